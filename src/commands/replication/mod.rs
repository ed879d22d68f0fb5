mod handshake;
mod psync;
mod replconf;
mod wait;

pub use handshake::intercept_handshake_step;
pub use psync::{PsyncArguments, psync};
pub use replconf::{ReplconfArguments, ReplconfConfiguration, replconf};
pub use wait::{WaitArguments, wait};
