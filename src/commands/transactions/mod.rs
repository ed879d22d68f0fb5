//! MULTI, EXEC and DISCARD. Queued commands live in [`crate::state::State`]
//! and run back to back when EXEC hands them over as a batch.

mod discard;
mod exec;
mod multi;

pub use discard::{DiscardArguments, discard};
pub use exec::{ExecArguments, exec, run_transaction_commands};
pub use multi::{MultiArguments, multi};
