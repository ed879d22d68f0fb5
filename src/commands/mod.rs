mod blpop;
mod command_error;
mod command_handler;
mod command_table;
mod echo;
mod get;
mod incr;
mod info;
mod llen;
mod lpop;
mod lrange;
mod ping;
mod replication;
mod rpush_and_lpush;
mod save;
mod set;
mod stream_utils;
mod transactions;
mod type_command;
mod xadd;
mod xrange;
mod xread;

pub use command_error::CommandError;
pub use command_handler::{CommandHandler, CommandResult, CommandSource};
pub use command_table::{COMMAND_TABLE, CommandKind, CommandSpec, lookup};
pub use transactions::run_transaction_commands;
