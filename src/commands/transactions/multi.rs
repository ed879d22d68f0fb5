use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::debug;

use crate::{
    commands::{CommandError, command_handler::CommandResult},
    resp::RespValue,
    state::State,
};

pub struct MultiArguments;

impl MultiArguments {
    pub fn parse(arguments: Vec<String>) -> Result<Self, CommandError> {
        if !arguments.is_empty() {
            return Err(CommandError::InvalidMultiCommand);
        }

        Ok(Self)
    }
}

/// Handles the MULTI command.
///
/// From here until EXEC or DISCARD every other command from this client is
/// validated and queued instead of run. A second MULTI fails and leaves the
/// open transaction as it is.
pub async fn multi(
    client_address: &str,
    state: Arc<Mutex<State>>,
    arguments: Vec<String>,
) -> Result<CommandResult, CommandError> {
    MultiArguments::parse(arguments)?;

    state
        .lock()
        .await
        .start_transaction(client_address.to_string())?;

    debug!(client = client_address, "transaction started");

    Ok(CommandResult::Response(
        RespValue::SimpleString("OK".to_string()).encode(),
    ))
}
