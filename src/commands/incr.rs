use std::sync::Arc;

use tokio::sync::Mutex;

use crate::{
    commands::{command_error::CommandError, command_handler::CommandResult},
    key_value_store::KeyValueStore,
    resp::RespValue,
};

pub struct IncrArguments {
    key: String,
}

impl IncrArguments {
    pub fn parse(arguments: Vec<String>) -> Result<Self, CommandError> {
        let [key]: [String; 1] = arguments
            .try_into()
            .map_err(|_| CommandError::InvalidIncrCommand)?;

        Ok(Self { key })
    }
}

/// Handles the INCR command.
///
/// A missing key starts from 0. The stored value must parse as a signed 64-bit
/// integer; otherwise, or on overflow, the value is left untouched and the
/// command fails.
pub async fn incr(
    store: Arc<Mutex<KeyValueStore>>,
    arguments: Vec<String>,
) -> Result<CommandResult, CommandError> {
    let incr_arguments = IncrArguments::parse(arguments)?;

    let mut store_guard = store.lock().await;
    let value = store_guard.incr(&incr_arguments.key)?;

    Ok(CommandResult::Response(RespValue::Integer(value).encode()))
}
