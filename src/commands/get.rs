use std::sync::Arc;

use tokio::sync::Mutex;

use crate::{
    commands::{command_error::CommandError, command_handler::CommandResult},
    key_value_store::{DataType, KeyValueStore, StoreError},
    resp::RespValue,
};

pub struct GetArguments {
    key: String,
}

impl GetArguments {
    pub fn parse(arguments: Vec<String>) -> Result<Self, CommandError> {
        let [key]: [String; 1] = arguments
            .try_into()
            .map_err(|_| CommandError::InvalidGetCommand)?;

        Ok(Self { key })
    }
}

/// Handles the GET command.
///
/// Expired keys are evicted by the store before the lookup, so a key whose TTL
/// has passed reads as absent.
///
/// # Returns
///
/// * Bulk string with the value for string and integer entries
/// * Null bulk string if the key does not exist
/// * `StoreError::WrongType` if the key holds a list or a stream
pub async fn get(
    store: Arc<Mutex<KeyValueStore>>,
    arguments: Vec<String>,
) -> Result<CommandResult, CommandError> {
    let get_arguments = GetArguments::parse(arguments)?;

    let mut store_guard = store.lock().await;

    let response = match store_guard.get(&get_arguments.key) {
        None => RespValue::Null,
        Some(value) => match &value.data {
            DataType::String(s) => RespValue::BulkString(s.clone()),
            DataType::Integer(i) => RespValue::BulkString(i.to_string()),
            DataType::List(_) | DataType::Stream(_) => {
                return Err(StoreError::WrongType.into());
            }
        },
    };

    Ok(CommandResult::Response(response.encode()))
}
