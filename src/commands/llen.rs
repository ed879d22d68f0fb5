use std::sync::Arc;

use tokio::sync::Mutex;

use crate::{
    commands::{command_error::CommandError, command_handler::CommandResult},
    key_value_store::KeyValueStore,
    resp::RespValue,
};

pub struct LlenArguments {
    key: String,
}

impl LlenArguments {
    pub fn parse(arguments: Vec<String>) -> Result<Self, CommandError> {
        let [key]: [String; 1] = arguments
            .try_into()
            .map_err(|_| CommandError::InvalidLLenCommand)?;

        Ok(Self { key })
    }
}

pub async fn llen(
    store: Arc<Mutex<KeyValueStore>>,
    arguments: Vec<String>,
) -> Result<CommandResult, CommandError> {
    let llen_arguments = LlenArguments::parse(arguments)?;

    let mut store_guard = store.lock().await;
    let length = store_guard
        .get_list(&llen_arguments.key)?
        .map(|list| list.len())
        .unwrap_or(0);

    Ok(CommandResult::Response(
        RespValue::Integer(length as i64).encode(),
    ))
}
