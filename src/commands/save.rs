use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};

use crate::{
    commands::{CommandError, command_handler::CommandResult},
    key_value_store::KeyValueStore,
    resp::RespValue,
    server::RedisServer,
};

pub struct SaveArguments;

impl SaveArguments {
    pub fn parse(arguments: Vec<String>) -> Result<Self, CommandError> {
        if !arguments.is_empty() {
            return Err(CommandError::InvalidSaveCommand);
        }

        Ok(Self)
    }
}

/// Writes the keyspace to the snapshot file before replying, and empties the
/// append log. Both locks are held throughout so no write slips in between.
pub async fn save(
    server: Arc<RwLock<RedisServer>>,
    store: Arc<Mutex<KeyValueStore>>,
    arguments: Vec<String>,
) -> Result<CommandResult, CommandError> {
    SaveArguments::parse(arguments)?;

    let mut server_guard = server.write().await;
    let mut store_guard = store.lock().await;

    server_guard
        .save(&mut store_guard)
        .await
        .map_err(|e| CommandError::SnapshotFailed(e.to_string()))?;

    Ok(CommandResult::Response(
        RespValue::SimpleString("OK".to_string()).encode(),
    ))
}
