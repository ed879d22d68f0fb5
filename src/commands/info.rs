use std::sync::Arc;

use tokio::sync::RwLock;

use crate::{
    commands::{CommandError, command_handler::CommandResult},
    resp::RespValue,
    server::RedisServer,
};

pub struct InfoArguments;

impl InfoArguments {
    pub fn parse(arguments: Vec<String>) -> Result<Self, CommandError> {
        if arguments.len() > 1 {
            return Err(CommandError::InvalidInfoCommand);
        }

        // Replication is the only section there is.
        if let Some(section) = arguments.first() {
            match section.to_lowercase().as_str() {
                "replication" | "default" | "all" | "everything" => {}
                _ => return Err(CommandError::InvalidInfoSection),
            }
        }

        Ok(Self)
    }
}

pub async fn info(
    server: Arc<RwLock<RedisServer>>,
    arguments: Vec<String>,
) -> Result<CommandResult, CommandError> {
    InfoArguments::parse(arguments)?;

    let server_guard = server.read().await;

    Ok(CommandResult::Response(
        RespValue::BulkString(server_guard.replication_info()).encode(),
    ))
}
