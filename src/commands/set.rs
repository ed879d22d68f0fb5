use std::{sync::Arc, time::Duration};

use tokio::sync::Mutex;

use crate::{
    commands::{command_error::CommandError, command_handler::CommandResult},
    key_value_store::{DataType, KeyValueStore},
    resp::RespValue,
};

/// Represents the parsed arguments for the SET command
#[derive(Debug, PartialEq)]
pub struct SetArguments {
    /// The key name to write
    key: String,
    /// The value to be stored under the given key
    value: String,
    /// Time to live, relative to when the command executes
    ttl: Option<Duration>,
}

impl SetArguments {
    /// Parses `key value [PX milliseconds | EX seconds]`.
    ///
    /// The TTL is kept relative rather than turned into a deadline here, because
    /// queued and replicated commands execute later than they are parsed.
    ///
    /// # Errors
    ///
    /// * `CommandError::InvalidSetCommand` - argument count is not 2 or 4
    /// * `CommandError::InvalidSetCommandArgument` - the option is not `PX` or `EX`
    /// * `CommandError::InvalidSetCommandExpiration` - the TTL is not a positive integer
    pub fn parse(arguments: Vec<String>) -> Result<Self, CommandError> {
        if arguments.len() != 2 && arguments.len() != 4 {
            return Err(CommandError::InvalidSetCommand);
        }

        let mut ttl: Option<Duration> = None;

        if arguments.len() == 4 {
            let amount = arguments[3]
                .parse::<u64>()
                .ok()
                .filter(|amount| *amount > 0)
                .ok_or(CommandError::InvalidSetCommandExpiration)?;

            ttl = match arguments[2].to_lowercase().as_str() {
                "px" => Some(Duration::from_millis(amount)),
                "ex" => Some(Duration::from_secs(amount)),
                _ => return Err(CommandError::InvalidSetCommandArgument),
            };
        }

        let mut arguments = arguments.into_iter();

        Ok(Self {
            key: arguments.next().unwrap_or_default(),
            value: arguments.next().unwrap_or_default(),
            ttl,
        })
    }
}

/// Handles the SET command.
///
/// Replaces whatever is stored under the key, regardless of its kind, and
/// schedules expiry when a TTL is given.
pub async fn set(
    store: Arc<Mutex<KeyValueStore>>,
    arguments: Vec<String>,
) -> Result<CommandResult, CommandError> {
    let set_arguments = SetArguments::parse(arguments)?;

    let mut store_guard = store.lock().await;
    store_guard.set(
        set_arguments.key,
        DataType::String(set_arguments.value),
        set_arguments.ttl,
    );

    Ok(CommandResult::Response(
        RespValue::SimpleString("OK".to_string()).encode(),
    ))
}
