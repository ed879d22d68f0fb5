use std::sync::Arc;

use tokio::sync::Mutex;

use crate::{
    commands::{command_error::CommandError, command_handler::CommandResult},
    key_value_store::KeyValueStore,
    resp::RespValue,
};

pub struct LpopArguments {
    key: String,
    count: Option<usize>,
}

impl LpopArguments {
    pub fn parse(arguments: Vec<String>) -> Result<Self, CommandError> {
        if arguments.is_empty() || arguments.len() > 2 {
            return Err(CommandError::InvalidLPopCommand);
        }

        let count = match arguments.get(1) {
            Some(count) => Some(
                count
                    .parse::<usize>()
                    .map_err(|_| CommandError::InvalidLPopCommandArgument)?,
            ),
            None => None,
        };

        Ok(Self {
            key: arguments[0].clone(),
            count,
        })
    }
}

/// Handles the LPOP command.
///
/// Without a count the reply is a single bulk string (nil when there is
/// nothing to pop). With a count the reply is always an array, possibly
/// shorter than requested, or a nil array when the key does not exist.
pub async fn lpop(
    store: Arc<Mutex<KeyValueStore>>,
    arguments: Vec<String>,
) -> Result<CommandResult, CommandError> {
    let lpop_arguments = LpopArguments::parse(arguments)?;
    let key = &lpop_arguments.key;

    let mut store_guard = store.lock().await;

    let Some(count) = lpop_arguments.count else {
        let response = match store_guard.pop_list_front(key)? {
            Some(value) => RespValue::BulkString(value),
            None => RespValue::Null,
        };

        return Ok(CommandResult::Response(response.encode()));
    };

    let (popped, is_empty) = match store_guard.get_list_mut(key)? {
        Some(list) => {
            let popped = (0..count)
                .map_while(|_| list.pop_front())
                .collect::<Vec<String>>();

            (popped, list.is_empty())
        }
        None => {
            return Ok(CommandResult::Response(RespValue::NullArray.encode()));
        }
    };

    if is_empty {
        store_guard.remove(key);
    }

    Ok(CommandResult::Response(
        RespValue::encode_array_from_strings(popped),
    ))
}
