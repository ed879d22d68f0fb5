use std::{collections::VecDeque, sync::Arc};

use tokio::sync::Mutex;

use crate::{
    commands::{command_error::CommandError, command_handler::CommandResult},
    key_value_store::KeyValueStore,
    resp::RespValue,
};

pub struct LrangeArguments {
    key: String,
    start_index: i64,
    end_index: i64,
}

impl LrangeArguments {
    pub fn parse(arguments: Vec<String>) -> Result<Self, CommandError> {
        let [key, start_index, end_index]: [String; 3] = arguments
            .try_into()
            .map_err(|_| CommandError::InvalidLRangeCommand)?;

        let Ok(start_index) = start_index.parse::<i64>() else {
            return Err(CommandError::InvalidLRangeCommandArgument);
        };

        let Ok(end_index) = end_index.parse::<i64>() else {
            return Err(CommandError::InvalidLRangeCommandArgument);
        };

        Ok(Self {
            key,
            start_index,
            end_index,
        })
    }
}

/// Handles the LRANGE command.
///
/// Negative indexes count from the tail. Out of range indexes are clamped and
/// an empty or inverted range yields an empty array.
pub async fn lrange(
    store: Arc<Mutex<KeyValueStore>>,
    arguments: Vec<String>,
) -> Result<CommandResult, CommandError> {
    let lrange_arguments = LrangeArguments::parse(arguments)?;

    let mut store_guard = store.lock().await;

    let Some(list) = store_guard.get_list(&lrange_arguments.key)? else {
        return Ok(CommandResult::Response(
            RespValue::Array(Vec::new()).encode(),
        ));
    };

    let Some((start, end)) = validate_range_indexes(
        list,
        lrange_arguments.start_index,
        lrange_arguments.end_index,
    ) else {
        return Ok(CommandResult::Response(
            RespValue::Array(Vec::new()).encode(),
        ));
    };

    let range = list
        .range(start..=end)
        .cloned()
        .collect::<Vec<String>>();

    Ok(CommandResult::Response(
        RespValue::encode_array_from_strings(range),
    ))
}

fn validate_range_indexes(
    list: &VecDeque<String>,
    start_index: i64,
    end_index: i64,
) -> Option<(usize, usize)> {
    let len = list.len() as i64;

    if len == 0 {
        return None;
    }

    let start = if start_index < 0 {
        len + start_index
    } else {
        start_index
    }
    .max(0);

    let end = if end_index < 0 {
        len + end_index
    } else {
        end_index
    }
    .min(len - 1);

    if start >= len || start > end {
        return None;
    }

    Some((start as usize, end as usize))
}
