use std::sync::Arc;

use tokio::sync::Mutex;

use crate::{
    commands::{
        command_error::CommandError,
        command_handler::CommandResult,
        stream_utils::{RangeBound, parse_range_bound, parse_stream_entries_to_resp},
    },
    key_value_store::KeyValueStore,
    resp::RespValue,
};

pub struct XrangeArguments {
    key: String,
    start: String,
    end: String,
    count: Option<usize>,
}

impl XrangeArguments {
    pub fn parse(arguments: Vec<String>) -> Result<Self, CommandError> {
        if arguments.len() != 3 && arguments.len() != 5 {
            return Err(CommandError::InvalidXRangeCommand);
        }

        let count = if arguments.len() == 5 {
            if arguments[3].to_lowercase() != "count" {
                return Err(CommandError::InvalidXReadOption);
            }

            Some(
                arguments[4]
                    .parse::<usize>()
                    .map_err(|_| CommandError::InvalidCount)?,
            )
        } else {
            None
        };

        Ok(Self {
            key: arguments[0].clone(),
            start: arguments[1].clone(),
            end: arguments[2].clone(),
            count,
        })
    }
}

pub async fn xrange(
    store: Arc<Mutex<KeyValueStore>>,
    arguments: Vec<String>,
) -> Result<CommandResult, CommandError> {
    let xrange_arguments = XrangeArguments::parse(arguments)?;

    let mut store_guard = store.lock().await;

    let Some(stream) = store_guard.get_stream(&xrange_arguments.key)? else {
        return Ok(CommandResult::Response(
            RespValue::Array(Vec::new()).encode(),
        ));
    };

    let start = parse_range_bound(&xrange_arguments.start, stream, RangeBound::Start)?;
    let end = parse_range_bound(&xrange_arguments.end, stream, RangeBound::End)?;

    let mut entries = stream.range(start, end);

    if let Some(count) = xrange_arguments.count {
        entries.truncate(count);
    }

    Ok(CommandResult::Response(
        parse_stream_entries_to_resp(entries).encode(),
    ))
}
