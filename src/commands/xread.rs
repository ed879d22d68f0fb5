use std::{sync::Arc, time::Duration};

use tokio::sync::{Mutex, mpsc};

use crate::{
    commands::{
        command_error::CommandError,
        command_handler::CommandResult,
        stream_utils::{parse_read_id, parse_stream_entries_to_resp},
    },
    key_value_store::KeyValueStore,
    resp::RespValue,
    state::{State, XreadSubscriber},
    stream::StreamId,
};

#[derive(Debug, PartialEq)]
pub struct XreadArguments {
    count: Option<usize>,
    /// Milliseconds, 0 blocks forever.
    blocking_duration: Option<u64>,
    key_stream_pairs: Vec<(String, String)>,
}

impl XreadArguments {
    pub fn parse(arguments: Vec<String>) -> Result<Self, CommandError> {
        let mut count = None;
        let mut blocking_duration = None;
        let mut index = 0;

        loop {
            let Some(option) = arguments.get(index) else {
                return Err(CommandError::InvalidXReadCommand);
            };

            match option.to_lowercase().as_str() {
                "count" => {
                    let value = arguments
                        .get(index + 1)
                        .ok_or(CommandError::InvalidXReadCommand)?;
                    count = Some(
                        value
                            .parse::<usize>()
                            .map_err(|_| CommandError::InvalidCount)?,
                    );
                    index += 2;
                }
                "block" => {
                    let value = arguments
                        .get(index + 1)
                        .ok_or(CommandError::InvalidXReadCommand)?;
                    blocking_duration = Some(
                        value
                            .parse::<u64>()
                            .map_err(|_| CommandError::InvalidXReadBlockDuration)?,
                    );
                    index += 2;
                }
                "streams" => {
                    index += 1;
                    break;
                }
                _ => return Err(CommandError::InvalidXReadOption),
            }
        }

        let data = &arguments[index..];

        if data.is_empty() || data.len() % 2 != 0 {
            return Err(CommandError::InvalidXReadCommand);
        }

        let (keys, ids) = data.split_at(data.len() / 2);
        let key_stream_pairs = keys
            .iter()
            .cloned()
            .zip(ids.iter().cloned())
            .collect::<Vec<(String, String)>>();

        Ok(Self {
            count,
            blocking_duration,
            key_stream_pairs,
        })
    }
}

/// Handles the XREAD command.
///
/// `$` is resolved once, at call time, to the stream's current last ID. When
/// blocking, the client is registered on every named stream while the store is
/// still locked, so an append racing with the registration cannot be missed.
/// After a wake-up or the timeout the streams are read one more time. Without
/// `may_block`, BLOCK is ignored.
pub async fn xread(
    client_address: &str,
    store: Arc<Mutex<KeyValueStore>>,
    state: Arc<Mutex<State>>,
    arguments: Vec<String>,
    may_block: bool,
) -> Result<CommandResult, CommandError> {
    let mut xread_arguments = XreadArguments::parse(arguments)?;

    if !may_block {
        xread_arguments.blocking_duration = None;
    }

    let count = xread_arguments.count.unwrap_or(1);

    let (parsed_stream_ids, mut receiver, blocking_duration_ms) = {
        let mut store_guard = store.lock().await;
        let parsed_stream_ids =
            parse_stream_ids(&mut store_guard, xread_arguments.key_stream_pairs)?;

        if let Some(response) = read_streams(&mut store_guard, &parsed_stream_ids, count)? {
            return Ok(CommandResult::Response(response.encode()));
        }

        let Some(blocking_duration_ms) = xread_arguments.blocking_duration else {
            return Ok(CommandResult::Response(RespValue::NullArray.encode()));
        };

        let (sender, receiver) = mpsc::channel(parsed_stream_ids.len());

        let mut state_guard = state.lock().await;
        for (key, _) in &parsed_stream_ids {
            state_guard.add_xread_subscriber(
                key.clone(),
                XreadSubscriber {
                    client_address: client_address.to_string(),
                    sender: sender.clone(),
                },
            );
        }

        (parsed_stream_ids, receiver, blocking_duration_ms)
    };

    wait_for_data(&mut receiver, blocking_duration_ms).await;

    {
        let mut state_guard = state.lock().await;
        for (key, _) in &parsed_stream_ids {
            state_guard.remove_xread_subscriber(key, client_address);
        }
    }

    let mut store_guard = store.lock().await;
    let response = read_streams(&mut store_guard, &parsed_stream_ids, count)?
        .unwrap_or(RespValue::NullArray);

    Ok(CommandResult::Response(response.encode()))
}

fn parse_stream_ids(
    store: &mut KeyValueStore,
    key_stream_id_pairs: Vec<(String, String)>,
) -> Result<Vec<(String, StreamId)>, CommandError> {
    let mut parsed_key_stream_id_pairs = Vec::with_capacity(key_stream_id_pairs.len());

    for (key, stream_id) in key_stream_id_pairs {
        let parsed_stream_id = if stream_id == "$" {
            store
                .get_stream(&key)?
                .map(|stream| stream.last_id())
                .unwrap_or(StreamId::ZERO)
        } else {
            parse_read_id(&stream_id)?
        };

        parsed_key_stream_id_pairs.push((key, parsed_stream_id));
    }

    Ok(parsed_key_stream_id_pairs)
}

async fn wait_for_data(receiver: &mut mpsc::Receiver<()>, blocking_duration_ms: u64) {
    match blocking_duration_ms {
        0 => {
            receiver.recv().await;
        }
        duration => {
            let _ = tokio::time::timeout(Duration::from_millis(duration), receiver.recv()).await;
        }
    }
}

/// Returns `None` when none of the streams has an entry past its ID.
fn read_streams(
    store: &mut KeyValueStore,
    key_stream_id_pairs: &[(String, StreamId)],
    count: usize,
) -> Result<Option<RespValue>, CommandError> {
    let mut result_streams = Vec::new();

    for (key, stream_id) in key_stream_id_pairs {
        let Some(stream) = store.get_stream(key)? else {
            continue;
        };

        let matching_entries = stream.entries_after(*stream_id, count);

        if !matching_entries.is_empty() {
            result_streams.push(RespValue::Array(vec![
                RespValue::BulkString(key.clone()),
                parse_stream_entries_to_resp(matching_entries),
            ]));
        }
    }

    if result_streams.is_empty() {
        return Ok(None);
    }

    Ok(Some(RespValue::Array(result_streams)))
}
