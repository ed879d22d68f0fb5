use std::sync::Arc;

use tokio::sync::Mutex;

use crate::{
    commands::{command_error::CommandError, command_handler::CommandResult},
    key_value_store::{DataType, KeyValueStore, unix_time_ms},
    resp::RespValue,
    state::State,
    stream::{Stream, StreamFields, StreamIdSpec},
};

pub struct XaddArguments {
    key: String,
    id_spec: StreamIdSpec,
    fields: StreamFields,
}

impl XaddArguments {
    pub fn parse(arguments: Vec<String>) -> Result<Self, CommandError> {
        if arguments.len() < 4 || arguments.len() % 2 != 0 {
            return Err(CommandError::InvalidXAddCommand);
        }

        let id_spec = arguments[1].parse::<StreamIdSpec>()?;

        let fields = arguments[2..]
            .chunks_exact(2)
            .map(|pair| (pair[0].clone(), pair[1].clone()))
            .collect::<StreamFields>();

        Ok(Self {
            key: arguments[0].clone(),
            id_spec,
            fields,
        })
    }
}

/// Handles the XADD command.
///
/// The stream is only created once the ID has been accepted, so a rejected
/// first entry leaves no empty stream behind. Every reader blocked on the key is
/// woken after the append.
pub async fn xadd(
    store: Arc<Mutex<KeyValueStore>>,
    state: Arc<Mutex<State>>,
    arguments: Vec<String>,
) -> Result<CommandResult, CommandError> {
    let xadd_arguments = XaddArguments::parse(arguments)?;
    let now_ms = unix_time_ms();

    let mut store_guard = store.lock().await;

    let id = match store_guard.get_stream_mut(&xadd_arguments.key)? {
        Some(stream) => stream.add(xadd_arguments.id_spec, xadd_arguments.fields, now_ms)?,
        None => {
            let mut stream = Stream::new();
            let id = stream.add(xadd_arguments.id_spec, xadd_arguments.fields, now_ms)?;
            store_guard.set(xadd_arguments.key.clone(), DataType::Stream(stream), None);

            id
        }
    };

    let mut state_guard = state.lock().await;
    state_guard.notify_xread_subscribers(&xadd_arguments.key);

    Ok(CommandResult::Response(
        RespValue::BulkString(id.to_string()).encode(),
    ))
}
