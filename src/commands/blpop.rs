use std::{sync::Arc, time::Duration};

use tokio::sync::{Mutex, oneshot};

use crate::{
    commands::{command_error::CommandError, command_handler::CommandResult},
    key_value_store::KeyValueStore,
    resp::RespValue,
    state::{BlpopSubscriber, State},
};

pub struct BlpopArguments {
    pub key: String,
    /// `None` blocks forever.
    pub timeout: Option<Duration>,
}

impl BlpopArguments {
    pub fn parse(arguments: Vec<String>) -> Result<Self, CommandError> {
        let [key, timeout]: [String; 2] = arguments
            .try_into()
            .map_err(|_| CommandError::InvalidBLPopCommand)?;

        let seconds = timeout
            .parse::<f64>()
            .ok()
            .filter(|seconds| seconds.is_finite() && *seconds >= 0.0)
            .ok_or(CommandError::InvalidBLPopTimeout)?;

        let timeout = if seconds == 0.0 {
            None
        } else {
            Some(Duration::from_secs_f64(seconds))
        };

        Ok(Self { key, timeout })
    }
}

/// How a BLPOP call got started.
#[derive(Debug)]
pub enum BlpopStart {
    Popped(String),
    /// Registered as a waiter; a later push sends the element here.
    Waiting(oneshot::Receiver<String>),
    /// Nothing to pop and not allowed to block.
    Empty,
}

/// Handles the BLPOP command.
///
/// Pops immediately when the list has elements. Otherwise the client joins the
/// key's FIFO of waiters and a later push hands it an element through a oneshot
/// channel. On timeout the waiter is removed and the channel closed; an element
/// sent in the meantime is still picked up, so nothing is lost.
pub async fn blpop(
    client_address: &str,
    store: Arc<Mutex<KeyValueStore>>,
    state: Arc<Mutex<State>>,
    arguments: Vec<String>,
    may_block: bool,
) -> Result<CommandResult, CommandError> {
    let blpop_arguments = BlpopArguments::parse(arguments)?;
    let key = blpop_arguments.key;

    let value = match start_blpop(client_address, &key, &store, &state, may_block).await? {
        BlpopStart::Popped(value) => Some(value),
        BlpopStart::Waiting(receiver) => {
            wait_for_blpop(client_address, &key, blpop_arguments.timeout, receiver, &state).await
        }
        BlpopStart::Empty => None,
    };

    Ok(blpop_reply(key, value))
}

/// Pops the head of `key` or, when the list is empty and `may_block` is set,
/// queues the client behind earlier waiters. The store stays locked across
/// both so a push cannot slip in between.
pub async fn start_blpop(
    client_address: &str,
    key: &str,
    store: &Arc<Mutex<KeyValueStore>>,
    state: &Arc<Mutex<State>>,
    may_block: bool,
) -> Result<BlpopStart, CommandError> {
    let mut store_guard = store.lock().await;

    if let Some(value) = store_guard.pop_list_front(key)? {
        return Ok(BlpopStart::Popped(value));
    }

    if !may_block {
        return Ok(BlpopStart::Empty);
    }

    let (sender, receiver) = oneshot::channel();

    state.lock().await.add_blpop_subscriber(
        key.to_string(),
        BlpopSubscriber {
            client_address: client_address.to_string(),
            sender,
        },
    );

    Ok(BlpopStart::Waiting(receiver))
}

/// Waits for a push to hand over an element, giving up after `timeout`.
pub async fn wait_for_blpop(
    client_address: &str,
    key: &str,
    timeout: Option<Duration>,
    mut receiver: oneshot::Receiver<String>,
    state: &Arc<Mutex<State>>,
) -> Option<String> {
    match timeout {
        None => receiver.await.ok(),
        Some(duration) => match tokio::time::timeout(duration, &mut receiver).await {
            Ok(result) => result.ok(),
            Err(_) => {
                state
                    .lock()
                    .await
                    .remove_blpop_subscriber(key, client_address);

                receiver.close();
                receiver.try_recv().ok()
            }
        },
    }
}

pub fn blpop_reply(key: String, value: Option<String>) -> CommandResult {
    match value {
        Some(value) => CommandResult::Response(RespValue::encode_array_from_strings(vec![
            key, value,
        ])),
        None => CommandResult::Response(RespValue::NullArray.encode()),
    }
}
