use std::{collections::VecDeque, sync::Arc};

use tokio::sync::Mutex;

use crate::{
    commands::{command_error::CommandError, command_handler::CommandResult},
    key_value_store::KeyValueStore,
    resp::RespValue,
    state::State,
};

pub struct PushArrayOperations {
    key: String,
    values: Vec<String>,
}

#[derive(Debug, PartialEq)]
pub struct PushOutcome {
    pub list_length: usize,
    /// Elements handed straight to blocked `BLPOP` clients.
    pub handed_off: usize,
}

impl PushOutcome {
    pub fn to_command_result(&self) -> CommandResult {
        CommandResult::Response(RespValue::Integer(self.list_length as i64).encode())
    }
}

impl PushArrayOperations {
    pub fn parse(arguments: Vec<String>, should_prepend: bool) -> Result<Self, CommandError> {
        if arguments.len() < 2 {
            return if should_prepend {
                Err(CommandError::InvalidLPushCommand)
            } else {
                Err(CommandError::InvalidRPushCommand)
            };
        }

        let mut arguments = arguments.into_iter();
        let key = arguments.next().unwrap_or_default();

        Ok(Self {
            key,
            values: arguments.collect(),
        })
    }
}

pub async fn rpush(
    store: Arc<Mutex<KeyValueStore>>,
    state: Arc<Mutex<State>>,
    arguments: Vec<String>,
) -> Result<CommandResult, CommandError> {
    push_array_operations(store, state, arguments, false)
        .await
        .map(|outcome| outcome.to_command_result())
}

pub async fn lpush(
    store: Arc<Mutex<KeyValueStore>>,
    state: Arc<Mutex<State>>,
    arguments: Vec<String>,
) -> Result<CommandResult, CommandError> {
    push_array_operations(store, state, arguments, true)
        .await
        .map(|outcome| outcome.to_command_result())
}

/// Pushes the values and then serves blocked `BLPOP` clients on the key.
///
/// The reply is the list length right after the push, even when some of the
/// new elements are handed straight to waiters. Both locks are held while
/// handing over so a waiter that times out concurrently either receives the
/// element or is already gone from the queue. Each hand-off takes the head of
/// the list, the same as an `LPOP` right after the push.
pub async fn push_array_operations(
    store: Arc<Mutex<KeyValueStore>>,
    state: Arc<Mutex<State>>,
    arguments: Vec<String>,
    should_prepend: bool,
) -> Result<PushOutcome, CommandError> {
    let push_array_arguments = PushArrayOperations::parse(arguments, should_prepend)?;
    let key = &push_array_arguments.key;

    let mut store_guard = store.lock().await;
    let list = store_guard.list_entry(key)?;
    add_values_to_list(list, &push_array_arguments.values, should_prepend);
    let list_length = list.len();

    let mut state_guard = state.lock().await;
    let mut handed_off = 0;

    for _ in 0..push_array_arguments.values.len() {
        if !state_guard.has_blpop_subscribers(key) {
            break;
        }

        let Some(value) = list.pop_front() else {
            break;
        };

        if let Some(unclaimed) = state_guard.send_to_blpop_subscriber(key, value) {
            list.push_front(unclaimed);
            break;
        }

        handed_off += 1;
    }

    if list.is_empty() {
        store_guard.remove(key);
    }

    Ok(PushOutcome {
        list_length,
        handed_off,
    })
}

fn add_values_to_list(list: &mut VecDeque<String>, values: &[String], should_prepend: bool) {
    for value in values {
        if should_prepend {
            list.push_front(value.clone());
        } else {
            list.push_back(value.clone());
        }
    }
}
