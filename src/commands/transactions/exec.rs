use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};

use crate::{
    commands::{
        CommandError, CommandHandler,
        command_handler::{CommandResult, CommandSource},
    },
    key_value_store::KeyValueStore,
    resp::RespValue,
    server::RedisServer,
    state::State,
};

pub struct ExecArguments;

impl ExecArguments {
    pub fn parse(arguments: Vec<String>) -> Result<Self, CommandError> {
        if !arguments.is_empty() {
            return Err(CommandError::InvalidExecCommand);
        }

        Ok(Self)
    }
}

/// Handles the EXEC command.
///
/// Ends the transaction and hands the queued commands back to the caller as a
/// batch, which runs them through `run_transaction_commands`.
pub async fn exec(
    client_address: &str,
    state: Arc<Mutex<State>>,
    arguments: Vec<String>,
) -> Result<CommandResult, CommandError> {
    ExecArguments::parse(arguments)?;

    let mut state_guard = state.lock().await;

    let Ok(transaction) = state_guard.remove_transaction(client_address) else {
        return Err(CommandError::ExecWithoutMulti);
    };

    if transaction.is_empty() {
        Ok(CommandResult::Response(
            RespValue::Array(Vec::new()).encode(),
        ))
    } else {
        Ok(CommandResult::Batch(transaction))
    }
}

/// Runs queued commands in order and builds the aggregate EXEC reply.
///
/// Each command goes through the regular command path, so writes are logged and
/// propagated one by one. A failing command contributes its error reply and
/// does not stop the rest. Blocking commands answer with what is there at once.
pub async fn run_transaction_commands(
    client_address: &str,
    server: Arc<RwLock<RedisServer>>,
    store: Arc<Mutex<KeyValueStore>>,
    state: Arc<Mutex<State>>,
    commands: Vec<CommandHandler>,
    source: CommandSource,
) -> String {
    let mut responses = Vec::with_capacity(commands.len() + 1);
    responses.push(format!("*{}\r\n", commands.len()));

    for command in commands {
        let response = match command
            .without_blocking()
            .handle_command(
                Arc::clone(&server),
                client_address,
                Arc::clone(&store),
                Arc::clone(&state),
                source,
            )
            .await
        {
            Ok(CommandResult::Response(data)) => data,
            Ok(CommandResult::NoResponse) => RespValue::Null.encode(),
            Ok(CommandResult::Sync) | Ok(CommandResult::Batch(_)) => {
                CommandError::NotAllowedInTransaction.as_string()
            }
            Err(e) => e.as_string(),
        };

        responses.push(response);
    }

    responses.join("")
}
