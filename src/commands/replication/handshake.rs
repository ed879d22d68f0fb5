use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};

use crate::{
    commands::{
        CommandError, CommandHandler,
        command_handler::CommandResult,
        ping::ping,
        replication::{
            ReplconfArguments, ReplconfConfiguration, psync::psync, replconf::replconf,
        },
    },
    server::RedisServer,
    state::{HandshakeStep, State},
};

/// Advances the master side of the replication handshake.
///
/// A connection moves `New -> Pinged -> PortSet -> CapaSet -> Synced` on
/// `PING`, `REPLCONF listening-port`, `REPLCONF capa` and `PSYNC`, in that
/// order. Returns `None` for anything that is not the next expected step, and
/// the command is then handled like any other.
pub async fn intercept_handshake_step(
    handler: &CommandHandler,
    client_address: &str,
    server: Arc<RwLock<RedisServer>>,
    state: Arc<Mutex<State>>,
) -> Result<Option<CommandResult>, CommandError> {
    if server.read().await.is_replica() {
        return Ok(None);
    }

    let step = {
        let state_guard = state.lock().await;

        // A queueing client is an ordinary client.
        if state_guard.get_transaction(client_address).is_some() {
            return Ok(None);
        }

        state_guard.handshake_step(client_address)
    };

    let next_step = match (handler.name.as_str(), step) {
        ("PING", HandshakeStep::New) if handler.arguments.is_empty() => HandshakeStep::Pinged,
        ("REPLCONF", HandshakeStep::Pinged) => match ReplconfArguments::parse(
            handler.arguments.clone(),
        ) {
            Ok(ReplconfArguments {
                configuration: ReplconfConfiguration::ListeningPort(_),
            }) => HandshakeStep::PortSet,
            _ => return Ok(None),
        },
        ("REPLCONF", HandshakeStep::PortSet) => match ReplconfArguments::parse(
            handler.arguments.clone(),
        ) {
            Ok(ReplconfArguments {
                configuration: ReplconfConfiguration::Capabilities(_),
            }) => HandshakeStep::CapaSet,
            _ => return Ok(None),
        },
        ("PSYNC", HandshakeStep::CapaSet) => HandshakeStep::Synced,
        _ => return Ok(None),
    };

    let result = match next_step {
        HandshakeStep::Pinged => ping(handler.arguments.clone())?,
        HandshakeStep::Synced => psync(handler.arguments.clone())?,
        _ => replconf(client_address, server, handler.arguments.clone()).await?,
    };

    let mut state_guard = state.lock().await;
    state_guard.set_handshake_step(client_address, next_step);

    Ok(Some(result))
}
