use std::{sync::Arc, time::Duration};

use tokio::{sync::RwLock, time::timeout};
use tracing::debug;

use crate::{
    commands::{CommandError, command_handler::CommandResult},
    resp::RespValue,
    server::RedisServer,
};

const ACK_POLL_INTERVAL: Duration = Duration::from_millis(10);

pub struct WaitArguments {
    pub number_of_replicas: usize,
    /// `None` waits forever.
    pub timeout: Option<Duration>,
}

impl WaitArguments {
    pub fn parse(arguments: Vec<String>) -> Result<Self, CommandError> {
        let [number_of_replicas, timeout_ms]: [String; 2] = arguments
            .try_into()
            .map_err(|_| CommandError::InvalidWaitCommand)?;

        let number_of_replicas = number_of_replicas
            .parse::<usize>()
            .map_err(|_| CommandError::InvalidWaitCommandArgument)?;

        let timeout_ms = timeout_ms
            .parse::<u64>()
            .map_err(|_| CommandError::InvalidWaitCommandArgument)?;

        let timeout = match timeout_ms {
            0 => None,
            _ => Some(Duration::from_millis(timeout_ms)),
        };

        Ok(Self {
            number_of_replicas,
            timeout,
        })
    }
}

/// Handles the WAIT command.
///
/// The target is the master offset when WAIT starts. If not enough replicas
/// have acknowledged it yet, every replica is asked for a fresh ACK and the
/// acknowledgements are polled until the count is reached or the timeout
/// fires. Either way the reply is the number of replicas at or past the target.
/// Without `may_block` the current count is returned straight away.
pub async fn wait(
    server: Arc<RwLock<RedisServer>>,
    arguments: Vec<String>,
    may_block: bool,
) -> Result<CommandResult, CommandError> {
    let wait_arguments = WaitArguments::parse(arguments)?;

    let (target_offset, connected_replicas) = {
        let server_guard = server.read().await;

        if server_guard.is_replica() {
            return Err(CommandError::InvalidWaitCommandForReplica);
        }

        (server_guard.repl_offset, server_guard.connected_replicas())
    };

    let synced_count = get_synced_replica_count(&server, target_offset).await;

    if !may_block || synced_count >= wait_arguments.number_of_replicas || connected_replicas == 0
    {
        return Ok(CommandResult::Response(
            RespValue::Integer(synced_count as i64).encode(),
        ));
    }

    {
        let mut server_guard = server.write().await;
        let getack = RespValue::encode_command("REPLCONF", &["GETACK".to_string(), "*".to_string()]);
        debug!(target_offset, "asking replicas for acknowledgements");
        server_guard.propagate_to_replicas(&getack);
    }

    let polling = poll_synced_replicas(
        Arc::clone(&server),
        target_offset,
        wait_arguments.number_of_replicas,
    );

    let synced_count = match wait_arguments.timeout {
        Some(duration) => match timeout(duration, polling).await {
            Ok(count) => count,
            Err(_) => get_synced_replica_count(&server, target_offset).await,
        },
        None => polling.await,
    };

    Ok(CommandResult::Response(
        RespValue::Integer(synced_count as i64).encode(),
    ))
}

async fn poll_synced_replicas(
    server: Arc<RwLock<RedisServer>>,
    target_offset: usize,
    number_of_replicas: usize,
) -> usize {
    loop {
        let synced_count = get_synced_replica_count(&server, target_offset).await;

        if synced_count >= number_of_replicas {
            return synced_count;
        }

        tokio::time::sleep(ACK_POLL_INTERVAL).await;
    }
}

async fn get_synced_replica_count(server: &Arc<RwLock<RedisServer>>, target_offset: usize) -> usize {
    let server_guard = server.read().await;
    server_guard.synced_replica_count(target_offset)
}
