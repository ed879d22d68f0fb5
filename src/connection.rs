use std::sync::Arc;

use anyhow::Context;
use bytes::BytesMut;
use tokio::{
    io::AsyncWriteExt,
    net::{TcpStream, tcp::OwnedWriteHalf},
    sync::{Mutex, RwLock},
};
use tracing::{debug, info, instrument, warn};

use crate::{
    commands::{CommandHandler, CommandResult, CommandSource, run_transaction_commands},
    input::{CommandReadError, drain_frames, handshake, read_into_buffer},
    key_value_store::KeyValueStore,
    resp::RespValue,
    server::{RedisRole, RedisServer},
    state::State,
};

async fn thread_safe_write_to_stream(
    writer: &Arc<RwLock<OwnedWriteHalf>>,
    bytes: &[u8],
) -> tokio::io::Result<()> {
    let mut writer_guard = writer.write().await;
    writer_guard.write_all(bytes).await?;
    writer_guard.flush().await
}

/// Serves one client until it disconnects.
#[instrument(skip(stream, server, store, state))]
pub async fn handle_client_connection(
    stream: TcpStream,
    client_address: String,
    server: Arc<RwLock<RedisServer>>,
    store: Arc<Mutex<KeyValueStore>>,
    state: Arc<Mutex<State>>,
) {
    debug!("client connected");

    let (mut reader, writer) = stream.into_split();
    let writer = Arc::new(RwLock::new(writer));
    let mut buffer = BytesMut::with_capacity(4096);

    loop {
        match read_into_buffer(&mut reader, &mut buffer).await {
            Ok(_) => {}
            Err(CommandReadError::ConnectionClosed) => break,
            Err(e) => {
                warn!(error = %e, "read failed");
                break;
            }
        }

        loop {
            let (frames, error) = drain_frames(&mut buffer);

            for (frame, _) in frames {
                if frame == RespValue::Array(Vec::new()) {
                    continue;
                }

                let reply = handle_client_frame(
                    frame,
                    &client_address,
                    &writer,
                    Arc::clone(&server),
                    Arc::clone(&store),
                    Arc::clone(&state),
                )
                .await;

                if let Some(reply) = reply {
                    if let Err(e) = thread_safe_write_to_stream(&writer, reply.as_bytes()).await {
                        warn!(error = %e, "write failed");
                    }
                }
            }

            let Some(error) = error else {
                break;
            };

            if let Err(e) = thread_safe_write_to_stream(&writer, error.as_string().as_bytes()).await
            {
                warn!(error = %e, "write failed");
            }
        }
    }

    server.write().await.remove_replica(&client_address);
    state.lock().await.remove_client(&client_address);

    debug!("client disconnected");
}

/// Runs one client command and returns the bytes to send back, if any.
async fn handle_client_frame(
    frame: RespValue,
    client_address: &str,
    writer: &Arc<RwLock<OwnedWriteHalf>>,
    server: Arc<RwLock<RedisServer>>,
    store: Arc<Mutex<KeyValueStore>>,
    state: Arc<Mutex<State>>,
) -> Option<String> {
    let command_handler = match CommandHandler::new(frame) {
        Ok(handler) => handler,
        Err(e) => return Some(e.as_string()),
    };

    let command_result = match command_handler
        .handle_command(
            Arc::clone(&server),
            client_address,
            Arc::clone(&store),
            Arc::clone(&state),
            CommandSource::Client,
        )
        .await
    {
        Ok(result) => result,
        Err(e) => {
            debug!(command = %command_handler.name, error = %e, "command failed");
            return Some(e.as_string());
        }
    };

    match command_result {
        CommandResult::NoResponse => None,
        CommandResult::Response(response) => Some(response),
        CommandResult::Sync => {
            let mut server_guard = server.write().await;
            let registered = server_guard.register_replica(
                client_address,
                Arc::clone(writer),
                &mut *store.lock().await,
            );

            if registered.is_none() {
                warn!("full resync requested but no replica could be registered");
            }

            None
        }
        CommandResult::Batch(commands) => Some(
            run_transaction_commands(
                client_address,
                server,
                store,
                state,
                commands,
                CommandSource::Client,
            )
            .await,
        ),
    }
}

/// Connects to the master, performs the handshake and applies the command
/// stream until the master goes away.
pub async fn handle_master_link(
    server: Arc<RwLock<RedisServer>>,
    store: Arc<Mutex<KeyValueStore>>,
    state: Arc<Mutex<State>>,
) -> anyhow::Result<()> {
    let (host, port, listening_port) = {
        let server_guard = server.read().await;

        match &server_guard.role {
            RedisRole::Replica((host, port)) => (host.clone(), *port, server_guard.config.port),
            RedisRole::Master => return Ok(()),
        }
    };

    let master_address = format!("{}:{}", host, port);

    let mut stream = TcpStream::connect((host.as_str(), port))
        .await
        .with_context(|| format!("failed to connect to master {}", master_address))?;

    let mut buffer = BytesMut::with_capacity(4096);

    let full_resync = handshake(&mut stream, &mut buffer, listening_port)
        .await
        .with_context(|| format!("replication handshake with {} failed", master_address))?;

    server.write().await.processed_offset = full_resync.offset;

    info!(
        master = %master_address,
        replication_id = %full_resync.replication_id,
        offset = full_resync.offset,
        "replication link established"
    );

    loop {
        let (frames, error) = drain_frames(&mut buffer);

        for (frame, consumed) in frames {
            apply_master_frame(
                frame,
                consumed,
                &master_address,
                &mut stream,
                Arc::clone(&server),
                Arc::clone(&store),
                Arc::clone(&state),
            )
            .await
            .with_context(|| format!("failed to answer master {}", master_address))?;
        }

        if let Some(error) = error {
            warn!(master = %master_address, %error, "skipping malformed bytes from master");
            continue;
        }

        match read_into_buffer(&mut stream, &mut buffer).await {
            Ok(_) => {}
            Err(CommandReadError::ConnectionClosed) => {
                info!(master = %master_address, "master closed the replication link");
                state.lock().await.remove_client(&master_address);
                return Ok(());
            }
            Err(e) => {
                return Err(e).with_context(|| format!("failed to read from master {}", master_address));
            }
        }
    }
}

/// Applies one propagated command. Only `REPLCONF` is answered.
///
/// The frame's bytes count towards the processed offset after it ran, so a
/// `GETACK` reports the offset as it stood before the request.
async fn apply_master_frame(
    frame: RespValue,
    consumed: usize,
    master_address: &str,
    stream: &mut TcpStream,
    server: Arc<RwLock<RedisServer>>,
    store: Arc<Mutex<KeyValueStore>>,
    state: Arc<Mutex<State>>,
) -> tokio::io::Result<()> {
    let reply = match CommandHandler::new(frame) {
        Ok(command_handler) => {
            let result = command_handler
                .handle_command(
                    Arc::clone(&server),
                    master_address,
                    Arc::clone(&store),
                    Arc::clone(&state),
                    CommandSource::Master,
                )
                .await;

            match result {
                Ok(CommandResult::Response(response)) if command_handler.name == "REPLCONF" => {
                    Some(response)
                }
                Ok(CommandResult::Batch(commands)) => {
                    run_transaction_commands(
                        master_address,
                        Arc::clone(&server),
                        store,
                        state,
                        commands,
                        CommandSource::Master,
                    )
                    .await;
                    None
                }
                Ok(_) => None,
                Err(e) => {
                    warn!(command = %command_handler.name, error = %e, "propagated command failed");
                    None
                }
            }
        }
        Err(e) => {
            warn!(error = %e, "master sent something that is not a command");
            None
        }
    };

    if let Some(reply) = reply {
        stream.write_all(reply.as_bytes()).await?;
        stream.flush().await?;
    }

    server.write().await.processed_offset += consumed;

    Ok(())
}
