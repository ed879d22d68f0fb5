use std::{
    collections::HashMap,
    net::SocketAddr,
    path::PathBuf,
    sync::Arc,
};

use anyhow::Context;
use bytes::{Bytes, BytesMut};
use tokio::{
    io::AsyncWriteExt,
    net::{TcpListener, tcp::OwnedWriteHalf},
    sync::{
        Mutex, RwLock,
        mpsc::{self, error::TrySendError},
    },
};
use tracing::{debug, error, info, warn};

use crate::{
    aof::{self, AppendOnlyFile},
    commands::{CommandHandler, CommandResult, CommandSource, run_transaction_commands},
    connection::{handle_client_connection, handle_master_link},
    key_value_store::KeyValueStore,
    rdb::{load_snapshot, save_snapshot, write_snapshot_file},
    resp::RespValue,
    state::State,
};

const REPLAY_CLIENT_ADDRESS: &str = "append-log-replay";
/// Frames a replica may fall behind by before it is dropped.
const REPLICA_QUEUE_CAPACITY: usize = 1024;

#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub port: u16,
    pub replica_of: Option<(String, u16)>,
    pub dir: PathBuf,
    pub dbfilename: String,
    pub appendfilename: String,
    pub appendonly: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 6379,
            replica_of: None,
            dir: PathBuf::from("."),
            dbfilename: "dump.rdb".to_string(),
            appendfilename: "appendonly.aof".to_string(),
            appendonly: true,
        }
    }
}

impl ServerConfig {
    pub fn snapshot_path(&self) -> PathBuf {
        self.dir.join(&self.dbfilename)
    }

    pub fn append_log_path(&self) -> PathBuf {
        self.dir.join(&self.appendfilename)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RedisRole {
    Master,
    Replica((String, u16)),
}

#[derive(Debug)]
pub struct Replica {
    /// Queue drained by the replica's writer task.
    sender: mpsc::Sender<Bytes>,
    /// Last offset the replica acknowledged.
    pub offset: usize,
}

#[derive(Debug)]
pub struct RedisServer {
    pub config: ServerConfig,
    pub role: RedisRole,
    pub repl_id: String,
    /// Bytes of commands sent to replicas so far.
    pub repl_offset: usize,
    /// Bytes of commands a replica has applied from its master.
    pub processed_offset: usize,
    pub replicas: Option<HashMap<String, Replica>>,
    append_log: Option<AppendOnlyFile>,
}

impl RedisServer {
    pub fn new(config: ServerConfig) -> Self {
        let role = match &config.replica_of {
            Some(master) => RedisRole::Replica(master.clone()),
            None => RedisRole::Master,
        };

        let replicas = match role {
            RedisRole::Master => Some(HashMap::new()),
            RedisRole::Replica(_) => None,
        };

        Self {
            config,
            role,
            repl_id: generate_replication_id(),
            repl_offset: 0,
            processed_offset: 0,
            replicas,
            append_log: None,
        }
    }

    pub fn is_replica(&self) -> bool {
        matches!(self.role, RedisRole::Replica(_))
    }

    pub fn full_resync_header(&self) -> String {
        RespValue::SimpleString(format!("FULLRESYNC {} {}", self.repl_id, self.repl_offset))
            .encode()
    }

    /// Registers the connection behind `writer` as a replica and queues the
    /// `FULLRESYNC` header and a snapshot of `store` as its first message.
    ///
    /// The caller holds the server lock, so the announced offset matches the
    /// snapshot and every later write lands in the replica's queue after it.
    /// Returns the snapshot size.
    pub fn register_replica(
        &mut self,
        client_address: &str,
        writer: Arc<RwLock<OwnedWriteHalf>>,
        store: &mut KeyValueStore,
    ) -> Option<usize> {
        let header = self.full_resync_header();
        let replicas = self.replicas.as_mut()?;

        let snapshot = save_snapshot(store);
        let mut payload = BytesMut::with_capacity(header.len() + snapshot.len() + 16);
        payload.extend_from_slice(header.as_bytes());
        payload.extend_from_slice(format!("${}\r\n", snapshot.len()).as_bytes());
        payload.extend_from_slice(&snapshot);

        let (sender, receiver) = mpsc::channel(REPLICA_QUEUE_CAPACITY);
        sender.try_send(payload.freeze()).ok()?;

        tokio::spawn(write_to_replica(
            client_address.to_string(),
            writer,
            receiver,
        ));

        replicas.insert(client_address.to_string(), Replica { sender, offset: 0 });
        info!(replica = client_address, bytes = snapshot.len(), "replica registered");

        Some(snapshot.len())
    }

    pub fn remove_replica(&mut self, client_address: &str) {
        if let Some(replicas) = &mut self.replicas {
            if replicas.remove(client_address).is_some() {
                info!(replica = client_address, "replica removed");
            }
        }
    }

    pub fn record_replica_ack(&mut self, client_address: &str, offset: usize) {
        match self
            .replicas
            .as_mut()
            .and_then(|replicas| replicas.get_mut(client_address))
        {
            Some(replica) => replica.offset = offset,
            None => warn!(client = client_address, offset, "ACK from unknown replica"),
        }
    }

    pub fn connected_replicas(&self) -> usize {
        self.replicas.as_ref().map_or(0, HashMap::len)
    }

    /// Replicas that acknowledged at least `target_offset`.
    pub fn synced_replica_count(&self, target_offset: usize) -> usize {
        self.replicas.as_ref().map_or(0, |replicas| {
            replicas
                .values()
                .filter(|replica| replica.offset >= target_offset)
                .count()
        })
    }

    pub fn set_append_log(&mut self, append_log: AppendOnlyFile) {
        self.append_log = Some(append_log);
    }

    pub async fn append_to_log(&mut self, frame: &str) {
        let Some(append_log) = &mut self.append_log else {
            return;
        };

        if let Err(e) = append_log.append(frame.as_bytes()).await {
            warn!(path = %append_log.path().display(), error = %e, "append to log failed");
        }
    }

    /// Writes the keyspace to the snapshot file and empties the append log,
    /// whose commands the snapshot now covers.
    pub async fn save(&mut self, store: &mut KeyValueStore) -> tokio::io::Result<usize> {
        let path = self.config.snapshot_path();
        let snapshot = save_snapshot(store);

        write_snapshot_file(&path, &snapshot).await?;

        if let Some(append_log) = &mut self.append_log {
            append_log.truncate().await?;
        }

        info!(path = %path.display(), bytes = snapshot.len(), "snapshot saved");

        Ok(snapshot.len())
    }

    /// Queues `frame` for every replica and advances the replication offset.
    ///
    /// Never waits on a socket. A replica whose queue is full or whose writer
    /// has stopped is dropped.
    pub fn propagate_to_replicas(&mut self, frame: &str) {
        if let Some(replicas) = &mut self.replicas {
            let frame = Bytes::copy_from_slice(frame.as_bytes());

            replicas.retain(|address, replica| match replica.sender.try_send(frame.clone()) {
                Ok(()) => true,
                Err(TrySendError::Full(_)) => {
                    warn!(replica = %address, "replica is not keeping up, dropping it");
                    false
                }
                Err(TrySendError::Closed(_)) => {
                    warn!(replica = %address, "replica writer stopped, dropping it");
                    false
                }
            });
        }

        self.repl_offset += frame.len();
    }

    pub fn replication_info(&self) -> String {
        let mut lines = vec!["# Replication".to_string()];

        match &self.role {
            RedisRole::Master => lines.push("role:master".to_string()),
            RedisRole::Replica((host, port)) => {
                lines.push("role:slave".to_string());
                lines.push(format!("master_host:{}", host));
                lines.push(format!("master_port:{}", port));
            }
        }

        lines.push(format!("connected_slaves:{}", self.connected_replicas()));
        lines.push(format!("master_replid:{}", self.repl_id));
        lines.push(format!("master_repl_offset:{}", self.repl_offset));

        lines.join("\r\n")
    }

    /// Recovers the keyspace and binds the listener.
    ///
    /// The snapshot is loaded first and the append log, when enabled, is
    /// replayed on top of it.
    pub async fn bind(mut self) -> anyhow::Result<BoundServer> {
        let snapshot_path = self.config.snapshot_path();
        let store = load_snapshot(&snapshot_path)
            .await
            .with_context(|| format!("failed to load snapshot {}", snapshot_path.display()))?;

        let listener = TcpListener::bind(("127.0.0.1", self.config.port))
            .await
            .with_context(|| format!("failed to bind port {}", self.config.port))?;
        let local_addr = listener.local_addr()?;
        self.config.port = local_addr.port();

        let appendonly = self.config.appendonly;
        let append_log_path = self.config.append_log_path();

        let bound = BoundServer {
            listener,
            local_addr,
            server: Arc::new(RwLock::new(self)),
            store: Arc::new(Mutex::new(store)),
            state: Arc::new(Mutex::new(State::new())),
        };

        if appendonly {
            let replayed = bound.replay_append_log(&append_log_path).await?;
            if replayed > 0 {
                info!(commands = replayed, "append log replayed");
            }

            let append_log = AppendOnlyFile::open(&append_log_path).await.with_context(|| {
                format!("failed to open append log {}", append_log_path.display())
            })?;
            bound.server.write().await.set_append_log(append_log);
        }

        info!(address = %local_addr, "listening");

        Ok(bound)
    }

    /// Runs until interrupted, then saves a final snapshot.
    pub async fn run(self) -> anyhow::Result<()> {
        let bound = self.bind().await?;
        let server = Arc::clone(&bound.server);
        let store = Arc::clone(&bound.store);

        tokio::select! {
            result = bound.serve() => result?,
            signal = tokio::signal::ctrl_c() => {
                signal.context("failed to listen for shutdown signal")?;
                info!("shutting down");
            }
        }

        let mut server_guard = server.write().await;
        let path = server_guard.config.snapshot_path();
        server_guard
            .save(&mut *store.lock().await)
            .await
            .with_context(|| format!("failed to write snapshot {}", path.display()))?;

        Ok(())
    }
}

/// Drains one replica's queue into its socket. Ends when the replica is
/// dropped or a write fails, then closes the write side.
async fn write_to_replica(
    address: String,
    writer: Arc<RwLock<OwnedWriteHalf>>,
    mut receiver: mpsc::Receiver<Bytes>,
) {
    while let Some(frame) = receiver.recv().await {
        let mut writer_guard = writer.write().await;

        let result = match writer_guard.write_all(&frame).await {
            Ok(()) => writer_guard.flush().await,
            Err(e) => Err(e),
        };

        if let Err(e) = result {
            warn!(replica = %address, error = %e, "write to replica failed");
            break;
        }
    }

    if let Err(e) = writer.write().await.shutdown().await {
        debug!(replica = %address, error = %e, "replica socket already closed");
    }
}

fn generate_replication_id() -> String {
    rand::random::<[u8; 20]>()
        .iter()
        .map(|byte| format!("{:02x}", byte))
        .collect()
}

/// A server whose listener is bound and whose state is recovered.
pub struct BoundServer {
    listener: TcpListener,
    local_addr: SocketAddr,
    pub server: Arc<RwLock<RedisServer>>,
    pub store: Arc<Mutex<KeyValueStore>>,
    pub state: Arc<Mutex<State>>,
}

impl BoundServer {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    async fn replay_append_log(&self, path: &std::path::Path) -> anyhow::Result<usize> {
        let commands = aof::replay(path)
            .await
            .with_context(|| format!("failed to read append log {}", path.display()))?;
        let replayed = commands.len();

        for (name, arguments) in commands {
            let handler = CommandHandler::from_parts(name, arguments);

            let result = handler
                .handle_command(
                    Arc::clone(&self.server),
                    REPLAY_CLIENT_ADDRESS,
                    Arc::clone(&self.store),
                    Arc::clone(&self.state),
                    CommandSource::Replay,
                )
                .await;

            match result {
                Ok(CommandResult::Batch(commands)) => {
                    run_transaction_commands(
                        REPLAY_CLIENT_ADDRESS,
                        Arc::clone(&self.server),
                        Arc::clone(&self.store),
                        Arc::clone(&self.state),
                        commands,
                        CommandSource::Replay,
                    )
                    .await;
                }
                Ok(_) => {}
                Err(e) => warn!(command = %handler.name, error = %e, "replayed command failed"),
            }
        }

        self.state.lock().await.remove_client(REPLAY_CLIENT_ADDRESS);

        Ok(replayed)
    }

    /// Accepts connections forever. A replica also keeps its master link running.
    pub async fn serve(self) -> anyhow::Result<()> {
        if self.server.read().await.is_replica() {
            let server = Arc::clone(&self.server);
            let store = Arc::clone(&self.store);
            let state = Arc::clone(&self.state);

            tokio::spawn(async move {
                if let Err(e) = handle_master_link(server, store, state).await {
                    error!(error = %format!("{:#}", e), "replication link failed");
                }
            });
        }

        loop {
            let (stream, address) = self
                .listener
                .accept()
                .await
                .context("failed to accept connection")?;

            let server = Arc::clone(&self.server);
            let store = Arc::clone(&self.store);
            let state = Arc::clone(&self.state);

            tokio::spawn(async move {
                handle_client_connection(stream, address.to_string(), server, store, state).await;
            });
        }
    }
}
