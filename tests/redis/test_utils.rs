use std::{net::SocketAddr, sync::Arc, time::Duration};

use bytes::BytesMut;
use redis_lite::{
    commands::{CommandError, CommandHandler, CommandResult, CommandSource, run_transaction_commands},
    input::read_frame,
    key_value_store::KeyValueStore,
    resp::RespValue,
    server::{BoundServer, RedisServer, ServerConfig},
    state::State,
};
use tokio::{
    io::AsyncWriteExt,
    net::TcpStream,
    sync::{Mutex, RwLock},
    task::JoinHandle,
    time::timeout,
};

/// Test utilities for simplifying Redis command tests
pub struct TestUtils;

/// Test environment containing store, state and server
pub struct TestEnv {
    pub store: Arc<Mutex<KeyValueStore>>,
    pub state: Arc<Mutex<State>>,
    pub server: Arc<RwLock<RedisServer>>,
}

impl TestEnv {
    /// Create a new test environment with a master server
    pub fn new_master_server() -> Self {
        Self::with_config(ServerConfig {
            appendonly: false,
            ..ServerConfig::default()
        })
    }

    /// Create a new test environment with a replica server that never connects
    pub fn new_replica_server() -> Self {
        Self::with_config(ServerConfig {
            port: 6380,
            replica_of: Some(("127.0.0.1".to_string(), 6379)),
            appendonly: false,
            ..ServerConfig::default()
        })
    }

    pub fn with_config(config: ServerConfig) -> Self {
        Self {
            store: Arc::new(Mutex::new(KeyValueStore::new())),
            state: Arc::new(Mutex::new(State::new())),
            server: Arc::new(RwLock::new(RedisServer::new(config))),
        }
    }

    /// Clone the environment for use in async tasks
    pub fn clone_env(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            state: Arc::clone(&self.state),
            server: Arc::clone(&self.server),
        }
    }

    /// Execute a command as a regular client
    pub async fn exec_command(
        &self,
        command: RespValue,
        client_address: &str,
    ) -> Result<CommandResult, CommandError> {
        self.exec_command_from(command, client_address, CommandSource::Client)
            .await
    }

    pub async fn exec_command_from(
        &self,
        command: RespValue,
        client_address: &str,
        source: CommandSource,
    ) -> Result<CommandResult, CommandError> {
        let command_handler = CommandHandler::new(command)?;

        command_handler
            .handle_command(
                Arc::clone(&self.server),
                client_address,
                Arc::clone(&self.store),
                Arc::clone(&self.state),
                source,
            )
            .await
    }

    /// Execute a command and assert it succeeds with expected result
    pub async fn exec_command_immediate_success_response(
        &self,
        command: RespValue,
        client_address: &str,
        expected_response: &str,
    ) {
        let result = self.exec_command(command, client_address).await;

        match result {
            Ok(CommandResult::Response(response)) => {
                assert_eq!(response, expected_response);
            }
            other => panic!("Expected response, got {:?}", other),
        }
    }

    /// Execute a command and assert it fails
    pub async fn exec_command_immediate_error_response(
        &self,
        command: RespValue,
        client_address: &str,
        expected_error: CommandError,
    ) {
        let result = self.exec_command(command, client_address).await;

        assert_eq!(result.unwrap_err(), expected_error);
    }

    /// Run EXEC and the queued batch, returning the aggregate reply
    pub async fn exec_transaction(&self, client_address: &str) -> Result<String, CommandError> {
        match self
            .exec_command(TestUtils::exec_command(), client_address)
            .await?
        {
            CommandResult::Batch(commands) => Ok(run_transaction_commands(
                client_address,
                Arc::clone(&self.server),
                Arc::clone(&self.store),
                Arc::clone(&self.state),
                commands,
                CommandSource::Client,
            )
            .await),
            CommandResult::Response(response) => Ok(response),
            other => panic!("Expected batch, got {:?}", other),
        }
    }

    /// Wait until some client is blocked in BLPOP on `key`
    pub async fn wait_for_blpop_waiter(&self, key: &str) {
        TestUtils::eventually(move || async move {
            self.get_state().await.has_blpop_subscribers(key)
        })
        .await;
    }

    pub async fn get_store(&self) -> tokio::sync::MutexGuard<'_, KeyValueStore> {
        self.store.lock().await
    }

    pub async fn get_state(&self) -> tokio::sync::MutexGuard<'_, State> {
        self.state.lock().await
    }
}

impl TestUtils {
    /// Build a command from its parts
    pub fn command(parts: &[&str]) -> RespValue {
        RespValue::Array(
            parts
                .iter()
                .map(|part| RespValue::BulkString(part.to_string()))
                .collect(),
        )
    }

    pub fn ping_command() -> RespValue {
        Self::command(&["PING"])
    }

    pub fn set_command(key: &str, value: &str) -> RespValue {
        Self::command(&["SET", key, value])
    }

    pub fn get_command(key: &str) -> RespValue {
        Self::command(&["GET", key])
    }

    pub fn incr_command(key: &str) -> RespValue {
        Self::command(&["INCR", key])
    }

    pub fn rpush_command(key: &str, values: &[&str]) -> RespValue {
        let mut parts = vec!["RPUSH", key];
        parts.extend_from_slice(values);
        Self::command(&parts)
    }

    pub fn lpush_command(key: &str, values: &[&str]) -> RespValue {
        let mut parts = vec!["LPUSH", key];
        parts.extend_from_slice(values);
        Self::command(&parts)
    }

    pub fn blpop_command(key: &str, timeout_seconds: &str) -> RespValue {
        Self::command(&["BLPOP", key, timeout_seconds])
    }

    pub fn xadd_command(key: &str, stream_id: &str, fields: &[&str]) -> RespValue {
        let mut parts = vec!["XADD", key, stream_id];
        parts.extend_from_slice(fields);
        Self::command(&parts)
    }

    pub fn xread_blocking_command(
        timeout_milliseconds: &str,
        keys: &[&str],
        stream_ids: &[&str],
    ) -> RespValue {
        let mut parts = vec!["XREAD", "BLOCK", timeout_milliseconds, "STREAMS"];
        parts.extend_from_slice(keys);
        parts.extend_from_slice(stream_ids);
        Self::command(&parts)
    }

    pub fn multi_command() -> RespValue {
        Self::command(&["MULTI"])
    }

    pub fn exec_command() -> RespValue {
        Self::command(&["EXEC"])
    }

    pub fn discard_command() -> RespValue {
        Self::command(&["DISCARD"])
    }

    pub fn replconf_command(key: &str, value: &str) -> RespValue {
        Self::command(&["REPLCONF", key, value])
    }

    pub fn psync_command(replication_id: &str, offset: &str) -> RespValue {
        Self::command(&["PSYNC", replication_id, offset])
    }

    pub fn wait_command(number_of_replicas: u32, timeout_ms: u32) -> RespValue {
        Self::command(&[
            "WAIT",
            &number_of_replicas.to_string(),
            &timeout_ms.to_string(),
        ])
    }

    /// Generate a client address for testing
    pub fn client_address(port: u16) -> String {
        format!("127.0.0.1:{}", port)
    }

    /// Spawn a command that is expected to block
    pub fn spawn_command_task(
        env: &TestEnv,
        command: RespValue,
        client_address: &str,
    ) -> JoinHandle<Result<CommandResult, CommandError>> {
        let env = env.clone_env();
        let client_address = client_address.to_string();

        tokio::spawn(async move { env.exec_command(command, &client_address).await })
    }

    /// Wait for a task with timeout and expect it to complete with a response
    pub async fn wait_for_completion(
        task: JoinHandle<Result<CommandResult, CommandError>>,
        timeout_duration: Duration,
    ) -> Result<String, CommandError> {
        match timeout(timeout_duration, task)
            .await
            .expect("Task should complete within timeout")
            .expect("Task should not panic")?
        {
            CommandResult::Response(value) => Ok(value),
            other => panic!("Unexpected command result {:?}", other),
        }
    }

    pub fn expected_bulk_string(value: &str) -> String {
        format!("${}\r\n{}\r\n", value.len(), value)
    }

    pub fn expected_integer(value: i64) -> String {
        format!(":{}\r\n", value)
    }

    pub fn expected_simple_string(value: &str) -> String {
        format!("+{}\r\n", value)
    }

    pub fn expected_null() -> String {
        "$-1\r\n".to_string()
    }

    pub fn expected_null_array() -> String {
        "*-1\r\n".to_string()
    }

    pub fn expected_bulk_string_array(items: &[&str]) -> String {
        let mut response = format!("*{}\r\n", items.len());
        for item in items {
            response.push_str(&Self::expected_bulk_string(item));
        }
        response
    }

    pub async fn sleep_ms(ms: u64) {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }

    /// Bind a server on an ephemeral port and serve it in the background
    pub async fn start_server(config: ServerConfig) -> (SocketAddr, TestEnv) {
        let bound: BoundServer = RedisServer::new(ServerConfig { port: 0, ..config })
            .bind()
            .await
            .expect("server should bind");

        let address = bound.local_addr();
        let env = TestEnv {
            store: Arc::clone(&bound.store),
            state: Arc::clone(&bound.state),
            server: Arc::clone(&bound.server),
        };

        tokio::spawn(bound.serve());

        (address, env)
    }

    /// Send a command over TCP and read one reply
    pub async fn send_command(
        client: &mut TcpStream,
        buffer: &mut BytesMut,
        command: RespValue,
    ) -> RespValue {
        client.write_all(command.encode().as_bytes()).await.unwrap();
        client.flush().await.unwrap();

        timeout(Duration::from_secs(5), read_frame(client, buffer))
            .await
            .expect("reply should arrive")
            .expect("reply should parse")
    }

    /// Poll until `condition` holds or the deadline passes
    pub async fn eventually<F, Fut>(mut condition: F)
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = bool>,
    {
        for _ in 0..200 {
            if condition().await {
                return;
            }

            Self::sleep_ms(10).await;
        }

        panic!("condition not met in time");
    }
}
