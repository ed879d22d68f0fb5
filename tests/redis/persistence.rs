use std::{path::Path, time::Duration};

use bytes::BytesMut;
use redis_lite::{
    key_value_store::{DataType, KeyValueStore},
    rdb::load_snapshot,
    resp::RespValue,
    server::{RedisServer, ServerConfig},
};
use tokio::net::TcpStream;

use crate::test_utils::{TestEnv, TestUtils};

fn persistent_config(dir: &Path) -> ServerConfig {
    ServerConfig {
        dir: dir.to_path_buf(),
        appendonly: true,
        ..ServerConfig::default()
    }
}

fn data_of(store: &mut KeyValueStore, key: &str) -> Option<DataType> {
    store.get(key).map(|value| value.data.clone())
}

#[tokio::test]
async fn test_save_then_load_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let env = TestEnv::with_config(ServerConfig {
        dir: dir.path().to_path_buf(),
        appendonly: false,
        ..ServerConfig::default()
    });
    let client = TestUtils::client_address(41844);

    for command in [
        TestUtils::set_command("grape", "mango"),
        TestUtils::command(&["SET", "session", "token", "EX", "100"]),
        TestUtils::command(&["SET", "flash", "gone", "PX", "1"]),
        TestUtils::incr_command("counter"),
        TestUtils::rpush_command("fruits", &["apple", "pear"]),
        TestUtils::xadd_command("sensor", "1-1", &["temperature", "36"]),
    ] {
        env.exec_command(command, &client).await.unwrap();
    }

    TestUtils::sleep_ms(5).await;

    env.exec_command_immediate_success_response(
        TestUtils::command(&["SAVE"]),
        &client,
        &TestUtils::expected_simple_string("OK"),
    )
    .await;

    let mut restored = load_snapshot(&dir.path().join("dump.rdb")).await.unwrap();

    assert_eq!(restored.len(), 5);
    assert_eq!(
        data_of(&mut restored, "grape"),
        Some(DataType::String("mango".to_string()))
    );
    assert_eq!(
        data_of(&mut restored, "counter"),
        Some(DataType::Integer(1))
    );
    assert_eq!(restored.type_of("fruits"), "list");
    assert_eq!(restored.type_of("sensor"), "stream");
    assert_eq!(restored.type_of("flash"), "none");

    let session = restored.get("session").unwrap();
    let remaining = session
        .expiration
        .unwrap()
        .saturating_duration_since(tokio::time::Instant::now());
    assert!(remaining > Duration::from_secs(90));
    assert!(remaining <= Duration::from_secs(100));
}

#[tokio::test]
async fn test_missing_snapshot_is_an_empty_keyspace() {
    let dir = tempfile::tempdir().unwrap();

    let mut store = load_snapshot(&dir.path().join("dump.rdb")).await.unwrap();

    assert!(store.is_empty());
}

#[tokio::test]
async fn test_append_log_is_replayed_at_boot() {
    let dir = tempfile::tempdir().unwrap();
    let (address, _first) = TestUtils::start_server(persistent_config(dir.path())).await;

    let mut client = TcpStream::connect(address).await.unwrap();
    let mut buffer = BytesMut::new();

    for command in [
        TestUtils::set_command("grape", "mango"),
        TestUtils::incr_command("counter"),
        TestUtils::incr_command("counter"),
        TestUtils::rpush_command("queue", &["a", "b", "c"]),
        TestUtils::command(&["LPOP", "queue"]),
        TestUtils::blpop_command("queue", "0"),
        TestUtils::xadd_command("sensor", "1-1", &["v", "a"]),
        TestUtils::multi_command(),
        TestUtils::set_command("inside", "exec"),
        TestUtils::exec_command(),
    ] {
        let reply = TestUtils::send_command(&mut client, &mut buffer, command).await;
        assert!(!matches!(reply, RespValue::Error(_)), "{:?}", reply);
    }

    // Reads and failed commands are not logged.
    TestUtils::send_command(&mut client, &mut buffer, TestUtils::get_command("grape")).await;
    TestUtils::send_command(&mut client, &mut buffer, TestUtils::incr_command("grape")).await;

    let restarted = RedisServer::new(ServerConfig {
        port: 0,
        ..persistent_config(dir.path())
    })
    .bind()
    .await
    .unwrap();

    let mut store = restarted.store.lock().await;

    assert_eq!(
        data_of(&mut store, "grape"),
        Some(DataType::String("mango".to_string()))
    );
    assert_eq!(data_of(&mut store, "counter"), Some(DataType::Integer(2)));
    assert_eq!(
        data_of(&mut store, "queue"),
        Some(DataType::List(["c".to_string()].into()))
    );
    assert_eq!(store.type_of("sensor"), "stream");
    assert_eq!(
        data_of(&mut store, "inside"),
        Some(DataType::String("exec".to_string()))
    );
    assert_eq!(store.len(), 5);
}

#[tokio::test]
async fn test_save_truncates_the_append_log() {
    let dir = tempfile::tempdir().unwrap();
    let (address, _first) = TestUtils::start_server(persistent_config(dir.path())).await;

    let mut client = TcpStream::connect(address).await.unwrap();
    let mut buffer = BytesMut::new();

    TestUtils::send_command(
        &mut client,
        &mut buffer,
        TestUtils::rpush_command("fruits", &["apple"]),
    )
    .await;
    TestUtils::send_command(&mut client, &mut buffer, TestUtils::command(&["SAVE"])).await;
    TestUtils::send_command(
        &mut client,
        &mut buffer,
        TestUtils::rpush_command("fruits", &["pear"]),
    )
    .await;

    // The snapshot holds the first push and the log only the second.
    let restarted = RedisServer::new(ServerConfig {
        port: 0,
        ..persistent_config(dir.path())
    })
    .bind()
    .await
    .unwrap();

    assert_eq!(
        data_of(&mut *restarted.store.lock().await, "fruits"),
        Some(DataType::List(
            ["apple".to_string(), "pear".to_string()].into()
        ))
    );
}

#[tokio::test]
async fn test_append_log_disabled() {
    let dir = tempfile::tempdir().unwrap();
    let config = ServerConfig {
        appendonly: false,
        ..persistent_config(dir.path())
    };
    let (address, _first) = TestUtils::start_server(config.clone()).await;

    let mut client = TcpStream::connect(address).await.unwrap();
    let mut buffer = BytesMut::new();

    TestUtils::send_command(
        &mut client,
        &mut buffer,
        TestUtils::set_command("grape", "mango"),
    )
    .await;

    assert!(!dir.path().join("appendonly.aof").exists());

    let restarted = RedisServer::new(ServerConfig { port: 0, ..config })
        .bind()
        .await
        .unwrap();

    assert!(restarted.store.lock().await.is_empty());
}

#[tokio::test]
async fn test_handoff_is_logged_right_after_its_push() {
    let dir = tempfile::tempdir().unwrap();
    let (address, first) = TestUtils::start_server(persistent_config(dir.path())).await;

    let blocked = tokio::spawn(async move {
        let mut stream = TcpStream::connect(address).await.unwrap();
        let mut buffer = BytesMut::new();
        TestUtils::send_command(&mut stream, &mut buffer, TestUtils::blpop_command("queue", "0"))
            .await
    });
    first.wait_for_blpop_waiter("queue").await;

    let mut client = TcpStream::connect(address).await.unwrap();
    let mut buffer = BytesMut::new();

    TestUtils::send_command(
        &mut client,
        &mut buffer,
        TestUtils::rpush_command("queue", &["a"]),
    )
    .await;
    TestUtils::send_command(
        &mut client,
        &mut buffer,
        TestUtils::lpush_command("queue", &["c"]),
    )
    .await;

    assert!(matches!(blocked.await.unwrap(), RespValue::Array(_)));

    let restarted = RedisServer::new(ServerConfig {
        port: 0,
        ..persistent_config(dir.path())
    })
    .bind()
    .await
    .unwrap();

    assert_eq!(
        data_of(&mut *restarted.store.lock().await, "queue"),
        Some(DataType::List(["c".to_string()].into()))
    );
}
