use std::{path::Path, sync::Arc, time::Duration};

use bytes::BytesMut;
use redis_lite::{
    commands::{CommandError, CommandResult},
    key_value_store::DataType,
    resp::RespValue,
    server::ServerConfig,
    state::HandshakeStep,
};
use tokio::net::TcpStream;

use crate::test_utils::{TestEnv, TestUtils};

fn master_config(dir: &Path) -> ServerConfig {
    ServerConfig {
        dir: dir.to_path_buf(),
        appendonly: false,
        ..ServerConfig::default()
    }
}

fn replica_config(dir: &Path, master_port: u16) -> ServerConfig {
    ServerConfig {
        replica_of: Some(("127.0.0.1".to_string(), master_port)),
        ..master_config(dir)
    }
}

async fn wait_for_replicas(master: &TestEnv, count: usize) {
    TestUtils::eventually(|| {
        let server = Arc::clone(&master.server);
        async move { server.read().await.connected_replicas() == count }
    })
    .await;
}

async fn wait_for_replica_to_catch_up(master: &TestEnv, replica: &TestEnv) {
    let expected_offset = master.server.read().await.repl_offset;

    TestUtils::eventually(|| {
        let server = Arc::clone(&replica.server);
        async move { server.read().await.processed_offset == expected_offset }
    })
    .await;
}

#[tokio::test]
async fn test_master_handshake_steps() {
    let env = TestEnv::new_master_server();
    let replica = TestUtils::client_address(6380);

    let steps = vec![
        (
            TestUtils::ping_command(),
            TestUtils::expected_simple_string("PONG"),
            HandshakeStep::Pinged,
        ),
        (
            TestUtils::replconf_command("listening-port", "6380"),
            TestUtils::expected_simple_string("OK"),
            HandshakeStep::PortSet,
        ),
        (
            TestUtils::replconf_command("capa", "psync2"),
            TestUtils::expected_simple_string("OK"),
            HandshakeStep::CapaSet,
        ),
    ];

    for (command, expected_response, expected_step) in steps {
        env.exec_command_immediate_success_response(command, &replica, &expected_response)
            .await;
        assert_eq!(env.get_state().await.handshake_step(&replica), expected_step);
    }

    let repl_id = env.server.read().await.repl_id.clone();

    let result = env
        .exec_command(TestUtils::psync_command("?", "-1"), &replica)
        .await
        .unwrap();
    assert_eq!(result, CommandResult::Sync);
    assert_eq!(
        env.server.read().await.full_resync_header(),
        TestUtils::expected_simple_string(&format!("FULLRESYNC {} 0", repl_id))
    );
    assert_eq!(
        env.get_state().await.handshake_step(&replica),
        HandshakeStep::Synced
    );
}

#[tokio::test]
async fn test_psync_out_of_order_is_rejected() {
    let env = TestEnv::new_master_server();
    let client = TestUtils::client_address(41844);

    let result = env
        .exec_command(TestUtils::psync_command("?", "-1"), &client)
        .await;
    assert!(matches!(
        result,
        Err(CommandError::ReplicationProtocolError(_))
    ));

    env.exec_command(TestUtils::ping_command(), &client)
        .await
        .unwrap();

    let result = env
        .exec_command(TestUtils::psync_command("?", "-1"), &client)
        .await;
    assert!(matches!(
        result,
        Err(CommandError::ReplicationProtocolError(_))
    ));

    env.exec_command_immediate_error_response(
        TestUtils::psync_command("?", "-2"),
        &client,
        CommandError::InvalidPsyncOffset,
    )
    .await;
}

#[tokio::test]
async fn test_getack_reports_offsets() {
    let master = TestEnv::new_master_server();
    let client = TestUtils::client_address(41844);

    master
        .exec_command(TestUtils::set_command("grape", "mango"), &client)
        .await
        .unwrap();

    let offset = TestUtils::set_command("grape", "mango").encode().len();

    master
        .exec_command_immediate_success_response(
            TestUtils::replconf_command("GETACK", "*"),
            &client,
            &TestUtils::expected_bulk_string_array(&["REPLCONF", "ACK", &offset.to_string()]),
        )
        .await;

    let replica = TestEnv::new_replica_server();
    replica.server.write().await.processed_offset = 154;

    replica
        .exec_command_immediate_success_response(
            TestUtils::replconf_command("GETACK", "*"),
            &client,
            &TestUtils::expected_bulk_string_array(&["REPLCONF", "ACK", "154"]),
        )
        .await;
}

#[tokio::test]
async fn test_full_resync_over_tcp() {
    let dir = tempfile::tempdir().unwrap();
    let (address, master) = TestUtils::start_server(master_config(dir.path())).await;

    let mut stream = TcpStream::connect(address).await.unwrap();
    let mut buffer = BytesMut::new();

    let full_resync = redis_lite::input::handshake(&mut stream, &mut buffer, 6380)
        .await
        .unwrap();

    assert_eq!(full_resync.replication_id, master.server.read().await.repl_id);
    assert_eq!(full_resync.offset, 0);
    assert!(full_resync.snapshot_length > 0);

    TestUtils::eventually(|| {
        let server = Arc::clone(&master.server);
        async move { server.read().await.connected_replicas() == 1 }
    })
    .await;

    // A client write reaches the replica byte for byte.
    let mut client = TcpStream::connect(address).await.unwrap();
    let mut client_buffer = BytesMut::new();
    let set = TestUtils::set_command("grape", "mango");

    assert_eq!(
        TestUtils::send_command(&mut client, &mut client_buffer, set.clone()).await,
        RespValue::SimpleString("OK".to_string())
    );

    let propagated = redis_lite::input::read_frame(&mut stream, &mut buffer)
        .await
        .unwrap();
    assert_eq!(propagated, set);
    assert_eq!(master.server.read().await.repl_offset, set.encode().len());
}

#[tokio::test]
async fn test_replica_follows_master() {
    let master_dir = tempfile::tempdir().unwrap();
    let replica_dir = tempfile::tempdir().unwrap();
    let (master_address, master) = TestUtils::start_server(master_config(master_dir.path())).await;

    let (replica_address, replica) = TestUtils::start_server(ServerConfig {
        replica_of: Some(("127.0.0.1".to_string(), master_address.port())),
        dir: replica_dir.path().to_path_buf(),
        appendonly: false,
        ..ServerConfig::default()
    })
    .await;

    TestUtils::eventually(|| {
        let server = Arc::clone(&master.server);
        async move { server.read().await.connected_replicas() == 1 }
    })
    .await;

    let mut client = TcpStream::connect(master_address).await.unwrap();
    let mut buffer = BytesMut::new();

    for command in [
        TestUtils::set_command("grape", "mango"),
        TestUtils::incr_command("counter"),
        TestUtils::rpush_command("fruits", &["apple", "pear"]),
        TestUtils::xadd_command("sensor", "1-1", &["v", "a"]),
    ] {
        TestUtils::send_command(&mut client, &mut buffer, command).await;
    }

    let expected_offset = master.server.read().await.repl_offset;

    TestUtils::eventually(|| {
        let server = Arc::clone(&replica.server);
        async move { server.read().await.processed_offset == expected_offset }
    })
    .await;

    {
        let mut store = replica.get_store().await;
        assert_eq!(
            store.get("grape").map(|value| value.data.clone()),
            Some(DataType::String("mango".to_string()))
        );
        assert_eq!(
            store.get("counter").map(|value| value.data.clone()),
            Some(DataType::Integer(1))
        );
        assert_eq!(store.type_of("fruits"), "list");
        assert_eq!(store.type_of("sensor"), "stream");
    }

    // WAIT asks the replica for an ACK and counts it.
    assert_eq!(
        TestUtils::send_command(&mut client, &mut buffer, TestUtils::wait_command(1, 1000)).await,
        RespValue::Integer(1)
    );

    // Clients of the replica can read but not write.
    let mut replica_client = TcpStream::connect(replica_address).await.unwrap();
    let mut replica_buffer = BytesMut::new();

    assert_eq!(
        TestUtils::send_command(
            &mut replica_client,
            &mut replica_buffer,
            TestUtils::get_command("grape")
        )
        .await,
        RespValue::BulkString("mango".to_string())
    );

    let reply = TestUtils::send_command(
        &mut replica_client,
        &mut replica_buffer,
        TestUtils::set_command("grape", "kiwi"),
    )
    .await;
    assert!(matches!(reply, RespValue::Error(_)));
}

#[tokio::test]
async fn test_wait_times_out_with_unacknowledged_replica() {
    let dir = tempfile::tempdir().unwrap();
    let (address, master) = TestUtils::start_server(master_config(dir.path())).await;

    // A replica that completes the handshake but never acknowledges.
    let mut silent_replica = TcpStream::connect(address).await.unwrap();
    let mut replica_buffer = BytesMut::new();
    redis_lite::input::handshake(&mut silent_replica, &mut replica_buffer, 6380)
        .await
        .unwrap();

    TestUtils::eventually(|| {
        let server = Arc::clone(&master.server);
        async move { server.read().await.connected_replicas() == 1 }
    })
    .await;

    let mut client = TcpStream::connect(address).await.unwrap();
    let mut buffer = BytesMut::new();

    TestUtils::send_command(&mut client, &mut buffer, TestUtils::set_command("grape", "mango"))
        .await;

    let started = tokio::time::Instant::now();
    assert_eq!(
        TestUtils::send_command(&mut client, &mut buffer, TestUtils::wait_command(1, 100)).await,
        RespValue::Integer(0)
    );
    assert!(started.elapsed() >= Duration::from_millis(100));
}

#[tokio::test]
async fn test_dropped_replica_is_unregistered() {
    let dir = tempfile::tempdir().unwrap();
    let (address, master) = TestUtils::start_server(master_config(dir.path())).await;

    let mut replica = TcpStream::connect(address).await.unwrap();
    let mut buffer = BytesMut::new();
    redis_lite::input::handshake(&mut replica, &mut buffer, 6380)
        .await
        .unwrap();

    TestUtils::eventually(|| {
        let server = Arc::clone(&master.server);
        async move { server.read().await.connected_replicas() == 1 }
    })
    .await;

    drop(replica);

    TestUtils::eventually(|| {
        let server = Arc::clone(&master.server);
        async move { server.read().await.connected_replicas() == 0 }
    })
    .await;
}

#[tokio::test]
async fn test_wait_counts_replica_that_joined_after_writes() {
    let master_dir = tempfile::tempdir().unwrap();
    let replica_dir = tempfile::tempdir().unwrap();
    let (master_address, master) = TestUtils::start_server(master_config(master_dir.path())).await;

    let mut client = TcpStream::connect(master_address).await.unwrap();
    let mut buffer = BytesMut::new();
    let early = TestUtils::set_command("early", "x");

    TestUtils::send_command(&mut client, &mut buffer, early.clone()).await;

    let (_, replica) = TestUtils::start_server(replica_config(
        replica_dir.path(),
        master_address.port(),
    ))
    .await;
    wait_for_replicas(&master, 1).await;

    // The replica counts from the offset its FULLRESYNC announced.
    wait_for_replica_to_catch_up(&master, &replica).await;
    assert_eq!(
        replica.server.read().await.processed_offset,
        early.encode().len()
    );

    TestUtils::send_command(
        &mut client,
        &mut buffer,
        TestUtils::set_command("grape", "mango"),
    )
    .await;

    assert_eq!(
        TestUtils::send_command(&mut client, &mut buffer, TestUtils::wait_command(1, 1000)).await,
        RespValue::Integer(1)
    );

    let mut store = replica.get_store().await;
    assert_eq!(
        store.get("grape").map(|value| value.data.clone()),
        Some(DataType::String("mango".to_string()))
    );
}

#[tokio::test]
async fn test_handoff_is_propagated_as_pop_after_push() {
    let env = TestEnv::new_master_server();
    let blocked_client = TestUtils::client_address(41844);
    let pushing_client = TestUtils::client_address(41845);

    let blocked = TestUtils::spawn_command_task(
        &env,
        TestUtils::blpop_command("queue", "0"),
        &blocked_client,
    );
    env.wait_for_blpop_waiter("queue").await;

    let push = TestUtils::rpush_command("queue", &["a"]);
    env.exec_command(push.clone(), &pushing_client)
        .await
        .unwrap();

    // Recorded together with the push, before the woken client runs again.
    let pop = TestUtils::command(&["LPOP", "queue"]);
    assert_eq!(
        env.server.read().await.repl_offset,
        push.encode().len() + pop.encode().len()
    );

    assert_eq!(
        TestUtils::wait_for_completion(blocked, Duration::from_secs(1))
            .await
            .unwrap(),
        TestUtils::expected_bulk_string_array(&["queue", "a"])
    );
    assert_eq!(
        env.server.read().await.repl_offset,
        push.encode().len() + pop.encode().len()
    );
}

#[tokio::test]
async fn test_replica_list_matches_master_after_handoff() {
    let master_dir = tempfile::tempdir().unwrap();
    let replica_dir = tempfile::tempdir().unwrap();
    let (master_address, master) = TestUtils::start_server(master_config(master_dir.path())).await;
    let (_, replica) = TestUtils::start_server(replica_config(
        replica_dir.path(),
        master_address.port(),
    ))
    .await;
    wait_for_replicas(&master, 1).await;

    let blocked = tokio::spawn(async move {
        let mut stream = TcpStream::connect(master_address).await.unwrap();
        let mut buffer = BytesMut::new();
        TestUtils::send_command(&mut stream, &mut buffer, TestUtils::blpop_command("k", "0")).await
    });
    master.wait_for_blpop_waiter("k").await;

    let mut client = TcpStream::connect(master_address).await.unwrap();
    let mut buffer = BytesMut::new();

    assert_eq!(
        TestUtils::send_command(&mut client, &mut buffer, TestUtils::rpush_command("k", &["a"]))
            .await,
        RespValue::Integer(1)
    );
    assert_eq!(
        TestUtils::send_command(&mut client, &mut buffer, TestUtils::lpush_command("k", &["c"]))
            .await,
        RespValue::Integer(1)
    );
    assert_eq!(
        blocked.await.unwrap(),
        RespValue::Array(vec![
            RespValue::BulkString("k".to_string()),
            RespValue::BulkString("a".to_string()),
        ])
    );

    wait_for_replica_to_catch_up(&master, &replica).await;

    let expected = Some(DataType::List(["c".to_string()].into()));
    assert_eq!(
        master.get_store().await.get("k").map(|value| value.data.clone()),
        expected
    );
    assert_eq!(
        replica.get_store().await.get("k").map(|value| value.data.clone()),
        expected
    );
}

#[tokio::test]
async fn test_stalled_replica_does_not_block_other_clients() {
    let dir = tempfile::tempdir().unwrap();
    let (address, master) = TestUtils::start_server(master_config(dir.path())).await;

    // Completes the handshake, then never reads again.
    let mut stalled_replica = TcpStream::connect(address).await.unwrap();
    let mut replica_buffer = BytesMut::new();
    redis_lite::input::handshake(&mut stalled_replica, &mut replica_buffer, 6380)
        .await
        .unwrap();
    wait_for_replicas(&master, 1).await;

    let mut client = TcpStream::connect(address).await.unwrap();
    let mut buffer = BytesMut::new();
    let value = "v".repeat(256 * 1024);

    for index in 0..64 {
        let key = format!("bulk:{}", index);

        assert_eq!(
            TestUtils::send_command(&mut client, &mut buffer, TestUtils::set_command(&key, &value))
                .await,
            RespValue::SimpleString("OK".to_string()),
            "write {} stalled",
            index
        );
    }

    let mut other_client = TcpStream::connect(address).await.unwrap();
    let mut other_buffer = BytesMut::new();
    let info = TestUtils::send_command(
        &mut other_client,
        &mut other_buffer,
        TestUtils::command(&["INFO", "replication"]),
    )
    .await;

    assert!(matches!(info, RespValue::BulkString(info) if info.contains("role:master")));
}
