use std::time::Duration;

use bytes::BytesMut;
use redis_lite::{input::read_frame, resp::RespValue, server::ServerConfig};
use tokio::{io::AsyncWriteExt, net::TcpStream, time::timeout};

use crate::test_utils::TestUtils;

async fn connect(config: ServerConfig) -> TcpStream {
    let (address, _env) = TestUtils::start_server(config).await;

    TcpStream::connect(address).await.unwrap()
}

fn ephemeral_config(dir: &std::path::Path) -> ServerConfig {
    ServerConfig {
        dir: dir.to_path_buf(),
        appendonly: false,
        ..ServerConfig::default()
    }
}

async fn read_reply(client: &mut TcpStream, buffer: &mut BytesMut) -> RespValue {
    timeout(Duration::from_secs(5), read_frame(client, buffer))
        .await
        .expect("reply should arrive")
        .expect("reply should parse")
}

#[tokio::test]
async fn test_pipelined_commands_are_answered_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let mut client = connect(ephemeral_config(dir.path())).await;
    let mut buffer = BytesMut::new();

    let pipeline = [
        TestUtils::set_command("grape", "mango"),
        TestUtils::get_command("grape"),
        TestUtils::incr_command("counter"),
        TestUtils::incr_command("counter"),
    ]
    .iter()
    .map(RespValue::encode)
    .collect::<String>();

    client.write_all(pipeline.as_bytes()).await.unwrap();

    assert_eq!(
        read_reply(&mut client, &mut buffer).await,
        RespValue::SimpleString("OK".to_string())
    );
    assert_eq!(
        read_reply(&mut client, &mut buffer).await,
        RespValue::BulkString("mango".to_string())
    );
    assert_eq!(read_reply(&mut client, &mut buffer).await, RespValue::Integer(1));
    assert_eq!(read_reply(&mut client, &mut buffer).await, RespValue::Integer(2));
}

#[tokio::test]
async fn test_frame_split_across_writes() {
    let dir = tempfile::tempdir().unwrap();
    let mut client = connect(ephemeral_config(dir.path())).await;
    let mut buffer = BytesMut::new();

    let frame = TestUtils::command(&["ECHO", "hello world"]).encode();
    let (head, tail) = frame.split_at(frame.len() / 2);

    client.write_all(head.as_bytes()).await.unwrap();
    client.flush().await.unwrap();
    TestUtils::sleep_ms(20).await;
    client.write_all(tail.as_bytes()).await.unwrap();

    assert_eq!(
        read_reply(&mut client, &mut buffer).await,
        RespValue::BulkString("hello world".to_string())
    );
}

#[tokio::test]
async fn test_inline_commands() {
    let dir = tempfile::tempdir().unwrap();
    let mut client = connect(ephemeral_config(dir.path())).await;
    let mut buffer = BytesMut::new();

    client.write_all(b"PING\r\n").await.unwrap();
    assert_eq!(
        read_reply(&mut client, &mut buffer).await,
        RespValue::SimpleString("PONG".to_string())
    );

    client.write_all(b"SET grape mango\r\nGET grape\n").await.unwrap();
    assert_eq!(
        read_reply(&mut client, &mut buffer).await,
        RespValue::SimpleString("OK".to_string())
    );
    assert_eq!(
        read_reply(&mut client, &mut buffer).await,
        RespValue::BulkString("mango".to_string())
    );

    // Blank lines are ignored.
    client.write_all(b"\r\nECHO hi\r\n").await.unwrap();
    assert_eq!(
        read_reply(&mut client, &mut buffer).await,
        RespValue::BulkString("hi".to_string())
    );
}

#[tokio::test]
async fn test_errors_keep_the_connection_open() {
    let dir = tempfile::tempdir().unwrap();
    let mut client = connect(ephemeral_config(dir.path())).await;
    let mut buffer = BytesMut::new();

    client.write_all(b"*1\r\n$x\r\nPING\r\n").await.unwrap();
    assert_eq!(
        read_reply(&mut client, &mut buffer).await,
        RespValue::Error("ERR Protocol error: invalid length 'x'".to_string())
    );

    client.write_all(b"+OK\r\n").await.unwrap();
    assert_eq!(
        read_reply(&mut client, &mut buffer).await,
        RespValue::Error("ERR Protocol error: expected an array of bulk strings".to_string())
    );

    assert_eq!(
        TestUtils::send_command(&mut client, &mut buffer, TestUtils::command(&["NOPE"])).await,
        RespValue::Error("ERR unknown command 'NOPE'".to_string())
    );

    assert_eq!(
        TestUtils::send_command(&mut client, &mut buffer, TestUtils::command(&["GET"])).await,
        RespValue::Error("ERR wrong number of arguments for 'get' command".to_string())
    );

    assert_eq!(
        TestUtils::send_command(&mut client, &mut buffer, TestUtils::command(&["PING", "still here"]))
            .await,
        RespValue::BulkString("still here".to_string())
    );
}

#[tokio::test]
async fn test_blocked_client_does_not_stall_others() {
    let dir = tempfile::tempdir().unwrap();
    let (address, env) = TestUtils::start_server(ephemeral_config(dir.path())).await;

    let mut waiter = TcpStream::connect(address).await.unwrap();
    let mut waiter_buffer = BytesMut::new();
    waiter
        .write_all(TestUtils::blpop_command("queue", "0").encode().as_bytes())
        .await
        .unwrap();

    env.wait_for_blpop_waiter("queue").await;

    let mut pusher = TcpStream::connect(address).await.unwrap();
    let mut pusher_buffer = BytesMut::new();
    assert_eq!(
        TestUtils::send_command(
            &mut pusher,
            &mut pusher_buffer,
            TestUtils::rpush_command("queue", &["job-1"])
        )
        .await,
        RespValue::Integer(1)
    );

    assert_eq!(
        read_reply(&mut waiter, &mut waiter_buffer).await,
        RespValue::Array(vec![
            RespValue::BulkString("queue".to_string()),
            RespValue::BulkString("job-1".to_string()),
        ])
    );
}

#[tokio::test]
async fn test_disconnect_discards_transaction() {
    let dir = tempfile::tempdir().unwrap();
    let (address, env) = TestUtils::start_server(ephemeral_config(dir.path())).await;

    let mut client = TcpStream::connect(address).await.unwrap();
    let mut buffer = BytesMut::new();
    let client_address = client.local_addr().unwrap().to_string();

    TestUtils::send_command(&mut client, &mut buffer, TestUtils::multi_command()).await;
    TestUtils::send_command(&mut client, &mut buffer, TestUtils::set_command("grape", "mango"))
        .await;
    assert!(env.get_state().await.get_transaction(&client_address).is_some());

    drop(client);

    let state = std::sync::Arc::clone(&env.state);
    TestUtils::eventually(move || {
        let state = std::sync::Arc::clone(&state);
        let client_address = client_address.clone();
        async move { state.lock().await.get_transaction(&client_address).is_none() }
    })
    .await;

    assert!(env.get_store().await.is_empty());
}
