//! Reading RESP frames off the network and the replica side of the
//! replication handshake.

use bytes::{Buf, BytesMut};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info};

use crate::resp::{RespError, RespValue, decode_snapshot_header};

/// Errors that can occur while reading from a connection.
#[derive(Error, Debug, PartialEq)]
pub enum CommandReadError {
    #[error("I/O error: {0}")]
    IoError(String),
    #[error("connection closed")]
    ConnectionClosed,
    #[error("RESP parse error: {0}")]
    RespParseError(#[from] RespError),
    #[error("invalid response from master: {0}")]
    InvalidResponseFromMaster(String),
}

impl From<std::io::Error> for CommandReadError {
    fn from(e: std::io::Error) -> Self {
        CommandReadError::IoError(e.to_string())
    }
}

/// Reads whatever is available into `buffer`.
///
/// Returns the number of new bytes, or `ConnectionClosed` once the peer is gone.
pub async fn read_into_buffer<R>(
    reader: &mut R,
    buffer: &mut BytesMut,
) -> Result<usize, CommandReadError>
where
    R: AsyncRead + Unpin,
{
    let number_of_bytes = reader.read_buf(buffer).await?;

    if number_of_bytes == 0 {
        return Err(CommandReadError::ConnectionClosed);
    }

    Ok(number_of_bytes)
}

/// Decodes every complete frame at the front of `buffer`.
///
/// Each frame comes with the number of bytes it occupied. A trailing partial
/// frame stays in the buffer. On malformed input the bytes up to the next
/// array marker are dropped and the error is returned alongside the frames
/// decoded before it.
pub fn drain_frames(buffer: &mut BytesMut) -> (Vec<(RespValue, usize)>, Option<RespError>) {
    let mut frames = Vec::new();

    loop {
        match RespValue::decode(buffer) {
            Ok(Some((value, consumed))) => {
                buffer.advance(consumed);
                frames.push((value, consumed));
            }
            Ok(None) => return (frames, None),
            Err(e) => {
                skip_malformed_bytes(buffer);
                return (frames, Some(e));
            }
        }
    }
}

fn skip_malformed_bytes(buffer: &mut BytesMut) {
    let next_frame = buffer
        .iter()
        .skip(1)
        .position(|byte| *byte == b'*')
        .map(|position| position + 1)
        .unwrap_or(buffer.len());

    buffer.advance(next_frame);
}

/// Reads until one full frame is available and returns it.
pub async fn read_frame<R>(
    reader: &mut R,
    buffer: &mut BytesMut,
) -> Result<RespValue, CommandReadError>
where
    R: AsyncRead + Unpin,
{
    loop {
        if let Some((value, consumed)) = RespValue::decode(buffer)? {
            buffer.advance(consumed);
            return Ok(value);
        }

        read_into_buffer(reader, buffer).await?;
    }
}

/// Result of a completed handshake.
#[derive(Debug, PartialEq)]
pub struct FullResync {
    pub replication_id: String,
    pub offset: usize,
    pub snapshot_length: usize,
}

/// Performs the replica side of the replication handshake.
///
/// Sends `PING`, `REPLCONF listening-port`, `REPLCONF capa psync2` and
/// `PSYNC ? -1`, checking each reply, then consumes the snapshot that follows
/// `+FULLRESYNC`. Bytes the master sends after the snapshot are left in
/// `buffer`; they are the start of the command stream.
pub async fn handshake<S>(
    stream: &mut S,
    buffer: &mut BytesMut,
    listening_port: u16,
) -> Result<FullResync, CommandReadError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let response = send_and_handle_handshake_command(stream, buffer, "PING", &[]).await?;

    if response != RespValue::SimpleString("PONG".to_string()) {
        return Err(CommandReadError::InvalidResponseFromMaster(format!(
            "expected PONG, got {:?}",
            response
        )));
    }

    for arguments in [
        ["listening-port".to_string(), listening_port.to_string()],
        ["capa".to_string(), "psync2".to_string()],
    ] {
        let response =
            send_and_handle_handshake_command(stream, buffer, "REPLCONF", &arguments).await?;

        if response != RespValue::SimpleString("OK".to_string()) {
            return Err(CommandReadError::InvalidResponseFromMaster(format!(
                "expected OK to REPLCONF {}, got {:?}",
                arguments[0], response
            )));
        }
    }

    let response = send_and_handle_handshake_command(
        stream,
        buffer,
        "PSYNC",
        &["?".to_string(), "-1".to_string()],
    )
    .await?;

    let (replication_id, offset) = parse_full_resync(&response)?;
    debug!(%replication_id, offset, "master accepted PSYNC");

    let snapshot_length = discard_snapshot(stream, buffer).await?;
    info!(snapshot_length, "received snapshot from master");

    Ok(FullResync {
        replication_id,
        offset,
        snapshot_length,
    })
}

async fn send_and_handle_handshake_command<S>(
    stream: &mut S,
    buffer: &mut BytesMut,
    name: &str,
    arguments: &[String],
) -> Result<RespValue, CommandReadError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    stream
        .write_all(RespValue::encode_command(name, arguments).as_bytes())
        .await?;
    stream.flush().await?;

    read_frame(stream, buffer).await
}

fn parse_full_resync(response: &RespValue) -> Result<(String, usize), CommandReadError> {
    let invalid = || {
        CommandReadError::InvalidResponseFromMaster(format!(
            "expected FULLRESYNC, got {:?}",
            response
        ))
    };

    let RespValue::SimpleString(line) = response else {
        return Err(invalid());
    };

    let mut parts = line.split_whitespace();

    let (Some("FULLRESYNC"), Some(replication_id), Some(offset)) =
        (parts.next(), parts.next(), parts.next())
    else {
        return Err(invalid());
    };

    let offset = offset.parse::<usize>().map_err(|_| invalid())?;

    Ok((replication_id.to_string(), offset))
}

/// Reads `$<len>\r\n` and exactly `len` snapshot bytes, without a trailing CRLF.
async fn discard_snapshot<R>(reader: &mut R, buffer: &mut BytesMut) -> Result<usize, CommandReadError>
where
    R: AsyncRead + Unpin,
{
    let (snapshot_length, header_length) = loop {
        if let Some(header) = decode_snapshot_header(buffer)? {
            break header;
        }

        read_into_buffer(reader, buffer).await?;
    };

    buffer.advance(header_length);

    while buffer.len() < snapshot_length {
        read_into_buffer(reader, buffer).await?;
    }

    buffer.advance(snapshot_length);

    Ok(snapshot_length)
}
