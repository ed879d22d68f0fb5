//! RESP (REdis Serialization Protocol) encoding and decoding.
//!
//! Decoding works on a byte buffer that may hold a partial frame, which is the
//! normal case for TCP reads and for the replication byte stream. An incomplete
//! frame is reported as `Ok(None)` with nothing consumed so the caller can buffer
//! more bytes and retry.

use std::str;

use thiserror::Error;

const CRLF: &[u8] = b"\r\n";
const MAX_BULK_LENGTH: i64 = 512 * 1024 * 1024;
const MAX_INLINE_LENGTH: usize = 64 * 1024;

/// Errors produced while decoding RESP frames.
#[derive(Error, Debug, PartialEq, Clone)]
pub enum RespError {
    #[error("invalid UTF-8 sequence")]
    InvalidUtf8,
    #[error("unknown RESP type '{0}'")]
    UnknownRespType(char),
    #[error("invalid length '{0}'")]
    InvalidLength(String),
    #[error("failed to parse integer '{0}'")]
    FailedToParseInteger(String),
    #[error("expected CRLF after bulk string payload")]
    MissingTerminator,
    #[error("inline command too long")]
    InlineCommandTooLong,
}

impl RespError {
    pub fn as_string(&self) -> String {
        RespValue::Error(format!("ERR Protocol error: {}", self)).encode()
    }
}

impl From<str::Utf8Error> for RespError {
    fn from(_: str::Utf8Error) -> Self {
        RespError::InvalidUtf8
    }
}

impl From<std::string::FromUtf8Error> for RespError {
    fn from(_: std::string::FromUtf8Error) -> Self {
        RespError::InvalidUtf8
    }
}

#[derive(Debug, PartialEq, Clone)]
pub enum RespValue {
    SimpleString(String),
    Error(String),
    Integer(i64),
    BulkString(String),
    Array(Vec<RespValue>),
    /// Nil bulk string (`$-1`).
    Null,
    /// Nil array (`*-1`).
    NullArray,
}

impl RespValue {
    /// Decodes a single value from the start of `buffer`.
    ///
    /// Returns the value together with the number of bytes it occupied, or
    /// `Ok(None)` if the buffer does not yet hold a complete frame. Input that
    /// does not start with a RESP type marker is treated as an inline command:
    /// one whitespace separated line, returned as an array of bulk strings.
    pub fn decode(buffer: &[u8]) -> Result<Option<(RespValue, usize)>, RespError> {
        match buffer.first() {
            None => Ok(None),
            Some(b'+' | b'-' | b':' | b'$' | b'*') => Self::decode_at(buffer, 0),
            Some(_) => Self::decode_inline(buffer),
        }
    }

    fn decode_at(buffer: &[u8], cursor: usize) -> Result<Option<(RespValue, usize)>, RespError> {
        let Some((line, next)) = read_line(buffer, cursor) else {
            return Ok(None);
        };

        let Some((&marker, rest)) = line.split_first() else {
            return Err(RespError::UnknownRespType(' '));
        };
        let content = str::from_utf8(rest)?;

        match marker {
            b'+' => Ok(Some((RespValue::SimpleString(content.to_string()), next))),
            b'-' => Ok(Some((RespValue::Error(content.to_string()), next))),
            b':' => {
                let value = content
                    .parse::<i64>()
                    .map_err(|_| RespError::FailedToParseInteger(content.to_string()))?;

                Ok(Some((RespValue::Integer(value), next)))
            }
            b'$' => {
                let length = parse_length(content)?;

                if length == -1 {
                    return Ok(Some((RespValue::Null, next)));
                }

                let length = length as usize;
                let end = next + length;

                if buffer.len() < end + CRLF.len() {
                    return Ok(None);
                }

                if &buffer[end..end + CRLF.len()] != CRLF {
                    return Err(RespError::MissingTerminator);
                }

                let bulk_string = String::from_utf8(buffer[next..end].to_vec())?;

                Ok(Some((RespValue::BulkString(bulk_string), end + CRLF.len())))
            }
            b'*' => {
                let length = parse_length(content)?;

                if length == -1 {
                    return Ok(Some((RespValue::NullArray, next)));
                }

                let mut elements = Vec::with_capacity((length as usize).min(1024));
                let mut element_cursor = next;

                for _ in 0..length {
                    match Self::decode_at(buffer, element_cursor)? {
                        Some((element, consumed_until)) => {
                            elements.push(element);
                            element_cursor = consumed_until;
                        }
                        None => return Ok(None),
                    }
                }

                Ok(Some((RespValue::Array(elements), element_cursor)))
            }
            other => Err(RespError::UnknownRespType(other as char)),
        }
    }

    fn decode_inline(buffer: &[u8]) -> Result<Option<(RespValue, usize)>, RespError> {
        let Some(newline) = buffer.iter().position(|byte| *byte == b'\n') else {
            if buffer.len() > MAX_INLINE_LENGTH {
                return Err(RespError::InlineCommandTooLong);
            }

            return Ok(None);
        };

        let line = str::from_utf8(&buffer[..newline])?;
        let arguments = line
            .split_whitespace()
            .map(|argument| RespValue::BulkString(argument.to_string()))
            .collect::<Vec<RespValue>>();

        Ok(Some((RespValue::Array(arguments), newline + 1)))
    }

    pub fn encode(&self) -> String {
        match self {
            RespValue::SimpleString(s) => format!("+{}\r\n", s),
            RespValue::Error(s) => format!("-{}\r\n", s),
            RespValue::Integer(i) => format!(":{}\r\n", i),
            RespValue::BulkString(s) => format!("${}\r\n{}\r\n", s.len(), s),
            RespValue::Array(elements) => {
                let mut encoded = format!("*{}\r\n", elements.len());

                for element in elements {
                    encoded.push_str(&element.encode());
                }

                encoded
            }
            RespValue::Null => "$-1\r\n".to_string(),
            RespValue::NullArray => "*-1\r\n".to_string(),
        }
    }

    pub fn encode_array_from_strings(values: Vec<String>) -> String {
        RespValue::Array(values.into_iter().map(RespValue::BulkString).collect()).encode()
    }

    /// Builds the canonical frame of a command, as logged and propagated.
    pub fn encode_command(name: &str, arguments: &[String]) -> String {
        let mut elements = Vec::with_capacity(arguments.len() + 1);
        elements.push(RespValue::BulkString(name.to_string()));
        elements.extend(arguments.iter().cloned().map(RespValue::BulkString));

        RespValue::Array(elements).encode()
    }
}

/// Parses the `$<len>\r\n` header that precedes a snapshot payload.
///
/// Unlike a bulk string the payload is not followed by CRLF. Returns the
/// declared payload length and the header length.
pub fn decode_snapshot_header(buffer: &[u8]) -> Result<Option<(usize, usize)>, RespError> {
    let Some((line, next)) = read_line(buffer, 0) else {
        return Ok(None);
    };

    let Some((b'$', rest)) = line.split_first() else {
        return Err(RespError::UnknownRespType(
            line.first().map(|byte| *byte as char).unwrap_or(' '),
        ));
    };

    let length = parse_length(str::from_utf8(rest)?)?;

    if length < 0 {
        return Err(RespError::InvalidLength(length.to_string()));
    }

    Ok(Some((length as usize, next)))
}

fn read_line(buffer: &[u8], cursor: usize) -> Option<(&[u8], usize)> {
    let remaining = buffer.get(cursor..)?;
    let position = remaining.windows(2).position(|window| window == CRLF)?;

    Some((&remaining[..position], cursor + position + CRLF.len()))
}

fn parse_length(content: &str) -> Result<i64, RespError> {
    let length = content
        .parse::<i64>()
        .map_err(|_| RespError::InvalidLength(content.to_string()))?;

    if length < -1 || length > MAX_BULK_LENGTH {
        return Err(RespError::InvalidLength(content.to_string()));
    }

    Ok(length)
}
