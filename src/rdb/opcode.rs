use std::collections::VecDeque;

use crate::{
    key_value_store::DataType,
    rdb::{
        encoding::{parse_length, parse_string},
        get_slice::{get_buffer_slice, read_u64_le},
    },
    stream::{Stream, StreamId},
};

pub const MAGIC_STRING: &str = "REDIS";
pub const RDB_VERSION: &str = "0011";

pub const METADATA_OPCODE: u8 = 0xFA;
pub const RESIZE_DB_OPCODE: u8 = 0xFB;
pub const EXPIRATION_MILLISECONDS_OPCODE: u8 = 0xFC;
pub const EXPIRATION_SECONDS_OPCODE: u8 = 0xFD;
pub const DATABASE_OPCODE: u8 = 0xFE;
pub const END_OF_FILE_OPCODE: u8 = 0xFF;

pub const STRING_VALUE_TYPE: u8 = 0x00;
pub const LIST_VALUE_TYPE: u8 = 0x01;
pub const STREAM_VALUE_TYPE: u8 = 0x15;
pub const INTEGER_VALUE_TYPE: u8 = 0x16;

#[derive(Debug, PartialEq)]
pub enum OpCodeResponse {
    Metadata {
        key: String,
        value: String,
    },
    ResizeDb {
        db_hash_table_size: usize,
        expiry_hash_table_size: usize,
    },
    Database {
        database_number: usize,
    },
    KeyValuePair {
        key: String,
        data: DataType,
        /// Unix time in milliseconds.
        expires_at: Option<u64>,
    },
    EndOfFile,
}

fn invalid_data(message: String) -> tokio::io::Error {
    tokio::io::Error::new(tokio::io::ErrorKind::InvalidData, message)
}

pub fn parse_opcode(bytes: &[u8], cursor: usize) -> tokio::io::Result<(OpCodeResponse, usize)> {
    let mut temp_cursor = cursor;
    let opcode = get_buffer_slice(bytes, temp_cursor, 1)?[0];
    temp_cursor += 1;

    let response = match opcode {
        METADATA_OPCODE => {
            let (key, key_bytes) = parse_string(bytes, temp_cursor)?;
            temp_cursor += key_bytes;
            let (value, value_bytes) = parse_string(bytes, temp_cursor)?;
            temp_cursor += value_bytes;

            OpCodeResponse::Metadata { key, value }
        }
        RESIZE_DB_OPCODE => {
            let (db_hash_table_size, db_bytes) = parse_length(bytes, temp_cursor)?;
            temp_cursor += db_bytes;
            let (expiry_hash_table_size, expiry_bytes) = parse_length(bytes, temp_cursor)?;
            temp_cursor += expiry_bytes;

            OpCodeResponse::ResizeDb {
                db_hash_table_size,
                expiry_hash_table_size,
            }
        }
        DATABASE_OPCODE => {
            let (database_number, number_bytes) = parse_length(bytes, temp_cursor)?;
            temp_cursor += number_bytes;

            OpCodeResponse::Database { database_number }
        }
        EXPIRATION_MILLISECONDS_OPCODE | EXPIRATION_SECONDS_OPCODE => {
            let expires_at = if opcode == EXPIRATION_MILLISECONDS_OPCODE {
                let milliseconds = read_u64_le(bytes, temp_cursor)?;
                temp_cursor += 8;
                milliseconds
            } else {
                let seconds: [u8; 4] = get_buffer_slice(bytes, temp_cursor, 4)?
                    .try_into()
                    .map_err(|_| invalid_data("Not enough bytes for u32".to_string()))?;
                temp_cursor += 4;
                u64::from(u32::from_le_bytes(seconds)) * 1000
            };

            let value_type = get_buffer_slice(bytes, temp_cursor, 1)?[0];
            temp_cursor += 1;

            let (key, data, entry_bytes) = parse_key_value_pair(bytes, temp_cursor, value_type)?;
            temp_cursor += entry_bytes;

            OpCodeResponse::KeyValuePair {
                key,
                data,
                expires_at: Some(expires_at),
            }
        }
        END_OF_FILE_OPCODE => {
            // CRC64 checksum, not verified.
            get_buffer_slice(bytes, temp_cursor, 8)?;
            temp_cursor += 8;

            OpCodeResponse::EndOfFile
        }
        value_type => {
            let (key, data, entry_bytes) = parse_key_value_pair(bytes, temp_cursor, value_type)?;
            temp_cursor += entry_bytes;

            OpCodeResponse::KeyValuePair {
                key,
                data,
                expires_at: None,
            }
        }
    };

    Ok((response, temp_cursor - cursor))
}

fn parse_key_value_pair(
    bytes: &[u8],
    cursor: usize,
    value_type: u8,
) -> tokio::io::Result<(String, DataType, usize)> {
    let mut temp_cursor = cursor;
    let (key, key_bytes) = parse_string(bytes, temp_cursor)?;
    temp_cursor += key_bytes;

    let data = match value_type {
        STRING_VALUE_TYPE => {
            let (value, value_bytes) = parse_string(bytes, temp_cursor)?;
            temp_cursor += value_bytes;

            DataType::String(value)
        }
        INTEGER_VALUE_TYPE => {
            let value = read_u64_le(bytes, temp_cursor)? as i64;
            temp_cursor += 8;

            DataType::Integer(value)
        }
        LIST_VALUE_TYPE => {
            let (length, length_bytes) = parse_length(bytes, temp_cursor)?;
            temp_cursor += length_bytes;

            let mut list = VecDeque::new();

            for _ in 0..length {
                let (element, element_bytes) = parse_string(bytes, temp_cursor)?;
                temp_cursor += element_bytes;
                list.push_back(element);
            }

            DataType::List(list)
        }
        STREAM_VALUE_TYPE => {
            let (stream, stream_bytes) = parse_stream(bytes, temp_cursor)?;
            temp_cursor += stream_bytes;

            DataType::Stream(stream)
        }
        other => {
            return Err(invalid_data(format!("Unknown OpCode: 0x{:02X}", other)));
        }
    };

    Ok((key, data, temp_cursor - cursor))
}

fn parse_stream(bytes: &[u8], cursor: usize) -> tokio::io::Result<(Stream, usize)> {
    let mut temp_cursor = cursor;
    let mut stream = Stream::new();

    let last_ms = read_u64_le(bytes, temp_cursor)?;
    let last_seq = read_u64_le(bytes, temp_cursor + 8)?;
    temp_cursor += 16;

    let (entry_count, count_bytes) = parse_length(bytes, temp_cursor)?;
    temp_cursor += count_bytes;

    for _ in 0..entry_count {
        let ms = read_u64_le(bytes, temp_cursor)?;
        let seq = read_u64_le(bytes, temp_cursor + 8)?;
        temp_cursor += 16;

        let (field_count, field_count_bytes) = parse_length(bytes, temp_cursor)?;
        temp_cursor += field_count_bytes;

        let mut fields = Vec::new();

        for _ in 0..field_count {
            let (field, field_bytes) = parse_string(bytes, temp_cursor)?;
            temp_cursor += field_bytes;
            let (value, value_bytes) = parse_string(bytes, temp_cursor)?;
            temp_cursor += value_bytes;

            fields.push((field, value));
        }

        stream.insert_entry(StreamId::new(ms, seq), fields);
    }

    stream.set_last_id(StreamId::new(last_ms, last_seq));

    Ok((stream, temp_cursor - cursor))
}

#[derive(Debug)]
pub struct MagicStringResponse {
    pub number_of_read_bytes: usize,
    pub redis_version: u32,
}

pub fn parse_magic_string(bytes: &[u8]) -> tokio::io::Result<MagicStringResponse> {
    let magic_string = get_buffer_slice(bytes, 0, 5)?;

    if magic_string != MAGIC_STRING.as_bytes() {
        return Err(invalid_data("Invalid magic string".to_string()));
    }

    let version = get_buffer_slice(bytes, 5, 4)?;
    let redis_version = std::str::from_utf8(version)
        .ok()
        .and_then(|version| version.parse::<u32>().ok())
        .ok_or_else(|| invalid_data("Invalid Redis version".to_string()))?;

    if !(1..=12).contains(&redis_version) {
        return Err(invalid_data("Invalid Redis version".to_string()));
    }

    Ok(MagicStringResponse {
        number_of_read_bytes: 9,
        redis_version,
    })
}
