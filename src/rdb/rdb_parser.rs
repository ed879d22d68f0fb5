use std::collections::HashMap;

use tracing::{debug, warn};

use crate::{
    key_value_store::{KeyValueStore, Value, deadline_from_unix_ms},
    rdb::opcode::{OpCodeResponse, parse_magic_string, parse_opcode},
};

/// Incremental snapshot parser.
///
/// Chunks can be fed as they arrive; a record split across chunks is retried
/// once more bytes are available.
#[derive(Debug, Default)]
pub struct RdbParser {
    buffer: Vec<u8>,
    cursor: usize,
    pub redis_version: Option<u32>,
    pub metadata: HashMap<String, String>,
    pub db_number: Option<usize>,
    pub key_value_store: KeyValueStore,
    pub expired_keys: usize,
    pub reached_end_of_file: bool,
}

impl RdbParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parse(&mut self, chunk: &[u8]) -> tokio::io::Result<()> {
        self.buffer.extend_from_slice(chunk);

        if self.redis_version.is_none() {
            let magic_string_response = match parse_magic_string(&self.buffer) {
                Ok(response) => response,
                Err(e) if e.kind() == tokio::io::ErrorKind::UnexpectedEof => return Ok(()),
                Err(e) => return Err(e),
            };

            self.cursor = magic_string_response.number_of_read_bytes;
            self.redis_version = Some(magic_string_response.redis_version);
        }

        while self.cursor < self.buffer.len() && !self.reached_end_of_file {
            let (result, bytes_read) = match parse_opcode(&self.buffer, self.cursor) {
                Ok(response) => response,
                Err(e) if e.kind() == tokio::io::ErrorKind::UnexpectedEof => {
                    // Wait for the rest of the record.
                    self.buffer.drain(..self.cursor);
                    self.cursor = 0;
                    return Ok(());
                }
                Err(e) => return Err(e),
            };

            self.cursor += bytes_read;

            match result {
                OpCodeResponse::Metadata { key, value } => {
                    debug!(%key, %value, "snapshot metadata");
                    self.metadata.insert(key, value);
                }
                OpCodeResponse::ResizeDb { .. } => {}
                OpCodeResponse::Database { database_number } => {
                    self.db_number = Some(database_number);
                }
                OpCodeResponse::KeyValuePair {
                    key,
                    data,
                    expires_at,
                } => {
                    let expiration = match expires_at {
                        None => None,
                        Some(expires_at) => match deadline_from_unix_ms(expires_at) {
                            Some(deadline) => Some(deadline),
                            None => {
                                self.expired_keys += 1;
                                continue;
                            }
                        },
                    };

                    self.key_value_store
                        .insert_value(key, Value { data, expiration });
                }
                OpCodeResponse::EndOfFile => {
                    self.reached_end_of_file = true;
                }
            }
        }

        Ok(())
    }

    /// Returns the parsed keyspace, checking the file was complete.
    pub fn finish(self) -> tokio::io::Result<KeyValueStore> {
        if !self.reached_end_of_file {
            warn!(
                pending_bytes = self.buffer.len() - self.cursor,
                "snapshot ended without an end-of-file marker"
            );

            return Err(tokio::io::Error::new(
                tokio::io::ErrorKind::UnexpectedEof,
                "Snapshot is truncated",
            ));
        }

        Ok(self.key_value_store)
    }
}
