//! A Redis-compatible server.
//!
//! Supports strings and counters with expiry, lists with blocking pops,
//! streams with blocking reads, MULTI/EXEC transactions, master-replica
//! replication with WAIT, and persistence through a snapshot file plus an
//! append-only command log.
//!
//! Connections speak RESP over TCP and are served concurrently on Tokio.

pub mod aof;
pub mod commands;
pub mod connection;
pub mod input;
pub mod key_value_store;
pub mod rdb;
pub mod resp;
pub mod server;
pub mod state;
pub mod stream;
