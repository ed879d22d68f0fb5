mod encoding;
mod get_slice;
mod opcode;
mod rdb_file_operations;
mod rdb_parser;
mod rdb_writer;

pub use rdb_file_operations::{load_snapshot, write_snapshot_file};
pub use rdb_parser::RdbParser;
pub use rdb_writer::save_snapshot;
