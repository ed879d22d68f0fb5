use thiserror::Error;

use crate::{
    key_value_store::StoreError, resp::RespValue, state::StateError, stream::StreamIdError,
};

#[derive(Error, Debug, PartialEq, Clone)]
pub enum CommandError {
    #[error("invalid command")]
    InvalidCommand,
    #[error("unknown command '{0}'")]
    UnknownCommand(String),
    #[error("invalid PING command")]
    InvalidPingCommand,
    #[error("invalid ECHO command")]
    InvalidEchoCommand,
    #[error("invalid GET command")]
    InvalidGetCommand,
    #[error("invalid SET command")]
    InvalidSetCommand,
    #[error("invalid SET command argument")]
    InvalidSetCommandArgument,
    #[error("invalid SET command expiration")]
    InvalidSetCommandExpiration,
    #[error("invalid TYPE command")]
    InvalidTypeCommand,
    #[error("invalid INCR command")]
    InvalidIncrCommand,
    #[error("invalid RPUSH command")]
    InvalidRPushCommand,
    #[error("invalid LPUSH command")]
    InvalidLPushCommand,
    #[error("invalid LLEN command")]
    InvalidLLenCommand,
    #[error("invalid LRANGE command")]
    InvalidLRangeCommand,
    #[error("invalid LRANGE command argument")]
    InvalidLRangeCommandArgument,
    #[error("invalid LPOP command")]
    InvalidLPopCommand,
    #[error("invalid LPOP command argument")]
    InvalidLPopCommandArgument,
    #[error("invalid BLPOP command")]
    InvalidBLPopCommand,
    #[error("invalid BLPOP timeout")]
    InvalidBLPopTimeout,
    #[error("invalid XADD command")]
    InvalidXAddCommand,
    #[error("invalid XRANGE command")]
    InvalidXRangeCommand,
    #[error("invalid XREAD command")]
    InvalidXReadCommand,
    #[error("invalid XREAD command option")]
    InvalidXReadOption,
    #[error("invalid XREAD block duration")]
    InvalidXReadBlockDuration,
    #[error("invalid COUNT value")]
    InvalidCount,
    #[error("invalid MULTI command")]
    InvalidMultiCommand,
    #[error("invalid EXEC command")]
    InvalidExecCommand,
    #[error("EXEC without MULTI")]
    ExecWithoutMulti,
    #[error("invalid DISCARD command")]
    InvalidDiscardCommand,
    #[error("DISCARD without MULTI")]
    DiscardWithoutMulti,
    #[error("command not allowed inside a transaction")]
    NotAllowedInTransaction,
    #[error("transaction error: {0}")]
    TransactionError(#[from] StateError),
    #[error("invalid INFO command")]
    InvalidInfoCommand,
    #[error("invalid INFO section")]
    InvalidInfoSection,
    #[error("invalid REPLCONF command")]
    InvalidReplconfCommand,
    #[error("invalid PSYNC command")]
    InvalidPsyncCommand,
    #[error("invalid PSYNC offset")]
    InvalidPsyncOffset,
    #[error("replication protocol error: {0}")]
    ReplicationProtocolError(String),
    #[error("invalid WAIT command")]
    InvalidWaitCommand,
    #[error("invalid WAIT command argument")]
    InvalidWaitCommandArgument,
    #[error("invalid WAIT command for replica")]
    InvalidWaitCommandForReplica,
    #[error("write command sent to a read only replica")]
    ReadOnlyReplica,
    #[error("invalid SAVE command")]
    InvalidSaveCommand,
    #[error("snapshot failed: {0}")]
    SnapshotFailed(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    StreamId(#[from] StreamIdError),
}

fn wrong_number_of_arguments(command: &str) -> String {
    RespValue::Error(format!(
        "ERR wrong number of arguments for '{}' command",
        command
    ))
    .encode()
}

impl CommandError {
    pub fn as_string(&self) -> String {
        match self {
            CommandError::InvalidCommand => {
                RespValue::Error("ERR Protocol error: expected an array of bulk strings".to_string())
                    .encode()
            }
            CommandError::UnknownCommand(name) => {
                RespValue::Error(format!("ERR unknown command '{}'", name)).encode()
            }
            CommandError::InvalidPingCommand => wrong_number_of_arguments("ping"),
            CommandError::InvalidEchoCommand => wrong_number_of_arguments("echo"),
            CommandError::InvalidGetCommand => wrong_number_of_arguments("get"),
            CommandError::InvalidSetCommand => wrong_number_of_arguments("set"),
            CommandError::InvalidSetCommandArgument => {
                RespValue::Error("ERR syntax error".to_string()).encode()
            }
            CommandError::InvalidSetCommandExpiration => {
                RespValue::Error("ERR invalid expire time in 'set' command".to_string()).encode()
            }
            CommandError::InvalidTypeCommand => wrong_number_of_arguments("type"),
            CommandError::InvalidIncrCommand => wrong_number_of_arguments("incr"),
            CommandError::InvalidRPushCommand => wrong_number_of_arguments("rpush"),
            CommandError::InvalidLPushCommand => wrong_number_of_arguments("lpush"),
            CommandError::InvalidLLenCommand => wrong_number_of_arguments("llen"),
            CommandError::InvalidLRangeCommand => wrong_number_of_arguments("lrange"),
            CommandError::InvalidLRangeCommandArgument => {
                RespValue::Error("ERR value is not an integer or out of range".to_string())
                    .encode()
            }
            CommandError::InvalidLPopCommand => wrong_number_of_arguments("lpop"),
            CommandError::InvalidLPopCommandArgument => {
                RespValue::Error("ERR value is out of range, must be positive".to_string())
                    .encode()
            }
            CommandError::InvalidBLPopCommand => wrong_number_of_arguments("blpop"),
            CommandError::InvalidBLPopTimeout => {
                RespValue::Error("ERR timeout is not a float or out of range".to_string())
                    .encode()
            }
            CommandError::InvalidXAddCommand => wrong_number_of_arguments("xadd"),
            CommandError::InvalidXRangeCommand => wrong_number_of_arguments("xrange"),
            CommandError::InvalidXReadCommand => wrong_number_of_arguments("xread"),
            CommandError::InvalidXReadOption => {
                RespValue::Error("ERR syntax error".to_string()).encode()
            }
            CommandError::InvalidXReadBlockDuration => {
                RespValue::Error("ERR timeout is not an integer or out of range".to_string())
                    .encode()
            }
            CommandError::InvalidCount => {
                RespValue::Error("ERR value is not an integer or out of range".to_string())
                    .encode()
            }
            CommandError::InvalidMultiCommand => wrong_number_of_arguments("multi"),
            CommandError::InvalidExecCommand => wrong_number_of_arguments("exec"),
            CommandError::ExecWithoutMulti => {
                RespValue::Error("ERR EXEC without MULTI".to_string()).encode()
            }
            CommandError::InvalidDiscardCommand => wrong_number_of_arguments("discard"),
            CommandError::DiscardWithoutMulti => {
                RespValue::Error("ERR DISCARD without MULTI".to_string()).encode()
            }
            CommandError::NotAllowedInTransaction => {
                RespValue::Error("ERR Command not allowed inside a transaction".to_string())
                    .encode()
            }
            CommandError::TransactionError(e) => {
                RespValue::Error(format!("ERR {}", e)).encode()
            }
            CommandError::InvalidInfoCommand => {
                RespValue::Error("ERR syntax error".to_string()).encode()
            }
            CommandError::InvalidInfoSection => {
                RespValue::Error("ERR Invalid INFO section".to_string()).encode()
            }
            CommandError::InvalidReplconfCommand => {
                RespValue::Error("ERR Unrecognized REPLCONF option".to_string()).encode()
            }
            CommandError::InvalidPsyncCommand => wrong_number_of_arguments("psync"),
            CommandError::InvalidPsyncOffset => {
                RespValue::Error("ERR Invalid PSYNC offset".to_string()).encode()
            }
            CommandError::ReplicationProtocolError(reason) => {
                RespValue::Error(format!("ERR {}", reason)).encode()
            }
            CommandError::InvalidWaitCommand => wrong_number_of_arguments("wait"),
            CommandError::InvalidWaitCommandArgument => {
                RespValue::Error("ERR value is not an integer or out of range".to_string())
                    .encode()
            }
            CommandError::InvalidWaitCommandForReplica => {
                RespValue::Error("ERR WAIT cannot be used with replica instances".to_string())
                    .encode()
            }
            CommandError::ReadOnlyReplica => RespValue::Error(
                "READONLY You can't write against a read only replica.".to_string(),
            )
            .encode(),
            CommandError::InvalidSaveCommand => wrong_number_of_arguments("save"),
            CommandError::SnapshotFailed(reason) => {
                RespValue::Error(format!("ERR {}", reason)).encode()
            }
            CommandError::Store(e) => RespValue::Error(e.to_string()).encode(),
            CommandError::StreamId(e) => RespValue::Error(e.to_string()).encode(),
        }
    }
}
