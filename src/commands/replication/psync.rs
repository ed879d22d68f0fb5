use crate::commands::{CommandError, command_handler::CommandResult};

pub struct PsyncArguments {
    pub replication_id: String,
    pub offset: i64,
}

impl PsyncArguments {
    pub fn parse(arguments: Vec<String>) -> Result<Self, CommandError> {
        let [replication_id, offset]: [String; 2] = arguments
            .try_into()
            .map_err(|_| CommandError::InvalidPsyncCommand)?;

        let offset = offset
            .parse::<i64>()
            .ok()
            .filter(|offset| *offset >= -1)
            .ok_or(CommandError::InvalidPsyncOffset)?;

        Ok(Self {
            replication_id,
            offset,
        })
    }
}

/// Accepts `PSYNC` as the last handshake step.
///
/// Partial resynchronization is not supported, so whatever ID and offset the
/// replica asks for, it gets the whole keyspace. The header and snapshot are
/// produced when the connection registers the replica, under one server lock.
pub fn psync(arguments: Vec<String>) -> Result<CommandResult, CommandError> {
    PsyncArguments::parse(arguments)?;

    Ok(CommandResult::Sync)
}
