//! REPLCONF, the configuration exchange between a master and its replicas.

use std::sync::Arc;

use tokio::sync::RwLock;

use crate::{
    commands::{CommandError, command_handler::CommandResult},
    resp::RespValue,
    server::RedisServer,
};

#[derive(Debug, PartialEq)]
pub enum ReplconfConfiguration {
    ListeningPort(u16),
    Capabilities(Vec<String>),
    Ack(usize),
    GetAck,
}

pub struct ReplconfArguments {
    pub configuration: ReplconfConfiguration,
}

impl ReplconfArguments {
    pub fn parse(arguments: Vec<String>) -> Result<Self, CommandError> {
        if arguments.len() < 2 {
            return Err(CommandError::InvalidReplconfCommand);
        }

        let configuration = match arguments[0].to_lowercase().as_str() {
            "listening-port" if arguments.len() == 2 => {
                let port = arguments[1]
                    .parse::<u16>()
                    .map_err(|_| CommandError::InvalidReplconfCommand)?;

                ReplconfConfiguration::ListeningPort(port)
            }
            // Replicas may send several pairs, e.g. `capa eof capa psync2`.
            "capa" => ReplconfConfiguration::Capabilities(
                arguments
                    .iter()
                    .skip(1)
                    .filter(|argument| !argument.eq_ignore_ascii_case("capa"))
                    .cloned()
                    .collect(),
            ),
            "ack" if arguments.len() == 2 => {
                let offset = arguments[1]
                    .parse::<usize>()
                    .map_err(|_| CommandError::InvalidReplconfCommand)?;

                ReplconfConfiguration::Ack(offset)
            }
            "getack" if arguments.len() == 2 && arguments[1] == "*" => {
                ReplconfConfiguration::GetAck
            }
            _ => return Err(CommandError::InvalidReplconfCommand),
        };

        Ok(Self { configuration })
    }
}

pub async fn replconf(
    client_address: &str,
    server: Arc<RwLock<RedisServer>>,
    arguments: Vec<String>,
) -> Result<CommandResult, CommandError> {
    let replconf_arguments = ReplconfArguments::parse(arguments)?;

    match replconf_arguments.configuration {
        ReplconfConfiguration::ListeningPort(_) | ReplconfConfiguration::Capabilities(_) => Ok(
            CommandResult::Response(RespValue::SimpleString("OK".to_string()).encode()),
        ),
        ReplconfConfiguration::Ack(offset) => {
            let mut server_guard = server.write().await;
            server_guard.record_replica_ack(client_address, offset);

            Ok(CommandResult::NoResponse)
        }
        ReplconfConfiguration::GetAck => {
            let server_guard = server.read().await;

            // A replica reports the bytes it has applied, a master its own offset.
            let offset = if server_guard.is_replica() {
                server_guard.processed_offset
            } else {
                server_guard.repl_offset
            };

            Ok(CommandResult::Response(RespValue::encode_array_from_strings(
                vec!["REPLCONF".to_string(), "ACK".to_string(), offset.to_string()],
            )))
        }
    }
}
