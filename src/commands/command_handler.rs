use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::{
    commands::{
        blpop::{BlpopArguments, BlpopStart, blpop, blpop_reply, start_blpop, wait_for_blpop},
        command_error::CommandError,
        command_table::{self, CommandKind},
        echo::{EchoArguments, echo},
        get::{GetArguments, get},
        incr::{IncrArguments, incr},
        info::{InfoArguments, info},
        llen::{LlenArguments, llen},
        lpop::{LpopArguments, lpop},
        lrange::{LrangeArguments, lrange},
        ping::{PingArguments, ping},
        replication::{
            PsyncArguments, ReplconfArguments, WaitArguments, intercept_handshake_step, replconf,
            wait,
        },
        rpush_and_lpush::{PushArrayOperations, lpush, push_array_operations, rpush},
        save::{SaveArguments, save},
        set::{SetArguments, set},
        transactions::{DiscardArguments, ExecArguments, MultiArguments, discard, exec, multi},
        type_command::{TypeArguments, type_command},
        xadd::{XaddArguments, xadd},
        xrange::{XrangeArguments, xrange},
        xread::{XreadArguments, xread},
    },
    key_value_store::KeyValueStore,
    resp::RespValue,
    server::RedisServer,
    state::State,
};

#[derive(Debug, PartialEq)]
pub enum CommandResult {
    NoResponse,
    Response(String),
    /// Full resynchronization accepted; the connection registers the replica
    /// and sends it the `+FULLRESYNC` header and the snapshot.
    Sync,
    /// Commands queued by a transaction, to be run by `run_transaction_commands`.
    Batch(Vec<CommandHandler>),
}

/// Where a command came from. Only client commands are logged and propagated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandSource {
    Client,
    Master,
    Replay,
}

#[derive(Debug, PartialEq, Clone)]
pub struct CommandHandler {
    pub name: String,
    pub arguments: Vec<String>,
    pub input: RespValue,
    /// Cleared for commands run by EXEC, where BLPOP, XREAD BLOCK and WAIT
    /// answer with what is there instead of suspending.
    may_block: bool,
}

impl CommandHandler {
    pub fn new(input: RespValue) -> Result<Self, CommandError> {
        let RespValue::Array(elements) = &input else {
            return Err(CommandError::InvalidCommand);
        };

        let name = match elements.first() {
            Some(RespValue::BulkString(s)) => s.to_uppercase(),
            _ => return Err(CommandError::InvalidCommand),
        };

        let mut arguments: Vec<String> = Vec::with_capacity(elements.len() - 1);

        for element in &elements[1..] {
            let RespValue::BulkString(argument) = element else {
                return Err(CommandError::InvalidCommand);
            };

            arguments.push(argument.clone());
        }

        Ok(Self {
            name,
            arguments,
            input,
            may_block: true,
        })
    }

    /// Rebuilds a handler from a decoded log entry.
    pub fn from_parts(name: String, arguments: Vec<String>) -> Self {
        let input = RespValue::Array(
            std::iter::once(name.clone())
                .chain(arguments.iter().cloned())
                .map(RespValue::BulkString)
                .collect(),
        );

        Self {
            name: name.to_uppercase(),
            arguments,
            input,
            may_block: true,
        }
    }

    pub fn without_blocking(mut self) -> Self {
        self.may_block = false;
        self
    }

    pub fn is_write(&self) -> bool {
        command_table::lookup(&self.name).is_some_and(|spec| spec.is_write)
    }

    /// Checks arity and argument shapes without executing anything.
    pub fn validate_command_arguments(&self) -> Result<(), CommandError> {
        let Some(spec) = command_table::lookup(&self.name) else {
            return Err(CommandError::UnknownCommand(self.name.clone()));
        };

        let arguments = self.arguments.clone();

        match spec.kind {
            CommandKind::Ping => PingArguments::parse(arguments).map(|_| ()),
            CommandKind::Echo => EchoArguments::parse(arguments).map(|_| ()),
            CommandKind::Get => GetArguments::parse(arguments).map(|_| ()),
            CommandKind::Set => SetArguments::parse(arguments).map(|_| ()),
            CommandKind::Type => TypeArguments::parse(arguments).map(|_| ()),
            CommandKind::Incr => IncrArguments::parse(arguments).map(|_| ()),
            CommandKind::RPush => PushArrayOperations::parse(arguments, false).map(|_| ()),
            CommandKind::LPush => PushArrayOperations::parse(arguments, true).map(|_| ()),
            CommandKind::LLen => LlenArguments::parse(arguments).map(|_| ()),
            CommandKind::LRange => LrangeArguments::parse(arguments).map(|_| ()),
            CommandKind::LPop => LpopArguments::parse(arguments).map(|_| ()),
            CommandKind::BLPop => BlpopArguments::parse(arguments).map(|_| ()),
            CommandKind::XAdd => XaddArguments::parse(arguments).map(|_| ()),
            CommandKind::XRange => XrangeArguments::parse(arguments).map(|_| ()),
            CommandKind::XRead => XreadArguments::parse(arguments).map(|_| ()),
            CommandKind::Multi => MultiArguments::parse(arguments).map(|_| ()),
            CommandKind::Exec => ExecArguments::parse(arguments).map(|_| ()),
            CommandKind::Discard => DiscardArguments::parse(arguments).map(|_| ()),
            CommandKind::Info => InfoArguments::parse(arguments).map(|_| ()),
            CommandKind::Replconf => ReplconfArguments::parse(arguments).map(|_| ()),
            CommandKind::Psync => PsyncArguments::parse(arguments).map(|_| ()),
            CommandKind::Wait => WaitArguments::parse(arguments).map(|_| ()),
            CommandKind::Save => SaveArguments::parse(arguments).map(|_| ()),
        }
    }

    /// Runs a command through the full pipeline.
    ///
    /// 1. Replicas refuse writes coming from their own clients.
    /// 2. A master lets the replication handshake steps short-circuit.
    /// 3. Inside MULTI everything but MULTI/EXEC/DISCARD is queued.
    /// 4. The command is dispatched.
    /// 5. Successful client writes are appended to the log and sent to replicas.
    ///
    /// Write handlers must not lock `server`; it is held while they run.
    pub async fn handle_command(
        &self,
        server: Arc<RwLock<RedisServer>>,
        client_address: &str,
        store: Arc<Mutex<KeyValueStore>>,
        state: Arc<Mutex<State>>,
        source: CommandSource,
    ) -> Result<CommandResult, CommandError> {
        let Some(spec) = command_table::lookup(&self.name) else {
            return Err(CommandError::UnknownCommand(self.name.clone()));
        };

        if spec.is_write && source == CommandSource::Client && server.read().await.is_replica() {
            return Err(CommandError::ReadOnlyReplica);
        }

        if source == CommandSource::Client {
            if let Some(result) = intercept_handshake_step(
                self,
                client_address,
                Arc::clone(&server),
                Arc::clone(&state),
            )
            .await?
            {
                return Ok(result);
            }
        }

        if let Some(response) = self
            .queue_command_if_in_transaction(client_address, Arc::clone(&state))
            .await?
        {
            return Ok(CommandResult::Response(response));
        }

        if !spec.is_write || source != CommandSource::Client {
            return self
                .dispatch(spec.kind, server, client_address, store, state)
                .await;
        }

        // Writes hold the server lock from execution to propagation so replicas
        // and the log see them in the order they were applied. BLPOP only
        // holds it while trying to pop, never while suspended.
        match spec.kind {
            CommandKind::BLPop => self.blpop_from_client(server, client_address, store, state).await,
            CommandKind::RPush | CommandKind::LPush => {
                let mut server_guard = server.write().await;
                let outcome = push_array_operations(
                    store,
                    state,
                    self.arguments.clone(),
                    spec.kind == CommandKind::LPush,
                )
                .await?;
                let command_result = outcome.to_command_result();

                self.record_write(&mut server_guard, &command_result).await;

                // Every element handed to a blocked client left the list
                // from the head, right after the push.
                if let Some(key) = self.arguments.first() {
                    let pop = RespValue::encode_command("LPOP", std::slice::from_ref(key));

                    for _ in 0..outcome.handed_off {
                        record_frame(&mut server_guard, &pop).await;
                    }
                }

                Ok(command_result)
            }
            kind => {
                let mut server_guard = server.write().await;
                let command_result = self
                    .dispatch(kind, Arc::clone(&server), client_address, store, state)
                    .await?;
                self.record_write(&mut server_guard, &command_result).await;

                Ok(command_result)
            }
        }
    }

    /// BLPOP from a client. An immediate pop is recorded as `LPOP key`; an
    /// element handed over later was already recorded by the push.
    async fn blpop_from_client(
        &self,
        server: Arc<RwLock<RedisServer>>,
        client_address: &str,
        store: Arc<Mutex<KeyValueStore>>,
        state: Arc<Mutex<State>>,
    ) -> Result<CommandResult, CommandError> {
        let blpop_arguments = BlpopArguments::parse(self.arguments.clone())?;
        let key = blpop_arguments.key;

        let receiver = {
            let mut server_guard = server.write().await;

            match start_blpop(client_address, &key, &store, &state, self.may_block).await? {
                BlpopStart::Popped(value) => {
                    let command_result = blpop_reply(key, Some(value));
                    self.record_write(&mut server_guard, &command_result).await;

                    return Ok(command_result);
                }
                BlpopStart::Waiting(receiver) => receiver,
                BlpopStart::Empty => return Ok(blpop_reply(key, None)),
            }
        };

        let value =
            wait_for_blpop(client_address, &key, blpop_arguments.timeout, receiver, &state).await;

        Ok(blpop_reply(key, value))
    }

    async fn record_write(&self, server: &mut RedisServer, command_result: &CommandResult) {
        if let Some(frame) = self.replication_frame(command_result) {
            record_frame(server, &frame).await;
        }
    }

    async fn dispatch(
        &self,
        kind: CommandKind,
        server: Arc<RwLock<RedisServer>>,
        client_address: &str,
        store: Arc<Mutex<KeyValueStore>>,
        state: Arc<Mutex<State>>,
    ) -> Result<CommandResult, CommandError> {
        let arguments = self.arguments.clone();

        match kind {
            CommandKind::Ping => ping(arguments),
            CommandKind::Echo => echo(arguments),
            CommandKind::Get => get(store, arguments).await,
            CommandKind::Set => set(store, arguments).await,
            CommandKind::Type => type_command(store, arguments).await,
            CommandKind::Incr => incr(store, arguments).await,
            CommandKind::RPush => rpush(store, state, arguments).await,
            CommandKind::LPush => lpush(store, state, arguments).await,
            CommandKind::LLen => llen(store, arguments).await,
            CommandKind::LRange => lrange(store, arguments).await,
            CommandKind::LPop => lpop(store, arguments).await,
            CommandKind::BLPop => {
                blpop(client_address, store, state, arguments, self.may_block).await
            }
            CommandKind::XAdd => xadd(store, state, arguments).await,
            CommandKind::XRange => xrange(store, arguments).await,
            CommandKind::XRead => {
                xread(client_address, store, state, arguments, self.may_block).await
            }
            CommandKind::Multi => multi(client_address, state, arguments).await,
            CommandKind::Exec => exec(client_address, state, arguments).await,
            CommandKind::Discard => discard(client_address, state, arguments).await,
            CommandKind::Info => info(server, arguments).await,
            CommandKind::Replconf => replconf(client_address, server, arguments).await,
            CommandKind::Psync => {
                PsyncArguments::parse(arguments)?;

                Err(CommandError::ReplicationProtocolError(
                    "PSYNC is only accepted after PING and REPLCONF".to_string(),
                ))
            }
            CommandKind::Wait => wait(server, arguments, self.may_block).await,
            CommandKind::Save => save(server, store, arguments).await,
        }
    }

    async fn queue_command_if_in_transaction(
        &self,
        client_address: &str,
        state: Arc<Mutex<State>>,
    ) -> Result<Option<String>, CommandError> {
        if matches!(self.name.as_str(), "MULTI" | "EXEC" | "DISCARD") {
            return Ok(None);
        }

        let mut state_guard = state.lock().await;

        if state_guard.get_transaction(client_address).is_none() {
            return Ok(None);
        }

        self.validate_command_arguments()?;
        state_guard.add_to_transaction(client_address, self.clone())?;

        debug!(command = %self.name, "queued");

        Ok(Some(RespValue::SimpleString("QUEUED".to_string()).encode()))
    }

    /// The frame replicas and the log see for a successful write.
    ///
    /// A blocking pop is replayed as the plain pop it turned into, and not at
    /// all when it timed out.
    fn replication_frame(&self, command_result: &CommandResult) -> Option<String> {
        match (self.name.as_str(), command_result) {
            ("BLPOP", CommandResult::Response(response)) => {
                if *response == RespValue::NullArray.encode() {
                    return None;
                }

                let key = self.arguments.first()?;
                Some(RespValue::encode_command("LPOP", std::slice::from_ref(key)))
            }
            (_, CommandResult::Response(_)) => Some(self.input.encode()),
            (name, other) => {
                warn!(command = name, result = ?other, "unexpected result for a write command");
                None
            }
        }
    }
}

async fn record_frame(server: &mut RedisServer, frame: &str) {
    server.append_to_log(frame).await;
    server.propagate_to_replicas(frame);
}
