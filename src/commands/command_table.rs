use std::{collections::HashMap, sync::LazyLock};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    Ping,
    Echo,
    Get,
    Set,
    Type,
    Incr,
    RPush,
    LPush,
    LLen,
    LRange,
    LPop,
    BLPop,
    XAdd,
    XRange,
    XRead,
    Multi,
    Exec,
    Discard,
    Info,
    Replconf,
    Psync,
    Wait,
    Save,
}

#[derive(Debug)]
pub struct CommandSpec {
    pub name: &'static str,
    pub kind: CommandKind,
    /// Write commands are logged, propagated and refused on replicas.
    pub is_write: bool,
}

const fn spec(name: &'static str, kind: CommandKind, is_write: bool) -> CommandSpec {
    CommandSpec {
        name,
        kind,
        is_write,
    }
}

pub static COMMAND_TABLE: &[CommandSpec] = &[
    spec("PING", CommandKind::Ping, false),
    spec("ECHO", CommandKind::Echo, false),
    spec("GET", CommandKind::Get, false),
    spec("SET", CommandKind::Set, true),
    spec("TYPE", CommandKind::Type, false),
    spec("INCR", CommandKind::Incr, true),
    spec("RPUSH", CommandKind::RPush, true),
    spec("LPUSH", CommandKind::LPush, true),
    spec("LLEN", CommandKind::LLen, false),
    spec("LRANGE", CommandKind::LRange, false),
    spec("LPOP", CommandKind::LPop, true),
    spec("BLPOP", CommandKind::BLPop, true),
    spec("XADD", CommandKind::XAdd, true),
    spec("XRANGE", CommandKind::XRange, false),
    spec("XREAD", CommandKind::XRead, false),
    spec("MULTI", CommandKind::Multi, false),
    spec("EXEC", CommandKind::Exec, false),
    spec("DISCARD", CommandKind::Discard, false),
    spec("INFO", CommandKind::Info, false),
    spec("REPLCONF", CommandKind::Replconf, false),
    spec("PSYNC", CommandKind::Psync, false),
    spec("WAIT", CommandKind::Wait, false),
    spec("SAVE", CommandKind::Save, false),
];

static COMMAND_INDEX: LazyLock<HashMap<&'static str, &'static CommandSpec>> =
    LazyLock::new(|| COMMAND_TABLE.iter().map(|spec| (spec.name, spec)).collect());

/// Looks up an upper-cased command name.
pub fn lookup(name: &str) -> Option<&'static CommandSpec> {
    COMMAND_INDEX.get(name).copied()
}
