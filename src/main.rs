use std::path::PathBuf;

use anyhow::Result;
use clap::{ArgAction, Parser};

use redis_lite::server::{RedisServer, ServerConfig};

#[derive(Parser, Debug)]
#[command(name = "redis-lite", version, about = "A small Redis-compatible server")]
struct Args {
    /// Port to listen on.
    #[arg(long, env = "REDIS_LITE_PORT", default_value_t = 6379)]
    port: u16,

    /// Replicate from a master, given as "<host> <port>".
    #[arg(long, value_parser = parse_replica_of)]
    replicaof: Option<(String, u16)>,

    /// Directory holding the snapshot and the append log.
    #[arg(long, env = "REDIS_LITE_DIR", default_value = ".")]
    dir: PathBuf,

    #[arg(long, default_value = "dump.rdb")]
    dbfilename: String,

    #[arg(long, default_value = "appendonly.aof")]
    appendfilename: String,

    /// Log every write to the append log (yes|no).
    #[arg(long, default_value = "yes", action = ArgAction::Set, value_parser = parse_yes_no)]
    appendonly: bool,
}

fn parse_replica_of(value: &str) -> Result<(String, u16), String> {
    let mut parts = value.split_whitespace();

    match (parts.next(), parts.next(), parts.next()) {
        (Some(host), Some(port), None) => {
            let port = port
                .parse::<u16>()
                .map_err(|_| format!("invalid master port '{}'", port))?;

            Ok((host.to_string(), port))
        }
        _ => Err("expected \"<host> <port>\"".to_string()),
    }
}

fn parse_yes_no(value: &str) -> Result<bool, String> {
    match value.to_ascii_lowercase().as_str() {
        "yes" => Ok(true),
        "no" => Ok(false),
        other => Err(format!("expected yes or no, got '{}'", other)),
    }
}

fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let args = Args::parse();

    let config = ServerConfig {
        port: args.port,
        replica_of: args.replicaof,
        dir: args.dir,
        dbfilename: args.dbfilename,
        appendfilename: args.appendfilename,
        appendonly: args.appendonly,
    };

    RedisServer::new(config).run().await
}
