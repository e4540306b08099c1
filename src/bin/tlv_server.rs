use std::{error::Error, num::NonZeroUsize, time::Duration};

use clap::{Parser, ValueEnum};
use log::{info, warn};
use tlv::protocol::{
    Concurrency, Connection, HandlerRegistry, MessageType, Server, ServerConfig,
    UnknownTypePolicy,
};

#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Listen for new connections at "host:port"
    address: String,
    /// Transport family: tcp, tcp4 or tcp6
    #[arg(long, default_value = "tcp")]
    network: String,
    /// Per-read timeout in milliseconds; 0 waits forever
    #[arg(long, default_value_t = 5000)]
    read_timeout_ms: u64,
    /// Serve connections from a fixed pool of this many workers
    #[arg(long)]
    workers: Option<NonZeroUsize>,
    /// What to do with messages of an unregistered type
    #[arg(long, value_enum, default_value_t = Unknown::Discard)]
    unknown: Unknown,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Unknown {
    Discard,
    Close,
}

impl From<Unknown> for UnknownTypePolicy {
    fn from(value: Unknown) -> Self {
        match value {
            Unknown::Discard => UnknownTypePolicy::Discard,
            Unknown::Close => UnknownTypePolicy::Close,
        }
    }
}

fn hello(conn: &mut Connection, _: &[u8]) {
    match conn.peer_addr() {
        Ok(peer) => info!("hello from {peer}"),
        Err(e) => info!("hello from unknown peer: {e}"),
    }
}

fn echo(conn: &mut Connection, payload: &[u8]) {
    if let Err(e) = conn.write_bytes(payload) {
        warn!("echo reply failed: {e}");
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let cli = Cli::parse();
    let concurrency = match cli.workers {
        Some(n) => Concurrency::Pool(n),
        None => Concurrency::Unbounded,
    };
    let config = ServerConfig::new(Duration::from_millis(cli.read_timeout_ms))
        .with_concurrency(concurrency)
        .with_unknown_type_policy(cli.unknown.into());

    let registry = HandlerRegistry::builder()
        .register(MessageType::HELLO, hello)
        .register(MessageType::USER_START, echo)
        .build();

    ctrlc::set_handler(|| {
        info!("interrupted, shutting down");
        std::process::exit(0);
    })?;

    let server = Server::bind_with_config(&cli.network, &cli.address, config, registry)?;
    server.serve()?;
    Ok(())
}
