use std::{error::Error, time::Duration};

use clap::Parser;
use tlv::protocol::{Client, MessageType};

#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Server address as "host:port"
    address: String,
    /// Payload to send
    #[arg(default_value = "")]
    payload: String,
    /// Transport family: tcp, tcp4 or tcp6
    #[arg(long, default_value = "tcp")]
    network: String,
    /// Message type id
    #[arg(long = "type", default_value_t = MessageType::USER_START.0)]
    message_type: u16,
    /// Read a reply of exactly this many bytes
    #[arg(long)]
    reply_len: Option<usize>,
    /// Reply timeout in milliseconds; 0 waits forever
    #[arg(long, default_value_t = 1000)]
    timeout_ms: u64,
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let cli = Cli::parse();
    let mut client = Client::connect(&cli.network, &cli.address)?;
    client.write_message(MessageType(cli.message_type), cli.payload.as_bytes())?;

    if let Some(len) = cli.reply_len {
        let reply = client.read_exact(len, Duration::from_millis(cli.timeout_ms))?;
        println!("{}", String::from_utf8_lossy(&reply));
    }

    client.close()?;
    Ok(())
}
