//! # Client Binary Entry Point
//!
//! Line-oriented chat client: every line typed on stdin is sent to the relay,
//! every line relayed from others is printed.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --bin client -- --address 127.0.0.1:5000 --name alice
//! cargo run --bin client -- --config config/client.toml
//! ```

use anyhow::anyhow;
use clap::Parser;
use env_logger::Builder;
use log::LevelFilter;
use rand::Rng;
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};

use lan_chat::client::{ClientConfig, PeerSession};
use lan_chat::common::events::{self, ChatEvent};
use lan_chat::ChatError;

/// Command-line arguments for the client binary
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the client configuration file (TOML format)
    #[arg(short, long)]
    config: Option<String>,

    /// Relay server address, e.g. 127.0.0.1:5000 (overrides the config file)
    #[arg(short, long)]
    address: Option<String>,

    /// Display name (overrides the config file; random when neither sets it)
    #[arg(short, long)]
    name: Option<String>,
}

/// Initialize the logging system with timestamp, level, and message formatting.
///
/// Logs go to stderr at WARN by default so they don't interleave with the chat.
fn init_logger() {
    Builder::new()
        .format(|buf, record| {
            writeln!(
                buf,
                "[{}] [{}] {}",
                chrono::Local::now().format("%H:%M:%S"),
                record.level(),
                record.args()
            )
        })
        .filter_level(LevelFilter::Warn)
        .parse_default_env()
        .init();
}

const REFUSED_MESSAGE: &str =
    "Connection Error: connection refused, check that the address and port are correct";

/// Map a failed connect to the error reported to the user.
fn connect_error(e: ChatError) -> anyhow::Error {
    match e {
        ChatError::Connection(io) if io.kind() == std::io::ErrorKind::ConnectionRefused => {
            anyhow!(REFUSED_MESSAGE)
        }
        other => other.into(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logger();

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => ClientConfig::from_file(path)?,
        None => ClientConfig::default(),
    };

    let address = args.address.unwrap_or(config.client.server_address);
    let name = args
        .name
        .or(config.client.name)
        .unwrap_or_else(|| rand::thread_rng().gen_range(0..9_999_999).to_string());

    let (events_tx, mut events_rx) = events::channel();

    let mut session = match PeerSession::connect(&address, &name, events_tx).await {
        Ok(session) => session,
        Err(e) => return Err(connect_error(e)),
    };

    println!("Connected to {} as {}", address, name);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => match line? {
                Some(text) if text.is_empty() => continue,
                Some(text) => {
                    println!("<{}>: {}", name, text);
                    session.send(&text).await?;
                }
                // stdin closed
                None => break,
            },

            event = events_rx.recv() => match event {
                Some(ChatEvent::ConnectionLost { reason }) => {
                    return Err(anyhow!("Reading error: {}", reason));
                }
                Some(event) => println!("{}", event),
                None => break,
            },
        }
    }

    session.shutdown().await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_refused_connection_message() {
        let err = connect_error(ChatError::Connection(io::Error::from(
            io::ErrorKind::ConnectionRefused,
        )));
        assert_eq!(
            err.to_string(),
            "Connection Error: connection refused, check that the address and port are correct"
        );
    }

    #[test]
    fn test_other_connect_errors_pass_through() {
        let err = connect_error(ChatError::Connection(io::Error::new(
            io::ErrorKind::TimedOut,
            "timed out",
        )));
        assert!(err.to_string().contains("timed out"));
        assert!(!err.to_string().contains("refused"));
    }
}
