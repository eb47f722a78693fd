//! # Server Binary Entry Point
//!
//! Runs the chat relay and prints the event log.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --bin server -- --address 0.0.0.0:5000
//! cargo run --bin server -- --config config/server.toml
//! ```

use clap::Parser;
use env_logger::Builder;
use log::LevelFilter;
use std::io::Write;

use lan_chat::common::events::{self, ChatEvent};
use lan_chat::server::{Dispatcher, Roster, ServerConfig};

/// Command-line arguments for the server binary
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the server configuration file (TOML format)
    #[arg(short, long)]
    config: Option<String>,

    /// Address to listen on, e.g. 127.0.0.1:5000 (overrides the config file)
    #[arg(short, long)]
    address: Option<String>,
}

/// Initialize the logging system with timestamp, level, and message formatting.
///
/// Format: `[HH:MM:SS] [LEVEL] message`. INFO by default, `RUST_LOG` overrides.
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
        .filter_level(LevelFilter::Info)
        .parse_default_env()
        .init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    init_logger();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => ServerConfig::from_file(path)?,
        None => ServerConfig::default(),
    };
    if let Some(address) = args.address {
        config.server.address = address;
    }

    let (events_tx, mut events_rx) = events::channel();

    // Failing to bind is the one error that ends the server
    let dispatcher = Dispatcher::bind(&config, events_tx).await?;
    println!("Server created on {}", dispatcher.local_addr()?);

    tokio::spawn(async move {
        let mut roster = Roster::new();
        while let Some(event) = events_rx.recv().await {
            roster.apply(&event);
            println!("{}", event);

            if matches!(event, ChatEvent::Joined { .. } | ChatEvent::Left { .. }) {
                println!(
                    "Connected clients: {} [{}]",
                    roster.len(),
                    roster.identities().join(", ")
                );
            }
        }
    });

    dispatcher.run().await;

    Ok(())
}
