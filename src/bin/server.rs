//! # Server Binary Entry Point
//!
//! ## Usage
//!
//! ```bash
//! cargo run --bin server -- --config config/server.toml
//! cargo run --bin server -- --address 127.0.0.1:1708
//! ```
//!
//! The server will:
//! 1. Load configuration (defaults when no file is given)
//! 2. Load the users file, creating a root user on first run
//! 3. Load the tasks file
//! 4. Listen for clients until Ctrl+C

use clap::Parser;
use env_logger::Builder;
use log::{info, LevelFilter};
use std::io::Write;
use std::sync::Arc;

use tasksync::common::config::{load_config, ServerConfig};
use tasksync::server::{ServerCore, ServerMiddleware};

/// Command-line arguments for the server binary
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the server configuration file (TOML format)
    #[arg(short, long)]
    config: Option<String>,

    /// Listen address, overriding the configuration file
    #[arg(short, long)]
    address: Option<String>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: String,
}

/// Format: `[HH:MM:SS] [LEVEL] message`
fn init_logger(level: LevelFilter) {
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
        .filter_level(level)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logger(args.log_level.parse().unwrap_or(LevelFilter::Info));

    let mut config: ServerConfig = match &args.config {
        Some(path) => load_config(path)?,
        None => ServerConfig::default(),
    };
    if let Some(address) = args.address {
        config.server.address = address;
    }

    let (core, generated) = ServerCore::open(&config).await?;
    if let Some(root) = generated {
        // Only way the operator learns the bootstrap password
        println!(
            "No users found, created root user: {}:{}",
            root.username, root.password
        );
    }

    let middleware = Arc::new(ServerMiddleware::new(config, Arc::new(core)));

    tokio::select! {
        result = middleware.run() => result?,
        result = tokio::signal::ctrl_c() => {
            result?;
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
