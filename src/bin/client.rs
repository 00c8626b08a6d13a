//! # Client Binary Entry Point
//!
//! ## Usage
//!
//! ```bash
//! cargo run --bin client -- login root 123456
//! cargo run --bin client -- push tasks.json
//! cargo run --bin client -- backup notes.txt photo.png
//! cargo run --bin client -- watch
//! ```

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use env_logger::Builder;
use log::{info, LevelFilter};
use std::io::Write;
use std::path::PathBuf;

use tasksync::client::TaskClient;
use tasksync::common::messages::{Message, Status, CMD_TASKS};
use tasksync::common::payload::{BackupBatch, FileRecord, TaskList};

/// Command-line arguments for the client binary
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address
    #[arg(short, long, default_value = "127.0.0.1:1708")]
    address: String,

    #[command(subcommand)]
    action: Action,
}

#[derive(Subcommand, Debug)]
enum Action {
    /// Check a username and password
    Login { username: String, password: String },
    /// Replace the shared task list with the JSON array in FILE
    Push { file: PathBuf },
    /// Upload files to the server's backup directory
    Backup {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Print the task list every time it changes
    Watch,
}

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
        .init();
}

fn require_ok(status: Status, what: &str) -> anyhow::Result<()> {
    match status {
        Status::Ok => {
            info!("✅ {} accepted", what);
            Ok(())
        }
        Status::Error => bail!("{} rejected by server", what),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logger();

    let args = Args::parse();
    let mut client = TaskClient::connect(&args.address)
        .await
        .with_context(|| format!("connecting to {}", args.address))?;

    match args.action {
        Action::Login { username, password } => {
            let logged_in = client.login(&username, &password).await?;
            println!("{}", logged_in);
        }
        Action::Push { file } => {
            let bytes = std::fs::read(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            let tasks = TaskList::from_bytes(&bytes)?;
            let status = client.push_tasks(&tasks).await?;
            require_ok(status, "task list")?;
        }
        Action::Backup { files } => {
            let mut records = Vec::with_capacity(files.len());
            for path in &files {
                let content = std::fs::read(path)
                    .with_context(|| format!("reading {}", path.display()))?;
                records.push(FileRecord::new(path.display().to_string(), content));
            }
            let status = client.backup(&BackupBatch::new(records)).await?;
            require_ok(status, "backup")?;
        }
        Action::Watch => {
            while let Some(message) = client.next_message().await? {
                if let Message::Request { command, data } = message {
                    if command == CMD_TASKS {
                        let tasks = TaskList::from_bytes(&data)?;
                        println!("{}", serde_json::to_string_pretty(&tasks)?);
                    }
                }
            }
            info!("🔌 Server closed the connection");
        }
    }

    Ok(())
}
