//! # Configuration Utilities
//!
//! TOML configuration for the task server. Every field has a default, so an
//! empty file (or no file at all) yields a server listening on port 1708 with
//! its data files in the working directory.
//!
//! ## Example TOML
//!
//! ```toml
//! [server]
//! address = "0.0.0.0:1708"
//!
//! [storage]
//! tasks_file = "Tasks.json"
//! users_file = "users.json"
//! backup_dir = "BackupFiles"
//!
//! [limits]
//! max_frame_bytes = 67108864
//! max_batch_files = 256
//! outbound_queue = 1024
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

use super::connection::DEFAULT_MAX_FRAME_BYTES;

/// Load a TOML configuration file and deserialize it into the specified type.
///
/// # Example
/// ```ignore
/// let config: ServerConfig = load_config("config/server.toml")?;
/// ```
pub fn load_config<T>(path: &str) -> Result<T>
where
    T: for<'de> Deserialize<'de>,
{
    let content =
        fs::read_to_string(path).with_context(|| format!("reading config file {}", path))?;
    let config: T =
        toml::from_str(&content).with_context(|| format!("parsing config file {}", path))?;
    Ok(config)
}

/// Complete server configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub server: ListenConfig,
    pub storage: StorageConfig,
    pub limits: LimitsConfig,
}

/// Where the server listens.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenConfig {
    /// Network address to bind (e.g., "0.0.0.0:1708")
    pub address: String,
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            address: "0.0.0.0:1708".to_string(),
        }
    }
}

/// On-disk locations of the persisted state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Whole-document JSON file holding the current task list
    pub tasks_file: PathBuf,
    /// JSON file holding the credential list
    pub users_file: PathBuf,
    /// Directory receiving uploaded backup files
    pub backup_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            tasks_file: PathBuf::from("Tasks.json"),
            users_file: PathBuf::from("users.json"),
            backup_dir: PathBuf::from("BackupFiles"),
        }
    }
}

/// Per-connection resource bounds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Largest accepted frame body; bigger frames close the connection
    pub max_frame_bytes: usize,
    /// Largest accepted number of records in one backup batch
    pub max_batch_files: usize,
    /// Messages a connection may have waiting to be written before it is dropped
    pub outbound_queue: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
            max_batch_files: 256,
            outbound_queue: 1024,
        }
    }
}

impl ServerConfig {
    /// Configuration rooted in `dir`: all data files live inside it.
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        Self {
            server: ListenConfig::default(),
            storage: StorageConfig {
                tasks_file: dir.join("Tasks.json"),
                users_file: dir.join("users.json"),
                backup_dir: dir.join("BackupFiles"),
            },
            limits: LimitsConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_empty_file_uses_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file).unwrap();

        let config: ServerConfig = load_config(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.server.address, "0.0.0.0:1708");
        assert_eq!(config.storage.tasks_file, PathBuf::from("Tasks.json"));
        assert_eq!(config.limits.max_batch_files, 256);
        assert_eq!(config.limits.outbound_queue, 1024);
    }

    #[test]
    fn test_partial_override() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[server]\naddress = \"127.0.0.1:9000\"\n").unwrap();
        writeln!(file, "[limits]\nmax_batch_files = 3").unwrap();

        let config: ServerConfig = load_config(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.server.address, "127.0.0.1:9000");
        assert_eq!(config.limits.max_batch_files, 3);
        assert_eq!(config.limits.max_frame_bytes, DEFAULT_MAX_FRAME_BYTES);
        assert_eq!(config.storage.backup_dir, PathBuf::from("BackupFiles"));
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let result: Result<ServerConfig> = load_config("/definitely/not/here.toml");
        assert!(result.is_err());
    }
}
