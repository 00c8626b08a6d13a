//! # Backup Sink
//!
//! Writes uploaded [`FileRecord`]s into the backup directory.
//!
//! Record names come from the client and are reduced to their final path
//! component before use, so a name like `../../etc/passwd` lands as
//! `passwd` inside the backup directory. Both `/` and `\` count as
//! separators. Existing files with the same name are overwritten.
//!
//! A batch is not atomic: every record is attempted, and a failure on one
//! does not stop the rest.

use anyhow::{Context, Result};
use log::{info, warn};
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::common::payload::{BackupBatch, FileRecord};

/// Per-batch outcome counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BackupReport {
    pub written: usize,
    pub failed: usize,
}

impl BackupReport {
    /// A batch fails only when it had records and none of them were written.
    pub fn is_success(&self) -> bool {
        self.written > 0 || self.failed == 0
    }
}

pub struct BackupSink {
    dir: PathBuf,
}

impl BackupSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write every record of `batch`, sequentially.
    pub async fn store(&self, batch: BackupBatch) -> BackupReport {
        let mut report = BackupReport::default();

        if batch.is_empty() {
            return report;
        }

        if let Err(e) = fs::create_dir_all(&self.dir).await {
            warn!(
                "⚠️  Cannot create backup directory {}: {}",
                self.dir.display(),
                e
            );
            report.failed = batch.len();
            return report;
        }

        for record in batch.into_files() {
            match self.write_record(&record).await {
                Ok(path) => {
                    info!("💾 Stored backup {} ({} bytes)", path.display(), record.content.len());
                    report.written += 1;
                }
                Err(e) => {
                    warn!("⚠️  Skipped backup record {:?}: {:#}", record.name, e);
                    report.failed += 1;
                }
            }
        }

        report
    }

    async fn write_record(&self, record: &FileRecord) -> Result<PathBuf> {
        let name = sanitize_file_name(&record.name)
            .with_context(|| format!("no usable file name in {:?}", record.name))?;
        let path = self.dir.join(name);

        fs::write(&path, &record.content)
            .await
            .with_context(|| format!("writing {}", path.display()))?;

        Ok(path)
    }
}

/// Final path component of `declared`, or `None` when nothing safe remains.
pub fn sanitize_file_name(declared: &str) -> Option<&str> {
    let base = declared.rsplit(|c: char| c == '/' || c == '\\').next().unwrap_or_default();

    match base {
        "" | "." | ".." => None,
        name if name.contains('\0') => None,
        name => Some(name),
    }
}
