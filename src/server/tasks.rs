//! # Task Store
//!
//! Holds the single current [`TaskList`] and its backing file.
//!
//! The value is only ever replaced wholesale. [`TaskStore::replace`] persists
//! the new list before swapping it in and hands the write guard back to the
//! caller, so the broadcast of the new value happens while no other
//! replacement (and no new connection's initial push) can interleave.

use anyhow::{Context, Result};
use log::info;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::persist::write_atomic;
use crate::common::payload::TaskList;

pub struct TaskStore {
    path: PathBuf,
    current: RwLock<TaskList>,
}

impl TaskStore {
    /// Load the tasks file; a missing file yields an empty list.
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let current = match tokio::fs::read(&path).await {
            Ok(bytes) => TaskList::from_bytes(&bytes)
                .with_context(|| format!("parsing tasks file {}", path.display()))?,
            Err(e) if e.kind() == ErrorKind::NotFound => TaskList::default(),
            Err(e) => {
                return Err(e).with_context(|| format!("reading tasks file {}", path.display()))
            }
        };

        info!("📋 Loaded {} tasks from {}", current.len(), path.display());

        Ok(Self {
            path,
            current: RwLock::new(current),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Shared access to the current list. Replacements wait until the guard drops.
    pub async fn read(&self) -> RwLockReadGuard<'_, TaskList> {
        self.current.read().await
    }

    /// Copy of the current list.
    pub async fn snapshot(&self) -> TaskList {
        self.current.read().await.clone()
    }

    /// Persist `list` and make it the current value.
    ///
    /// On a persistence failure the in-memory value is left untouched and the
    /// error is returned. On success the returned guard still holds exclusive
    /// access to the new value.
    pub async fn replace(&self, list: TaskList) -> Result<RwLockWriteGuard<'_, TaskList>> {
        let bytes = list.to_bytes()?;
        let mut current = self.current.write().await;

        write_atomic(&self.path, &bytes).await?;
        *current = list;

        Ok(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> TaskList {
        TaskList::new(vec![json!({"title": "write tests", "done": false}), json!("x")])
    }

    #[tokio::test]
    async fn test_missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = TaskStore::load(dir.path().join("Tasks.json")).await.unwrap();

        assert!(store.snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn test_replace_persists_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Tasks.json");
        let store = TaskStore::load(&path).await.unwrap();

        drop(store.replace(sample()).await.unwrap());
        assert_eq!(store.snapshot().await, sample());

        let on_disk = TaskList::from_bytes(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(on_disk, sample());

        let reloaded = TaskStore::load(&path).await.unwrap();
        assert_eq!(reloaded.snapshot().await, sample());
    }

    #[tokio::test]
    async fn test_failed_persist_keeps_old_value() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Tasks.json");
        let store = TaskStore::load(&path).await.unwrap();

        // A non-empty directory where the file should be makes the write fail
        std::fs::create_dir(&path).unwrap();
        std::fs::write(path.join("blocker"), b"x").unwrap();

        assert!(store.replace(sample()).await.is_err());
        assert!(store.snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Tasks.json");
        std::fs::write(&path, b"{\"not\":\"a list\"}").unwrap();

        assert!(TaskStore::load(&path).await.is_err());
    }
}
