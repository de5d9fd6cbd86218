//! File-based journal: a JSON array of records.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{JournalBackend, JournalRecord, JournalStatus};
use crate::error::{MigrateError, Result};

/// Journal stored as pretty-printed JSON on disk.
///
/// Every write rewrites the whole file: write to a temp file, then rename.
pub struct FileJournal {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileJournal {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<Vec<JournalRecord>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) if content.trim().is_empty() => Ok(Vec::new()),
            Ok(content) => serde_json::from_str(&content).map_err(|e| {
                MigrateError::Journal(format!(
                    "Failed to parse journal {}: {}",
                    self.path.display(),
                    e
                ))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, records: &[JournalRecord]) -> Result<()> {
        let content = serde_json::to_string_pretty(records)?;

        // Atomic write: write to temp file, then rename
        let temp_path = self.path.with_extension("tmp");
        tokio::fs::write(&temp_path, &content).await?;
        tokio::fs::rename(&temp_path, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl JournalBackend for FileJournal {
    async fn init(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        Ok(())
    }

    async fn append(&self, record: &JournalRecord) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut records = self.load().await?;
        records.push(record.clone());
        self.save(&records).await
    }

    async fn set_status(&self, id: Uuid, status: JournalStatus) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut records = self.load().await?;
        let record = records
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| MigrateError::Journal(format!("No journal record {}", id)))?;
        record.status = status;
        record.updated = Utc::now();
        self.save(&records).await
    }

    async fn records(&self) -> Result<Vec<JournalRecord>> {
        let _guard = self.lock.lock().await;
        self.load().await
    }

    fn backend_type(&self) -> &'static str {
        "file"
    }
}
