//! Migration journal: the persisted record of applied up/down pairs.
//!
//! The [`JournalBackend`] trait defines how records are stored:
//!
//! - [`FileJournal`]: JSON array on disk
//! - [`SqlJournal`]: table in the migrated database
//! - [`MemoryJournal`]: in-process, for tests and dry runs
//!
//! The migrator works with `Arc<dyn JournalBackend>` without knowing the
//! concrete type.

mod file;
mod sql;

pub use file::FileJournal;
pub use sql::SqlJournal;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::compiler::MigrationResult;
use crate::config::{Config, JournalBackendKind};
use crate::core::schema::TableRef;
use crate::core::traits::{Dialect, StatementExecutor};
use crate::error::{MigrateError, Result};

/// Journal record status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JournalStatus {
    Pending,
    Applied,
    Failed,
}

impl JournalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JournalStatus::Pending => "pending",
            JournalStatus::Applied => "applied",
            JournalStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Ok(JournalStatus::Pending),
            "applied" => Ok(JournalStatus::Applied),
            "failed" => Ok(JournalStatus::Failed),
            _ => Err(MigrateError::Journal(format!("Invalid journal status: {}", s))),
        }
    }
}

impl fmt::Display for JournalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One migration as persisted by a journal backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalRecord {
    pub id: Uuid,

    /// Up statements, serialized as a JSON array of SQL strings.
    pub title: String,

    /// Down statements, serialized the same way.
    pub title_down: String,

    pub description: String,

    /// Grouping id shared by records written in one run.
    pub batch: i64,

    /// Hex SHA-256 over `title + "\n" + title_down`.
    pub checksum: String,

    pub status: JournalStatus,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

impl JournalRecord {
    /// Build a record for a compiled migration.
    pub fn new(
        result: &MigrationResult,
        description: impl Into<String>,
        batch: i64,
        status: JournalStatus,
    ) -> Result<Self> {
        let title = serde_json::to_string(&result.up_sql())?;
        let title_down = serde_json::to_string(&result.down_sql())?;
        let checksum = checksum(&title, &title_down);
        let now = Utc::now();
        Ok(Self {
            id: Uuid::new_v4(),
            title,
            title_down,
            description: description.into(),
            batch,
            checksum,
            status,
            created: now,
            updated: now,
        })
    }

    /// Up statements decoded from `title`.
    pub fn up_statements(&self) -> Result<Vec<String>> {
        Ok(serde_json::from_str(&self.title)?)
    }

    /// Down statements decoded from `title_down`.
    pub fn down_statements(&self) -> Result<Vec<String>> {
        Ok(serde_json::from_str(&self.title_down)?)
    }

    /// Whether the stored checksum still matches the statements.
    pub fn verify_checksum(&self) -> bool {
        checksum(&self.title, &self.title_down) == self.checksum
    }
}

fn checksum(title: &str, title_down: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(title.as_bytes());
    hasher.update(b"\n");
    hasher.update(title_down.as_bytes());
    hex::encode(hasher.finalize())
}

/// Storage for journal records.
///
/// Implementations must be `Send + Sync`; the migrator shares one backend
/// across concurrent requests for different tables.
#[async_trait]
pub trait JournalBackend: Send + Sync {
    /// Create whatever storage the backend needs. Idempotent.
    async fn init(&self) -> Result<()> {
        Ok(())
    }

    /// Persist a new record.
    async fn append(&self, record: &JournalRecord) -> Result<()>;

    /// Change the status of an existing record and bump `updated`.
    async fn set_status(&self, id: Uuid, status: JournalStatus) -> Result<()>;

    /// All records, oldest first.
    async fn records(&self) -> Result<Vec<JournalRecord>>;

    /// One past the highest batch recorded so far, starting at 1.
    async fn next_batch(&self) -> Result<i64> {
        let max = self.records().await?.iter().map(|r| r.batch).max();
        Ok(max.unwrap_or(0) + 1)
    }

    /// Get the backend type name for logging.
    fn backend_type(&self) -> &'static str;
}

/// Records held in process memory.
#[derive(Default)]
pub struct MemoryJournal {
    records: Mutex<Vec<JournalRecord>>,
}

impl MemoryJournal {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JournalBackend for MemoryJournal {
    async fn append(&self, record: &JournalRecord) -> Result<()> {
        self.records.lock().await.push(record.clone());
        Ok(())
    }

    async fn set_status(&self, id: Uuid, status: JournalStatus) -> Result<()> {
        let mut records = self.records.lock().await;
        let record = records
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| MigrateError::Journal(format!("No journal record {}", id)))?;
        record.status = status;
        record.updated = Utc::now();
        Ok(())
    }

    async fn records(&self) -> Result<Vec<JournalRecord>> {
        Ok(self.records.lock().await.clone())
    }

    fn backend_type(&self) -> &'static str {
        "memory"
    }
}

/// Open the journal described by the configuration, or `None` when the
/// backend is `none`. The database backend writes through `executor`.
pub fn open(
    config: &Config,
    dialect: Arc<dyn Dialect>,
    executor: Arc<dyn StatementExecutor>,
) -> Result<Option<Arc<dyn JournalBackend>>> {
    let journal = &config.journal;
    match journal.backend {
        JournalBackendKind::None => Ok(None),
        JournalBackendKind::File => {
            let path = journal.path.clone().ok_or_else(|| {
                MigrateError::Config("journal.path is required when journal.backend is 'file'".into())
            })?;
            Ok(Some(Arc::new(FileJournal::new(path))))
        }
        JournalBackendKind::Database => {
            let table = TableRef::new(
                Some(config.connection.effective_schema()),
                journal.table.clone(),
            );
            Ok(Some(Arc::new(SqlJournal::new(dialect, executor, table))))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::Statement;

    fn result() -> MigrationResult {
        MigrationResult {
            up_statements: vec![Statement::new("ALTER TABLE `t` ADD COLUMN `x` int NULL")],
            down_statements: vec![Statement::new("ALTER TABLE `t` DROP COLUMN `x`")],
            ..Default::default()
        }
    }

    #[test]
    fn test_record_serializes_statements_as_json_arrays() {
        let record = JournalRecord::new(&result(), "add x", 3, JournalStatus::Applied).unwrap();
        assert_eq!(record.title, r#"["ALTER TABLE `t` ADD COLUMN `x` int NULL"]"#);
        assert_eq!(
            record.down_statements().unwrap(),
            vec!["ALTER TABLE `t` DROP COLUMN `x`".to_string()]
        );
        assert_eq!(record.batch, 3);
        assert_eq!(record.created, record.updated);
    }

    #[test]
    fn test_checksum_covers_both_directions() {
        let mut record = JournalRecord::new(&result(), "", 1, JournalStatus::Pending).unwrap();
        assert_eq!(record.checksum.len(), 64);
        assert!(record.verify_checksum());

        record.title_down = "[]".to_string();
        assert!(!record.verify_checksum());
    }

    #[test]
    fn test_status_parse() {
        assert_eq!(JournalStatus::parse("APPLIED").unwrap(), JournalStatus::Applied);
        assert_eq!(JournalStatus::Failed.to_string(), "failed");
        assert!(JournalStatus::parse("done").is_err());
    }

    // ===== MemoryJournal =====

    #[tokio::test]
    async fn test_memory_journal_batches_and_status() {
        let journal = MemoryJournal::new();
        assert_eq!(journal.next_batch().await.unwrap(), 1);

        let record = JournalRecord::new(&result(), "", 1, JournalStatus::Pending).unwrap();
        journal.append(&record).await.unwrap();
        assert_eq!(journal.next_batch().await.unwrap(), 2);

        journal.set_status(record.id, JournalStatus::Applied).await.unwrap();
        let records = journal.records().await.unwrap();
        assert_eq!(records[0].status, JournalStatus::Applied);
        assert!(records[0].updated >= records[0].created);

        assert!(journal
            .set_status(Uuid::new_v4(), JournalStatus::Failed)
            .await
            .is_err());
    }
}
