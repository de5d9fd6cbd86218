//! Migrator: compiles a request against the cached schema and executes it.
//!
//! Requests for the same table are serialized with a per-table lock, since
//! reading the current shape and changing the live schema are not atomic.
//! Requests for different tables proceed concurrently.
//!
//! The migrator never compensates. When an up-sequence fails part way the
//! error carries the down-sequence and the caller decides what to run.

mod request;

pub use request::MigrationRequest;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{Mutex, OnceCell, RwLock};
use tracing::{debug, error, info, warn};

use crate::compiler::{apply_plan, Compiler, MigrationResult};
use crate::config::Config;
use crate::core::schema::TableSpec;
use crate::core::traits::{Dialect, SchemaIntrospector, StatementExecutor};
use crate::drivers::ConnectionImpl;
use crate::error::{MigrateError, Result};
use crate::journal::{self, JournalBackend, JournalRecord, JournalStatus};
use crate::schema_cache::SchemaCache;

/// Executes migration requests against one database.
pub struct Migrator {
    dialect: Arc<dyn Dialect>,
    executor: Arc<dyn StatementExecutor>,
    introspector: Arc<dyn SchemaIntrospector>,
    cache: Arc<RwLock<SchemaCache>>,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    journal: Option<Arc<dyn JournalBackend>>,
    batch: OnceCell<i64>,
}

impl Migrator {
    pub fn new(
        dialect: Arc<dyn Dialect>,
        executor: Arc<dyn StatementExecutor>,
        introspector: Arc<dyn SchemaIntrospector>,
        cache: Arc<RwLock<SchemaCache>>,
    ) -> Self {
        Self {
            dialect,
            executor,
            introspector,
            cache,
            locks: Mutex::new(HashMap::new()),
            journal: None,
            batch: OnceCell::new(),
        }
    }

    /// Record every executed migration in `journal`.
    pub fn with_journal(mut self, journal: Arc<dyn JournalBackend>) -> Self {
        self.journal = Some(journal);
        self
    }

    /// Connect, open the configured journal and load the schema cache.
    pub async fn connect(config: &Config) -> Result<Self> {
        let connection = Arc::new(ConnectionImpl::connect(&config.connection).await?);
        let dialect: Arc<dyn Dialect> = Arc::new(connection.dialect());
        let executor: Arc<dyn StatementExecutor> = connection.clone();
        let introspector: Arc<dyn SchemaIntrospector> = connection;

        let mut migrator = Self::new(
            dialect.clone(),
            executor.clone(),
            introspector,
            Arc::new(RwLock::new(SchemaCache::new())),
        );

        if let Some(journal) = journal::open(config, dialect, executor)? {
            journal.init().await?;
            info!("Journal backend: {}", journal.backend_type());
            migrator = migrator.with_journal(journal);
        }

        migrator.load_schema().await?;
        Ok(migrator)
    }

    /// Rebuild the cache from a bulk introspection.
    pub async fn load_schema(&self) -> Result<usize> {
        let mut cache = self.cache.write().await;
        *cache = SchemaCache::new();
        cache.load(self.introspector.as_ref()).await
    }

    pub fn cache(&self) -> Arc<RwLock<SchemaCache>> {
        self.cache.clone()
    }

    pub fn dialect(&self) -> &dyn Dialect {
        self.dialect.as_ref()
    }

    /// Compile a request without executing it.
    pub async fn plan(&self, request: &MigrationRequest) -> Result<MigrationResult> {
        let current = self.current_table(&request.table).await?;
        Compiler::new(self.dialect.as_ref()).compile(&current, &request.desired(&current))
    }

    /// Compile and execute one request.
    ///
    /// # Errors
    ///
    /// - `ConstraintConflict` when the first statement fails; nothing was
    ///   applied.
    /// - `PartialMigration` when statement k > 0 fails. The cache entry is
    ///   invalidated and a `Failed` record is journaled.
    pub async fn request_migration(&self, request: &MigrationRequest) -> Result<MigrationResult> {
        let lock = self.table_lock(&request.table).await;
        let _guard = lock.lock().await;

        let current = self.current_table(&request.table).await?;
        let result =
            Compiler::new(self.dialect.as_ref()).compile(&current, &request.desired(&current))?;

        if result.up_statements.is_empty() {
            info!("{}: already in the requested shape", request.table);
            return Ok(result);
        }

        let total = result.up_statements.len();
        info!(
            "{}: migrating ({} statement(s), {})",
            request.table,
            total,
            self.dialect.name()
        );
        let started = Instant::now();

        for (index, statement) in result.up_statements.iter().enumerate() {
            let statement_start = Instant::now();
            if let Err(source) = self.executor.execute(&statement.sql).await {
                let elapsed_ms = statement_start.elapsed().as_millis();
                error!(
                    "{}: statement {}/{} failed after {}ms: {} - {}",
                    request.table,
                    index + 1,
                    total,
                    elapsed_ms,
                    statement.sql,
                    source
                );
                let conflict = MigrateError::ConstraintConflict {
                    dialect: self.dialect.name().to_string(),
                    table: request.table.clone(),
                    statement: statement.sql.clone(),
                    elapsed_ms,
                    source,
                };
                if index == 0 {
                    return Err(conflict);
                }

                warn!(
                    "{}: left in an intermediate state after {} of {} statement(s)",
                    request.table, index, total
                );
                self.cache.write().await.invalidate(&request.table);
                if let Err(e) = self
                    .record(&result, request, JournalStatus::Failed)
                    .await
                {
                    warn!("{}: could not journal the failure: {}", request.table, e);
                }
                return Err(MigrateError::PartialMigration {
                    table: request.table.clone(),
                    last_successful: index - 1,
                    applied: index,
                    total,
                    down_statements: result.down_statements.clone(),
                    source: Box::new(conflict),
                });
            }
            debug!(
                "{}: [{}/{}] {}ms {}",
                request.table,
                index + 1,
                total,
                statement_start.elapsed().as_millis(),
                statement.sql
            );
        }

        self.cache
            .write()
            .await
            .upsert_table(apply_plan(&current, &result.up_plan));
        self.record(&result, request, JournalStatus::Applied).await?;

        info!(
            "{}: migrated in {}ms",
            request.table,
            started.elapsed().as_millis()
        );
        Ok(result)
    }

    /// Run several requests. Different tables proceed concurrently; the
    /// same table is serialized in submission order of lock acquisition.
    pub async fn request_migrations(
        &self,
        requests: &[MigrationRequest],
    ) -> Vec<Result<MigrationResult>> {
        futures::future::join_all(requests.iter().map(|r| self.request_migration(r))).await
    }

    /// Current shape from the cache, re-fetching a table the cache does
    /// not know. An unknown table is never treated as dropped.
    async fn current_table(&self, table: &str) -> Result<TableSpec> {
        {
            let cache = self.cache.read().await;
            if let Some(spec) = cache.table(table).known() {
                return Ok(spec.clone());
            }
        }

        warn!("{}: not in the schema cache, re-fetching", table);
        let mut cache = self.cache.write().await;
        cache
            .refresh_table(self.introspector.as_ref(), table)
            .await?;
        cache.table(table).known().cloned().ok_or_else(|| {
            MigrateError::invalid_spec(
                table,
                "table does not exist; only existing tables can be migrated",
            )
        })
    }

    async fn table_lock(&self, table: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(table.to_lowercase())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    async fn record(
        &self,
        result: &MigrationResult,
        request: &MigrationRequest,
        status: JournalStatus,
    ) -> Result<()> {
        let Some(journal) = &self.journal else {
            return Ok(());
        };
        let batch = *self
            .batch
            .get_or_try_init(|| journal.next_batch())
            .await?;
        let description = if request.description.is_empty() {
            request.table.clone()
        } else {
            format!("{}: {}", request.table, request.description)
        };
        let record = JournalRecord::new(result, description, batch, status)?;
        journal.append(&record).await?;
        debug!("{}: journaled {} as {}", request.table, record.id, status);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::schema::ColumnSpec;
    use crate::drivers::DialectImpl;
    use crate::error::DriverError;
    use crate::journal::MemoryJournal;
    use crate::schema_cache::RawRow;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Executes statements in memory, failing the nth call when asked to.
    #[derive(Default)]
    struct MockExecutor {
        executed: Mutex<Vec<String>>,
        fail_at: Option<usize>,
        calls: AtomicUsize,
    }

    impl MockExecutor {
        fn failing_at(index: usize) -> Self {
            Self {
                fail_at: Some(index),
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl StatementExecutor for MockExecutor {
        fn db_type(&self) -> &str {
            "mock"
        }

        async fn execute(&self, sql: &str) -> std::result::Result<u64, DriverError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if Some(call) == self.fail_at {
                return Err("column contains NULL values".into());
            }
            self.executed.lock().await.push(sql.to_string());
            Ok(0)
        }

        async fn query(&self, _sql: &str) -> std::result::Result<Vec<RawRow>, DriverError> {
            Ok(Vec::new())
        }
    }

    /// Serves introspection rows for table `t` only.
    #[derive(Default)]
    struct MockIntrospector {
        table_fetches: AtomicUsize,
    }

    fn raw(value: serde_json::Value) -> RawRow {
        match value {
            serde_json::Value::Object(map) => map,
            _ => RawRow::new(),
        }
    }

    fn rows_for_t() -> Vec<RawRow> {
        vec![
            raw(json!({"tn": "t", "cn": "id", "dt": "int", "nrqd": "NO", "pk_ordinal": 1, "op": 1})),
            raw(json!({"tn": "t", "cn": "name", "dt": "varchar", "clen": 50, "nrqd": "YES", "op": 2})),
            raw(json!({"tn": "t", "cn": "age", "dt": "int", "nrqd": "YES", "op": 3})),
        ]
    }

    #[async_trait]
    impl SchemaIntrospector for MockIntrospector {
        fn db_type(&self) -> &str {
            "mock"
        }

        async fn fetch_rows(&self) -> Result<Vec<RawRow>> {
            Ok(rows_for_t())
        }

        async fn fetch_table_rows(&self, table: &str) -> Result<Vec<RawRow>> {
            self.table_fetches.fetch_add(1, Ordering::SeqCst);
            if table.eq_ignore_ascii_case("t") {
                Ok(rows_for_t())
            } else {
                Ok(Vec::new())
            }
        }
    }

    fn migrator(
        dialect: &str,
        executor: Arc<MockExecutor>,
        introspector: Arc<MockIntrospector>,
    ) -> Migrator {
        Migrator::new(
            Arc::new(DialectImpl::from_db_type(dialect).unwrap()),
            executor,
            introspector,
            Arc::new(RwLock::new(SchemaCache::new())),
        )
    }

    /// `age` becomes NOT NULL with default 0 and `nick` is added.
    fn request() -> MigrationRequest {
        MigrationRequest::new(
            "t",
            vec![
                ColumnSpec::new("id", "int").primary(),
                ColumnSpec::new("name", "varchar").with_length(50),
                ColumnSpec::new("age", "int").not_null().with_default("0"),
                ColumnSpec::new("nick", "varchar").with_length(20),
            ],
        )
        .with_description("tighten age")
    }

    // ===== success path =====

    #[tokio::test]
    async fn test_request_migration_executes_and_updates_cache() {
        let executor = Arc::new(MockExecutor::default());
        let introspector = Arc::new(MockIntrospector::default());
        let journal = Arc::new(MemoryJournal::new());
        let m = migrator("postgres", executor.clone(), introspector.clone())
            .with_journal(journal.clone());
        m.load_schema().await.unwrap();

        let result = m.request_migration(&request()).await.unwrap();
        let executed = executor.executed.lock().await.clone();
        assert_eq!(executed, result.up_sql());
        assert!(executed.iter().any(|s| s.contains("SET NOT NULL")));
        assert_eq!(introspector.table_fetches.load(Ordering::SeqCst), 0);

        let cache = m.cache();
        let cache = cache.read().await;
        let t = cache.table("t").known().unwrap();
        assert!(!t.column("age").unwrap().nullable);
        assert!(t.column("nick").is_some());
        drop(cache);

        let records = journal.records().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, JournalStatus::Applied);
        assert_eq!(records[0].batch, 1);
        assert_eq!(records[0].description, "t: tighten age");

        // The cache now matches the request, so a repeat is a no-op.
        let again = m.request_migration(&request()).await.unwrap();
        assert!(again.is_empty());
        assert_eq!(journal.records().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_table_is_refetched_not_dropped() {
        let executor = Arc::new(MockExecutor::default());
        let introspector = Arc::new(MockIntrospector::default());
        let m = migrator("mysql", executor, introspector.clone());

        let result = m.plan(&request()).await.unwrap();
        assert!(!result.up_statements.is_empty());
        assert!(result.up_sql().iter().all(|s| !s.contains("DROP COLUMN `id`")));
        assert_eq!(introspector.table_fetches.load(Ordering::SeqCst), 1);

        let missing = MigrationRequest::new("ghost", vec![ColumnSpec::new("id", "int")]);
        let err = m.request_migration(&missing).await.unwrap_err();
        assert!(matches!(err, MigrateError::InvalidSpec { .. }));
    }

    #[tokio::test]
    async fn test_plan_does_not_execute() {
        let executor = Arc::new(MockExecutor::default());
        let m = migrator("mssql", executor.clone(), Arc::new(MockIntrospector::default()));
        m.load_schema().await.unwrap();

        let result = m.plan(&request()).await.unwrap();
        assert!(!result.down_statements.is_empty());
        assert!(executor.executed.lock().await.is_empty());
    }

    // ===== failure paths =====

    #[tokio::test]
    async fn test_first_statement_failure_is_constraint_conflict() {
        let executor = Arc::new(MockExecutor::failing_at(0));
        let journal = Arc::new(MemoryJournal::new());
        let m = migrator("postgres", executor, Arc::new(MockIntrospector::default()))
            .with_journal(journal.clone());
        m.load_schema().await.unwrap();

        let err = m.request_migration(&request()).await.unwrap_err();
        match &err {
            MigrateError::ConstraintConflict {
                dialect, statement, ..
            } => {
                assert_eq!(dialect, "postgres");
                assert!(statement.starts_with("ALTER TABLE"));
            }
            other => panic!("expected ConstraintConflict, got {other:?}"),
        }
        assert_eq!(err.exit_code(), 5);
        assert!(journal.records().await.unwrap().is_empty());
        assert!(m.cache().read().await.table("t").known().is_some());
    }

    #[tokio::test]
    async fn test_partial_failure_carries_down_sequence() {
        let executor = Arc::new(MockExecutor::failing_at(1));
        let introspector = Arc::new(MockIntrospector::default());
        let journal = Arc::new(MemoryJournal::new());
        let m = migrator("mssql", executor.clone(), introspector.clone())
            .with_journal(journal.clone());
        m.load_schema().await.unwrap();

        let planned = m.plan(&request()).await.unwrap();
        assert!(planned.up_statements.len() > 1);

        let err = m.request_migration(&request()).await.unwrap_err();
        match &err {
            MigrateError::PartialMigration {
                last_successful,
                applied,
                total,
                down_statements,
                source,
                ..
            } => {
                assert_eq!(*last_successful, 0);
                assert_eq!(*applied, 1);
                assert_eq!(*total, planned.up_statements.len());
                assert_eq!(down_statements, &planned.down_statements);
                assert!(matches!(**source, MigrateError::ConstraintConflict { .. }));
            }
            other => panic!("expected PartialMigration, got {other:?}"),
        }
        assert_eq!(executor.executed.lock().await.len(), 1);

        let records = journal.records().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, JournalStatus::Failed);

        // The invalidated entry is re-fetched on the next request.
        assert!(m.cache().read().await.table("t").known().is_none());
        m.plan(&request()).await.unwrap();
        assert_eq!(introspector.table_fetches.load(Ordering::SeqCst), 1);
    }

    // ===== concurrency =====

    #[tokio::test]
    async fn test_same_table_requests_are_serialized() {
        let executor = Arc::new(MockExecutor::default());
        let m = migrator("mysql", executor.clone(), Arc::new(MockIntrospector::default()));
        m.load_schema().await.unwrap();

        let results = m.request_migrations(&[request(), request()]).await;
        let sizes: Vec<usize> = results
            .into_iter()
            .map(|r| r.unwrap().up_statements.len())
            .collect();

        // Whichever ran second saw the first one's cache update.
        assert!(sizes.contains(&0));
        assert_eq!(executor.executed.lock().await.len(), sizes.iter().sum::<usize>());
    }
}
