//! SQLite Execution Engine
//!
//! `Database` is an explicit handle owned by the caller; there is no global
//! connection. Every query opens its own read-only connection on a blocking
//! worker, so concurrent reads never wait on each other, and a timeout
//! interrupts statements that run too long.

use crate::error::{ExplorerError, Result};
use crate::execution::engine::QueryExecutor;
use crate::execution::result::ResultSet;
use crate::gate::FinalStatement;
use async_trait::async_trait;
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

pub const DEFAULT_EXECUTION_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_MAX_ROWS: usize = 10_000;

#[derive(Debug, Clone)]
pub struct Database {
    path: PathBuf,
    timeout: Duration,
    max_rows: usize,
}

impl Database {
    /// Handle to an existing database file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if !path.is_file() {
            return Err(ExplorerError::Database(format!(
                "database file does not exist: {}",
                path.display()
            )));
        }
        Ok(Self::at(path))
    }

    /// Creates the database file if needed and switches it to WAL so readers
    /// and the importer do not block each other.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(&path).map_err(ExplorerError::database)?;
        let mode: String = conn
            .query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))
            .map_err(ExplorerError::database)?;
        debug!(journal_mode = %mode, "database ready");

        Ok(Self::at(path))
    }

    fn at(path: PathBuf) -> Self {
        Self {
            path,
            timeout: DEFAULT_EXECUTION_TIMEOUT,
            max_rows: DEFAULT_MAX_ROWS,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_rows(mut self, max_rows: usize) -> Self {
        self.max_rows = max_rows;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn max_rows(&self) -> usize {
        self.max_rows
    }

    fn connect(&self, writable: bool) -> rusqlite::Result<Connection> {
        let flags = if writable {
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX
        } else {
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX
        };
        let conn = Connection::open_with_flags(&self.path, flags)?;
        conn.busy_timeout(self.timeout)?;
        Ok(conn)
    }

    /// Runs `f` against a fresh connection on a blocking worker. Used by the
    /// schema introspector (read-only) and the CSV importer (writable); the
    /// gated query path goes through [`QueryExecutor::run`] instead.
    pub(crate) async fn with_connection<F, T>(&self, writable: bool, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let handle = self.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = handle.connect(writable).map_err(ExplorerError::database)?;
            f(&mut conn)
        })
        .await
        .map_err(|e| ExplorerError::Database(format!("database worker failed: {}", e)))?
    }
}

#[async_trait]
impl QueryExecutor for Database {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    async fn run(&self, stmt: &FinalStatement) -> Result<ResultSet> {
        let start_time = Instant::now();
        let sql = stmt.as_str().to_string();
        let handle = self.clone();
        let cancelled = Arc::new(AtomicBool::new(false));
        let worker_cancelled = Arc::clone(&cancelled);
        let (interrupt_tx, interrupt_rx) = oneshot::channel();

        debug!(engine = self.name(), sql = %sql, "executing accepted statement");
        let worker = tokio::task::spawn_blocking(move || {
            let conn = handle.connect(false).map_err(ExplorerError::execution)?;
            let _ = interrupt_tx.send(conn.get_interrupt_handle());
            if worker_cancelled.load(Ordering::SeqCst) {
                return Err(ExplorerError::Timeout(handle.timeout));
            }
            materialize(&conn, &sql, handle.max_rows)
        });

        match tokio::time::timeout(self.timeout, worker).await {
            Ok(Ok(result)) => {
                if let Ok(rows) = &result {
                    info!(
                        rows = rows.row_count(),
                        truncated = rows.truncated,
                        elapsed_ms = start_time.elapsed().as_millis() as u64,
                        "query completed"
                    );
                }
                result
            }
            Ok(Err(join_err)) => Err(ExplorerError::Execution(format!(
                "query worker failed: {}",
                join_err
            ))),
            Err(_) => {
                cancelled.store(true, Ordering::SeqCst);
                // the worker may still be opening its connection
                if let Ok(interrupt) = interrupt_rx.await {
                    interrupt.interrupt();
                }
                warn!(timeout = ?self.timeout, "query timed out, interrupting");
                Err(ExplorerError::Timeout(self.timeout))
            }
        }
    }
}

fn materialize(conn: &Connection, sql: &str, max_rows: usize) -> Result<ResultSet> {
    let mut stmt = conn.prepare(sql).map_err(ExplorerError::execution)?;
    if !stmt.readonly() {
        return Err(ExplorerError::Execution(
            "statement would modify the database".to_string(),
        ));
    }

    let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    let mut rows = stmt.query([]).map_err(ExplorerError::execution)?;

    let mut out = Vec::new();
    let mut truncated = false;
    while let Some(row) = rows.next().map_err(ExplorerError::execution)? {
        if out.len() >= max_rows {
            truncated = true;
            break;
        }
        let mut values = Vec::with_capacity(columns.len());
        for idx in 0..columns.len() {
            values.push(value_to_json(row.get_ref(idx).map_err(ExplorerError::execution)?));
        }
        out.push(values);
    }

    Ok(ResultSet::new(columns, out, truncated))
}

fn value_to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Number(i.into()),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ValueRef::Text(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Value::String(format!("<blob {} bytes>", bytes.len())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::{ExtractedStatement, QueryGate};

    #[test]
    fn test_value_to_json() {
        assert_eq!(value_to_json(ValueRef::Null), Value::Null);
        assert_eq!(value_to_json(ValueRef::Integer(42)), serde_json::json!(42));
        assert_eq!(value_to_json(ValueRef::Real(1.5)), serde_json::json!(1.5));
        assert_eq!(value_to_json(ValueRef::Real(f64::NAN)), Value::Null);
        assert_eq!(value_to_json(ValueRef::Text(b"hi")), serde_json::json!("hi"));
        assert_eq!(value_to_json(ValueRef::Blob(&[1, 2, 3])), serde_json::json!("<blob 3 bytes>"));
    }

    #[test]
    fn test_open_missing_database_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = Database::open(dir.path().join("missing.db")).unwrap_err();
        assert!(matches!(err, ExplorerError::Database(_)));
    }

    #[tokio::test]
    async fn test_connection_failure_inside_worker_is_execution_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gone.db");
        let db = Database::create(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        let stmt = QueryGate::default()
            .evaluate(ExtractedStatement::new("SELECT 1"), None)
            .decision
            .into_result()
            .unwrap();
        let err = db.run(&stmt).await.unwrap_err();
        match err {
            ExplorerError::Execution(message) => assert!(!message.contains("gone.db")),
            other => panic!("expected an execution error, got {:?}", other),
        }
    }

    #[test]
    fn test_materialize_caps_rows() {
        let conn = Connection::open_in_memory().unwrap();
        let rs = materialize(
            &conn,
            "SELECT value FROM (SELECT 1 AS value UNION ALL SELECT 2 UNION ALL SELECT 3)",
            2,
        )
        .unwrap();
        assert_eq!(rs.row_count(), 2);
        assert!(rs.truncated);
    }

    #[test]
    fn test_materialize_refuses_writes() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (x INTEGER)").unwrap();
        let err = materialize(&conn, "DELETE FROM t", 10).unwrap_err();
        assert!(matches!(err, ExplorerError::Execution(_)));
    }
}
