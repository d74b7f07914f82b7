//! SQLite relational store

use crate::schema::bootstrap_statements;
use crate::RelationalStore;
use async_trait::async_trait;
use lumen_core::{Cell, Dataset, LumenError, LumenResult, MutationAck, StorageError};
use rusqlite::types::ValueRef;
use rusqlite::{Connection, InterruptHandle};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// SQLite-backed [`RelationalStore`]. Statements run on the blocking pool;
/// the connection stays in autocommit mode.
///
/// Dropping an in-flight call (for instance when a deadline expires)
/// interrupts the running statement, so a timed-out mutation is rolled back
/// instead of committing later. A call dropped before its statement started
/// never runs it.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    interrupt: Arc<InterruptHandle>,
}

/// Cancels the blocking call it was armed for unless disarmed first.
struct CancelOnDrop {
    interrupt: Arc<InterruptHandle>,
    cancelled: Arc<AtomicBool>,
    armed: bool,
}

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        if self.armed {
            self.cancelled.store(true, Ordering::SeqCst);
            self.interrupt.interrupt();
            tracing::debug!("SQLite call abandoned; statement interrupted");
        }
    }
}

impl SqliteStore {
    /// Open (or create) a database file and make sure the schema exists.
    pub fn open(path: impl AsRef<Path>) -> LumenResult<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path).map_err(|e| {
            LumenError::Storage(StorageError::Unavailable {
                reason: format!("cannot open {}: {}", path.display(), e),
            })
        })?;
        Self::from_connection(conn)
    }

    /// In-memory database with the schema created.
    pub fn in_memory() -> LumenResult<Self> {
        let conn = Connection::open_in_memory().map_err(|e| {
            LumenError::Storage(StorageError::Unavailable {
                reason: e.to_string(),
            })
        })?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> LumenResult<Self> {
        let store = Self {
            interrupt: Arc::new(conn.get_interrupt_handle()),
            conn: Arc::new(Mutex::new(conn)),
        };
        store.bootstrap_schema()?;
        Ok(store)
    }

    /// Create the contacts and companies tables when absent.
    pub fn bootstrap_schema(&self) -> LumenResult<()> {
        let conn = self.conn.lock().map_err(|_| StorageError::LockPoisoned)?;
        for ddl in bootstrap_statements() {
            conn.execute(&ddl, []).map_err(statement_failed)?;
        }
        Ok(())
    }

    async fn with_connection<T, F>(&self, f: F) -> LumenResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> LumenResult<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        let cancelled = Arc::new(AtomicBool::new(false));
        let mut cancel = CancelOnDrop {
            interrupt: Arc::clone(&self.interrupt),
            cancelled: Arc::clone(&cancelled),
            armed: true,
        };
        let joined = tokio::task::spawn_blocking(move || {
            let guard = conn.lock().map_err(|_| StorageError::LockPoisoned)?;
            if cancelled.load(Ordering::SeqCst) {
                return Err(LumenError::Storage(StorageError::StatementFailed {
                    reason: "cancelled before execution".to_string(),
                }));
            }
            f(&guard)
        })
        .await;
        cancel.armed = false;
        joined.map_err(|e| {
            LumenError::Storage(StorageError::Unavailable {
                reason: format!("sqlite worker failed: {}", e),
            })
        })?
    }
}

#[async_trait]
impl RelationalStore for SqliteStore {
    async fn execute(&self, statement: &str) -> LumenResult<MutationAck> {
        let sql = statement.to_string();
        self.with_connection(move |conn| {
            let rows = conn.execute(&sql, []).map_err(statement_failed)?;
            Ok(MutationAck {
                rows_affected: rows as u64,
            })
        })
        .await
    }

    async fn query(&self, statement: &str) -> LumenResult<Dataset> {
        let sql = statement.to_string();
        self.with_connection(move |conn| {
            let mut stmt = conn.prepare(&sql).map_err(statement_failed)?;
            let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();
            let width = columns.len();

            let mut rows = stmt.query([]).map_err(statement_failed)?;
            let mut out = Vec::new();
            while let Some(row) = rows.next().map_err(statement_failed)? {
                let mut cells = Vec::with_capacity(width);
                for idx in 0..width {
                    let value = row.get_ref(idx).map_err(statement_failed)?;
                    cells.push(to_cell(value));
                }
                out.push(cells);
            }
            Ok(Dataset::new(columns, out))
        })
        .await
    }

    async fn ping(&self) -> LumenResult<()> {
        self.with_connection(|conn| {
            conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
                .map(|_| ())
                .map_err(|e| {
                    LumenError::Storage(StorageError::Unavailable {
                        reason: e.to_string(),
                    })
                })
        })
        .await
    }
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore").finish_non_exhaustive()
    }
}

fn to_cell(value: ValueRef<'_>) -> Cell {
    match value {
        ValueRef::Null => Cell::Null,
        ValueRef::Integer(i) => Cell::Integer(i),
        ValueRef::Real(r) => Cell::Real(r),
        ValueRef::Text(t) => Cell::Text(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Cell::Blob(b.to_vec()),
    }
}

fn statement_failed(e: rusqlite::Error) -> LumenError {
    LumenError::Storage(StorageError::StatementFailed {
        reason: e.to_string(),
    })
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_schema_bootstrapped() {
        let store = SqliteStore::in_memory().unwrap();
        let ds = store
            .query("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
            .await
            .unwrap();
        let names: Vec<_> = ds.rows.iter().map(|r| r[0].to_string()).collect();
        assert_eq!(names, vec!["companies", "contacts"]);
    }

    #[tokio::test]
    async fn test_bootstrap_is_idempotent() {
        let store = SqliteStore::in_memory().unwrap();
        store.bootstrap_schema().unwrap();
    }

    #[tokio::test]
    async fn test_insert_then_query_round_trip() {
        let store = SqliteStore::in_memory().unwrap();
        let ack = store
            .execute("INSERT INTO companies (Société) VALUES ('Acme')")
            .await
            .unwrap();
        assert_eq!(ack.rows_affected, 1);

        let ds = store
            .query("SELECT * FROM companies WHERE LOWER(Société) = 'acme'")
            .await
            .unwrap();
        assert_eq!(ds.columns, vec!["Société".to_string()]);
        assert_eq!(ds.rows, vec![vec![Cell::from("Acme")]]);
    }

    #[tokio::test]
    async fn test_query_maps_value_types() {
        let store = SqliteStore::in_memory().unwrap();
        let ds = store
            .query("SELECT 1 AS i, 2.5 AS r, 'x' AS t, NULL AS n, X'0102' AS b")
            .await
            .unwrap();
        assert_eq!(
            ds.rows[0],
            vec![
                Cell::Integer(1),
                Cell::Real(2.5),
                Cell::from("x"),
                Cell::Null,
                Cell::Blob(vec![1, 2]),
            ]
        );
    }

    #[tokio::test]
    async fn test_bad_statement_is_statement_failure() {
        let store = SqliteStore::in_memory().unwrap();
        let err = store.query("SELECT * FROM nowhere").await.unwrap_err();
        match err {
            LumenError::Storage(StorageError::StatementFailed { reason }) => {
                assert!(reason.contains("nowhere"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_ping_answers() {
        let store = SqliteStore::in_memory().unwrap();
        store.ping().await.unwrap();
    }

    #[tokio::test]
    async fn test_abandoned_mutation_is_rolled_back() {
        let store = SqliteStore::in_memory().unwrap();
        let heavy = "INSERT INTO companies (Société) \
                     WITH RECURSIVE n(i) AS (SELECT 1 UNION ALL SELECT i + 1 FROM n WHERE i < 5000000) \
                     SELECT 'S' || i FROM n";
        let outcome = tokio::time::timeout(
            std::time::Duration::from_millis(5),
            store.execute(heavy),
        )
        .await;
        assert!(outcome.is_err(), "mutation should still be running");

        let ds = store.query("SELECT COUNT(*) FROM companies").await.unwrap();
        assert_eq!(ds.rows, vec![vec![Cell::Integer(0)]]);
    }

    #[tokio::test]
    async fn test_on_disk_store_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clients.db");
        {
            let store = SqliteStore::open(&path).unwrap();
            store
                .execute("INSERT INTO contacts (Nom, Prénom) VALUES ('Durand', 'Marie')")
                .await
                .unwrap();
        }
        let reopened = SqliteStore::open(&path).unwrap();
        let ds = reopened.query("SELECT Nom FROM contacts").await.unwrap();
        assert_eq!(ds.len(), 1);
    }
}
