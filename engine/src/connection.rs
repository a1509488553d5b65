//! Connection - an active session against a database file.
//!
//! A connection owns its backing database (local mode) or borrows one from
//! a replica pair. All operations are synchronous from the caller's
//! perspective; the kernel's async I/O runs on the shared runtime.

use crate::encode::{CellValue, ResultSet};
use crate::error::{Error, Result};
use crate::runtime::runtime;
use crate::transaction::{Behavior, Transaction};
use libsql::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// How a local database file is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OpenMode {
    /// Read-write, creating the file when missing (engine default)
    #[default]
    ReadWriteCreate,
    /// Read-only; fails when the file is missing
    ReadOnly,
    /// Read-write; fails when the file is missing
    ReadWrite,
}

impl OpenMode {
    /// Parse a boundary flags string. Unrecognized or absent flags fall
    /// back to the read-write-create default.
    pub fn parse(flags: Option<&str>) -> Self {
        match flags {
            Some("FERRITE_OPEN_READONLY") => OpenMode::ReadOnly,
            Some("FERRITE_OPEN_READWRITE") => OpenMode::ReadWrite,
            _ => OpenMode::ReadWriteCreate,
        }
    }

    fn to_flags(self) -> libsql::OpenFlags {
        match self {
            OpenMode::ReadWriteCreate => libsql::OpenFlags::default(),
            OpenMode::ReadOnly => libsql::OpenFlags::SQLITE_OPEN_READ_ONLY,
            OpenMode::ReadWrite => libsql::OpenFlags::SQLITE_OPEN_READ_WRITE,
        }
    }
}

/// An active session against a database.
///
/// At most one transaction may be open per connection; `begin` enforces
/// this through the transaction latch shared with the [`Transaction`] it
/// hands out.
pub struct Connection {
    inner: libsql::Connection,
    /// Keeps the backing database alive for local connections. `None`
    /// when the database is owned by a replica pair.
    _db: Option<libsql::Database>,
    latch: Arc<AtomicBool>,
}

impl Connection {
    /// Open or create a local database file.
    ///
    /// A non-empty `encryption_key` enables AES-256-CBC at-rest
    /// encryption; `None` or an empty key opens the file unencrypted.
    pub fn open_local(path: &str, mode: OpenMode, encryption_key: Option<&str>) -> Result<Self> {
        let encryption_config = match encryption_key {
            Some(key) if !key.is_empty() => Some(libsql::EncryptionConfig::new(
                libsql::Cipher::Aes256Cbc,
                key.as_bytes().to_vec().into(),
            )),
            _ => None,
        };

        let db = runtime()
            .block_on(async {
                let mut builder = libsql::Builder::new_local(path).flags(mode.to_flags());
                if let Some(config) = encryption_config {
                    builder = builder.encryption_config(config);
                }
                builder.build().await
            })
            .map_err(|e| Error::Open(e.to_string()))?;

        let conn = db.connect().map_err(|e| Error::Open(e.to_string()))?;
        tracing::debug!(path, ?mode, "opened local database");

        Ok(Self::from_parts(conn, Some(db)))
    }

    pub(crate) fn from_parts(inner: libsql::Connection, db: Option<libsql::Database>) -> Self {
        Self {
            inner,
            _db: db,
            latch: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Execute a read statement and materialize every row.
    pub fn query(&self, sql: &str, params: Vec<Value>) -> Result<ResultSet> {
        run_query(&self.inner, sql, params)
    }

    /// Execute a mutating statement; returns the affected-row count.
    /// Zero is a legitimate success.
    pub fn exec(&self, sql: &str, params: Vec<Value>) -> Result<u64> {
        run_exec(&self.inner, sql, params)
    }

    /// Execute a semicolon-separated sequence of statements as a single
    /// unit. No partial-result reporting; atomicity requires an explicit
    /// transaction around the batch.
    pub fn execute_batch(&self, sql: &str) -> Result<()> {
        runtime()
            .block_on(self.inner.execute_batch(sql))
            .map(|_| ())
            .map_err(|e| Error::Query(e.to_string()))
    }

    /// Clear pending statement state without closing the connection.
    pub fn reset(&self) {
        runtime().block_on(self.inner.reset());
    }

    /// Rowid of the most recent successful insert, 0 when unavailable.
    pub fn last_insert_rowid(&self) -> i64 {
        self.inner.last_insert_rowid()
    }

    /// Whether the connection currently auto-commits each statement.
    /// False while a transaction is open.
    pub fn is_autocommit(&self) -> bool {
        self.inner.is_autocommit()
    }

    /// Rows changed by the most recent mutating statement.
    pub fn affected_rows(&self) -> u64 {
        self.inner.changes()
    }

    /// Begin a transaction with the requested behavior.
    ///
    /// Fails when this connection already has an open transaction;
    /// transactions are serialized, not nested.
    pub fn begin(&self, behavior: Behavior) -> Result<Transaction> {
        if self
            .latch
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Acquire)
            .is_err()
        {
            return Err(Error::TransactionState(
                "connection already has an open transaction",
            ));
        }

        match runtime().block_on(self.inner.transaction_with_behavior(behavior.into())) {
            Ok(tx) => Ok(Transaction::new(tx, Arc::clone(&self.latch))),
            Err(e) => {
                self.latch.store(false, Ordering::Release);
                Err(Error::Query(e.to_string()))
            }
        }
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("in_transaction", &self.latch.load(Ordering::Acquire))
            .finish()
    }
}

/// Prepare, bind-check and run a read statement against a raw kernel
/// connection. Shared with transaction-scoped execution.
pub(crate) fn run_query(
    conn: &libsql::Connection,
    sql: &str,
    params: Vec<Value>,
) -> Result<ResultSet> {
    runtime().block_on(async {
        let mut stmt = conn
            .prepare(sql)
            .await
            .map_err(|e| Error::Query(e.to_string()))?;
        check_params(&stmt, &params)?;

        let mut rows = stmt
            .query(params)
            .await
            .map_err(|e| Error::Query(e.to_string()))?;

        let column_count = rows.column_count();
        let columns = (0..column_count)
            .map(|idx| rows.column_name(idx).unwrap_or_default().to_string())
            .collect();

        let mut set = ResultSet::new(columns);
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| Error::Query(e.to_string()))?
        {
            let mut cells = Vec::with_capacity(column_count as usize);
            for idx in 0..column_count {
                let value = row
                    .get_value(idx)
                    .map_err(|e| Error::Query(e.to_string()))?;
                cells.push(CellValue::from(value));
            }
            set.push_row(cells);
        }
        Ok(set)
    })
}

/// Prepare, bind-check and run a mutating statement against a raw kernel
/// connection. Shared with transaction-scoped execution.
pub(crate) fn run_exec(conn: &libsql::Connection, sql: &str, params: Vec<Value>) -> Result<u64> {
    runtime().block_on(async {
        let mut stmt = conn
            .prepare(sql)
            .await
            .map_err(|e| Error::Query(e.to_string()))?;
        check_params(&stmt, &params)?;

        let affected = stmt
            .execute(params)
            .await
            .map_err(|e| Error::Query(e.to_string()))?;
        Ok(affected as u64)
    })
}

fn check_params(stmt: &libsql::Statement, params: &[Value]) -> Result<()> {
    let expected = stmt.parameter_count();
    if expected != params.len() {
        return Err(Error::Bind {
            expected,
            got: params.len(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn temp_db() -> (TempDir, Connection) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.db");
        let conn = Connection::open_local(path.to_str().unwrap(), OpenMode::default(), None)
            .unwrap();
        (dir, conn)
    }

    #[test]
    fn open_mode_parsing() {
        assert_eq!(OpenMode::parse(None), OpenMode::ReadWriteCreate);
        assert_eq!(
            OpenMode::parse(Some("FERRITE_OPEN_READONLY")),
            OpenMode::ReadOnly
        );
        assert_eq!(
            OpenMode::parse(Some("FERRITE_OPEN_READWRITE")),
            OpenMode::ReadWrite
        );
        assert_eq!(OpenMode::parse(Some("garbage")), OpenMode::ReadWriteCreate);
    }

    #[test]
    fn open_close_cycling_leaves_no_stale_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cycle.db");
        for _ in 0..25 {
            let conn =
                Connection::open_local(path.to_str().unwrap(), OpenMode::default(), None).unwrap();
            drop(conn);
        }
        // the file is still a usable database afterwards
        let conn =
            Connection::open_local(path.to_str().unwrap(), OpenMode::default(), None).unwrap();
        conn.exec("CREATE TABLE IF NOT EXISTS t (x INT)", vec![]).unwrap();
    }

    #[test]
    fn open_readonly_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.db");
        let err =
            Connection::open_local(path.to_str().unwrap(), OpenMode::ReadOnly, None).unwrap_err();
        assert!(matches!(err, Error::Open(_)));
    }

    #[test]
    fn create_insert_query_scenario() {
        let (_dir, conn) = temp_db();

        let affected = conn.exec("CREATE TABLE t (x INT)", vec![]).unwrap();
        assert_eq!(affected, 0);

        let affected = conn.exec("INSERT INTO t VALUES (1)", vec![]).unwrap();
        assert_eq!(affected, 1);

        let set = conn.query("SELECT x FROM t", vec![]).unwrap();
        assert_eq!(set.columns, vec!["x".to_string()]);
        assert_eq!(set.rows, vec![vec![CellValue::Integer(1)]]);

        assert_eq!(conn.last_insert_rowid(), 1);
    }

    #[test]
    fn fresh_connection_has_no_last_insert_rowid() {
        let (_dir, conn) = temp_db();
        assert_eq!(conn.last_insert_rowid(), 0);
    }

    #[test]
    fn positional_parameters_bind_in_order() {
        let (_dir, conn) = temp_db();
        conn.exec("CREATE TABLE kv (k TEXT, v INT)", vec![]).unwrap();
        conn.exec(
            "INSERT INTO kv VALUES (?1, ?2)",
            vec![Value::Text("a".to_string()), Value::Integer(10)],
        )
        .unwrap();

        let set = conn
            .query(
                "SELECT v FROM kv WHERE k = ?1",
                vec![Value::Text("a".to_string())],
            )
            .unwrap();
        assert_eq!(set.rows, vec![vec![CellValue::Integer(10)]]);
    }

    #[test]
    fn parameter_count_mismatch_is_a_bind_error() {
        let (_dir, conn) = temp_db();
        conn.exec("CREATE TABLE t (x INT)", vec![]).unwrap();

        let err = conn
            .exec("INSERT INTO t VALUES (?1)", vec![])
            .unwrap_err();
        assert_eq!(err, Error::Bind { expected: 1, got: 0 });

        let err = conn
            .exec(
                "INSERT INTO t VALUES (?1)",
                vec![Value::Integer(1), Value::Integer(2)],
            )
            .unwrap_err();
        assert_eq!(err, Error::Bind { expected: 1, got: 2 });
    }

    #[test]
    fn exec_zero_affected_rows_is_success() {
        let (_dir, conn) = temp_db();
        conn.exec("CREATE TABLE t (x INT)", vec![]).unwrap();
        let affected = conn
            .exec("UPDATE t SET x = 0 WHERE x = 99", vec![])
            .unwrap();
        assert_eq!(affected, 0);
    }

    #[test]
    fn query_error_carries_engine_message() {
        let (_dir, conn) = temp_db();
        let err = conn.query("SELECT * FROM missing", vec![]).unwrap_err();
        assert!(matches!(err, Error::Query(_)));
    }

    #[test]
    fn execute_batch_runs_all_statements() {
        let (_dir, conn) = temp_db();
        conn.execute_batch(
            "CREATE TABLE a (x INT);
             CREATE TABLE b (y INT);
             INSERT INTO a VALUES (1);
             INSERT INTO b VALUES (2);",
        )
        .unwrap();

        let set = conn.query("SELECT x FROM a", vec![]).unwrap();
        assert_eq!(set.row_count(), 1);
        let set = conn.query("SELECT y FROM b", vec![]).unwrap();
        assert_eq!(set.row_count(), 1);
    }

    #[test]
    fn execute_batch_error_reports_failure() {
        let (_dir, conn) = temp_db();
        let err = conn.execute_batch("CREATE TABLE ok (x INT); NOT SQL;").unwrap_err();
        assert!(matches!(err, Error::Query(_)));
    }

    #[test]
    fn readonly_connection_rejects_writes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ro.db");
        {
            let conn =
                Connection::open_local(path.to_str().unwrap(), OpenMode::default(), None).unwrap();
            conn.exec("CREATE TABLE t (x INT)", vec![]).unwrap();
        }

        let conn =
            Connection::open_local(path.to_str().unwrap(), OpenMode::ReadOnly, None).unwrap();
        let err = conn.exec("INSERT INTO t VALUES (1)", vec![]).unwrap_err();
        assert!(matches!(err, Error::Query(_)));
    }

    #[test]
    fn encrypted_database_reopens_with_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("secret.db");
        {
            let conn = Connection::open_local(
                path.to_str().unwrap(),
                OpenMode::default(),
                Some("hunter2"),
            )
            .unwrap();
            conn.exec("CREATE TABLE t (x INT)", vec![]).unwrap();
            conn.exec("INSERT INTO t VALUES (41)", vec![]).unwrap();
        }

        let conn = Connection::open_local(
            path.to_str().unwrap(),
            OpenMode::default(),
            Some("hunter2"),
        )
        .unwrap();
        let set = conn.query("SELECT x FROM t", vec![]).unwrap();
        assert_eq!(set.rows, vec![vec![CellValue::Integer(41)]]);
    }

    #[test]
    fn empty_encryption_key_means_unencrypted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plain.db");
        {
            let conn =
                Connection::open_local(path.to_str().unwrap(), OpenMode::default(), Some(""))
                    .unwrap();
            conn.exec("CREATE TABLE t (x INT)", vec![]).unwrap();
        }
        // reopens without any key
        let conn =
            Connection::open_local(path.to_str().unwrap(), OpenMode::default(), None).unwrap();
        conn.query("SELECT x FROM t", vec![]).unwrap();
    }

    #[test]
    fn typed_cells_come_back_typed() {
        let (_dir, conn) = temp_db();
        conn.exec("CREATE TABLE v (a INT, b REAL, c TEXT, d BLOB, e INT)", vec![])
            .unwrap();
        conn.exec(
            "INSERT INTO v VALUES (1, 1.5, 'hi', X'BEEF', NULL)",
            vec![],
        )
        .unwrap();

        let set = conn.query("SELECT a, b, c, d, e FROM v", vec![]).unwrap();
        assert_eq!(
            set.rows,
            vec![vec![
                CellValue::Integer(1),
                CellValue::Real(1.5),
                CellValue::Text("hi".to_string()),
                CellValue::Blob(vec![0xbe, 0xef]),
                CellValue::Null,
            ]]
        );
    }

    #[test]
    fn autocommit_reflects_transaction_scope() {
        let (_dir, conn) = temp_db();
        assert!(conn.is_autocommit());

        let trx = conn.begin(Behavior::Write).unwrap();
        assert!(!conn.is_autocommit());

        trx.commit().unwrap();
        assert!(conn.is_autocommit());
    }

    #[test]
    fn affected_rows_tracks_last_statement() {
        let (_dir, conn) = temp_db();
        conn.exec("CREATE TABLE t (x INT)", vec![]).unwrap();
        conn.execute_batch("INSERT INTO t VALUES (1); INSERT INTO t VALUES (2);")
            .unwrap();
        conn.exec("UPDATE t SET x = x + 1", vec![]).unwrap();
        assert_eq!(conn.affected_rows(), 2);
    }

    #[test]
    fn reset_keeps_the_connection_usable() {
        let (_dir, conn) = temp_db();
        conn.exec("CREATE TABLE t (x INT)", vec![]).unwrap();
        conn.reset();
        conn.exec("INSERT INTO t VALUES (1)", vec![]).unwrap();
        assert_eq!(conn.query("SELECT x FROM t", vec![]).unwrap().row_count(), 1);
    }
}
