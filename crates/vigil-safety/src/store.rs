use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::{Mutex, MutexGuard};
use rusqlite::Connection;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use vigil_core::{Result, VigilError};

/// Shared SQLite handle for the approvals, usage, budgets and audit tables.
///
/// Cloning is cheap; every clone serialises on the same connection. Other
/// processes using the same file are coordinated by SQLite's own locking.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create the database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        info!(?path, "opening vigil database");
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).map_err(storage_err)?;
        conn.busy_timeout(Duration::from_secs(5)).map_err(storage_err)?;
        // WAL for concurrent readers alongside a writer
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(storage_err)?;
        Self::init(conn)
    }

    /// In-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(storage_err)?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS approvals (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                project_id TEXT NOT NULL,
                agent_id TEXT NOT NULL DEFAULT '',
                action_type TEXT NOT NULL,
                action_data TEXT NOT NULL,
                context_summary TEXT NOT NULL DEFAULT '',
                cost_estimate REAL NOT NULL DEFAULT 0,
                status TEXT NOT NULL DEFAULT 'pending',
                created_at TEXT NOT NULL,
                decided_at TEXT,
                executed_at TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_approvals_status ON approvals(status);

            CREATE TABLE IF NOT EXISTS token_usage (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                project_id TEXT NOT NULL,
                model TEXT NOT NULL,
                tokens_input INTEGER NOT NULL,
                tokens_output INTEGER NOT NULL,
                cost_usd REAL NOT NULL,
                task_type TEXT NOT NULL DEFAULT '',
                agent_id TEXT NOT NULL DEFAULT '',
                timestamp TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_usage_project_date
                ON token_usage(project_id, timestamp);

            CREATE TABLE IF NOT EXISTS budgets (
                project_id TEXT PRIMARY KEY,
                daily_limit REAL NOT NULL,
                monthly_limit REAL NOT NULL
            );

            CREATE TABLE IF NOT EXISTS audit_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                project_id TEXT NOT NULL,
                agent_id TEXT NOT NULL DEFAULT '',
                severity TEXT NOT NULL,
                category TEXT NOT NULL,
                action TEXT NOT NULL,
                details TEXT NOT NULL DEFAULT '',
                tokens_used INTEGER NOT NULL DEFAULT 0,
                cost_usd REAL NOT NULL DEFAULT 0,
                model TEXT NOT NULL DEFAULT '',
                success INTEGER NOT NULL DEFAULT 1
            );

            CREATE INDEX IF NOT EXISTS idx_audit_severity ON audit_log(severity);
            CREATE INDEX IF NOT EXISTS idx_audit_project_date
                ON audit_log(project_id, timestamp);
            ",
        )
        .map_err(storage_err)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub(crate) fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock()
    }
}

pub(crate) fn storage_err(e: rusqlite::Error) -> VigilError {
    VigilError::Storage(e.to_string())
}

/// RFC 3339 in UTC with a `Z` suffix; the first ten characters are the day.
pub(crate) fn timestamp(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub(crate) fn parse_timestamp(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_default()
}

/// `YYYY-MM-DD` of a UTC instant.
pub(crate) fn day_of(t: DateTime<Utc>) -> String {
    t.format("%Y-%m-%d").to_string()
}
