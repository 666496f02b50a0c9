use rusqlite::Connection;
use tracing::debug;

use crate::error::EasySqlError;

/// Database location named by a `SQLite` DSN.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqliteTarget {
    Memory,
    /// A filesystem path or a `file:` URI.
    Path(String),
}

impl SqliteTarget {
    /// Parse `sqlite://path`, `sqlite:path`, `:memory:`, `file:` URIs or a bare path.
    ///
    /// # Errors
    /// Returns `EasySqlError::ConfigError` for an empty path.
    pub fn parse(dsn: &str) -> Result<Self, EasySqlError> {
        let path = dsn
            .strip_prefix("sqlite://")
            .or_else(|| dsn.strip_prefix("sqlite:"))
            .unwrap_or(dsn)
            .trim();
        match path {
            "" => Err(EasySqlError::ConfigError(
                "sqlite DSN names no database path".to_string(),
            )),
            ":memory:" => Ok(SqliteTarget::Memory),
            path => Ok(SqliteTarget::Path(path.to_string())),
        }
    }
}

/// Open a `rusqlite` connection; file databases are switched to WAL journaling.
///
/// # Errors
/// Returns `EasySqlError::SqliteError` if the database cannot be opened.
pub(crate) fn open_connection(target: &SqliteTarget) -> Result<Connection, EasySqlError> {
    match target {
        SqliteTarget::Memory => Ok(Connection::open_in_memory()?),
        SqliteTarget::Path(path) => {
            let conn = Connection::open(path)?;
            let mode: String = conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
            debug!(path = %path, journal_mode = %mode, "opened sqlite database");
            Ok(conn)
        }
    }
}
