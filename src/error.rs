use thiserror::Error;

#[cfg(feature = "sqlite")]
use rusqlite;
#[cfg(feature = "postgres")]
use tokio_postgres;

/// Errors surfaced by this crate.
///
/// Driver failures are carried through untouched so callers can match on the driver's own
/// error taxonomy (`SQLSTATE` codes, `rusqlite::Error` variants, ...).
#[derive(Debug, Error)]
pub enum EasySqlError {
    #[cfg(feature = "postgres")]
    #[error(transparent)]
    PostgresError(#[from] tokio_postgres::Error),

    #[cfg(feature = "sqlite")]
    #[error(transparent)]
    SqliteError(#[from] rusqlite::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Parameter error: {0}")]
    ParameterError(String),

    #[error("SQL execution error: {0}")]
    ExecutionError(String),

    #[error("Missing key: {0}")]
    MissingKey(String),
}

impl EasySqlError {
    /// True when the error came from the underlying driver rather than from this crate.
    #[must_use]
    pub fn is_driver_error(&self) -> bool {
        match self {
            #[cfg(feature = "postgres")]
            EasySqlError::PostgresError(_) => true,
            #[cfg(feature = "sqlite")]
            EasySqlError::SqliteError(_) => true,
            _ => false,
        }
    }
}
