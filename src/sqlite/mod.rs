// SQLite driver built on rusqlite.
//
// - config: DSN parsing and opening the database
// - params: binding `SqlValue`s to statement parameters
// - query: stepping statements row by row and value extraction

pub mod config;
pub mod params;
pub mod query;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::driver::{Cursor, Driver};
use crate::error::EasySqlError;
use crate::params::Params;
use crate::types::Backend;

pub use config::SqliteTarget;
pub use params::{bind_params, sql_value_to_sqlite_value};
pub use query::{SqliteCursor, open_statement, sqlite_extract_value_sync};

pub(crate) type SharedSqliteConnection = Arc<Mutex<rusqlite::Connection>>;

/// A single `rusqlite` connection, driven on tokio's blocking pool.
pub struct SqliteDriver {
    conn: SharedSqliteConnection,
}

impl SqliteDriver {
    /// Open the database named by `dsn`.
    ///
    /// # Errors
    /// Returns `EasySqlError::ConfigError` for an unusable DSN or the `rusqlite` open error.
    pub async fn open(dsn: &str) -> Result<Self, EasySqlError> {
        let target = SqliteTarget::parse(dsn)?;
        let conn = tokio::task::spawn_blocking(move || config::open_connection(&target))
            .await
            .map_err(|e| {
                EasySqlError::ConnectionError(format!("sqlite spawn_blocking join error: {e}"))
            })??;
        Ok(Self::from_connection(conn))
    }

    /// Wrap an already-open `rusqlite` connection.
    #[must_use]
    pub fn from_connection(conn: rusqlite::Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }
}

impl fmt::Debug for SqliteDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqliteDriver").finish_non_exhaustive()
    }
}

pub(crate) async fn run_blocking<F, R>(
    conn: SharedSqliteConnection,
    func: F,
) -> Result<R, EasySqlError>
where
    F: FnOnce(&mut rusqlite::Connection) -> Result<R, EasySqlError> + Send + 'static,
    R: Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let mut guard = conn.blocking_lock();
        func(&mut guard)
    })
    .await
    .map_err(|e| EasySqlError::ExecutionError(format!("sqlite spawn_blocking join error: {e}")))?
}

#[async_trait]
impl Driver for SqliteDriver {
    fn backend(&self) -> Backend {
        Backend::Sqlite
    }

    async fn query<'a>(
        &'a mut self,
        sql: &str,
        params: &Params,
    ) -> Result<Box<dyn Cursor + 'a>, EasySqlError> {
        let cursor = open_statement(Arc::clone(&self.conn), sql.to_owned(), params.clone()).await?;
        Ok(Box::new(cursor))
    }

    async fn batch_execute(&mut self, sql: &str) -> Result<(), EasySqlError> {
        let sql_owned = sql.to_owned();
        run_blocking(Arc::clone(&self.conn), move |guard| {
            guard.execute_batch(&sql_owned)?;
            Ok(())
        })
        .await
    }

    async fn close(self: Box<Self>) -> Result<(), EasySqlError> {
        // A statement task that has not wound down yet still holds a handle; its drop closes.
        let Ok(mutex) = Arc::try_unwrap(self.conn) else {
            return Ok(());
        };
        let conn = mutex.into_inner();
        tokio::task::spawn_blocking(move || conn.close().map_err(|(_, e)| EasySqlError::from(e)))
            .await
            .map_err(|e| {
                EasySqlError::ConnectionError(format!("sqlite spawn_blocking join error: {e}"))
            })?
    }
}
