use std::fmt;

use tokio::runtime::Handle;
use tracing::{debug, info, warn};

use crate::config::{ConnectOptions, redact_dsn};
use crate::driver::{Cursor, Driver};
use crate::error::EasySqlError;
use crate::executor::{FetchMode, Fetched, RowIter, fetch_all, fetch_one};
use crate::params::Args;
use crate::record::Record;
use crate::shape::{AsRecord, AsTuple, RowShape, TupleRow};
use crate::transaction::Transaction;
use crate::types::Backend;

#[cfg(feature = "postgres")]
use crate::postgres::PostgresDriver;
#[cfg(feature = "sqlite")]
use crate::sqlite::SqliteDriver;

/// One database connection with client-side autocommit handling.
///
/// With autocommit on, every statement commits on its own. With autocommit off, the first
/// statement after a commit or rollback opens a transaction that stays open until
/// [`Connection::commit`] or [`Connection::rollback`].
///
/// ```rust,no_run
/// use easy_sql::prelude::*;
///
/// # async fn demo() -> Result<(), EasySqlError> {
/// let mut conn = Connection::connect(":memory:").await?;
/// conn.run("CREATE TABLE t (id INTEGER, name TEXT)", ()).await?;
/// conn.run("INSERT INTO t VALUES (?, ?)", (1, "alice")).await?;
///
/// let name = conn.one("SELECT name FROM t WHERE id = ?", 1).await?;
/// assert_eq!(name, Some(TupleRow::Scalar(SqlValue::Text("alice".into()))));
///
/// let row = conn.one_record("SELECT id, name FROM t", ()).await?.unwrap();
/// assert_eq!(row.attr("id")?, &SqlValue::Int(1));
/// conn.close().await?;
/// # Ok(())
/// # }
/// ```
pub struct Connection {
    driver: Option<Box<dyn Driver>>,
    backend: Backend,
    label: String,
    autocommit: bool,
    in_transaction: bool,
    pending_rollback: bool,
}

impl Connection {
    /// Connect with autocommit on, inferring the backend from `dsn`.
    ///
    /// # Errors
    /// See [`Connection::connect_with`].
    pub async fn connect(dsn: impl Into<String>) -> Result<Self, EasySqlError> {
        Self::connect_with(ConnectOptions::new(dsn)).await
    }

    /// Connect with explicit options.
    ///
    /// # Errors
    /// Returns `EasySqlError::ConfigError` when the backend cannot be determined or the DSN is
    /// malformed, and the driver's error when the database cannot be reached.
    pub async fn connect_with(opts: ConnectOptions) -> Result<Self, EasySqlError> {
        let backend = opts.resolve_backend()?;
        let driver: Box<dyn Driver> = match backend {
            #[cfg(feature = "postgres")]
            Backend::Postgres => Box::new(PostgresDriver::connect(&opts.dsn).await?),
            #[cfg(feature = "sqlite")]
            Backend::Sqlite => Box::new(SqliteDriver::open(&opts.dsn).await?),
        };
        let label = redact_dsn(&opts.dsn).into_owned();
        info!(backend = %backend, dsn = %label, autocommit = opts.autocommit, "connected");
        let mut conn = Self::from_driver(driver, opts.autocommit);
        conn.label = label;
        Ok(conn)
    }

    /// Wrap a driver that is already connected.
    #[must_use]
    pub fn from_driver(driver: Box<dyn Driver>, autocommit: bool) -> Self {
        let backend = driver.backend();
        Self {
            driver: Some(driver),
            backend,
            label: format!("<{backend} driver>"),
            autocommit,
            in_transaction: false,
            pending_rollback: false,
        }
    }

    /// Open a connection, hand it to `f`, then commit and close on `Ok` or roll back and
    /// close on `Err`.
    ///
    /// ```rust,no_run
    /// use easy_sql::prelude::*;
    ///
    /// # async fn demo() -> Result<(), EasySqlError> {
    /// let opts = ConnectOptions::builder("app.db").autocommit(false).finish();
    /// let _count = Connection::scope(opts, async |conn: &mut Connection| {
    ///     conn.run("INSERT INTO t (id) VALUES (?)", 7).await?;
    ///     conn.one("SELECT count(*) FROM t", ()).await
    /// })
    /// .await?;
    /// # Ok(())
    /// # }
    /// ```
    ///
    /// # Errors
    /// Returns connection errors, the closure's error, or the commit error. A failing rollback
    /// on the error path is logged and the closure's error is returned.
    pub async fn scope<T, E, F>(opts: ConnectOptions, f: F) -> Result<T, E>
    where
        F: AsyncFnOnce(&mut Connection) -> Result<T, E>,
        E: From<EasySqlError>,
    {
        let mut conn = Connection::connect_with(opts).await?;
        match f(&mut conn).await {
            Ok(value) => {
                let committed = conn.commit().await;
                let closed = conn.close().await;
                committed?;
                closed?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = conn.rollback().await {
                    warn!(error = %rollback_err, "rollback failed while leaving connection scope");
                }
                if let Err(close_err) = conn.close().await {
                    warn!(error = %close_err, "close failed while leaving connection scope");
                }
                Err(err)
            }
        }
    }

    #[must_use]
    pub fn backend(&self) -> Backend {
        self.backend
    }

    #[must_use]
    pub fn autocommit(&self) -> bool {
        self.autocommit
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.driver.is_none()
    }

    /// True while a server transaction is open on this connection.
    #[must_use]
    pub fn in_transaction(&self) -> bool {
        self.in_transaction
    }

    /// Change the autocommit policy.
    ///
    /// # Errors
    /// Returns `EasySqlError::ConnectionError` on a closed connection and
    /// `EasySqlError::ExecutionError` when turning autocommit on inside an open transaction.
    pub async fn set_autocommit(&mut self, autocommit: bool) -> Result<(), EasySqlError> {
        self.driver_mut()?;
        self.flush_pending_rollback().await?;
        if autocommit && self.in_transaction {
            return Err(EasySqlError::ExecutionError(
                "cannot enable autocommit inside an open transaction; commit or roll back first"
                    .to_string(),
            ));
        }
        self.autocommit = autocommit;
        Ok(())
    }

    /// Execute `query` and return the driver's cursor for direct row access.
    ///
    /// # Errors
    /// Returns `EasySqlError::ParameterError` for arguments that cannot be normalized,
    /// `EasySqlError::ConnectionError` on a closed connection and the driver's error when
    /// execution fails.
    pub async fn cursor(
        &mut self,
        query: &str,
        args: impl Into<Args>,
    ) -> Result<Box<dyn Cursor + '_>, EasySqlError> {
        let params = args.into().normalize()?;
        self.driver_mut()?;
        self.flush_pending_rollback().await?;
        if !self.autocommit && !self.in_transaction {
            self.driver_mut()?.batch_execute("BEGIN").await?;
            self.in_transaction = true;
        }
        debug!(backend = %self.backend, sql = query, params = params.len(), "executing statement");
        self.driver_mut()?.query(query, &params).await
    }

    /// Execute `query` with a fetch strategy and row shape chosen by the caller.
    ///
    /// # Errors
    /// See [`Connection::cursor`]; errors raised while reading rows propagate as well.
    pub async fn execute<S: RowShape>(
        &mut self,
        query: &str,
        mode: FetchMode,
        args: impl Into<Args>,
    ) -> Result<Fetched<'_, S>, EasySqlError> {
        let mut cursor = self.cursor(query, args).await?;
        Ok(match mode {
            FetchMode::None => {
                // errors raised mid-statement only surface while the statement runs out
                cursor.drain().await?;
                Fetched::None
            }
            FetchMode::One => Fetched::One(fetch_one::<S>(cursor.as_mut()).await?),
            FetchMode::All => Fetched::All(fetch_all::<S>(cursor.as_mut()).await?),
            FetchMode::Iter => Fetched::Iter(RowIter::new(cursor)),
        })
    }

    /// Run a statement and discard any rows.
    ///
    /// # Errors
    /// See [`Connection::execute`].
    pub async fn run(&mut self, query: &str, args: impl Into<Args>) -> Result<(), EasySqlError> {
        self.execute::<AsTuple>(query, FetchMode::None, args)
            .await
            .map(|_| ())
    }

    /// The single row of the result as a scalar or tuple; `None` unless exactly one row came
    /// back.
    ///
    /// # Errors
    /// See [`Connection::execute`].
    pub async fn one(
        &mut self,
        query: &str,
        args: impl Into<Args>,
    ) -> Result<Option<TupleRow>, EasySqlError> {
        Ok(self
            .execute::<AsTuple>(query, FetchMode::One, args)
            .await?
            .into_one())
    }

    /// The single row of the result as a [`Record`]; `None` unless exactly one row came back.
    ///
    /// # Errors
    /// See [`Connection::execute`].
    pub async fn one_record(
        &mut self,
        query: &str,
        args: impl Into<Args>,
    ) -> Result<Option<Record>, EasySqlError> {
        Ok(self
            .execute::<AsRecord>(query, FetchMode::One, args)
            .await?
            .into_one())
    }

    /// # Errors
    /// See [`Connection::execute`].
    pub async fn all(
        &mut self,
        query: &str,
        args: impl Into<Args>,
    ) -> Result<Vec<TupleRow>, EasySqlError> {
        Ok(self
            .execute::<AsTuple>(query, FetchMode::All, args)
            .await?
            .into_all())
    }

    /// # Errors
    /// See [`Connection::execute`].
    pub async fn all_records(
        &mut self,
        query: &str,
        args: impl Into<Args>,
    ) -> Result<Vec<Record>, EasySqlError> {
        Ok(self
            .execute::<AsRecord>(query, FetchMode::All, args)
            .await?
            .into_all())
    }

    /// Lazily iterate over scalar/tuple rows. The connection stays borrowed until the iterator
    /// is dropped.
    ///
    /// # Errors
    /// See [`Connection::cursor`].
    pub async fn iter(
        &mut self,
        query: &str,
        args: impl Into<Args>,
    ) -> Result<RowIter<'_, AsTuple>, EasySqlError> {
        let cursor = self.cursor(query, args).await?;
        Ok(RowIter::new(cursor))
    }

    /// Lazily iterate over [`Record`] rows.
    ///
    /// # Errors
    /// See [`Connection::cursor`].
    pub async fn iter_records(
        &mut self,
        query: &str,
        args: impl Into<Args>,
    ) -> Result<RowIter<'_, AsRecord>, EasySqlError> {
        let cursor = self.cursor(query, args).await?;
        Ok(RowIter::new(cursor))
    }

    /// Suspend autocommit until the returned guard is committed or rolled back.
    ///
    /// # Errors
    /// Returns `EasySqlError::ConnectionError` on a closed connection.
    pub fn transaction(&mut self) -> Result<Transaction<'_>, EasySqlError> {
        Transaction::begin(self)
    }

    /// Run `f` inside a [`Transaction`], committing on `Ok` and rolling back on `Err`.
    ///
    /// # Errors
    /// Returns the closure's error, or the commit error. A failing rollback is logged and the
    /// closure's error is returned.
    pub async fn with_transaction<T, E, F>(&mut self, f: F) -> Result<T, E>
    where
        F: AsyncFnOnce(&mut Connection) -> Result<T, E>,
        E: From<EasySqlError>,
    {
        let mut tx = Transaction::begin(self)?;
        match f(&mut *tx).await {
            Ok(value) => {
                tx.commit().await?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    warn!(error = %rollback_err, "rollback failed while leaving transaction");
                }
                Err(err)
            }
        }
    }

    /// Commit the open transaction, if any.
    ///
    /// If the commit fails the transaction is rolled back, so the connection is never left
    /// inside a half-finished transaction.
    ///
    /// # Errors
    /// Returns `EasySqlError::ConnectionError` on a closed connection and the driver's error
    /// when `COMMIT` fails.
    pub async fn commit(&mut self) -> Result<(), EasySqlError> {
        self.driver_mut()?;
        self.flush_pending_rollback().await?;
        if !self.in_transaction {
            return Ok(());
        }
        self.in_transaction = false;
        let driver = self.driver_mut()?;
        if let Err(err) = driver.batch_execute("COMMIT").await {
            if let Err(rollback_err) = driver.batch_execute("ROLLBACK").await {
                debug!(error = %rollback_err, "rollback after failed commit");
            }
            return Err(err);
        }
        debug!(backend = %self.backend, "committed");
        Ok(())
    }

    /// Roll back the open transaction, if any.
    ///
    /// # Errors
    /// Returns `EasySqlError::ConnectionError` on a closed connection and the driver's error
    /// when `ROLLBACK` fails.
    pub async fn rollback(&mut self) -> Result<(), EasySqlError> {
        self.driver_mut()?;
        if !self.in_transaction && !self.pending_rollback {
            return Ok(());
        }
        self.in_transaction = false;
        self.pending_rollback = false;
        self.driver_mut()?.batch_execute("ROLLBACK").await?;
        debug!(backend = %self.backend, "rolled back");
        Ok(())
    }

    /// Close the connection. An open transaction is discarded. Closing twice is a no-op.
    ///
    /// # Errors
    /// Returns the driver's error if shutting the connection down fails; the connection counts
    /// as closed either way.
    pub async fn close(&mut self) -> Result<(), EasySqlError> {
        let Some(driver) = self.driver.take() else {
            return Ok(());
        };
        if self.in_transaction {
            debug!(backend = %self.backend, "closing with an open transaction; discarding it");
        }
        self.in_transaction = false;
        self.pending_rollback = false;
        info!(backend = %self.backend, dsn = %self.label, "closing connection");
        driver.close().await
    }

    pub(crate) fn driver_mut(&mut self) -> Result<&mut Box<dyn Driver>, EasySqlError> {
        self.driver
            .as_mut()
            .ok_or_else(|| EasySqlError::ConnectionError("connection is closed".to_string()))
    }

    /// Issue the `ROLLBACK` owed by a transaction guard that was dropped while active.
    async fn flush_pending_rollback(&mut self) -> Result<(), EasySqlError> {
        if !self.pending_rollback {
            return Ok(());
        }
        self.pending_rollback = false;
        self.in_transaction = false;
        debug!(backend = %self.backend, "rolling back abandoned transaction");
        self.driver_mut()?.batch_execute("ROLLBACK").await
    }

    pub(crate) fn suspend_autocommit(&mut self) {
        self.autocommit = false;
    }

    pub(crate) fn restore_autocommit(&mut self) {
        self.autocommit = true;
    }

    /// Called when a transaction guard is dropped unresolved.
    pub(crate) fn abandon_transaction(&mut self) {
        if self.in_transaction {
            self.pending_rollback = true;
        }
    }
}

impl fmt::Display for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<connection backend={} dsn='{}' closed={}>",
            self.backend,
            self.label,
            u8::from(self.is_closed())
        )
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("backend", &self.backend)
            .field("dsn", &self.label)
            .field("closed", &self.is_closed())
            .field("autocommit", &self.autocommit)
            .field("in_transaction", &self.in_transaction)
            .finish_non_exhaustive()
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        let Some(driver) = self.driver.take() else {
            return;
        };
        warn!(backend = %self.backend, dsn = %self.label, "connection dropped without close");
        if let Ok(handle) = Handle::try_current() {
            handle.spawn(async move {
                let _ = driver.close().await;
            });
        }
    }
}
