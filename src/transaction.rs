use std::ops::{Deref, DerefMut};

use tracing::warn;

use crate::connection::Connection;
use crate::error::EasySqlError;

/// Guard that suspends autocommit on a [`Connection`] until it is resolved.
///
/// Statements run through the guard (it derefs to the connection) share one transaction.
/// [`Transaction::commit`] and [`Transaction::rollback`] end it and turn autocommit back on
/// if it was on when the guard began, even when the `COMMIT`/`ROLLBACK` itself fails.
///
/// Dropping an unresolved guard restores autocommit immediately and defers the `ROLLBACK` to
/// the next operation on the connection, since `Drop` cannot await.
///
/// ```rust,no_run
/// use easy_sql::prelude::*;
///
/// # async fn demo(conn: &mut Connection) -> Result<(), EasySqlError> {
/// let mut tx = conn.transaction()?;
/// tx.run("UPDATE accounts SET balance = balance - ? WHERE id = ?", (10, 1)).await?;
/// tx.run("UPDATE accounts SET balance = balance + ? WHERE id = ?", (10, 2)).await?;
/// tx.commit().await?;
/// # Ok(())
/// # }
/// ```
#[must_use = "an unresolved transaction is rolled back"]
pub struct Transaction<'c> {
    conn: &'c mut Connection,
    restore_autocommit: bool,
    resolved: bool,
}

impl<'c> Transaction<'c> {
    /// Start a transaction on `conn`, turning autocommit off for its duration.
    ///
    /// No statement is sent yet; `BEGIN` goes out with the first statement run through the
    /// guard.
    ///
    /// # Errors
    /// Returns `EasySqlError::ConnectionError` if `conn` is closed.
    pub fn begin(conn: &'c mut Connection) -> Result<Self, EasySqlError> {
        conn.driver_mut()?;
        let restore_autocommit = conn.autocommit();
        if restore_autocommit {
            conn.suspend_autocommit();
        }
        Ok(Self {
            conn,
            restore_autocommit,
            resolved: false,
        })
    }

    /// Autocommit value observed when the guard began.
    #[must_use]
    pub fn original_autocommit(&self) -> bool {
        self.restore_autocommit
    }

    /// Commit and restore autocommit.
    ///
    /// # Errors
    /// Returns the connection's commit error.
    pub async fn commit(self) -> Result<(), EasySqlError> {
        self.finish(true).await
    }

    /// Roll back and restore autocommit.
    ///
    /// # Errors
    /// Returns the connection's rollback error.
    pub async fn rollback(self) -> Result<(), EasySqlError> {
        self.finish(false).await
    }

    /// Commit when `ok`, roll back otherwise, then restore autocommit.
    ///
    /// # Errors
    /// Returns the commit or rollback error.
    pub async fn finish(mut self, ok: bool) -> Result<(), EasySqlError> {
        let result = if ok {
            self.conn.commit().await
        } else {
            self.conn.rollback().await
        };
        if self.restore_autocommit {
            self.conn.restore_autocommit();
        }
        self.resolved = true;
        result
    }
}

impl Deref for Transaction<'_> {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        &*self.conn
    }
}

impl DerefMut for Transaction<'_> {
    fn deref_mut(&mut self) -> &mut Connection {
        &mut *self.conn
    }
}

impl std::fmt::Debug for Transaction<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("connection", &self.conn)
            .field("restore_autocommit", &self.restore_autocommit)
            .field("resolved", &self.resolved)
            .finish()
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if self.resolved {
            return;
        }
        warn!("transaction dropped without commit or rollback; rolling back on next use");
        self.conn.abandon_transaction();
        if self.restore_autocommit {
            self.conn.restore_autocommit();
        }
    }
}
