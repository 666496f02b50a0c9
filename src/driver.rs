use async_trait::async_trait;

use crate::error::EasySqlError;
use crate::params::Params;
use crate::shape::Columns;
use crate::types::{Backend, SqlValue};

/// The database client a [`crate::Connection`] delegates to.
///
/// Drivers execute SQL with bound parameters and hand back a [`Cursor`]; everything else
/// (argument normalization, autocommit, row shaping) lives above this trait.
#[async_trait]
pub trait Driver: Send {
    fn backend(&self) -> Backend;

    /// Execute one statement and return a cursor over its result rows.
    async fn query<'a>(
        &'a mut self,
        sql: &str,
        params: &Params,
    ) -> Result<Box<dyn Cursor + 'a>, EasySqlError>;

    /// Execute one or more statements without parameters or results.
    async fn batch_execute(&mut self, sql: &str) -> Result<(), EasySqlError>;

    /// Close the underlying connection.
    async fn close(self: Box<Self>) -> Result<(), EasySqlError>;
}

/// Forward-only access to the rows of one executed statement.
#[async_trait]
pub trait Cursor: Send {
    /// Column names of the result set; empty for statements without results.
    fn columns(&self) -> &Columns;

    /// Fetch the next row, or `None` once the result set is exhausted.
    async fn next_row(&mut self) -> Result<Option<Vec<SqlValue>>, EasySqlError>;

    /// Run the statement to completion without decoding the remaining rows.
    ///
    /// Errors the server raises while producing rows still surface here.
    async fn drain(&mut self) -> Result<(), EasySqlError> {
        while self.next_row().await?.is_some() {}
        Ok(())
    }

    /// Rows affected by the statement, once the driver knows it.
    fn rows_affected(&self) -> Option<u64>;
}
