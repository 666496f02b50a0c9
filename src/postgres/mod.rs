// PostgreSQL driver built on tokio-postgres.
//
// - config: DSN parsing and client setup
// - params: binding `SqlValue`s and named placeholders
// - query: row streaming and value extraction

pub mod config;
pub mod params;
pub mod query;

use std::sync::Arc;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio_postgres::Client;

use crate::driver::{Cursor, Driver};
use crate::error::EasySqlError;
use crate::params::Params;
use crate::types::Backend;

pub use params::{BoundParams, bind_params};
pub use query::{PgCursor, PgValue, postgres_extract_value};

/// A single `tokio-postgres` client plus the task driving its socket.
pub struct PostgresDriver {
    client: Client,
    connection_task: JoinHandle<()>,
}

impl PostgresDriver {
    /// Connect to the server named by `dsn`.
    ///
    /// # Errors
    /// Returns configuration or driver errors from [`config::connect_client`].
    pub async fn connect(dsn: &str) -> Result<Self, EasySqlError> {
        let (client, connection_task) = config::connect_client(dsn).await?;
        Ok(Self {
            client,
            connection_task,
        })
    }
}

#[async_trait]
impl Driver for PostgresDriver {
    fn backend(&self) -> Backend {
        Backend::Postgres
    }

    async fn query<'a>(
        &'a mut self,
        sql: &str,
        params: &Params,
    ) -> Result<Box<dyn Cursor + 'a>, EasySqlError> {
        let bound = bind_params(sql, params)?;
        let statement = self.client.prepare(&bound.sql).await?;
        let columns = Arc::new(
            statement
                .columns()
                .iter()
                .map(|col| col.name().to_string())
                .collect::<Vec<_>>(),
        );
        let stream = self
            .client
            .query_raw(&statement, bound.values.iter().copied())
            .await?;
        Ok(Box::new(PgCursor::new(stream, columns)))
    }

    async fn batch_execute(&mut self, sql: &str) -> Result<(), EasySqlError> {
        self.client.batch_execute(sql).await?;
        Ok(())
    }

    async fn close(self: Box<Self>) -> Result<(), EasySqlError> {
        let PostgresDriver {
            client,
            connection_task,
        } = *self;
        drop(client);
        connection_task.await.map_err(|e| {
            EasySqlError::ConnectionError(format!("postgres connection task failed: {e}"))
        })
    }
}
