use std::sync::Arc;

use async_trait::async_trait;
use rusqlite::types::Value;
use tokio::sync::{mpsc, oneshot};

use crate::driver::Cursor;
use crate::error::EasySqlError;
use crate::params::Params;
use crate::shape::Columns;
use crate::types::SqlValue;

use super::SharedSqliteConnection;
use super::params::bind_params;

/// Extract a `SqlValue` from a `SQLite` row.
///
/// # Errors
///
/// Returns `EasySqlError::SqliteError` if the value cannot be read.
pub fn sqlite_extract_value_sync(row: &rusqlite::Row, idx: usize) -> Result<SqlValue, EasySqlError> {
    let value: Value = row.get(idx)?;
    Ok(match value {
        Value::Null => SqlValue::Null,
        Value::Integer(i) => SqlValue::Int(i),
        Value::Real(f) => SqlValue::Float(f),
        Value::Text(s) => SqlValue::Text(s),
        Value::Blob(b) => SqlValue::Blob(b),
    })
}

/// What the cursor asks the statement task for.
#[derive(Debug, Clone, Copy)]
enum Step {
    Next,
    Drain,
}

/// What the statement task answers.
#[derive(Debug)]
enum Reply {
    Row(Vec<SqlValue>),
    /// The statement ran out; carries the change count for writes.
    Done(Option<u64>),
}

/// Reported once the statement is prepared and bound.
#[derive(Debug)]
struct Opened {
    columns: Columns,
    /// `Some` when the statement has no result columns and already ran to completion.
    finished: Option<Option<u64>>,
}

/// Prepare and bind `sql` on a blocking task that keeps the connection locked, stepping
/// one row each time the returned cursor asks for one.
///
/// Statements without result columns run to completion before this returns, so their
/// change count is known immediately. Dropping the cursor resets the statement and
/// releases the connection.
///
/// # Errors
/// Returns binding errors from [`bind_params`], `rusqlite` failures while preparing or
/// running a column-less statement, and `EasySqlError::ConnectionError` if the task dies.
pub async fn open_statement(
    conn: SharedSqliteConnection,
    sql: String,
    params: Params,
) -> Result<SqliteCursor, EasySqlError> {
    let (opened_tx, opened_rx) = oneshot::channel();
    let (step_tx, step_rx) = mpsc::channel(1);
    let (reply_tx, reply_rx) = mpsc::channel(1);

    tokio::task::spawn_blocking(move || {
        let guard = conn.blocking_lock();
        serve_statement(&guard, &sql, &params, opened_tx, step_rx, &reply_tx);
    });

    let opened = opened_rx.await.map_err(|_| task_gone())??;
    let (done, changes) = match opened.finished {
        Some(changes) => (true, changes),
        None => (false, None),
    };
    Ok(SqliteCursor {
        columns: opened.columns,
        steps: step_tx,
        replies: reply_rx,
        changes,
        done,
    })
}

fn task_gone() -> EasySqlError {
    EasySqlError::ConnectionError("sqlite statement task ended unexpectedly".to_string())
}

fn serve_statement(
    conn: &rusqlite::Connection,
    sql: &str,
    params: &Params,
    opened: oneshot::Sender<Result<Opened, EasySqlError>>,
    mut steps: mpsc::Receiver<Step>,
    replies: &mpsc::Sender<Result<Reply, EasySqlError>>,
) {
    let mut stmt = match prepare_bound(conn, sql, params) {
        Ok(stmt) => stmt,
        Err(err) => {
            let _ = opened.send(Err(err));
            return;
        }
    };

    let columns: Columns = Arc::new(
        stmt.column_names()
            .iter()
            .map(std::string::ToString::to_string)
            .collect(),
    );
    let col_count = columns.len();
    let writes = !stmt.readonly();
    let changes = || writes.then(|| conn.changes());
    let mut rows = stmt.raw_query();

    if col_count == 0 {
        let result = skip_rows(&mut rows).map(|()| Opened {
            columns,
            finished: Some(changes()),
        });
        let _ = opened.send(result);
        return;
    }
    if opened
        .send(Ok(Opened {
            columns,
            finished: None,
        }))
        .is_err()
    {
        return;
    }

    // a closed step channel means the cursor was dropped
    while let Some(step) = steps.blocking_recv() {
        let reply = match step {
            Step::Next => match rows.next() {
                Ok(Some(row)) => read_row(row, col_count).map(Reply::Row),
                Ok(None) => Ok(Reply::Done(changes())),
                Err(err) => Err(err.into()),
            },
            Step::Drain => skip_rows(&mut rows).map(|()| Reply::Done(changes())),
        };
        let last = !matches!(reply, Ok(Reply::Row(_)));
        if replies.blocking_send(reply).is_err() || last {
            return;
        }
    }
}

fn prepare_bound<'c>(
    conn: &'c rusqlite::Connection,
    sql: &str,
    params: &Params,
) -> Result<rusqlite::Statement<'c>, EasySqlError> {
    let mut stmt = conn.prepare(sql)?;
    bind_params(&mut stmt, params)?;
    Ok(stmt)
}

fn read_row(row: &rusqlite::Row<'_>, col_count: usize) -> Result<Vec<SqlValue>, EasySqlError> {
    let mut values = Vec::with_capacity(col_count);
    for i in 0..col_count {
        values.push(sqlite_extract_value_sync(row, i)?);
    }
    Ok(values)
}

fn skip_rows(rows: &mut rusqlite::Rows<'_>) -> Result<(), EasySqlError> {
    while rows.next()?.is_some() {}
    Ok(())
}

/// Cursor over a statement stepped on a blocking task, one row per request.
#[derive(Debug)]
pub struct SqliteCursor {
    columns: Columns,
    steps: mpsc::Sender<Step>,
    replies: mpsc::Receiver<Result<Reply, EasySqlError>>,
    changes: Option<u64>,
    done: bool,
}

impl SqliteCursor {
    async fn request(&mut self, step: Step) -> Result<Reply, EasySqlError> {
        self.steps.send(step).await.map_err(|_| task_gone())?;
        match self.replies.recv().await {
            Some(Ok(reply)) => Ok(reply),
            Some(Err(err)) => {
                self.done = true;
                Err(err)
            }
            None => {
                self.done = true;
                Err(task_gone())
            }
        }
    }
}

#[async_trait]
impl Cursor for SqliteCursor {
    fn columns(&self) -> &Columns {
        &self.columns
    }

    async fn next_row(&mut self) -> Result<Option<Vec<SqlValue>>, EasySqlError> {
        if self.done {
            return Ok(None);
        }
        match self.request(Step::Next).await? {
            Reply::Row(values) => Ok(Some(values)),
            Reply::Done(changes) => {
                self.done = true;
                self.changes = changes;
                Ok(None)
            }
        }
    }

    async fn drain(&mut self) -> Result<(), EasySqlError> {
        if self.done {
            return Ok(());
        }
        if let Reply::Done(changes) = self.request(Step::Drain).await? {
            self.changes = changes;
        }
        self.done = true;
        Ok(())
    }

    fn rows_affected(&self) -> Option<u64> {
        self.changes
    }
}
