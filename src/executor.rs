//! Fetch strategies applied to an executed statement.

use std::marker::PhantomData;

use futures_util::stream::{self, Stream};

use crate::driver::Cursor;
use crate::error::EasySqlError;
use crate::shape::{Columns, RowShape};

/// How many rows to retrieve after executing a statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchMode {
    /// Consume no rows.
    None,
    /// Exactly one row, or nothing.
    One,
    /// Every row, eagerly.
    All,
    /// Rows one at a time, lazily.
    Iter,
}

/// Result of [`crate::Connection::execute`], one variant per [`FetchMode`].
pub enum Fetched<'c, S: RowShape> {
    None,
    One(Option<S::Output>),
    All(Vec<S::Output>),
    Iter(RowIter<'c, S>),
}

impl<S: RowShape> Fetched<'_, S> {
    /// The single row of a `FetchMode::One` call.
    #[must_use]
    pub fn into_one(self) -> Option<S::Output> {
        match self {
            Fetched::One(row) => row,
            _ => None,
        }
    }

    /// The rows of a `FetchMode::All` call; empty for any other mode.
    #[must_use]
    pub fn into_all(self) -> Vec<S::Output> {
        match self {
            Fetched::All(rows) => rows,
            _ => Vec::new(),
        }
    }

    #[must_use]
    pub fn is_none(&self) -> bool {
        matches!(self, Fetched::None)
    }
}

impl<S: RowShape> std::fmt::Debug for Fetched<'_, S>
where
    S::Output: std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Fetched::None => f.write_str("None"),
            Fetched::One(row) => f.debug_tuple("One").field(row).finish(),
            Fetched::All(rows) => f.debug_tuple("All").field(rows).finish(),
            Fetched::Iter(iter) => f.debug_tuple("Iter").field(iter).finish(),
        }
    }
}

/// Fetch exactly one row; zero or several rows yield `None`.
pub(crate) async fn fetch_one<S: RowShape>(
    cursor: &mut (dyn Cursor + '_),
) -> Result<Option<S::Output>, EasySqlError> {
    let Some(first) = cursor.next_row().await? else {
        return Ok(None);
    };
    if cursor.next_row().await?.is_some() {
        return Ok(None);
    }
    Ok(Some(S::shape(first, cursor.columns())))
}

/// Fetch every row in driver order.
pub(crate) async fn fetch_all<S: RowShape>(
    cursor: &mut (dyn Cursor + '_),
) -> Result<Vec<S::Output>, EasySqlError> {
    let mut rows = Vec::new();
    while let Some(row) = cursor.next_row().await? {
        rows.push(S::shape(row, cursor.columns()));
    }
    Ok(rows)
}

/// Lazy, forward-only sequence of shaped rows.
///
/// The iterator holds the connection's exclusive borrow until it is dropped, so no other
/// statement can run on that connection mid-traversal. Once exhausted (or after an error) it
/// keeps returning `None`; it cannot be restarted.
pub struct RowIter<'c, S: RowShape> {
    cursor: Option<Box<dyn Cursor + 'c>>,
    columns: Columns,
    _shape: PhantomData<fn() -> S>,
}

impl<'c, S: RowShape> RowIter<'c, S> {
    pub(crate) fn new(cursor: Box<dyn Cursor + 'c>) -> Self {
        let columns = cursor.columns().clone();
        Self {
            cursor: Some(cursor),
            columns,
            _shape: PhantomData,
        }
    }

    /// Column names of the underlying result set.
    #[must_use]
    pub fn columns(&self) -> &Columns {
        &self.columns
    }

    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.cursor.is_none()
    }

    /// Advance by one row.
    ///
    /// # Errors
    /// Propagates driver errors raised while fetching; the iterator is exhausted afterwards.
    pub async fn try_next(&mut self) -> Result<Option<S::Output>, EasySqlError> {
        let Some(cursor) = self.cursor.as_mut() else {
            return Ok(None);
        };
        match cursor.next_row().await {
            Ok(Some(row)) => Ok(Some(S::shape(row, &self.columns))),
            Ok(None) => {
                self.cursor = None;
                Ok(None)
            }
            Err(err) => {
                self.cursor = None;
                Err(err)
            }
        }
    }

    /// Drain the remaining rows into a vector.
    ///
    /// # Errors
    /// Propagates the first driver error.
    pub async fn collect_remaining(mut self) -> Result<Vec<S::Output>, EasySqlError> {
        let mut rows = Vec::new();
        while let Some(row) = self.try_next().await? {
            rows.push(row);
        }
        Ok(rows)
    }

    /// Adapt the iterator into a [`Stream`].
    pub fn into_stream(self) -> impl Stream<Item = Result<S::Output, EasySqlError>> + 'c
    where
        S: 'c,
    {
        stream::try_unfold(self, |mut iter| async move {
            Ok::<_, EasySqlError>(iter.try_next().await?.map(|row| (row, iter)))
        })
    }
}

impl<S: RowShape> std::fmt::Debug for RowIter<'_, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RowIter")
            .field("columns", &self.columns)
            .field("exhausted", &self.is_exhausted())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Arc;

    use async_trait::async_trait;
    use futures_util::TryStreamExt;

    use super::*;
    use crate::shape::{AsRecord, AsTuple, TupleRow};
    use crate::types::SqlValue;

    struct VecCursor {
        columns: Columns,
        rows: VecDeque<Vec<SqlValue>>,
        fail_after: Option<usize>,
        served: usize,
    }

    impl VecCursor {
        fn new(columns: &[&str], rows: Vec<Vec<i64>>) -> Self {
            Self {
                columns: Arc::new(columns.iter().map(ToString::to_string).collect()),
                rows: rows
                    .into_iter()
                    .map(|r| r.into_iter().map(SqlValue::Int).collect())
                    .collect(),
                fail_after: None,
                served: 0,
            }
        }
    }

    #[async_trait]
    impl Cursor for VecCursor {
        fn columns(&self) -> &Columns {
            &self.columns
        }

        async fn next_row(&mut self) -> Result<Option<Vec<SqlValue>>, EasySqlError> {
            if self.fail_after == Some(self.served) {
                return Err(EasySqlError::ConnectionError("lost".into()));
            }
            self.served += 1;
            Ok(self.rows.pop_front())
        }

        fn rows_affected(&self) -> Option<u64> {
            None
        }
    }

    #[tokio::test]
    async fn one_with_single_row_is_shaped() {
        let mut cursor = VecCursor::new(&["id"], vec![vec![1]]);
        let row = fetch_one::<AsTuple>(&mut cursor).await.unwrap();
        assert_eq!(row, Some(TupleRow::Scalar(SqlValue::Int(1))));
    }

    #[tokio::test]
    async fn one_with_zero_or_many_rows_is_none() {
        let mut empty = VecCursor::new(&["id"], vec![]);
        assert!(fetch_one::<AsTuple>(&mut empty).await.unwrap().is_none());

        let mut many = VecCursor::new(&["id"], vec![vec![1], vec![2]]);
        assert!(fetch_one::<AsRecord>(&mut many).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn all_with_zero_rows_is_empty() {
        let mut cursor = VecCursor::new(&["id"], vec![]);
        assert!(fetch_all::<AsTuple>(&mut cursor).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn all_preserves_driver_order() {
        let mut cursor = VecCursor::new(&["a", "b"], vec![vec![3, 4], vec![1, 2]]);
        let rows = fetch_all::<AsTuple>(&mut cursor).await.unwrap();
        assert_eq!(
            rows,
            vec![
                TupleRow::Tuple(vec![SqlValue::Int(3), SqlValue::Int(4)]),
                TupleRow::Tuple(vec![SqlValue::Int(1), SqlValue::Int(2)]),
            ]
        );
    }

    #[tokio::test]
    async fn iter_yields_each_row_then_stays_exhausted() {
        let cursor = VecCursor::new(&["n"], vec![vec![1], vec![2], vec![3]]);
        let mut iter = RowIter::<AsTuple>::new(Box::new(cursor));
        let mut seen = Vec::new();
        while let Some(row) = iter.try_next().await.unwrap() {
            seen.push(row.into_scalar().unwrap());
        }
        assert_eq!(seen, vec![SqlValue::Int(1), SqlValue::Int(2), SqlValue::Int(3)]);
        assert!(iter.is_exhausted());
        assert!(iter.try_next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn iter_error_ends_the_sequence() {
        let mut cursor = VecCursor::new(&["n"], vec![vec![1], vec![2]]);
        cursor.fail_after = Some(1);
        let mut iter = RowIter::<AsTuple>::new(Box::new(cursor));
        assert!(iter.try_next().await.unwrap().is_some());
        assert!(iter.try_next().await.is_err());
        assert!(iter.try_next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn stream_adapter_collects_records() {
        let cursor = VecCursor::new(&["id"], vec![vec![5], vec![6]]);
        let iter = RowIter::<AsRecord>::new(Box::new(cursor));
        let records: Vec<_> = iter.into_stream().try_collect().await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].attr("id").unwrap(), &SqlValue::Int(6));
    }
}
