//! Row shaping: one raw row plus its column names in, a caller-friendly value out.

use std::sync::Arc;

use crate::record::Record;
use crate::types::SqlValue;

/// Column names reported by the driver for the active result set.
pub type Columns = Arc<Vec<String>>;

/// A row in tuple mode: single-column rows collapse to their only value.
#[derive(Debug, Clone, PartialEq)]
pub enum TupleRow {
    /// The row had exactly one column.
    Scalar(SqlValue),
    /// The row had zero or several columns, in column order.
    Tuple(Vec<SqlValue>),
}

impl TupleRow {
    #[must_use]
    pub fn as_scalar(&self) -> Option<&SqlValue> {
        match self {
            TupleRow::Scalar(value) => Some(value),
            TupleRow::Tuple(_) => None,
        }
    }

    #[must_use]
    pub fn into_scalar(self) -> Option<SqlValue> {
        match self {
            TupleRow::Scalar(value) => Some(value),
            TupleRow::Tuple(_) => None,
        }
    }

    #[must_use]
    pub fn as_tuple(&self) -> Option<&[SqlValue]> {
        match self {
            TupleRow::Tuple(values) => Some(values),
            TupleRow::Scalar(_) => None,
        }
    }

    /// All values of the row, whichever form it took.
    #[must_use]
    pub fn into_values(self) -> Vec<SqlValue> {
        match self {
            TupleRow::Scalar(value) => vec![value],
            TupleRow::Tuple(values) => values,
        }
    }
}

impl From<Vec<SqlValue>> for TupleRow {
    fn from(mut row: Vec<SqlValue>) -> Self {
        if row.len() == 1 {
            TupleRow::Scalar(row.remove(0))
        } else {
            TupleRow::Tuple(row)
        }
    }
}

/// Strategy turning a fetched row into an output value.
pub trait RowShape {
    type Output: Send;

    fn shape(row: Vec<SqlValue>, columns: &Columns) -> Self::Output;
}

/// Tuple mode: scalar for single-column rows, the ordered values otherwise.
#[derive(Debug, Clone, Copy)]
pub enum AsTuple {}

/// Record mode: always a [`Record`] keyed by column name, even for one column.
#[derive(Debug, Clone, Copy)]
pub enum AsRecord {}

impl RowShape for AsTuple {
    type Output = TupleRow;

    fn shape(row: Vec<SqlValue>, _columns: &Columns) -> TupleRow {
        TupleRow::from(row)
    }
}

impl RowShape for AsRecord {
    type Output = Record;

    fn shape(row: Vec<SqlValue>, columns: &Columns) -> Record {
        Record::from_row(columns, row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cols(names: &[&str]) -> Columns {
        Arc::new(names.iter().map(ToString::to_string).collect())
    }

    #[test]
    fn tuple_mode_unwraps_single_column() {
        let shaped = AsTuple::shape(vec![SqlValue::Int(1)], &cols(&["id"]));
        assert_eq!(shaped, TupleRow::Scalar(SqlValue::Int(1)));
        assert_eq!(shaped.into_values(), vec![SqlValue::Int(1)]);
    }

    #[test]
    fn tuple_mode_keeps_multi_column_rows() {
        let row = vec![SqlValue::Int(1), SqlValue::Int(2)];
        let shaped = AsTuple::shape(row.clone(), &cols(&["a", "b"]));
        assert_eq!(shaped, TupleRow::Tuple(row.clone()));
        assert_eq!(shaped.into_values(), row);
    }

    #[test]
    fn tuple_mode_keeps_empty_rows_as_tuples() {
        assert_eq!(AsTuple::shape(vec![], &cols(&[])), TupleRow::Tuple(vec![]));
    }

    #[test]
    fn record_mode_never_unwraps() {
        let record = AsRecord::shape(vec![SqlValue::Int(1)], &cols(&["id"]));
        assert_eq!(record.len(), 1);
        assert_eq!(record.attr("id").unwrap(), &SqlValue::Int(1));
    }

    #[test]
    fn record_mode_pairs_columns_in_order() {
        let record = AsRecord::shape(
            vec![SqlValue::Text("x".into()), SqlValue::Null],
            &cols(&["name", "email"]),
        );
        assert_eq!(record.keys().collect::<Vec<_>>(), vec!["name", "email"]);
        assert!(record["email"].is_null());
    }
}
