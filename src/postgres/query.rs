use std::error::Error;
use std::pin::Pin;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use futures_util::TryStreamExt;
use rust_decimal::Decimal;
use serde_json::Value;
use tokio_postgres::RowStream;
use tokio_postgres::types::{FromSql, Kind, Type};
use uuid::Uuid;

use crate::driver::Cursor;
use crate::error::EasySqlError;
use crate::shape::Columns;
use crate::types::SqlValue;

/// Streaming cursor over the rows of one `tokio-postgres` portal.
pub struct PgCursor {
    stream: Pin<Box<RowStream>>,
    columns: Columns,
    done: bool,
}

impl PgCursor {
    pub(crate) fn new(stream: RowStream, columns: Columns) -> Self {
        Self {
            stream: Box::pin(stream),
            columns,
            done: false,
        }
    }
}

#[async_trait]
impl Cursor for PgCursor {
    fn columns(&self) -> &Columns {
        &self.columns
    }

    async fn next_row(&mut self) -> Result<Option<Vec<SqlValue>>, EasySqlError> {
        if self.done {
            return Ok(None);
        }
        match self.stream.try_next().await? {
            Some(row) => {
                let mut values = Vec::with_capacity(row.len());
                for idx in 0..row.len() {
                    values.push(postgres_extract_value(&row, idx)?);
                }
                Ok(Some(values))
            }
            None => {
                self.done = true;
                Ok(None)
            }
        }
    }

    async fn drain(&mut self) -> Result<(), EasySqlError> {
        while !self.done {
            if self.stream.try_next().await?.is_none() {
                self.done = true;
            }
        }
        Ok(())
    }

    fn rows_affected(&self) -> Option<u64> {
        self.stream.rows_affected()
    }
}

/// Extracts a `SqlValue` from a `tokio_postgres` Row at the given index.
///
/// Every column type decodes: see [`PgValue`] for the mapping.
///
/// # Errors
/// Returns `EasySqlError::PostgresError` if the column bytes are malformed for their type.
pub fn postgres_extract_value(
    row: &tokio_postgres::Row,
    idx: usize,
) -> Result<SqlValue, EasySqlError> {
    Ok(row.try_get::<_, PgValue>(idx)?.0)
}

/// A column value read as a [`SqlValue`], accepting any server type.
///
/// - integers, floats, booleans, timestamps, dates, JSON and `bytea` map to their variants
/// - `numeric` becomes exact decimal text (`NaN` and the infinities included)
/// - `uuid` becomes hyphenated text, `time` becomes `HH:MM:SS[.f]` text
/// - `void` is `Null`
/// - one-dimensional arrays become a JSON array of their decoded elements
/// - text-like types (enums, `citext`, `xml`, ...) become text, anything else raw bytes
#[derive(Debug)]
pub struct PgValue(pub SqlValue);

type DecodeResult<T> = Result<T, Box<dyn Error + Sync + Send>>;

impl<'a> FromSql<'a> for PgValue {
    fn from_sql(ty: &Type, raw: &'a [u8]) -> DecodeResult<Self> {
        let value = match *ty {
            Type::INT2 => SqlValue::Int(i64::from(i16::from_sql(ty, raw)?)),
            Type::INT4 => SqlValue::Int(i64::from(i32::from_sql(ty, raw)?)),
            Type::INT8 => SqlValue::Int(i64::from_sql(ty, raw)?),
            Type::OID => SqlValue::Int(i64::from(u32::from_sql(ty, raw)?)),
            Type::FLOAT4 => SqlValue::Float(f64::from(f32::from_sql(ty, raw)?)),
            Type::FLOAT8 => SqlValue::Float(f64::from_sql(ty, raw)?),
            Type::NUMERIC => decode_numeric(ty, raw),
            Type::BOOL => SqlValue::Bool(bool::from_sql(ty, raw)?),
            Type::TIMESTAMP => SqlValue::Timestamp(NaiveDateTime::from_sql(ty, raw)?),
            Type::TIMESTAMPTZ => {
                SqlValue::Timestamp(DateTime::<Utc>::from_sql(ty, raw)?.naive_utc())
            }
            Type::DATE => {
                SqlValue::Timestamp(NaiveDate::from_sql(ty, raw)?.and_time(NaiveTime::MIN))
            }
            Type::TIME => SqlValue::Text(
                NaiveTime::from_sql(ty, raw)?
                    .format("%H:%M:%S%.f")
                    .to_string(),
            ),
            Type::UUID => SqlValue::Text(Uuid::from_sql(ty, raw)?.hyphenated().to_string()),
            Type::JSON | Type::JSONB => SqlValue::JSON(Value::from_sql(ty, raw)?),
            Type::BYTEA => SqlValue::Blob(raw.to_vec()),
            Type::VOID => SqlValue::Null,
            _ if matches!(ty.kind(), Kind::Array(_)) => decode_array(ty, raw)?,
            _ => decode_fallback(ty, raw),
        };
        Ok(Self(value))
    }

    fn from_sql_null(_ty: &Type) -> DecodeResult<Self> {
        Ok(Self(SqlValue::Null))
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }
}

fn decode_numeric(ty: &Type, raw: &[u8]) -> SqlValue {
    match Decimal::from_sql(ty, raw) {
        Ok(decimal) => SqlValue::Text(decimal.to_string()),
        Err(_) => numeric_special(raw).map_or_else(
            || SqlValue::Blob(raw.to_vec()),
            |text| SqlValue::Text(text.to_string()),
        ),
    }
}

/// `NaN` and the infinities, which have no `Decimal` form. The sign word sits at bytes 4..6.
fn numeric_special(raw: &[u8]) -> Option<&'static str> {
    let sign = u16::from_be_bytes([*raw.get(4)?, *raw.get(5)?]);
    match sign {
        0xC000 => Some("NaN"),
        0xD000 => Some("Infinity"),
        0xF000 => Some("-Infinity"),
        _ => None,
    }
}

fn decode_array(ty: &Type, raw: &[u8]) -> DecodeResult<SqlValue> {
    // multi-dimensional arrays are rejected by `Vec::from_sql`
    let Ok(items) = Vec::<PgValue>::from_sql(ty, raw) else {
        return Ok(SqlValue::Blob(raw.to_vec()));
    };
    let items: Vec<SqlValue> = items.into_iter().map(|item| item.0).collect();
    Ok(SqlValue::JSON(serde_json::to_value(items)?))
}

fn decode_fallback(ty: &Type, raw: &[u8]) -> SqlValue {
    if <String as FromSql<'_>>::accepts(ty)
        && let Ok(text) = String::from_sql(ty, raw)
    {
        return SqlValue::Text(text);
    }
    let textual =
        matches!(ty.kind(), Kind::Enum(_)) || matches!(*ty, Type::CHAR | Type::XML);
    match std::str::from_utf8(raw) {
        Ok(text) if textual => SqlValue::Text(text.to_string()),
        _ => SqlValue::Blob(raw.to_vec()),
    }
}

#[cfg(test)]
mod tests {
    use tokio_postgres::types::ToSql;
    use tokio_util::bytes::BytesMut;

    use super::*;

    fn decode(ty: &Type, raw: &[u8]) -> SqlValue {
        PgValue::from_sql(ty, raw).unwrap().0
    }

    #[test]
    fn numeric_decodes_to_exact_text() {
        // 1.5: ndigits 2, weight 0, sign +, dscale 1, digits [1, 5000]
        let raw = [0, 2, 0, 0, 0, 0, 0, 1, 0, 1, 0x13, 0x88];
        assert_eq!(decode(&Type::NUMERIC, &raw), SqlValue::Text("1.5".into()));

        let nan = [0, 0, 0, 0, 0xC0, 0, 0, 0];
        assert_eq!(decode(&Type::NUMERIC, &nan), SqlValue::Text("NaN".into()));
        let neg_inf = [0, 0, 0, 0, 0xF0, 0, 0, 0];
        assert_eq!(
            decode(&Type::NUMERIC, &neg_inf),
            SqlValue::Text("-Infinity".into())
        );
    }

    #[test]
    fn uuid_and_void() {
        let raw: Vec<u8> = (0..16).collect();
        assert_eq!(
            decode(&Type::UUID, &raw),
            SqlValue::Text("00010203-0405-0607-0809-0a0b0c0d0e0f".into())
        );
        assert_eq!(decode(&Type::VOID, &[]), SqlValue::Null);
        assert!(PgValue::from_sql_null(&Type::UUID).unwrap().0.is_null());
    }

    #[test]
    fn arrays_become_json() {
        let mut buf = BytesMut::new();
        vec![Some(1_i32), None, Some(3)]
            .to_sql(&Type::INT4_ARRAY, &mut buf)
            .unwrap();
        assert_eq!(
            decode(&Type::INT4_ARRAY, &buf),
            SqlValue::JSON(serde_json::json!([1, null, 3]))
        );
    }

    #[test]
    fn unfamiliar_types_degrade_instead_of_failing() {
        let mood = Type::new(
            "mood".into(),
            90_001,
            Kind::Enum(vec!["happy".into()]),
            "public".into(),
        );
        assert_eq!(decode(&mood, b"happy"), SqlValue::Text("happy".into()));
        assert_eq!(decode(&Type::TEXT, b"plain"), SqlValue::Text("plain".into()));

        let interval = [0, 0, 0, 0, 0, 0, 0, 1, 0, 0, 0, 0, 0, 0, 0, 0];
        assert_eq!(
            decode(&Type::INTERVAL, &interval),
            SqlValue::Blob(interval.to_vec())
        );
    }
}
