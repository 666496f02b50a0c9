use std::borrow::Cow;
use std::error::Error;

use tokio_postgres::types::{IsNull, ToSql, Type, to_sql_checked};
use tokio_util::bytes;

use crate::error::EasySqlError;
use crate::params::{ParamKey, Params};
use crate::translation::rewrite_named_placeholders;
use crate::types::SqlValue;

/// Statement text and the values for its `$N` placeholders, in placeholder order.
#[derive(Debug)]
pub struct BoundParams<'s, 'p> {
    pub sql: Cow<'s, str>,
    pub values: Vec<&'p SqlValue>,
}

/// Turn a normalized parameter set into positional values for `tokio-postgres`.
///
/// Tuples bind `$1..$n` directly. Mappings bind `Index(i)` to `$(i + 1)` and number each
/// `:name` placeholder after the highest index; names the statement never mentions are
/// ignored.
///
/// # Errors
/// Returns `EasySqlError::ParameterError` when index keys leave a gap or when the statement
/// references a name the mapping lacks.
pub fn bind_params<'s, 'p>(
    sql: &'s str,
    params: &'p Params,
) -> Result<BoundParams<'s, 'p>, EasySqlError> {
    let map = match params {
        Params::Tuple(values) => {
            return Ok(BoundParams {
                sql: Cow::Borrowed(sql),
                values: values.iter().collect(),
            });
        }
        Params::Map(map) => map,
    };

    let mut values = Vec::with_capacity(map.len());
    for (expected, (key, value)) in map.iter().enumerate() {
        match key {
            ParamKey::Index(i) if *i == expected => values.push(value),
            ParamKey::Index(i) => {
                return Err(EasySqlError::ParameterError(format!(
                    "positional parameter #{i} given without #{expected}"
                )));
            }
            // `Index` keys sort before `Name` keys
            ParamKey::Name(_) => break,
        }
    }

    let rewrite = rewrite_named_placeholders(sql, values.len() + 1);
    for name in &rewrite.names {
        let value = map.get(&ParamKey::Name(name.clone())).ok_or_else(|| {
            EasySqlError::ParameterError(format!("no value supplied for placeholder :{name}"))
        })?;
        values.push(value);
    }

    Ok(BoundParams {
        sql: rewrite.sql,
        values,
    })
}

fn checked<T: ToSql>(
    value: &T,
    ty: &Type,
    out: &mut bytes::BytesMut,
) -> Result<IsNull, Box<dyn Error + Sync + Send>> {
    if !T::accepts(ty) {
        return Err(format!(
            "cannot bind a {} value to a parameter of type {ty}",
            std::any::type_name::<T>()
        )
        .into());
    }
    value.to_sql(ty, out)
}

impl ToSql for SqlValue {
    fn to_sql(
        &self,
        ty: &Type,
        out: &mut bytes::BytesMut,
    ) -> Result<IsNull, Box<dyn Error + Sync + Send>> {
        match self {
            SqlValue::Int(i) => match *ty {
                Type::INT2 => i16::try_from(*i)?.to_sql(ty, out),
                Type::INT4 => i32::try_from(*i)?.to_sql(ty, out),
                Type::OID => u32::try_from(*i)?.to_sql(ty, out),
                _ => checked(i, ty, out),
            },
            #[allow(clippy::cast_possible_truncation)]
            SqlValue::Float(f) if *ty == Type::FLOAT4 => (*f as f32).to_sql(ty, out),
            SqlValue::Float(f) => checked(f, ty, out),
            SqlValue::Text(s) => checked(s, ty, out),
            SqlValue::Bool(b) => checked(b, ty, out),
            SqlValue::Timestamp(dt) => match *ty {
                Type::TIMESTAMPTZ => dt.and_utc().to_sql(ty, out),
                Type::DATE => dt.date().to_sql(ty, out),
                _ => checked(dt, ty, out),
            },
            SqlValue::Null => Ok(IsNull::Yes),
            SqlValue::JSON(v) => checked(v, ty, out),
            SqlValue::Blob(b) => checked(b, ty, out),
        }
    }

    // NULL binds to any column type; concrete values are checked per variant in `to_sql`
    fn accepts(_ty: &Type) -> bool {
        true
    }

    to_sql_checked!();
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    fn map(entries: Vec<(ParamKey, i64)>) -> Params {
        Params::Map(
            entries
                .into_iter()
                .map(|(k, v)| (k, SqlValue::Int(v)))
                .collect::<BTreeMap<_, _>>(),
        )
    }

    #[test]
    fn tuple_binds_in_order_without_rewriting() {
        let params = Params::Tuple(vec![SqlValue::Int(1), SqlValue::Int(2)]);
        let bound = bind_params("select $1, $2", &params).unwrap();
        assert!(matches!(bound.sql, Cow::Borrowed(_)));
        assert_eq!(bound.values, vec![&SqlValue::Int(1), &SqlValue::Int(2)]);
    }

    #[test]
    fn names_are_numbered_after_indexes() {
        let params = map(vec![
            (ParamKey::Index(0), 10),
            (ParamKey::Index(1), 20),
            (ParamKey::from("a"), 30),
            (ParamKey::from("unused"), 40),
        ]);
        let bound = bind_params("select $1, $2, :a, :a", &params).unwrap();
        assert_eq!(bound.sql, "select $1, $2, $3, $3");
        assert_eq!(
            bound.values,
            vec![&SqlValue::Int(10), &SqlValue::Int(20), &SqlValue::Int(30)]
        );
    }

    #[test]
    fn index_gap_is_rejected() {
        let params = map(vec![(ParamKey::Index(1), 1)]);
        let err = bind_params("select $2", &params).unwrap_err();
        assert!(matches!(err, EasySqlError::ParameterError(_)));
    }

    #[test]
    fn missing_name_is_rejected() {
        let params = map(vec![(ParamKey::from("a"), 1)]);
        let err = bind_params("select :a, :b", &params).unwrap_err();
        assert!(matches!(err, EasySqlError::ParameterError(msg) if msg.contains(":b")));
    }

    #[test]
    fn int_narrows_to_int4_and_rejects_overflow() {
        let mut out = bytes::BytesMut::new();
        SqlValue::Int(7).to_sql(&Type::INT4, &mut out).unwrap();
        assert_eq!(&out[..], &7_i32.to_be_bytes());
        assert!(SqlValue::Int(i64::MAX).to_sql(&Type::INT4, &mut out).is_err());
    }

    #[test]
    fn mismatched_variant_is_an_error_and_null_binds_anywhere() {
        let mut out = bytes::BytesMut::new();
        assert!(SqlValue::Bool(true).to_sql(&Type::INT8, &mut out).is_err());
        assert!(matches!(
            SqlValue::Null.to_sql(&Type::NUMERIC, &mut out),
            Ok(IsNull::Yes)
        ));
    }
}
