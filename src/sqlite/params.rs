use rusqlite::Statement;
use rusqlite::types::Value;

use crate::error::EasySqlError;
use crate::params::{ParamKey, Params};
use crate::types::SqlValue;

/// Prefixes `SQLite` accepts for named parameters, tried in this order.
const NAME_PREFIXES: [char; 3] = [':', '@', '$'];

/// Convert a single `SqlValue` to a rusqlite `Value`.
///
/// `SQLite` has no boolean, timestamp or JSON storage class: booleans become 0/1, timestamps
/// `YYYY-MM-DD HH:MM:SS[.fff]` text and JSON its serialized text.
#[must_use]
pub fn sql_value_to_sqlite_value(value: &SqlValue) -> Value {
    match value {
        SqlValue::Int(i) => Value::Integer(*i),
        SqlValue::Float(f) => Value::Real(*f),
        SqlValue::Text(s) => Value::Text(s.clone()),
        SqlValue::Bool(b) => Value::Integer(i64::from(*b)),
        SqlValue::Timestamp(dt) => Value::Text(dt.format("%F %T%.f").to_string()),
        SqlValue::Null => Value::Null,
        SqlValue::JSON(jval) => Value::Text(jval.to_string()),
        SqlValue::Blob(bytes) => Value::Blob(bytes.clone()),
    }
}

/// Bind a normalized parameter set to a prepared statement.
///
/// Tuples must match the statement's parameter count exactly. Mappings bind `Index(i)` to
/// position `i + 1` and each name to the `:name`, `@name` or `$name` parameter; names the
/// statement does not use are ignored, but every parameter of the statement must receive a
/// value.
///
/// # Errors
/// Returns `EasySqlError::SqliteError` for a tuple of the wrong length and
/// `EasySqlError::ParameterError` when a mapping leaves a parameter unbound or names a position
/// past the end of the statement.
pub fn bind_params(stmt: &mut Statement<'_>, params: &Params) -> Result<(), EasySqlError> {
    let expected = stmt.parameter_count();
    match params {
        Params::Tuple(values) => {
            if values.len() != expected {
                return Err(rusqlite::Error::InvalidParameterCount(values.len(), expected).into());
            }
            for (i, value) in values.iter().enumerate() {
                stmt.raw_bind_parameter(i + 1, sql_value_to_sqlite_value(value))?;
            }
        }
        Params::Map(map) => {
            let mut bound = vec![false; expected];
            for (key, value) in map {
                let position = match key {
                    ParamKey::Index(i) if *i < expected => Some(i + 1),
                    ParamKey::Index(i) => {
                        return Err(EasySqlError::ParameterError(format!(
                            "positional parameter #{i} is out of range; statement takes {expected}"
                        )));
                    }
                    ParamKey::Name(name) => named_position(stmt, name)?,
                };
                if let Some(position) = position {
                    stmt.raw_bind_parameter(position, sql_value_to_sqlite_value(value))?;
                    bound[position - 1] = true;
                }
            }
            if let Some(missing) = bound.iter().position(|b| !b) {
                let label = stmt
                    .parameter_name(missing + 1)
                    .map_or_else(|| format!("?{}", missing + 1), ToString::to_string);
                return Err(EasySqlError::ParameterError(format!(
                    "no value supplied for placeholder {label}"
                )));
            }
        }
    }
    Ok(())
}

fn named_position(stmt: &Statement<'_>, name: &str) -> Result<Option<usize>, EasySqlError> {
    for prefix in NAME_PREFIXES {
        if let Some(position) = stmt.parameter_index(&format!("{prefix}{name}"))? {
            return Ok(Some(position));
        }
    }
    Ok(None)
}
