use chrono::NaiveDateTime;
use clap::ValueEnum;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value as JsonValue;

/// Values that can be stored in a database row or used as query parameters.
///
/// The same enum is used by every backend, so shaping helpers never branch on driver types:
/// ```rust
/// use easy_sql::prelude::*;
///
/// let values = vec![
///     SqlValue::Int(1),
///     SqlValue::Text("alice".into()),
///     SqlValue::from(true),
///     SqlValue::from(None::<i64>),
/// ];
/// assert!(values[3].is_null());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    /// Integer value (64-bit)
    Int(i64),
    /// Floating point value (64-bit)
    Float(f64),
    /// Text/string value
    Text(String),
    /// Boolean value
    Bool(bool),
    /// Timestamp value
    Timestamp(NaiveDateTime),
    /// NULL value
    Null,
    /// JSON value
    JSON(JsonValue),
    /// Binary data
    Blob(Vec<u8>),
}

impl SqlValue {
    /// Check if this value is NULL
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub fn as_int(&self) -> Option<&i64> {
        if let SqlValue::Int(value) = self {
            Some(value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        if let SqlValue::Text(value) = self {
            Some(value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<&bool> {
        if let SqlValue::Bool(value) = self {
            return Some(value);
        } else if let Some(i) = self.as_int() {
            // SQLite stores booleans as 0/1
            if *i == 1 {
                return Some(&true);
            } else if *i == 0 {
                return Some(&false);
            }
        }
        None
    }

    #[must_use]
    pub fn as_timestamp(&self) -> Option<NaiveDateTime> {
        if let SqlValue::Timestamp(value) = self {
            return Some(*value);
        } else if let Some(s) = self.as_text() {
            if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
                return Some(dt);
            }
            if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
                return Some(dt);
            }
        }
        None
    }

    #[must_use]
    pub fn as_float(&self) -> Option<f64> {
        if let SqlValue::Float(value) = self {
            Some(*value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_json(&self) -> Option<&JsonValue> {
        if let SqlValue::JSON(value) = self {
            Some(value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_blob(&self) -> Option<&[u8]> {
        if let SqlValue::Blob(bytes) = self {
            Some(bytes)
        } else {
            None
        }
    }

    /// Build a value from JSON, keeping scalars as native variants and nesting as `JSON`.
    #[must_use]
    pub fn from_json(value: JsonValue) -> Self {
        match value {
            JsonValue::Null => SqlValue::Null,
            JsonValue::Bool(b) => SqlValue::Bool(b),
            JsonValue::Number(n) => match n.as_i64() {
                Some(i) => SqlValue::Int(i),
                None => n.as_f64().map_or(SqlValue::JSON(JsonValue::Number(n)), SqlValue::Float),
            },
            JsonValue::String(s) => SqlValue::Text(s),
            nested @ (JsonValue::Array(_) | JsonValue::Object(_)) => SqlValue::JSON(nested),
        }
    }
}

impl Serialize for SqlValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            SqlValue::Int(i) => serializer.serialize_i64(*i),
            SqlValue::Float(f) => serializer.serialize_f64(*f),
            SqlValue::Text(s) => serializer.serialize_str(s),
            SqlValue::Bool(b) => serializer.serialize_bool(*b),
            SqlValue::Timestamp(dt) => dt.serialize(serializer),
            SqlValue::Null => serializer.serialize_none(),
            SqlValue::JSON(json) => json.serialize(serializer),
            SqlValue::Blob(bytes) => serializer.serialize_bytes(bytes),
        }
    }
}

macro_rules! impl_from_scalar {
    ($($ty:ty => |$v:ident| $body:expr),* $(,)?) => {
        $(
            impl From<$ty> for SqlValue {
                fn from($v: $ty) -> Self {
                    $body
                }
            }
        )*
    };
}

impl_from_scalar! {
    i64 => |v| SqlValue::Int(v),
    i32 => |v| SqlValue::Int(i64::from(v)),
    i16 => |v| SqlValue::Int(i64::from(v)),
    u32 => |v| SqlValue::Int(i64::from(v)),
    f64 => |v| SqlValue::Float(v),
    f32 => |v| SqlValue::Float(f64::from(v)),
    bool => |v| SqlValue::Bool(v),
    String => |v| SqlValue::Text(v),
    &str => |v| SqlValue::Text(v.to_string()),
    &String => |v| SqlValue::Text(v.clone()),
    NaiveDateTime => |v| SqlValue::Timestamp(v),
    JsonValue => |v| SqlValue::JSON(v),
    Vec<u8> => |v| SqlValue::Blob(v),
    &[u8] => |v| SqlValue::Blob(v.to_vec()),
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(SqlValue::Null, Into::into)
    }
}

/// The database driver behind a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// `PostgreSQL` through `tokio-postgres`
    #[cfg(feature = "postgres")]
    Postgres,
    /// `SQLite` through `rusqlite`
    #[cfg(feature = "sqlite")]
    Sqlite,
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            #[cfg(feature = "postgres")]
            Backend::Postgres => f.write_str("postgres"),
            #[cfg(feature = "sqlite")]
            Backend::Sqlite => f.write_str("sqlite"),
        }
    }
}
