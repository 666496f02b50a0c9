use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::ops::Index;

use serde::de::DeserializeOwned;
use serde::{Serialize, Serializer, ser::SerializeMap};
use serde_json::Value as JsonValue;

use crate::error::EasySqlError;
use crate::types::SqlValue;

/// A result row whose fields are reachable by key and by attribute.
///
/// Map operations (`get`, `insert`, `remove`, `contains_key`) and attribute operations
/// (`attr`, `set_attr`, `del_attr`, `has_attr`) share one backing store, so writing through
/// one is immediately visible through the other. Entries keep insertion order, which for a
/// fetched row is the column order.
///
/// ```rust
/// use easy_sql::prelude::*;
///
/// let mut record = Record::new();
/// record.set_attr("id", 1);
/// assert_eq!(record.get("id"), Some(&SqlValue::Int(1)));
///
/// record.remove("id");
/// assert!(matches!(record.attr("id"), Err(EasySqlError::MissingKey(_))));
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    entries: Vec<(String, SqlValue)>,
}

impl Record {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
        }
    }

    /// Build a record from column names and the matching row values.
    #[must_use]
    pub fn from_row(columns: &[String], values: Vec<SqlValue>) -> Self {
        let mut record = Self::with_capacity(columns.len());
        for (name, value) in columns.iter().zip(values) {
            record.insert(name.clone(), value);
        }
        record
    }

    /// Copy the entries of an existing map; the source is left untouched.
    #[must_use]
    pub fn from_map<K, V, S>(source: &HashMap<K, V, S>) -> Self
    where
        K: AsRef<str>,
        V: Clone + Into<SqlValue>,
    {
        Self::from_map_with(source, std::iter::empty::<(String, SqlValue)>())
    }

    /// Copy an existing map and then apply `extra` entries on top of it.
    #[must_use]
    pub fn from_map_with<K, V, S, I, EK, EV>(source: &HashMap<K, V, S>, extra: I) -> Self
    where
        K: AsRef<str>,
        V: Clone + Into<SqlValue>,
        I: IntoIterator<Item = (EK, EV)>,
        EK: Into<String>,
        EV: Into<SqlValue>,
    {
        let mut record: Record = source
            .iter()
            .map(|(k, v)| (k.as_ref().to_string(), v.clone().into()))
            .collect();
        record.extend(extra);
        record
    }

    /// Build a record from the fields of any serializable value.
    ///
    /// Struct fields become entries in declaration order; scalar fields map to native
    /// variants and nested values are kept as `SqlValue::JSON`.
    ///
    /// # Errors
    /// Returns `EasySqlError::ParameterError` if the value does not serialize to an object.
    pub fn from_serialize<T: Serialize>(source: &T) -> Result<Self, EasySqlError> {
        match serde_json::to_value(source) {
            Ok(JsonValue::Object(fields)) => Ok(fields
                .into_iter()
                .map(|(k, v)| (k, SqlValue::from_json(v)))
                .collect()),
            Ok(other) => Err(EasySqlError::ParameterError(format!(
                "expected a struct or map, got {other}"
            ))),
            Err(e) => Err(EasySqlError::ParameterError(format!(
                "failed to serialize record source: {e}"
            ))),
        }
    }

    /// Deserialize the record into a typed value, field by field.
    ///
    /// # Errors
    /// Returns `EasySqlError::ParameterError` if the entries do not fit `T`.
    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T, EasySqlError> {
        let value = serde_json::to_value(self).map_err(|e| {
            EasySqlError::ParameterError(format!("failed to serialize record: {e}"))
        })?;
        serde_json::from_value(value)
            .map_err(|e| EasySqlError::ParameterError(format!("failed to deserialize record: {e}")))
    }

    fn position(&self, key: &str) -> Option<usize> {
        self.entries.iter().position(|(k, _)| k == key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&SqlValue> {
        self.position(key).map(|idx| &self.entries[idx].1)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut SqlValue> {
        self.position(key).map(|idx| &mut self.entries[idx].1)
    }

    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.position(key).is_some()
    }

    /// Insert or replace an entry, returning the previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<SqlValue>) -> Option<SqlValue> {
        let key = key.into();
        let value = value.into();
        match self.position(&key) {
            Some(idx) => Some(std::mem::replace(&mut self.entries[idx].1, value)),
            None => {
                self.entries.push((key, value));
                None
            }
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<SqlValue> {
        self.position(key).map(|idx| self.entries.remove(idx).1)
    }

    /// Read a field by attribute name.
    ///
    /// # Errors
    /// Returns `EasySqlError::MissingKey` if the field does not exist.
    pub fn attr(&self, name: &str) -> Result<&SqlValue, EasySqlError> {
        self.get(name)
            .ok_or_else(|| EasySqlError::MissingKey(name.to_string()))
    }

    /// Set a field by attribute name; identical to [`Record::insert`].
    pub fn set_attr(&mut self, name: impl Into<String>, value: impl Into<SqlValue>) {
        self.insert(name, value);
    }

    /// Delete a field by attribute name.
    ///
    /// # Errors
    /// Returns `EasySqlError::MissingKey` if the field does not exist.
    pub fn del_attr(&mut self, name: &str) -> Result<SqlValue, EasySqlError> {
        self.remove(name)
            .ok_or_else(|| EasySqlError::MissingKey(name.to_string()))
    }

    #[must_use]
    pub fn has_attr(&self, name: &str) -> bool {
        self.contains_key(name)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = &SqlValue> {
        self.entries.iter().map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SqlValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Copy the entries into a plain map.
    #[must_use]
    pub fn to_map(&self) -> BTreeMap<String, SqlValue> {
        self.entries.iter().cloned().collect()
    }
}

impl Index<&str> for Record {
    type Output = SqlValue;

    /// # Panics
    /// Panics if the key is absent; use [`Record::get`] or [`Record::attr`] to handle that case.
    fn index(&self, key: &str) -> &SqlValue {
        match self.get(key) {
            Some(value) => value,
            None => panic!("record has no field named {key:?}"),
        }
    }
}

impl<K: Into<String>, V: Into<SqlValue>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut record = Record::new();
        record.extend(iter);
        record
    }
}

impl<K: Into<String>, V: Into<SqlValue>> Extend<(K, V)> for Record {
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (k, v) in iter {
            self.insert(k, v);
        }
    }
}

impl IntoIterator for Record {
    type Item = (String, SqlValue);
    type IntoIter = std::vec::IntoIter<(String, SqlValue)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, v) in &self.entries {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (idx, (k, v)) in self.entries.iter().enumerate() {
            if idx > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{k:?}: {v:?}")?;
        }
        f.write_str("}")
    }
}
