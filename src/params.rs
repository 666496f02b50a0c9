//! Call-style arguments and their normalization into one parameter set.
//!
//! Every query operation accepts `impl Into<Args>`. A single argument converts directly:
//! ```rust
//! use easy_sql::prelude::*;
//!
//! // one scalar -> one-element tuple
//! assert_eq!(Args::from(5).normalize()?, Params::Tuple(vec![SqlValue::Int(5)]));
//! // a list -> tuple
//! assert_eq!(
//!     Args::from(vec![1, 2]).normalize()?,
//!     Params::Tuple(vec![SqlValue::Int(1), SqlValue::Int(2)])
//! );
//! // positional plus named -> map keyed by index and name
//! let params = args![1, 2, a = 3].normalize()?;
//! assert_eq!(params.get(&ParamKey::Index(1)), Some(&SqlValue::Int(2)));
//! assert_eq!(params.get(&ParamKey::from("a")), Some(&SqlValue::Int(3)));
//! # Ok::<(), EasySqlError>(())
//! ```

use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDateTime;
use serde_json::Value as JsonValue;

use crate::error::EasySqlError;
use crate::types::SqlValue;

/// Key of a mapping parameter set.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ParamKey {
    /// 0-based position, bound to the positional placeholder `index + 1`.
    Index(usize),
    /// Name, bound to the named placeholder `:name`.
    Name(String),
}

impl From<usize> for ParamKey {
    fn from(index: usize) -> Self {
        ParamKey::Index(index)
    }
}

impl From<&str> for ParamKey {
    fn from(name: &str) -> Self {
        ParamKey::Name(name.to_string())
    }
}

impl From<String> for ParamKey {
    fn from(name: String) -> Self {
        ParamKey::Name(name)
    }
}

impl std::fmt::Display for ParamKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParamKey::Index(i) => write!(f, "#{i}"),
            ParamKey::Name(n) => write!(f, ":{n}"),
        }
    }
}

/// Normalized parameter set handed to a driver.
#[derive(Debug, Clone, PartialEq)]
pub enum Params {
    /// Ordered values bound to positional placeholders.
    Tuple(Vec<SqlValue>),
    /// Values keyed by position index and/or name.
    Map(BTreeMap<ParamKey, SqlValue>),
}

impl Default for Params {
    fn default() -> Self {
        Params::Tuple(Vec::new())
    }
}

impl Params {
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Params::Tuple(values) => values.len(),
            Params::Map(map) => map.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn is_map(&self) -> bool {
        matches!(self, Params::Map(_))
    }

    /// Look a value up by key. Tuples answer `Index` keys only.
    #[must_use]
    pub fn get(&self, key: &ParamKey) -> Option<&SqlValue> {
        match (self, key) {
            (Params::Tuple(values), ParamKey::Index(i)) => values.get(*i),
            (Params::Tuple(_), ParamKey::Name(_)) => None,
            (Params::Map(map), key) => map.get(key),
        }
    }

    /// Convert to the mapping form, keying tuple entries by their 0-based position.
    #[must_use]
    pub fn into_map(self) -> BTreeMap<ParamKey, SqlValue> {
        match self {
            Params::Tuple(values) => values
                .into_iter()
                .enumerate()
                .map(|(i, v)| (ParamKey::Index(i), v))
                .collect(),
            Params::Map(map) => map,
        }
    }
}

/// One positional argument of a query call, tagged by its shape.
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    /// A single value.
    Value(SqlValue),
    /// An ordered sequence (Rust `Vec`/slice).
    List(Vec<SqlValue>),
    /// A fixed-size tuple.
    Tuple(Vec<SqlValue>),
    /// A mapping.
    Map(BTreeMap<ParamKey, SqlValue>),
}

impl Arg {
    fn kind(&self) -> &'static str {
        match self {
            Arg::Value(_) => "value",
            Arg::List(_) => "list",
            Arg::Tuple(_) => "tuple",
            Arg::Map(_) => "map",
        }
    }
}

/// The arguments of one query call: positional arguments followed by named ones.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Args {
    positional: Vec<Arg>,
    named: Vec<(String, SqlValue)>,
}

impl Args {
    /// A call without arguments.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a positional argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<Arg>) -> Self {
        self.positional.push(arg.into());
        self
    }

    /// Append a named argument.
    #[must_use]
    pub fn named(mut self, name: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        self.named.push((name.into(), value.into()));
        self
    }

    #[doc(hidden)]
    pub fn push_arg(&mut self, arg: impl Into<Arg>) {
        self.positional.push(arg.into());
    }

    #[doc(hidden)]
    pub fn push_named(&mut self, name: &str, value: impl Into<SqlValue>) {
        self.named.push((name.to_string(), value.into()));
    }

    #[must_use]
    pub fn positional(&self) -> &[Arg] {
        &self.positional
    }

    #[must_use]
    pub fn named_args(&self) -> &[(String, SqlValue)] {
        &self.named
    }

    /// Collapse the call into a single parameter set.
    ///
    /// 1. A lone positional map or tuple is used as-is, a lone list becomes a tuple and a
    ///    lone value becomes a one-element tuple.
    /// 2. Zero or several positional arguments form a tuple.
    /// 3. Named arguments turn a tuple into a map keyed by position, then merge in call order.
    ///    `Name("0")` and `Index(0)` are different keys.
    ///
    /// # Errors
    /// Returns `EasySqlError::ParameterError` when a list, tuple or map appears among several
    /// positional arguments.
    pub fn normalize(self) -> Result<Params, EasySqlError> {
        let Args { positional, named } = self;

        let params = if positional.len() == 1 {
            match positional.into_iter().next() {
                Some(Arg::Map(map)) => Params::Map(map),
                Some(Arg::Tuple(values) | Arg::List(values)) => Params::Tuple(values),
                Some(Arg::Value(value)) => Params::Tuple(vec![value]),
                None => Params::default(),
            }
        } else {
            let mut values = Vec::with_capacity(positional.len());
            for (idx, arg) in positional.into_iter().enumerate() {
                match arg {
                    Arg::Value(value) => values.push(value),
                    other => {
                        return Err(EasySqlError::ParameterError(format!(
                            "positional argument {idx} is a {}; only single values can be \
                             combined with other positional arguments",
                            other.kind()
                        )));
                    }
                }
            }
            Params::Tuple(values)
        };

        if named.is_empty() {
            return Ok(params);
        }

        let mut map = params.into_map();
        for (name, value) in named {
            map.insert(ParamKey::Name(name), value);
        }
        Ok(Params::Map(map))
    }
}

impl From<Params> for Args {
    fn from(params: Params) -> Self {
        let arg = match params {
            Params::Tuple(values) => Arg::Tuple(values),
            Params::Map(map) => Arg::Map(map),
        };
        Args::new().arg(arg)
    }
}

impl From<()> for Args {
    fn from((): ()) -> Self {
        Args::new()
    }
}

impl From<Arg> for Args {
    fn from(arg: Arg) -> Self {
        Args::new().arg(arg)
    }
}

macro_rules! impl_scalar_arg {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for Arg {
                fn from(value: $ty) -> Self {
                    Arg::Value(value.into())
                }
            }

            impl From<$ty> for Args {
                fn from(value: $ty) -> Self {
                    Args::new().arg(value)
                }
            }
        )*
    };
}

impl_scalar_arg!(
    SqlValue,
    i64,
    i32,
    i16,
    u32,
    f64,
    f32,
    bool,
    String,
    &str,
    &String,
    NaiveDateTime,
    JsonValue,
);

impl<T: Into<SqlValue>> From<Option<T>> for Arg {
    fn from(value: Option<T>) -> Self {
        Arg::Value(value.into())
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for Args {
    fn from(value: Option<T>) -> Self {
        Args::new().arg(value)
    }
}

impl<T: Into<SqlValue>> From<Vec<T>> for Arg {
    fn from(values: Vec<T>) -> Self {
        Arg::List(values.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<SqlValue>> From<Vec<T>> for Args {
    fn from(values: Vec<T>) -> Self {
        Args::new().arg(values)
    }
}

impl<T: Into<SqlValue> + Clone> From<&[T]> for Arg {
    fn from(values: &[T]) -> Self {
        Arg::List(values.iter().cloned().map(Into::into).collect())
    }
}

impl<T: Into<SqlValue> + Clone> From<&[T]> for Args {
    fn from(values: &[T]) -> Self {
        Args::new().arg(values)
    }
}

impl<K: Into<ParamKey>, V: Into<SqlValue>> From<BTreeMap<K, V>> for Arg {
    fn from(map: BTreeMap<K, V>) -> Self {
        Arg::Map(map.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl<K: Into<ParamKey>, V: Into<SqlValue>> From<BTreeMap<K, V>> for Args {
    fn from(map: BTreeMap<K, V>) -> Self {
        Args::new().arg(map)
    }
}

impl<K: Into<ParamKey>, V: Into<SqlValue>, S> From<HashMap<K, V, S>> for Arg {
    fn from(map: HashMap<K, V, S>) -> Self {
        Arg::Map(map.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl<K: Into<ParamKey>, V: Into<SqlValue>, S> From<HashMap<K, V, S>> for Args {
    fn from(map: HashMap<K, V, S>) -> Self {
        Args::new().arg(map)
    }
}

macro_rules! impl_tuple_arg {
    ($($name:ident),+) => {
        impl<$($name: Into<SqlValue>),+> From<($($name,)+)> for Arg {
            #[allow(non_snake_case)]
            fn from(($($name,)+): ($($name,)+)) -> Self {
                Arg::Tuple(vec![$($name.into()),+])
            }
        }

        impl<$($name: Into<SqlValue>),+> From<($($name,)+)> for Args {
            fn from(tuple: ($($name,)+)) -> Self {
                Args::new().arg(tuple)
            }
        }
    };
}

impl_tuple_arg!(A);
impl_tuple_arg!(A, B);
impl_tuple_arg!(A, B, C);
impl_tuple_arg!(A, B, C, D);
impl_tuple_arg!(A, B, C, D, E);
impl_tuple_arg!(A, B, C, D, E, F);
impl_tuple_arg!(A, B, C, D, E, F, G);
impl_tuple_arg!(A, B, C, D, E, F, G, H);

/// Build [`Args`] from a mix of positional and `name = value` arguments.
///
/// ```rust
/// use easy_sql::prelude::*;
///
/// let call = args![1, "two", flag = true];
/// assert_eq!(call.positional().len(), 2);
/// assert_eq!(call.named_args().len(), 1);
/// ```
#[macro_export]
macro_rules! args {
    (@push $args:ident;) => {};
    (@push $args:ident; $name:ident = $value:expr $(, $($rest:tt)*)?) => {
        $args.push_named(stringify!($name), $value);
        $crate::args!(@push $args; $($($rest)*)?);
    };
    (@push $args:ident; $value:expr $(, $($rest:tt)*)?) => {
        $args.push_arg($value);
        $crate::args!(@push $args; $($($rest)*)?);
    };
    () => { $crate::params::Args::new() };
    ($($rest:tt)+) => {{
        let mut __args = $crate::params::Args::new();
        $crate::args!(@push __args; $($rest)+);
        __args
    }};
}
