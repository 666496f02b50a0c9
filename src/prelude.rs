//! Convenient imports for common functionality.
//!
//! `use easy_sql::prelude::*;` brings in the connection, the argument and row types and the
//! [`args!`](crate::args) macro.

pub use crate::args;
pub use crate::config::{ConnectOptions, ConnectOptionsBuilder};
pub use crate::connection::Connection;
pub use crate::driver::{Cursor, Driver};
pub use crate::error::EasySqlError;
pub use crate::executor::{FetchMode, Fetched, RowIter};
pub use crate::params::{Arg, Args, ParamKey, Params};
pub use crate::record::Record;
pub use crate::shape::{AsRecord, AsTuple, RowShape, TupleRow};
pub use crate::transaction::Transaction;
pub use crate::types::{Backend, SqlValue};

#[cfg(feature = "postgres")]
pub use crate::postgres::PostgresDriver;
#[cfg(feature = "sqlite")]
pub use crate::sqlite::SqliteDriver;
