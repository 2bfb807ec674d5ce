//! simpledb: a minimal, synchronous SQL access layer.
//!
//! Statements are composed from fragments with positional `?` parameters,
//! executed on the calling context's own connection, and returned as generic
//! [`RawRow`]s, single values, or records implementing [`FromRow`].
//!
//! ```no_run
//! use simpledb::{DbConfig, SimpleDb};
//!
//! # fn main() -> simpledb::Result<()> {
//! let db = SimpleDb::new(DbConfig::local("app.db"))?;
//! db.set_dev_mode(true);
//!
//! let id = db
//!     .gen_sql()
//!     .append("INSERT INTO article (createdDate, modifiedDate, title, body, isBlind)", ())
//!     .append("VALUES (datetime('now'), datetime('now'), ?, ?, ?)", ("title", "body", false))
//!     .insert()?;
//!
//! let title = db
//!     .gen_sql()
//!     .append("SELECT title FROM article WHERE id = ?", (id,))
//!     .select_string()?;
//! assert_eq!(title.as_deref(), Some("title"));
//! # Ok(()) }
//! ```

// Core infrastructure modules
pub mod core;

// Feature-specific modules
pub mod config;
pub mod db;
pub mod record;
pub mod row;
pub mod sql;

#[cfg(test)]
mod test_utils;

pub use crate::config::DbConfig;
pub use crate::core::db::{ContextId, TransactionMode, TransactionState};
pub use crate::core::{DbError, Result};
pub use crate::db::{ContextHandle, SimpleDb};
pub use crate::record::{FromRow, FromValue};
pub use crate::row::{RawRow, Value};
pub use crate::sql::{IntoParams, Sql};
