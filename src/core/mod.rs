/// Core Module for simpledb
///
/// Shared infrastructure for the access layer: error handling and the
/// connection/execution machinery that sits under the public `Sql` builder.

pub mod db;
pub mod error;

// Re-export commonly used types for convenience
pub use error::{DbError, Result};
