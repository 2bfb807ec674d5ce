/// Database Module
///
/// The low-level half of simpledb, split into two concerns:
/// - **Connection Management** (`connection.rs`): one lazily opened connection per
///   execution context, the context table, and per-context transaction state
/// - **Query Execution** (`query.rs`): binding, executing and turning driver
///   values into canonical `Value`s
///
/// All operations use the standardized `DbError` type.
pub mod connection;
pub mod query;

pub use connection::*;
pub use query::*;
