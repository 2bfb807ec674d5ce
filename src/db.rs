//! The database handle.
//!
//! [`SimpleDb`] holds the connection descriptor, the dev-mode switch and the
//! table of execution contexts. Every operation runs in some context: the
//! plain methods use the calling thread's [`ContextId::current`], and
//! [`SimpleDb::context`] gives a [`ContextHandle`] bound to an explicit id.

use crate::config::DbConfig;
use crate::core::db::connection::lock_context;
use crate::core::db::{ContextId, ContextTable, Executor, TransactionState};
use crate::core::Result;
use crate::sql::{IntoParams, Sql};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info};

/// Entry point of the access layer; share it between threads by reference or `Arc`.
#[derive(Debug)]
pub struct SimpleDb {
    config: DbConfig,
    dev_mode: AtomicBool,
    contexts: ContextTable,
}

impl SimpleDb {
    /// Creates a handle. No connection is opened until a context first needs one.
    pub fn new(config: DbConfig) -> Result<Self> {
        config.validate()?;
        debug!(database = %config.database, host = %config.host, "created database handle");
        Ok(SimpleDb {
            dev_mode: AtomicBool::new(config.dev_mode),
            config,
            contexts: ContextTable::new(),
        })
    }

    /// Creates a handle from a bare descriptor with default connection options.
    pub fn connect(host: &str, username: &str, password: &str, database: &str) -> Result<Self> {
        SimpleDb::new(DbConfig::new(host, username, password, database))
    }

    pub fn config(&self) -> &DbConfig {
        &self.config
    }

    /// Turns logging of every executed SQL text on or off.
    pub fn set_dev_mode(&self, dev_mode: bool) {
        self.dev_mode.store(dev_mode, Ordering::Relaxed);
    }

    pub fn dev_mode(&self) -> bool {
        self.dev_mode.load(Ordering::Relaxed)
    }

    /// Handle bound to an explicit execution context.
    pub fn context(&self, id: ContextId) -> ContextHandle<'_> {
        ContextHandle { db: self, id }
    }

    /// Handle bound to the calling thread's context.
    pub fn current(&self) -> ContextHandle<'_> {
        self.context(ContextId::current())
    }

    /// New statement builder in the calling thread's context.
    pub fn gen_sql(&self) -> Sql<'_> {
        self.current().gen_sql()
    }

    /// Executes a one-off statement, discarding any row count.
    pub fn run(&self, sql: &str, params: impl IntoParams) -> Result<()> {
        self.current().run(sql, params)
    }

    pub fn start_transaction(&self) -> Result<()> {
        self.current().start_transaction()
    }

    pub fn commit(&self) -> Result<()> {
        self.current().commit()
    }

    pub fn rollback(&self) -> Result<()> {
        self.current().rollback()
    }

    /// Closes the calling thread's connection and forgets its context.
    pub fn close(&self) -> Result<()> {
        self.current().close()
    }

    pub fn transaction_state(&self) -> TransactionState {
        self.current().transaction_state()
    }

    /// Number of contexts currently registered, open or not.
    pub fn open_contexts(&self) -> usize {
        self.contexts.len()
    }

    /// Runs `f` against the context's connection, opening it if needed.
    pub(crate) fn execute<T>(
        &self,
        context: ContextId,
        sql: &str,
        f: impl FnOnce(&Executor<'_>) -> Result<T>,
    ) -> Result<T> {
        let ctx = self.contexts.acquire(context)?;
        let mut guard = lock_context(&ctx)?;
        let connection = guard.connection(&self.config)?;

        if self.dev_mode() {
            info!(target: "simpledb::sql", context = %context, "{}", sql);
        }

        let executor = Executor::new(connection);
        f(&executor)
    }
}

/// A [`SimpleDb`] viewed from one execution context.
#[derive(Debug, Clone, Copy)]
pub struct ContextHandle<'a> {
    db: &'a SimpleDb,
    id: ContextId,
}

impl<'a> ContextHandle<'a> {
    pub fn id(&self) -> ContextId {
        self.id
    }

    pub fn gen_sql(&self) -> Sql<'a> {
        Sql::new(self.db, self.id)
    }

    pub fn run(&self, sql: &str, params: impl IntoParams) -> Result<()> {
        self.gen_sql().append(sql, params).update().map(|_| ())
    }

    /// Opens the context's connection if needed and begins a transaction.
    ///
    /// # Errors
    ///
    /// Returns `DbError::Transaction` if a transaction is already open.
    pub fn start_transaction(&self) -> Result<()> {
        let ctx = self.db.contexts.acquire(self.id)?;
        let mut guard = lock_context(&ctx)?;
        guard.begin(&self.db.config)
    }

    /// Commits the open transaction; a no-op when there is no connection.
    pub fn commit(&self) -> Result<()> {
        let Some(ctx) = self.db.contexts.get(self.id)? else {
            return Ok(());
        };
        let mut guard = lock_context(&ctx)?;
        guard.commit()
    }

    /// Rolls back the open transaction; a no-op when there is no connection.
    pub fn rollback(&self) -> Result<()> {
        let Some(ctx) = self.db.contexts.get(self.id)? else {
            return Ok(());
        };
        let mut guard = lock_context(&ctx)?;
        guard.rollback()
    }

    pub fn close(&self) -> Result<()> {
        self.db.contexts.release(self.id)
    }

    pub fn transaction_state(&self) -> TransactionState {
        match self.db.contexts.get(self.id) {
            Ok(Some(ctx)) => {
                let state = lock_context(&ctx).map(|c| c.transaction_state());
                state.unwrap_or_default()
            }
            _ => TransactionState::Autocommit,
        }
    }

    /// Whether this context currently holds a live connection.
    pub fn is_open(&self) -> bool {
        match self.db.contexts.get(self.id) {
            Ok(Some(ctx)) => {
                let open = lock_context(&ctx).map(|c| c.is_open());
                open.unwrap_or(false)
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::DbError;

    #[test]
    fn test_connect_success() {
        let db = SimpleDb::connect("localhost", "root", "pw", ":memory:").unwrap();
        assert_eq!(db.open_contexts(), 0);
        assert!(!db.dev_mode());
    }

    #[test]
    fn test_connect_rejects_invalid_config() {
        let result = SimpleDb::connect("localhost", "root", "pw", "  ");
        assert!(matches!(result, Err(DbError::Config(_))));
    }

    #[test]
    fn test_dev_mode_toggle() {
        let db = SimpleDb::new(DbConfig::local(":memory:").with_dev_mode(true)).unwrap();
        assert!(db.dev_mode());
        db.set_dev_mode(false);
        assert!(!db.dev_mode());
    }

    #[test]
    fn test_context_lifecycle() {
        let db = SimpleDb::new(DbConfig::local(":memory:")).unwrap();
        let ctx = db.context(ContextId::new());
        assert!(!ctx.is_open());

        assert_eq!(ctx.gen_sql().append("SELECT 1", ()).select_long().unwrap(), Some(1));
        assert!(ctx.is_open());
        assert_eq!(db.open_contexts(), 1);

        ctx.close().unwrap();
        assert!(!ctx.is_open());
        assert_eq!(db.open_contexts(), 0);

        // reopened lazily on next use
        assert_eq!(ctx.gen_sql().append("SELECT 2", ()).select_long().unwrap(), Some(2));
        assert!(ctx.is_open());
    }

    #[test]
    fn test_commit_and_rollback_without_context_are_noops() {
        let db = SimpleDb::new(DbConfig::local(":memory:")).unwrap();
        let ctx = db.context(ContextId::new());
        ctx.commit().unwrap();
        ctx.rollback().unwrap();
        assert_eq!(db.open_contexts(), 0);
    }

    #[test]
    fn test_start_transaction_twice_is_error() {
        let db = SimpleDb::new(DbConfig::local(":memory:")).unwrap();
        let ctx = db.context(ContextId::new());
        ctx.start_transaction().unwrap();
        assert_eq!(ctx.transaction_state(), TransactionState::InTransaction);
        assert!(matches!(ctx.start_transaction(), Err(DbError::Transaction(_))));
        ctx.rollback().unwrap();
        assert_eq!(ctx.transaction_state(), TransactionState::Autocommit);
    }
}
