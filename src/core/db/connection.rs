/// Connection Management Module
///
/// One connection per logical execution context. Contexts are keyed by
/// [`ContextId`] in a [`ContextTable`]; each [`ConnectionContext`] opens its
/// connection on first use, tracks its own transaction state, and is closed
/// only when the caller releases it.

use crate::config::DbConfig;
use crate::core::{DbError, Result};
use rusqlite::Connection;
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

/// Represents a context's transaction state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransactionState {
    /// No active transaction (autocommit mode)
    #[default]
    Autocommit,
    /// Transaction in progress
    InTransaction,
}

/// Locking behaviour of `BEGIN` when a context starts a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionMode {
    /// Locks are taken on first read/write
    #[default]
    Deferred,
    /// The write lock is taken at `BEGIN`
    Immediate,
    /// Readers are excluded as well
    Exclusive,
}

impl TransactionMode {
    fn begin_sql(self) -> &'static str {
        match self {
            TransactionMode::Deferred => "BEGIN DEFERRED",
            TransactionMode::Immediate => "BEGIN IMMEDIATE",
            TransactionMode::Exclusive => "BEGIN EXCLUSIVE",
        }
    }
}

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static THREAD_CONTEXT: ContextId = ContextId::new();
}

/// Key identifying a logical execution context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextId(u64);

impl ContextId {
    /// Allocates an id no other context has used in this process.
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        ContextId(NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// The id bound to the calling thread. Stable for the thread's lifetime.
    pub fn current() -> Self {
        THREAD_CONTEXT.with(|id| *id)
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ctx-{}", self.0)
    }
}

/// The per-context owner of at most one live connection
#[derive(Debug)]
pub struct ConnectionContext {
    id: ContextId,
    /// Active connection (None until first use or after close)
    connection: Option<Connection>,
    state: TransactionState,
}

impl ConnectionContext {
    pub fn new(id: ContextId) -> Self {
        ConnectionContext {
            id,
            connection: None,
            state: TransactionState::Autocommit,
        }
    }

    pub fn id(&self) -> ContextId {
        self.id
    }

    pub fn is_open(&self) -> bool {
        self.connection.is_some()
    }

    pub fn transaction_state(&self) -> TransactionState {
        self.state
    }

    /// Returns the context's connection, opening it on first use.
    pub fn connection(&mut self, config: &DbConfig) -> Result<&Connection> {
        if self.connection.is_none() {
            let conn = open_connection(config)?;
            debug!(context = %self.id, database = %config.database, "opened connection");
            self.connection = Some(conn);
            self.state = TransactionState::Autocommit;
        }
        self.connection
            .as_ref()
            .ok_or_else(|| DbError::Connection(format!("no connection for {}", self.id)))
    }

    /// Disables autocommit by opening a transaction.
    ///
    /// # Errors
    ///
    /// Returns `DbError::Transaction` if this context already has one open.
    /// A transaction the backend already ended (a raw `ROLLBACK`, or an error
    /// that forced one) no longer counts as open.
    pub fn begin(&mut self, config: &DbConfig) -> Result<()> {
        if self.state == TransactionState::InTransaction {
            let ended = self.connection.as_ref().map_or(true, Connection::is_autocommit);
            if !ended {
                return Err(DbError::Transaction(format!(
                    "transaction already in progress for {}",
                    self.id
                )));
            }
            debug!(context = %self.id, "transaction was ended by the backend");
            self.state = TransactionState::Autocommit;
        }

        let begin = config.transaction_mode.begin_sql();
        self.connection(config)?.execute_batch(begin)?;
        self.state = TransactionState::InTransaction;
        debug!(context = %self.id, "{}", begin);
        Ok(())
    }

    /// Commits the open transaction and returns to autocommit.
    ///
    /// A context without a connection, or without an open transaction, has
    /// nothing to commit and returns `Ok(())`.
    pub fn commit(&mut self) -> Result<()> {
        self.finish("COMMIT")
    }

    /// Rolls back the open transaction and returns to autocommit.
    pub fn rollback(&mut self) -> Result<()> {
        self.finish("ROLLBACK")
    }

    fn finish(&mut self, verb: &str) -> Result<()> {
        let Some(conn) = self.connection.as_ref() else {
            return Ok(());
        };

        if conn.is_autocommit() {
            let was_open = self.state == TransactionState::InTransaction;
            self.state = TransactionState::Autocommit;
            if was_open {
                return Err(DbError::Transaction(format!(
                    "transaction for {} was already ended by the backend",
                    self.id
                )));
            }
            return Ok(());
        }

        // a failed COMMIT leaves the transaction open; state stays as is
        conn.execute_batch(verb)?;
        self.state = TransactionState::Autocommit;
        debug!(context = %self.id, "{}", verb);
        Ok(())
    }

    /// Closes the connection. An open transaction is rolled back by the backend.
    pub fn close(&mut self) -> Result<()> {
        self.state = TransactionState::Autocommit;
        if let Some(conn) = self.connection.take() {
            conn.close().map_err(|(_, e)| DbError::connection(e))?;
            debug!(context = %self.id, "closed connection");
        }
        Ok(())
    }
}

/// Opens and configures a connection for the given descriptor.
fn open_connection(config: &DbConfig) -> Result<Connection> {
    if !config.is_local() {
        return Err(DbError::Connection(format!(
            "host '{}' is not reachable by the embedded backend",
            config.host
        )));
    }

    let conn = if config.is_memory() {
        Connection::open_in_memory()
    } else {
        Connection::open(&config.database)
    }
    .map_err(DbError::connection)?;

    conn.busy_timeout(config.busy_timeout)
        .map_err(DbError::connection)?;
    conn.pragma_update(None, "encoding", &config.encoding)
        .map_err(DbError::connection)?;
    conn.pragma_update(None, "foreign_keys", config.foreign_keys)
        .map_err(DbError::connection)?;
    conn.pragma_update_and_check(None, "journal_mode", &config.journal_mode, |row| {
        row.get::<_, String>(0)
    })
    .map_err(DbError::connection)?;

    Ok(conn)
}

/// Table of execution contexts, each with its own connection
#[derive(Debug, Default)]
pub struct ContextTable {
    contexts: Mutex<HashMap<ContextId, Arc<Mutex<ConnectionContext>>>>,
}

impl ContextTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the context for `id`, creating an unopened one if needed.
    pub fn acquire(&self, id: ContextId) -> Result<Arc<Mutex<ConnectionContext>>> {
        let mut contexts = self.lock()?;
        let ctx = contexts
            .entry(id)
            .or_insert_with(|| Arc::new(Mutex::new(ConnectionContext::new(id))));
        Ok(Arc::clone(ctx))
    }

    /// Returns the context for `id` only if it already exists.
    pub fn get(&self, id: ContextId) -> Result<Option<Arc<Mutex<ConnectionContext>>>> {
        Ok(self.lock()?.get(&id).cloned())
    }

    /// Removes the context from the table and closes its connection.
    pub fn release(&self, id: ContextId) -> Result<()> {
        let Some(ctx) = self.lock()?.remove(&id) else {
            return Ok(());
        };
        let mut guard = lock_context(&ctx)?;
        guard.close()
    }

    /// Number of contexts holding an entry.
    pub fn len(&self) -> usize {
        self.lock().map(|c| c.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<ContextId, Arc<Mutex<ConnectionContext>>>>> {
        self.contexts
            .lock()
            .map_err(|_| DbError::Connection("context table lock poisoned".to_string()))
    }
}

pub(crate) fn lock_context(ctx: &Mutex<ConnectionContext>) -> Result<MutexGuard<'_, ConnectionContext>> {
    ctx.lock()
        .map_err(|_| DbError::Connection("connection context lock poisoned".to_string()))
}
