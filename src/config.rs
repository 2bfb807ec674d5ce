use crate::core::db::TransactionMode;
use crate::core::{DbError, Result};
use serde::Deserialize;
use std::fmt;
use std::fs;
use std::path::Path;
use std::time::Duration;

const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5000;
const DEFAULT_JOURNAL_MODE: &str = "wal";
const DEFAULT_ENCODING: &str = "UTF-8";

const JOURNAL_MODES: &[&str] = &["delete", "truncate", "persist", "memory", "wal", "off"];
const ENCODINGS: &[&str] = &["UTF-8", "UTF-16", "UTF-16le", "UTF-16be"];
const LOCAL_HOSTS: &[&str] = &["", "localhost", "127.0.0.1", "::1"];

/// Top-level configuration structure parsed from a TOML file.
#[derive(Debug, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub connection: Option<ConnectionConfig>,
    pub logging: Option<LoggingConfig>,
}

/// Connection descriptor section.
#[derive(Debug, Deserialize)]
pub struct DatabaseConfig {
    pub host: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub name: String,
}

/// Per-connection options applied every time a context opens its connection.
#[derive(Debug, Deserialize)]
pub struct ConnectionConfig {
    pub busy_timeout_ms: Option<u64>,
    pub journal_mode: Option<String>,
    pub foreign_keys: Option<bool>,
    pub encoding: Option<String>,
    pub transaction_mode: Option<TransactionMode>,
}

/// Logging-related configuration.
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    pub dev_mode: Option<bool>,
}

impl Config {
    /// Resolves the optional sections into a validated [`DbConfig`].
    pub fn into_db_config(self) -> Result<DbConfig> {
        let db = self.database;
        let mut config = DbConfig::new(
            db.host.unwrap_or_else(|| "localhost".to_string()),
            db.username.unwrap_or_default(),
            db.password.unwrap_or_default(),
            db.name,
        );

        if let Some(conn) = self.connection {
            if let Some(ms) = conn.busy_timeout_ms {
                config.busy_timeout = Duration::from_millis(ms);
            }
            if let Some(mode) = conn.journal_mode {
                config.journal_mode = mode;
            }
            if let Some(fk) = conn.foreign_keys {
                config.foreign_keys = fk;
            }
            if let Some(encoding) = conn.encoding {
                config.encoding = encoding;
            }
            if let Some(mode) = conn.transaction_mode {
                config.transaction_mode = mode;
            }
        }

        if let Some(logging) = self.logging {
            config.dev_mode = logging.dev_mode.unwrap_or(false);
        }

        config.validate()?;
        Ok(config)
    }
}

/// Connection descriptor and connection options for a [`crate::SimpleDb`].
///
/// `database` is a file path, or `:memory:` for a private in-memory database
/// per context. The embedded backend has no authentication, so `username` and
/// `password` are carried only as part of the descriptor.
#[derive(Clone, PartialEq)]
pub struct DbConfig {
    pub host: String,
    pub username: String,
    pub password: String,
    pub database: String,
    pub busy_timeout: Duration,
    pub journal_mode: String,
    pub foreign_keys: bool,
    pub encoding: String,
    pub transaction_mode: TransactionMode,
    pub dev_mode: bool,
}

impl DbConfig {
    /// Creates a descriptor with default connection options.
    pub fn new(
        host: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
        database: impl Into<String>,
    ) -> Self {
        DbConfig {
            host: host.into(),
            username: username.into(),
            password: password.into(),
            database: database.into(),
            busy_timeout: Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS),
            journal_mode: DEFAULT_JOURNAL_MODE.to_string(),
            foreign_keys: true,
            encoding: DEFAULT_ENCODING.to_string(),
            transaction_mode: TransactionMode::default(),
            dev_mode: false,
        }
    }

    /// Descriptor for a local database file with no credentials.
    pub fn local(database: impl Into<String>) -> Self {
        DbConfig::new("localhost", "", "", database)
    }

    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    pub fn with_journal_mode(mut self, mode: impl Into<String>) -> Self {
        self.journal_mode = mode.into();
        self
    }

    pub fn with_transaction_mode(mut self, mode: TransactionMode) -> Self {
        self.transaction_mode = mode;
        self
    }

    pub fn with_dev_mode(mut self, dev_mode: bool) -> Self {
        self.dev_mode = dev_mode;
        self
    }

    /// Whether every context gets its own in-memory database.
    pub fn is_memory(&self) -> bool {
        self.database == ":memory:"
    }

    /// Whether `host` names this machine.
    pub fn is_local(&self) -> bool {
        LOCAL_HOSTS.contains(&self.host.as_str())
    }

    /// Checks option values that SQLite would otherwise reject at connect time.
    pub fn validate(&self) -> Result<()> {
        if self.database.trim().is_empty() {
            return Err(DbError::Config("database name must not be empty".to_string()));
        }
        if !JOURNAL_MODES.contains(&self.journal_mode.to_lowercase().as_str()) {
            return Err(DbError::Config(format!(
                "unknown journal mode '{}'",
                self.journal_mode
            )));
        }
        if !ENCODINGS
            .iter()
            .any(|e| e.eq_ignore_ascii_case(&self.encoding))
        {
            return Err(DbError::Config(format!(
                "unsupported encoding '{}'",
                self.encoding
            )));
        }
        Ok(())
    }
}

impl fmt::Debug for DbConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DbConfig")
            .field("host", &self.host)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("database", &self.database)
            .field("busy_timeout", &self.busy_timeout)
            .field("journal_mode", &self.journal_mode)
            .field("foreign_keys", &self.foreign_keys)
            .field("encoding", &self.encoding)
            .field("transaction_mode", &self.transaction_mode)
            .field("dev_mode", &self.dev_mode)
            .finish()
    }
}

/// Loads configuration from a TOML file at the given path.
///
/// # Example
///
/// ```no_run
/// let config = simpledb::config::load_config("simpledb.toml").expect("Failed to load config");
/// let db = simpledb::SimpleDb::new(config.into_db_config().unwrap()).unwrap();
/// ```
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let content = fs::read_to_string(path)?;
    toml::from_str(&content).map_err(|e| DbError::Config(e.to_string()))
}
