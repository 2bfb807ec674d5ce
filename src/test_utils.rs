/// # Test Utilities Module
///
/// Fixtures shared by the crate's unit and integration tests: a temp-file
/// database with the `article` table, a record type to map it onto, and a
/// log capture for dev-mode output.

use crate::config::DbConfig;
use crate::core::Result;
use crate::db::SimpleDb;
use chrono::NaiveDateTime;
use std::io;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

pub const ARTICLE_SCHEMA: &str = "
    CREATE TABLE article (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        createdDate DATETIME NOT NULL,
        modifiedDate DATETIME NOT NULL,
        title VARCHAR(100) NOT NULL,
        body TEXT NOT NULL,
        isBlind BIT(1) NOT NULL DEFAULT 0
    )";

/// Record shape of the `article` table
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Article {
    pub id: Option<i64>,
    pub created_date: Option<NaiveDateTime>,
    pub modified_date: Option<NaiveDateTime>,
    pub title: String,
    pub body: String,
    pub is_blind: bool,
}

crate::from_row!(Article {
    id,
    created_date => "createdDate",
    modified_date => "modifiedDate",
    title,
    body,
    is_blind => "isBlind",
});

/// Isolated database test fixture backed by a file in a temp directory
pub struct DatabaseFixture {
    pub db: SimpleDb,
    // keeps the directory alive for the fixture's lifetime
    _dir: TempDir,
}

impl DatabaseFixture {
    /// Create a fixture with an empty `article` table
    pub fn new() -> Result<Self> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("simpledb_test.db");
        let db = SimpleDb::new(DbConfig::local(path.to_string_lossy()))?;
        db.run(ARTICLE_SCHEMA, ())?;
        Ok(DatabaseFixture { db, _dir: dir })
    }

    /// Create a fixture with `count` articles titled `title 1..=count`
    pub fn with_articles(count: usize) -> Result<Self> {
        let fixture = Self::new()?;
        for i in 1..=count {
            fixture.insert_article(&format!("title {}", i), &format!("body {}", i), false)?;
        }
        Ok(fixture)
    }

    pub fn insert_article(&self, title: &str, body: &str, is_blind: bool) -> Result<i64> {
        self.db
            .gen_sql()
            .append("INSERT INTO article (createdDate, modifiedDate, title, body, isBlind)", ())
            .append("VALUES (datetime('now'), datetime('now'), ?, ?, ?)", (title, body, is_blind))
            .insert()
    }

    pub fn article_count(&self) -> Result<i64> {
        let count = self
            .db
            .gen_sql()
            .append("SELECT COUNT(*) FROM article", ())
            .select_long()?;
        Ok(count.unwrap_or(0))
    }
}

/// In-memory sink for `tracing` output
#[derive(Clone, Default)]
pub struct LogCapture {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl LogCapture {
    pub fn contents(&self) -> String {
        let buffer = self.buffer.lock().unwrap();
        String::from_utf8_lossy(&buffer).into_owned()
    }

    /// Runs `f` with a subscriber writing into this capture on the current thread
    pub fn capture<T>(&self, f: impl FnOnce() -> T) -> T {
        let sink = self.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || sink.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::DEBUG)
            .finish();
        tracing::subscriber::with_default(subscriber, f)
    }
}

impl io::Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
