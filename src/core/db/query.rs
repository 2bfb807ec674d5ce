/// Query Execution Module
///
/// Binds positional parameters, executes statements on a borrowed connection
/// and converts driver values into canonical [`Value`]s and [`RawRow`]s.
/// Statements are prepared fresh for every call.

use crate::core::Result;
use crate::row::{RawRow, Value};
use rusqlite::{params_from_iter, Connection, Statement};

/// Statement execution on a single connection
pub struct Executor<'a> {
    connection: &'a Connection,
}

impl<'a> Executor<'a> {
    /// Creates a new Executor for the given connection
    pub fn new(connection: &'a Connection) -> Self {
        Executor { connection }
    }

    /// Executes a mutating statement and returns the number of affected rows.
    ///
    /// # Errors
    ///
    /// Returns `DbError::Statement` if the SQL is invalid, the number of
    /// parameters differs from the number of placeholders, or the backend
    /// rejects the change.
    ///
    /// Statements that produce rows (`PRAGMA`, `... RETURNING`) run to
    /// completion with their rows discarded. A read-only one reports 0.
    pub fn execute(&self, sql: &str, params: &[Value]) -> Result<usize> {
        let mut stmt = self.connection.prepare(sql)?;
        if stmt.column_count() == 0 {
            return Ok(stmt.execute(params_from_iter(params.iter()))?);
        }

        let readonly = stmt.readonly();
        let mut rows = stmt.query(params_from_iter(params.iter()))?;
        while rows.next()?.is_some() {}
        if readonly {
            return Ok(0);
        }
        Ok(usize::try_from(self.connection.changes()).unwrap_or(usize::MAX))
    }

    /// Executes an insert and returns the generated rowid, or 0 when the
    /// backend generated none.
    ///
    /// The connection's last rowid is sampled around the statement: a table
    /// declared `WITHOUT ROWID`, or an upsert taking its update branch, leaves
    /// it unchanged.
    pub fn insert(&self, sql: &str, params: &[Value]) -> Result<i64> {
        let before = self.connection.last_insert_rowid();
        let changed = self.execute(sql, params)?;
        let after = self.connection.last_insert_rowid();
        if changed == 0 || after == before {
            return Ok(0);
        }
        Ok(after)
    }

    /// Executes a query and returns every row, columns in statement order.
    pub fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<RawRow>> {
        let mut stmt = self.connection.prepare(sql)?;
        let columns = column_descriptors(&stmt);

        let mut rows = stmt.query(params_from_iter(params.iter()))?;
        let mut result = Vec::new();
        while let Some(row) = rows.next()? {
            let mut raw = RawRow::new();
            for (i, (label, decl_type)) in columns.iter().enumerate() {
                raw.insert(label.clone(), Value::from_column(row.get_ref(i)?, decl_type.as_deref()));
            }
            result.push(raw);
        }
        Ok(result)
    }

    /// Column 1 of row 1. `None` when the query returned no row; a NULL in
    /// that position comes back as `Some(Value::Null)`.
    pub fn first_value(&self, sql: &str, params: &[Value]) -> Result<Option<Value>> {
        let mut stmt = self.connection.prepare(sql)?;
        let decl_type = first_decl_type(&stmt);

        let mut rows = stmt.query(params_from_iter(params.iter()))?;
        let value = match rows.next()? {
            Some(row) => Some(Value::from_column(row.get_ref(0)?, decl_type.as_deref())),
            None => None,
        };
        Ok(value)
    }

    /// Column 1 of every row.
    pub fn first_column(&self, sql: &str, params: &[Value]) -> Result<Vec<Value>> {
        let mut stmt = self.connection.prepare(sql)?;
        let decl_type = first_decl_type(&stmt);

        let mut rows = stmt.query(params_from_iter(params.iter()))?;
        let mut values = Vec::new();
        while let Some(row) = rows.next()? {
            values.push(Value::from_column(row.get_ref(0)?, decl_type.as_deref()));
        }
        Ok(values)
    }
}

/// Column labels and declared types, owned so the statement can be re-borrowed.
fn column_descriptors(stmt: &Statement<'_>) -> Vec<(String, Option<String>)> {
    stmt.columns()
        .iter()
        .map(|c| (c.name().to_string(), c.decl_type().map(str::to_string)))
        .collect()
}

fn first_decl_type(stmt: &Statement<'_>) -> Option<String> {
    stmt.columns()
        .first()
        .and_then(|c| c.decl_type().map(str::to_string))
}
