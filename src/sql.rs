//! Fragment-based SQL builder and its terminal operations.
//!
//! A [`Sql`] is obtained from [`SimpleDb::gen_sql`](crate::SimpleDb::gen_sql),
//! grown with [`append`](Sql::append)/[`append_in`](Sql::append_in), and
//! consumed by exactly one terminal operation:
//!
//! ```no_run
//! # fn demo(db: &simpledb::SimpleDb) -> simpledb::Result<()> {
//! let ids: Vec<i64> = db
//!     .gen_sql()
//!     .append("SELECT id FROM article", ())
//!     .append_in("WHERE id IN (?)", [1, 2, 3])
//!     .append("AND isBlind = ?", (false,))
//!     .select_longs()?;
//! # Ok(()) }
//! ```

use crate::core::db::{ContextId, Executor};
use crate::core::{DbError, Result};
use crate::db::SimpleDb;
use crate::record::{FromRow, FromValue};
use crate::row::{parse_datetime, RawRow, Value, DATETIME_FORMAT};
use chrono::NaiveDateTime;
use tracing::warn;

/// Label used in mapping errors raised by the single-value selects.
const FIRST_COLUMN: &str = "1";

/// Values that can be bound positionally by [`Sql::append`].
///
/// Implemented for `()`, tuples of up to eight `Into<Value>` items, arrays
/// and vectors.
pub trait IntoParams {
    fn extend_params(self, params: &mut Vec<Value>);
}

impl IntoParams for () {
    fn extend_params(self, _params: &mut Vec<Value>) {}
}

impl<T: Into<Value>, const N: usize> IntoParams for [T; N] {
    fn extend_params(self, params: &mut Vec<Value>) {
        params.extend(self.into_iter().map(Into::into));
    }
}

impl<T: Into<Value>> IntoParams for Vec<T> {
    fn extend_params(self, params: &mut Vec<Value>) {
        params.extend(self.into_iter().map(Into::into));
    }
}

macro_rules! tuple_params {
    ($($name:ident),+) => {
        impl<$($name: Into<Value>),+> IntoParams for ($($name,)+) {
            #[allow(non_snake_case)]
            fn extend_params(self, params: &mut Vec<Value>) {
                let ($($name,)+) = self;
                $(params.push($name.into());)+
            }
        }
    };
}

tuple_params!(A);
tuple_params!(A, B);
tuple_params!(A, B, C);
tuple_params!(A, B, C, D);
tuple_params!(A, B, C, D, E);
tuple_params!(A, B, C, D, E, F);
tuple_params!(A, B, C, D, E, F, G);
tuple_params!(A, B, C, D, E, F, G, H);

/// A single-use statement under construction.
///
/// Fragments are joined with one space; parameters are matched left to right
/// against the `?` markers of the joined text. Terminal operations take the
/// builder by value, so it cannot be reused once executed.
#[must_use]
pub struct Sql<'a> {
    db: &'a SimpleDb,
    context: ContextId,
    fragments: Vec<String>,
    params: Vec<Value>,
}

impl<'a> Sql<'a> {
    pub(crate) fn new(db: &'a SimpleDb, context: ContextId) -> Self {
        Sql {
            db,
            context,
            fragments: Vec::new(),
            params: Vec::new(),
        }
    }

    /// Appends a fragment and its parameters. Placeholder and parameter
    /// counts are not checked until execution.
    pub fn append(mut self, fragment: &str, params: impl IntoParams) -> Self {
        self.fragments.push(fragment.to_string());
        params.extend_params(&mut self.params);
        self
    }

    /// Appends a fragment whose first `?` stands for a whole value list.
    ///
    /// With N values the first `?` becomes `?, ?, ...` (N markers) and the
    /// values are bound in order. With no values the fragment is appended
    /// unchanged, leaving its `?` for some other parameter to satisfy.
    pub fn append_in<I, V>(self, fragment: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let values: Vec<Value> = values.into_iter().map(Into::into).collect();
        if values.is_empty() {
            warn!(fragment, "append_in called without values, placeholder left unexpanded");
            return self.append(fragment, ());
        }

        let placeholders = vec!["?"; values.len()].join(", ");
        let expanded = fragment.replacen('?', &placeholders, 1);
        self.append(&expanded, values)
    }

    /// The assembled statement text.
    pub fn sql(&self) -> String {
        self.fragments.join(" ")
    }

    /// Parameters bound so far, in binding order.
    pub fn params(&self) -> &[Value] {
        &self.params
    }

    /// The execution context this statement will run in.
    pub fn context(&self) -> ContextId {
        self.context
    }

    /// Runs an insert and returns the generated key, or 0 if none was generated.
    pub fn insert(self) -> Result<i64> {
        self.run(|executor, sql, params| executor.insert(sql, params))
    }

    /// Runs a mutating statement and returns the affected row count.
    pub fn update(self) -> Result<usize> {
        self.run(|executor, sql, params| executor.execute(sql, params))
    }

    /// Same as [`update`](Sql::update).
    pub fn delete(self) -> Result<usize> {
        self.update()
    }

    pub fn select_rows(self) -> Result<Vec<RawRow>> {
        self.run(|executor, sql, params| executor.query(sql, params))
    }

    pub fn select_row(self) -> Result<Option<RawRow>> {
        Ok(self.select_rows()?.into_iter().next())
    }

    pub fn select_rows_as<T: FromRow>(self) -> Result<Vec<T>> {
        self.select_rows()?.iter().map(T::from_raw_row).collect()
    }

    pub fn select_row_as<T: FromRow>(self) -> Result<Option<T>> {
        self.select_row()?.as_ref().map(T::from_raw_row).transpose()
    }

    /// Column 1 of row 1 as an integer. `None` for no row or NULL.
    pub fn select_long(self) -> Result<Option<i64>> {
        match self.first_value()? {
            Some(value) => long_of(&value),
            None => Ok(None),
        }
    }

    /// Column 1 of every row as an integer; NULL reads as 0.
    pub fn select_longs(self) -> Result<Vec<i64>> {
        let values = self.run(|executor, sql, params| executor.first_column(sql, params))?;
        values
            .iter()
            .map(|value| long_of(value).map(|v| v.unwrap_or(0)))
            .collect()
    }

    /// Column 1 of row 1 rendered as text. `None` for no row or NULL.
    pub fn select_string(self) -> Result<Option<String>> {
        match self.first_value()? {
            Some(value) => string_of(&value),
            None => Ok(None),
        }
    }

    /// Column 1 of row 1 as a boolean. `None` for no row or NULL.
    pub fn select_boolean(self) -> Result<Option<bool>> {
        match self.first_value()? {
            Some(value) => boolean_of(&value),
            None => Ok(None),
        }
    }

    /// Column 1 of row 1 as a date-time. `None` for no row or NULL.
    pub fn select_datetime(self) -> Result<Option<NaiveDateTime>> {
        match self.first_value()? {
            Some(value) => datetime_of(&value),
            None => Ok(None),
        }
    }

    fn first_value(self) -> Result<Option<Value>> {
        self.run(|executor, sql, params| executor.first_value(sql, params))
    }

    fn run<T>(self, f: impl FnOnce(&Executor<'_>, &str, &[Value]) -> Result<T>) -> Result<T> {
        let sql = self.sql();
        let params = self.params;
        self.db
            .execute(self.context, &sql, |executor| f(executor, &sql, &params))
    }
}

fn long_of(value: &Value) -> Result<Option<i64>> {
    match value {
        Value::Text(s) => s
            .trim()
            .parse::<i64>()
            .map(Some)
            .map_err(|_| DbError::mapping(FIRST_COLUMN, format!("'{}' is not an integer", s))),
        other => i64::from_value(other).map_err(|message| DbError::mapping(FIRST_COLUMN, message)),
    }
}

fn string_of(value: &Value) -> Result<Option<String>> {
    Ok(match value {
        Value::Null => None,
        Value::Text(s) => Some(s.clone()),
        Value::Integer(i) => Some(i.to_string()),
        Value::Real(f) => Some(f.to_string()),
        Value::Boolean(b) => Some(b.to_string()),
        Value::DateTime(dt) => Some(dt.format(DATETIME_FORMAT).to_string()),
        Value::Blob(b) => Some(
            String::from_utf8(b.clone())
                .map_err(|_| DbError::mapping(FIRST_COLUMN, "blob is not valid UTF-8"))?,
        ),
    })
}

fn boolean_of(value: &Value) -> Result<Option<bool>> {
    Ok(match value {
        Value::Null => None,
        Value::Boolean(b) => Some(*b),
        Value::Integer(i) => Some(*i != 0),
        Value::Real(f) => Some(*f != 0.0),
        Value::Blob(b) => Some(b.first().is_some_and(|&byte| byte != 0)),
        Value::Text(s) => match s.trim().to_lowercase().as_str() {
            "1" | "true" => Some(true),
            "0" | "false" => Some(false),
            _ => return Err(DbError::mapping(FIRST_COLUMN, format!("'{}' is not a boolean", s))),
        },
        Value::DateTime(_) => {
            return Err(DbError::mapping(FIRST_COLUMN, "cannot read datetime value as boolean"))
        }
    })
}

fn datetime_of(value: &Value) -> Result<Option<NaiveDateTime>> {
    Ok(match value {
        Value::Null => None,
        Value::DateTime(dt) => Some(*dt),
        Value::Text(s) => Some(
            parse_datetime(s)
                .ok_or_else(|| DbError::mapping(FIRST_COLUMN, format!("'{}' is not a date-time", s)))?,
        ),
        Value::Integer(secs) => Some(
            chrono::DateTime::from_timestamp(*secs, 0)
                .map(|dt| dt.naive_utc())
                .ok_or_else(|| DbError::mapping(FIRST_COLUMN, format!("{} is out of date-time range", secs)))?,
        ),
        other => {
            return Err(DbError::mapping(
                FIRST_COLUMN,
                format!("cannot read {} value as datetime", other.type_name()),
            ))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DbConfig;

    fn handle() -> SimpleDb {
        SimpleDb::new(DbConfig::local(":memory:")).unwrap()
    }

    #[test]
    fn test_fragments_join_with_single_space() {
        let db = handle();
        let sql = db
            .gen_sql()
            .append("UPDATE article", ())
            .append("SET title = ?", ("new title",))
            .append("WHERE id = ?", (1,));

        insta::assert_snapshot!(sql.sql(), @"UPDATE article SET title = ? WHERE id = ?");
        assert_eq!(sql.params(), &[Value::from("new title"), Value::Integer(1)]);
    }

    #[test]
    fn test_append_in_expands_first_placeholder() {
        let db = handle();
        let sql = db
            .gen_sql()
            .append("SELECT COUNT(*) FROM article", ())
            .append_in("WHERE id IN (?) OR parentId IN (?)", [1, 2, 3])
            .append("AND title != ?", ("x",));

        insta::assert_snapshot!(
            sql.sql(),
            @"SELECT COUNT(*) FROM article WHERE id IN (?, ?, ?) OR parentId IN (?) AND title != ?"
        );
        assert_eq!(
            sql.params(),
            &[Value::Integer(1), Value::Integer(2), Value::Integer(3), Value::from("x")]
        );
    }

    #[test]
    fn test_append_in_without_values_leaves_fragment() {
        let db = handle();
        let sql = db
            .gen_sql()
            .append("SELECT id FROM article", ())
            .append_in("WHERE id IN (?)", Vec::<i64>::new());

        assert_eq!(sql.sql(), "SELECT id FROM article WHERE id IN (?)");
        assert!(sql.params().is_empty());
    }

    #[test]
    fn test_tuple_params_mix_types() {
        let db = handle();
        let sql = db
            .gen_sql()
            .append("INSERT INTO t SET a = ?, b = ?, c = ?, d = ?", (1_i32, "two", 3.5, Some(true)));
        assert_eq!(
            sql.params(),
            &[
                Value::Integer(1),
                Value::from("two"),
                Value::Real(3.5),
                Value::Boolean(true)
            ]
        );
    }

    #[test]
    fn test_building_does_not_open_a_connection() {
        let db = handle();
        let _sql = db.gen_sql().append("SELECT 1", ());
        assert_eq!(db.open_contexts(), 0);
    }

    #[test]
    fn test_scalar_coercions() {
        assert_eq!(long_of(&Value::from(" 42 ")).unwrap(), Some(42));
        assert_eq!(long_of(&Value::Null).unwrap(), None);
        assert!(long_of(&Value::from("4x2")).is_err());

        assert_eq!(string_of(&Value::Integer(5)).unwrap().as_deref(), Some("5"));
        assert_eq!(boolean_of(&Value::from("TRUE")).unwrap(), Some(true));
        assert_eq!(boolean_of(&Value::Blob(vec![])).unwrap(), Some(false));
        assert!(boolean_of(&Value::from("maybe")).is_err());

        assert_eq!(
            datetime_of(&Value::Integer(86_400)).unwrap(),
            NaiveDateTime::parse_from_str("1970-01-02 00:00:00", "%Y-%m-%d %H:%M:%S").ok()
        );
    }
}
