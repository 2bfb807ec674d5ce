//! Canonical result values and the generic row shape.
use crate::core::DbError;
use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::types::{ToSql, ToSqlOutput, ValueRef};
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;

/// Text format used when a date-time is bound as a parameter.
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

const DATETIME_PARSE_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

/// A single column value after backend-specific coercion.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Boolean(bool),
    DateTime(NaiveDateTime),
    Blob(Vec<u8>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Short name of the variant, used in mapping error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Integer(_) => "integer",
            Value::Real(_) => "real",
            Value::Text(_) => "text",
            Value::Boolean(_) => "boolean",
            Value::DateTime(_) => "datetime",
            Value::Blob(_) => "blob",
        }
    }

    /// Converts a driver value using the column's declared type.
    ///
    /// Declared types drive three coercions: `DATETIME`/`TIMESTAMP` become
    /// date-times, `DATE` becomes a date-time at midnight, and `BOOL*`/`BIT*`
    /// become booleans. Values that do not fit the declared type are kept in
    /// their storage class.
    pub fn from_column(raw: ValueRef<'_>, decl_type: Option<&str>) -> Value {
        let kind = decl_type.map(DeclaredKind::of).unwrap_or(DeclaredKind::Plain);

        match (raw, kind) {
            (ValueRef::Null, _) => Value::Null,
            (ValueRef::Text(t), DeclaredKind::DateTime) => {
                let text = String::from_utf8_lossy(t);
                parse_datetime(&text)
                    .map(Value::DateTime)
                    .unwrap_or_else(|| Value::Text(text.into_owned()))
            }
            (ValueRef::Integer(secs), DeclaredKind::DateTime) => {
                chrono::DateTime::from_timestamp(secs, 0)
                    .map(|dt| Value::DateTime(dt.naive_utc()))
                    .unwrap_or(Value::Integer(secs))
            }
            (ValueRef::Text(t), DeclaredKind::Date) => {
                let text = String::from_utf8_lossy(t);
                parse_datetime(&text)
                    .and_then(|dt| dt.date().and_hms_opt(0, 0, 0))
                    .map(Value::DateTime)
                    .unwrap_or_else(|| Value::Text(text.into_owned()))
            }
            (ValueRef::Integer(i), DeclaredKind::Flag) => Value::Boolean(i != 0),
            (ValueRef::Blob(b), DeclaredKind::Flag) => Value::Boolean(b.first().is_some_and(|&byte| byte != 0)),
            (ValueRef::Integer(i), _) => Value::Integer(i),
            (ValueRef::Real(f), _) => Value::Real(f),
            (ValueRef::Text(t), _) => Value::Text(String::from_utf8_lossy(t).into_owned()),
            (ValueRef::Blob(b), _) => Value::Blob(b.to_vec()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum DeclaredKind {
    DateTime,
    Date,
    Flag,
    Plain,
}

impl DeclaredKind {
    fn of(decl: &str) -> Self {
        let upper = decl.trim().to_uppercase();
        if upper.starts_with("DATETIME") || upper.starts_with("TIMESTAMP") {
            DeclaredKind::DateTime
        } else if upper == "DATE" {
            DeclaredKind::Date
        } else if upper.starts_with("BOOL") || upper.starts_with("BIT") {
            DeclaredKind::Flag
        } else {
            DeclaredKind::Plain
        }
    }
}

/// Parses the date-time spellings SQLite produces, plus bare dates.
pub fn parse_datetime(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    DATETIME_PARSE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Value::Null => ToSqlOutput::Borrowed(ValueRef::Null),
            Value::Integer(i) => ToSqlOutput::Borrowed(ValueRef::Integer(*i)),
            Value::Real(f) => ToSqlOutput::Borrowed(ValueRef::Real(*f)),
            Value::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            Value::Boolean(b) => ToSqlOutput::Borrowed(ValueRef::Integer(i64::from(*b))),
            Value::DateTime(dt) => ToSqlOutput::Owned(rusqlite::types::Value::Text(
                dt.format(DATETIME_FORMAT).to_string(),
            )),
            Value::Blob(b) => ToSqlOutput::Borrowed(ValueRef::Blob(b)),
        })
    }
}

macro_rules! value_from_int {
    ($($ty:ty),*) => {
        $(impl From<$ty> for Value {
            fn from(v: $ty) -> Self {
                Value::Integer(i64::from(v))
            }
        })*
    };
}

value_from_int!(i8, i16, i32, i64, u8, u16, u32);

// Wider unsigned values only fit when they are at most `i64::MAX`.
macro_rules! value_try_from_unsigned {
    ($($ty:ty),*) => {
        $(impl TryFrom<$ty> for Value {
            type Error = DbError;

            fn try_from(v: $ty) -> Result<Self, Self::Error> {
                i64::try_from(v)
                    .map(Value::Integer)
                    .map_err(|e| DbError::Statement(rusqlite::Error::ToSqlConversionFailure(Box::new(e))))
            }
        })*
    };
}

value_try_from_unsigned!(u64, usize);

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Real(f64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Real(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<&String> for Value {
    fn from(v: &String) -> Self {
        Value::Text(v.clone())
    }
}

impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Value::DateTime(v)
    }
}

impl From<NaiveDate> for Value {
    fn from(v: NaiveDate) -> Self {
        v.and_hms_opt(0, 0, 0).map(Value::DateTime).unwrap_or(Value::Null)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Blob(v)
    }
}

impl From<&[u8]> for Value {
    fn from(v: &[u8]) -> Self {
        Value::Blob(v.to_vec())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// One result row: column labels in statement order, each with its value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRow {
    columns: Vec<(String, Value)>,
}

impl RawRow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a column. A label already present keeps its position and
    /// takes the new value.
    pub fn insert(&mut self, label: impl Into<String>, value: Value) {
        let label = label.into();
        match self.columns.iter_mut().find(|(l, _)| *l == label) {
            Some((_, slot)) => *slot = value,
            None => self.columns.push((label, value)),
        }
    }

    /// Value for an exact label match.
    pub fn get(&self, label: &str) -> Option<&Value> {
        self.columns.iter().find(|(l, _)| l == label).map(|(_, v)| v)
    }

    /// Value at a zero-based column position.
    pub fn get_index(&self, index: usize) -> Option<&Value> {
        self.columns.get(index).map(|(_, v)| v)
    }

    pub fn contains(&self, label: &str) -> bool {
        self.get(label).is_some()
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(l, _)| l.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns.iter().map(|(l, v)| (l.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

impl<L: Into<String>> FromIterator<(L, Value)> for RawRow {
    fn from_iter<I: IntoIterator<Item = (L, Value)>>(iter: I) -> Self {
        let mut row = RawRow::new();
        for (label, value) in iter {
            row.insert(label, value);
        }
        row
    }
}

impl Serialize for RawRow {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.columns.len()))?;
        for (label, value) in &self.columns {
            map.serialize_entry(label, value)?;
        }
        map.end()
    }
}
