//! Mapping of [`RawRow`]s onto caller-defined record types.
//!
//! A record implements [`FromRow`], usually through the [`from_row!`](crate::from_row)
//! macro, which generates the field ↔ column table at compile time:
//!
//! ```
//! use chrono::NaiveDateTime;
//!
//! #[derive(Debug, Default)]
//! struct Article {
//!     id: i64,
//!     title: String,
//!     created_date: Option<NaiveDateTime>,
//!     is_blind: bool,
//! }
//!
//! simpledb::from_row!(Article {
//!     id,
//!     title,
//!     created_date => "createdDate",
//!     is_blind => "isBlind",
//! });
//! ```
//!
//! Columns without a matching field are skipped, fields without a matching
//! column keep their `Default` value, and a NULL column leaves a
//! non-nullable field untouched.

use crate::core::{DbError, Result};
use crate::row::{parse_datetime, RawRow, Value};
use chrono::{NaiveDate, NaiveDateTime};

/// A record that can be populated from named column values.
pub trait FromRow: Default {
    /// Assigns `value` to the field bound to `column`.
    ///
    /// Must return `Ok(())` for columns the record does not know.
    fn set_column(&mut self, column: &str, value: &Value) -> Result<()>;

    /// Builds a record from a default instance and every column of `row`.
    fn from_raw_row(row: &RawRow) -> Result<Self> {
        let mut record = Self::default();
        for (column, value) in row.iter() {
            record.set_column(column, value)?;
        }
        Ok(record)
    }
}

/// Coercion of a canonical value into a field type.
///
/// `Ok(None)` means "leave the field as it is"; non-nullable types return it
/// for NULL. `Err` carries the reason an impossible coercion failed.
pub trait FromValue: Sized {
    fn from_value(value: &Value) -> std::result::Result<Option<Self>, String>;
}

/// Coerces `value` and stores it in `slot`, naming `column` on failure.
pub fn assign<T: FromValue>(slot: &mut T, column: &str, value: &Value) -> Result<()> {
    if let Some(v) = T::from_value(value).map_err(|message| DbError::mapping(column, message))? {
        *slot = v;
    }
    Ok(())
}

fn mismatch(value: &Value, target: &str) -> String {
    format!("cannot assign {} value to {}", value.type_name(), target)
}

fn real_to_i64(f: f64) -> Option<i64> {
    // truncates toward zero
    (f.is_finite() && f >= i64::MIN as f64 && f < i64::MAX as f64).then(|| f as i64)
}

macro_rules! from_value_int {
    ($($ty:ty),*) => {
        $(impl FromValue for $ty {
            fn from_value(value: &Value) -> std::result::Result<Option<Self>, String> {
                let wide = match value {
                    Value::Null => return Ok(None),
                    Value::Integer(i) => *i,
                    Value::Boolean(b) => i64::from(*b),
                    Value::Real(f) => real_to_i64(*f)
                        .ok_or_else(|| format!("value {} out of range for {}", f, stringify!($ty)))?,
                    other => return Err(mismatch(other, stringify!($ty))),
                };
                <$ty>::try_from(wide)
                    .map(Some)
                    .map_err(|_| format!("value {} out of range for {}", wide, stringify!($ty)))
            }
        })*
    };
}

from_value_int!(i8, i16, i32, i64, u8, u16, u32, u64, usize);

impl FromValue for f64 {
    fn from_value(value: &Value) -> std::result::Result<Option<Self>, String> {
        match value {
            Value::Null => Ok(None),
            Value::Real(f) => Ok(Some(*f)),
            Value::Integer(i) => Ok(Some(*i as f64)),
            other => Err(mismatch(other, "f64")),
        }
    }
}

impl FromValue for f32 {
    fn from_value(value: &Value) -> std::result::Result<Option<Self>, String> {
        let wide = match f64::from_value(value) {
            Ok(Some(f)) => f,
            Ok(None) => return Ok(None),
            Err(_) => return Err(mismatch(value, "f32")),
        };
        let narrow = wide as f32;
        if wide.is_finite() && !narrow.is_finite() {
            return Err(format!("value {} out of range for f32", wide));
        }
        Ok(Some(narrow))
    }
}

impl FromValue for bool {
    fn from_value(value: &Value) -> std::result::Result<Option<Self>, String> {
        match value {
            Value::Null => Ok(None),
            Value::Boolean(b) => Ok(Some(*b)),
            Value::Integer(i) => Ok(Some(*i != 0)),
            other => Err(mismatch(other, "bool")),
        }
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> std::result::Result<Option<Self>, String> {
        match value {
            Value::Null => Ok(None),
            Value::Text(s) => Ok(Some(s.clone())),
            other => Err(mismatch(other, "String")),
        }
    }
}

impl FromValue for NaiveDateTime {
    fn from_value(value: &Value) -> std::result::Result<Option<Self>, String> {
        match value {
            Value::Null => Ok(None),
            Value::DateTime(dt) => Ok(Some(*dt)),
            Value::Text(s) => parse_datetime(s)
                .map(Some)
                .ok_or_else(|| format!("'{}' is not a date-time", s)),
            other => Err(mismatch(other, "NaiveDateTime")),
        }
    }
}

impl FromValue for NaiveDate {
    fn from_value(value: &Value) -> std::result::Result<Option<Self>, String> {
        NaiveDateTime::from_value(value)
            .map(|dt| dt.map(|dt| dt.date()))
            .map_err(|_| mismatch(value, "NaiveDate"))
    }
}

impl FromValue for Vec<u8> {
    fn from_value(value: &Value) -> std::result::Result<Option<Self>, String> {
        match value {
            Value::Null => Ok(None),
            Value::Blob(b) => Ok(Some(b.clone())),
            other => Err(mismatch(other, "Vec<u8>")),
        }
    }
}

impl FromValue for Value {
    fn from_value(value: &Value) -> std::result::Result<Option<Self>, String> {
        Ok(Some(value.clone()))
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &Value) -> std::result::Result<Option<Self>, String> {
        match value {
            Value::Null => Ok(Some(None)),
            other => T::from_value(other).map(Some),
        }
    }
}

/// Implements [`FromRow`] for a struct by listing its mapped fields.
///
/// Each entry is either `field` (column label equals the field name) or
/// `field => "columnLabel"`.
#[macro_export]
macro_rules! from_row {
    (@column $field:ident => $column:literal) => {
        $column
    };
    (@column $field:ident) => {
        stringify!($field)
    };
    ($name:ident { $($field:ident $(=> $column:literal)?),* $(,)? }) => {
        impl $crate::record::FromRow for $name {
            fn set_column(&mut self, column: &str, value: &$crate::Value) -> $crate::Result<()> {
                $(
                    if column == $crate::from_row!(@column $field $(=> $column)?) {
                        return $crate::record::assign(&mut self.$field, column, value);
                    }
                )*
                Ok(())
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default, PartialEq)]
    struct Article {
        id: i64,
        created_date: Option<NaiveDateTime>,
        title: String,
        body: Option<String>,
        is_blind: bool,
    }

    crate::from_row!(Article {
        id,
        created_date => "createdDate",
        title,
        body,
        is_blind => "isBlind",
    });

    #[derive(Debug, PartialEq)]
    struct Counter {
        hits: u8,
        enabled: bool,
    }

    impl Default for Counter {
        fn default() -> Self {
            Counter { hits: 7, enabled: true }
        }
    }

    crate::from_row!(Counter { hits, enabled });

    fn row(columns: Vec<(&str, Value)>) -> RawRow {
        columns.into_iter().collect()
    }

    #[test]
    fn test_maps_matching_columns() {
        let created = NaiveDateTime::parse_from_str("2024-05-06 07:08:09", "%Y-%m-%d %H:%M:%S").unwrap();
        let article = Article::from_raw_row(&row(vec![
            ("id", Value::Integer(3)),
            ("createdDate", Value::DateTime(created)),
            ("title", Value::from("title 3")),
            ("body", Value::from("body 3")),
            ("isBlind", Value::Boolean(true)),
        ]))
        .unwrap();

        assert_eq!(
            article,
            Article {
                id: 3,
                created_date: Some(created),
                title: "title 3".to_string(),
                body: Some("body 3".to_string()),
                is_blind: true,
            }
        );
    }

    #[test]
    fn test_unknown_columns_are_ignored() {
        let article = Article::from_raw_row(&row(vec![
            ("id", Value::Integer(1)),
            ("viewCount", Value::Integer(99)),
        ]))
        .unwrap();
        assert_eq!(article.id, 1);
        assert_eq!(article.title, "");
        assert_eq!(article.created_date, None);
    }

    #[test]
    fn test_null_handling() {
        let article = Article::from_raw_row(&row(vec![
            ("body", Value::Null),
            ("createdDate", Value::Null),
        ]))
        .unwrap();
        assert_eq!(article.body, None);
        assert_eq!(article.created_date, None);

        // NULL leaves a non-nullable field at whatever it already holds
        let counter = Counter::from_raw_row(&row(vec![
            ("hits", Value::Null),
            ("enabled", Value::Null),
        ]))
        .unwrap();
        assert_eq!(counter, Counter::default());
    }

    #[test]
    fn test_numeric_width_coercion() {
        let counter = Counter::from_raw_row(&row(vec![("hits", Value::Integer(200))])).unwrap();
        assert_eq!(counter.hits, 200);

        match Counter::from_raw_row(&row(vec![("hits", Value::Integer(300))])) {
            Err(DbError::Mapping { column, message }) => {
                assert_eq!(column, "hits");
                assert!(message.contains("out of range for u8"));
            }
            other => panic!("Expected Mapping error, got {:?}", other),
        }

        assert!(Counter::from_raw_row(&row(vec![("hits", Value::Integer(-1))])).is_err());
        assert_eq!(i64::from_value(&Value::Real(2.9)), Ok(Some(2)));
    }

    #[test]
    fn test_incompatible_value_is_mapping_error() {
        let err = Article::from_raw_row(&row(vec![("id", Value::from("abc"))])).unwrap_err();
        assert!(err.is_mapping());
        assert!(err.to_string().contains("cannot assign text value to i64"));
    }

    #[test]
    fn test_boolean_from_integer_flag() {
        let counter = Counter::from_raw_row(&row(vec![("enabled", Value::Integer(0))])).unwrap();
        assert!(!counter.enabled);
    }

    #[test]
    fn test_datetime_from_text() {
        let parsed = NaiveDateTime::from_value(&Value::from("2024-01-01 00:00:01")).unwrap();
        assert!(parsed.is_some());
        assert!(NaiveDateTime::from_value(&Value::from("soon")).is_err());
        assert_eq!(
            NaiveDate::from_value(&Value::from("2024-02-29")).unwrap(),
            NaiveDate::from_ymd_opt(2024, 2, 29)
        );
    }
}
