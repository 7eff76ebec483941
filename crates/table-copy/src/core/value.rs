//! SQL value types carried between the source and target databases.

use std::fmt;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One column value of a fetched row.
///
/// Rows are materialized client-side for a whole table, so values own their
/// data.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    /// SQL NULL.
    Null,

    /// Boolean value (`BOOLEAN` / `TINYINT(1)`).
    Bool(bool),

    /// Signed integer of any width.
    Int(i64),

    /// Unsigned integer of any width.
    UInt(u64),

    /// `FLOAT` / `DOUBLE`.
    Float(f64),

    /// `DECIMAL` / `NUMERIC`.
    Decimal(Decimal),

    /// Character data.
    Text(String),

    /// Binary data.
    Bytes(Vec<u8>),

    /// Date without time component.
    Date(NaiveDate),

    /// Time without date component.
    Time(NaiveTime),

    /// `DATETIME` / `TIMESTAMP`.
    DateTime(NaiveDateTime),
}

impl SqlValue {
    /// Check if this value is NULL.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    /// Key form of this value, used for `id` and foreign-key comparisons.
    ///
    /// Returns `None` for NULL and for values that cannot be a primary key
    /// (fractional numbers, dates, non-UTF-8 blobs).
    #[must_use]
    pub fn as_key(&self) -> Option<PkValue> {
        match self {
            SqlValue::Int(v) => Some(PkValue::Int(*v)),
            SqlValue::UInt(v) => Some(PkValue::from_unsigned(*v)),
            SqlValue::Bool(v) => Some(PkValue::Int(i64::from(*v))),
            SqlValue::Float(v) if v.fract() == 0.0 && v.abs() < 9.0e15 => {
                Some(PkValue::Int(*v as i64))
            }
            SqlValue::Decimal(d) if d.fract().is_zero() => match d.to_i64() {
                Some(v) => Some(PkValue::Int(v)),
                None => Some(PkValue::String(d.normalize().to_string())),
            },
            SqlValue::Text(s) => Some(PkValue::from_text(s)),
            SqlValue::Bytes(b) => std::str::from_utf8(b).ok().map(PkValue::from_text),
            _ => None,
        }
    }
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlValue::Null => f.write_str("NULL"),
            SqlValue::Bool(v) => write!(f, "{}", v),
            SqlValue::Int(v) => write!(f, "{}", v),
            SqlValue::UInt(v) => write!(f, "{}", v),
            SqlValue::Float(v) => write!(f, "{}", v),
            SqlValue::Decimal(v) => write!(f, "{}", v),
            SqlValue::Text(v) => write!(f, "'{}'", v),
            SqlValue::Bytes(v) => write!(f, "<{} bytes>", v.len()),
            SqlValue::Date(v) => write!(f, "{}", v),
            SqlValue::Time(v) => write!(f, "{}", v),
            SqlValue::DateTime(v) => write!(f, "{}", v),
        }
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Bool(v)
    }
}

impl From<i32> for SqlValue {
    fn from(v: i32) -> Self {
        SqlValue::Int(i64::from(v))
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::Int(v)
    }
}

impl From<u64> for SqlValue {
    fn from(v: u64) -> Self {
        SqlValue::UInt(v)
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        SqlValue::Float(v)
    }
}

impl From<Decimal> for SqlValue {
    fn from(v: Decimal) -> Self {
        SqlValue::Decimal(v)
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl From<Vec<u8>> for SqlValue {
    fn from(v: Vec<u8>) -> Self {
        SqlValue::Bytes(v)
    }
}

impl From<NaiveDate> for SqlValue {
    fn from(v: NaiveDate) -> Self {
        SqlValue::Date(v)
    }
}

impl From<NaiveTime> for SqlValue {
    fn from(v: NaiveTime) -> Self {
        SqlValue::Time(v)
    }
}

impl From<NaiveDateTime> for SqlValue {
    fn from(v: NaiveDateTime) -> Self {
        SqlValue::DateTime(v)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(SqlValue::Null)
    }
}

/// Represents a primary key value of various types.
///
/// Integer-looking strings are folded into `Int` so that a `VARCHAR` foreign
/// key holding `"77"` matches an `INT` primary key `77`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PkValue {
    /// Integer primary key (covers int, bigint, smallint, tinyint).
    Int(i64),
    /// String primary key (varchar, char, or an unsigned value beyond `i64`).
    String(String),
}

impl PkValue {
    /// Key for a textual value.
    pub fn from_text(s: &str) -> Self {
        match s.parse::<i64>() {
            Ok(v) if v.to_string() == s => PkValue::Int(v),
            _ => PkValue::String(s.to_string()),
        }
    }

    /// Key for an unsigned value.
    pub fn from_unsigned(v: u64) -> Self {
        i64::try_from(v)
            .map(PkValue::Int)
            .unwrap_or_else(|_| PkValue::String(v.to_string()))
    }
}

impl fmt::Display for PkValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PkValue::Int(v) => write!(f, "{}", v),
            PkValue::String(v) => write!(f, "'{}'", v),
        }
    }
}

impl From<i64> for PkValue {
    fn from(v: i64) -> Self {
        PkValue::Int(v)
    }
}

impl From<i32> for PkValue {
    fn from(v: i32) -> Self {
        PkValue::Int(v as i64)
    }
}

impl From<&str> for PkValue {
    fn from(v: &str) -> Self {
        PkValue::from_text(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sql_value_is_null() {
        assert!(SqlValue::Null.is_null());
        assert!(!SqlValue::Int(42).is_null());
        assert!(SqlValue::from(None::<i64>).is_null());
    }

    #[test]
    fn test_as_key_integers() {
        assert_eq!(SqlValue::Int(77).as_key(), Some(PkValue::Int(77)));
        assert_eq!(SqlValue::UInt(77).as_key(), Some(PkValue::Int(77)));
        assert_eq!(
            SqlValue::UInt(u64::MAX).as_key(),
            Some(PkValue::String(u64::MAX.to_string()))
        );
        assert_eq!(
            SqlValue::Decimal(Decimal::new(770, 1)).as_key(),
            Some(PkValue::Int(77))
        );
        assert_eq!(SqlValue::Float(77.0).as_key(), Some(PkValue::Int(77)));
        assert_eq!(SqlValue::Float(-3.0).as_key(), Some(PkValue::Int(-3)));
    }

    #[test]
    fn test_as_key_text_folds_integers() {
        assert_eq!(SqlValue::from("77").as_key(), Some(PkValue::Int(77)));
        assert_eq!(
            SqlValue::from("077").as_key(),
            Some(PkValue::String("077".into()))
        );
        assert_eq!(
            SqlValue::from("MH").as_key(),
            Some(PkValue::String("MH".into()))
        );
        assert_eq!(
            SqlValue::Bytes(b"12".to_vec()).as_key(),
            Some(PkValue::Int(12))
        );
    }

    #[test]
    fn test_as_key_rejects_non_keys() {
        assert_eq!(SqlValue::Null.as_key(), None);
        assert_eq!(SqlValue::Float(1.5).as_key(), None);
        assert_eq!(SqlValue::Decimal(Decimal::new(15, 1)).as_key(), None);
        assert_eq!(SqlValue::Bytes(vec![0xff, 0xfe]).as_key(), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(SqlValue::Null.to_string(), "NULL");
        assert_eq!(SqlValue::from("a").to_string(), "'a'");
        assert_eq!(PkValue::Int(5).to_string(), "5");
        assert_eq!(PkValue::String("x".into()).to_string(), "'x'");
    }
}
