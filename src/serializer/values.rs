//! Typed field values and locale-aware parsing
//!
//! Values reach the converter either already typed (a `NaiveDate`, a
//! `Decimal`) or as text produced by the caller's own formatting. Text is
//! parsed with the session [`Locale`], the way a desktop application reads
//! what its user typed; output is always written in the invariant layouts.

use super::coded::CodedMember;
use crate::error::{Error, Result};
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Raw value of one field
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// Free text
    Text(String),
    /// Signed integer
    Integer(i64),
    /// Fixed-point decimal
    Decimal(Decimal),
    /// Calendar date
    Date(NaiveDate),
    /// Time of day
    Time(NaiveTime),
    /// Date and time without offset
    DateTime(NaiveDateTime),
    /// Date and time with UTC offset
    DateTimeOffset(DateTime<FixedOffset>),
    /// Member of a coded enumeration
    Coded(CodedMember),
}

impl FieldValue {
    /// Name of the variant, for error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            FieldValue::Text(_) => "text",
            FieldValue::Integer(_) => "integer",
            FieldValue::Decimal(_) => "decimal",
            FieldValue::Date(_) => "date",
            FieldValue::Time(_) => "time",
            FieldValue::DateTime(_) => "datetime",
            FieldValue::DateTimeOffset(_) => "datetime with offset",
            FieldValue::Coded(_) => "coded member",
        }
    }

    fn mismatch(&self, expected: &str) -> Error {
        Error::format("", format!("expected {}, found {} '{}'", expected, self.type_name(), self))
    }

    /// Text content, or the textual form of any other value
    pub fn into_text(self) -> String {
        match self {
            FieldValue::Text(text) => text,
            other => other.to_string(),
        }
    }

    /// Integer value
    pub fn into_integer(self) -> Result<i64> {
        match self {
            FieldValue::Integer(v) => Ok(v),
            FieldValue::Text(ref text) => text.trim().parse().map_err(|_| self.mismatch("integer")),
            other => Err(other.mismatch("integer")),
        }
    }

    /// Decimal value
    pub fn into_decimal(self) -> Result<Decimal> {
        match self {
            FieldValue::Decimal(v) => Ok(v),
            FieldValue::Integer(v) => Ok(Decimal::from(v)),
            other => Err(other.mismatch("decimal")),
        }
    }

    /// Date value
    pub fn into_date(self) -> Result<NaiveDate> {
        match self {
            FieldValue::Date(v) => Ok(v),
            FieldValue::DateTime(v) => Ok(v.date()),
            FieldValue::DateTimeOffset(v) => Ok(v.date_naive()),
            other => Err(other.mismatch("date")),
        }
    }

    /// Time value
    pub fn into_time(self) -> Result<NaiveTime> {
        match self {
            FieldValue::Time(v) => Ok(v),
            FieldValue::DateTime(v) => Ok(v.time()),
            other => Err(other.mismatch("time")),
        }
    }

    /// Date and time without offset
    pub fn into_datetime(self) -> Result<NaiveDateTime> {
        match self {
            FieldValue::DateTime(v) => Ok(v),
            FieldValue::DateTimeOffset(v) => Ok(v.naive_local()),
            FieldValue::Date(v) => Ok(v.and_time(NaiveTime::MIN)),
            other => Err(other.mismatch("datetime")),
        }
    }

    /// Date and time with offset
    pub fn into_datetime_offset(self) -> Result<DateTime<FixedOffset>> {
        match self {
            FieldValue::DateTimeOffset(v) => Ok(v),
            other => Err(other.mismatch("datetime with offset")),
        }
    }

    /// Coded enumeration member
    pub fn into_coded(self) -> Result<CodedMember> {
        match self {
            FieldValue::Coded(v) => Ok(v),
            other => Err(other.mismatch("coded member")),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Text(v) => f.write_str(v),
            FieldValue::Integer(v) => write!(f, "{}", v),
            FieldValue::Decimal(v) => write!(f, "{}", v),
            FieldValue::Date(v) => write!(f, "{}", v.format("%Y-%m-%d")),
            FieldValue::Time(v) => write!(f, "{}", v.format("%H:%M:%S")),
            FieldValue::DateTime(v) => write!(f, "{}", v.format("%Y-%m-%dT%H:%M:%S")),
            FieldValue::DateTimeOffset(v) => write!(f, "{}", v.format("%Y-%m-%dT%H:%M:%S%:z")),
            FieldValue::Coded(v) => f.write_str(v.name),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::Text(v.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::Text(v)
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Integer(v)
    }
}

impl From<i32> for FieldValue {
    fn from(v: i32) -> Self {
        FieldValue::Integer(i64::from(v))
    }
}

impl From<u32> for FieldValue {
    fn from(v: u32) -> Self {
        FieldValue::Integer(i64::from(v))
    }
}

impl From<Decimal> for FieldValue {
    fn from(v: Decimal) -> Self {
        FieldValue::Decimal(v)
    }
}

impl From<NaiveDate> for FieldValue {
    fn from(v: NaiveDate) -> Self {
        FieldValue::Date(v)
    }
}

impl From<NaiveTime> for FieldValue {
    fn from(v: NaiveTime) -> Self {
        FieldValue::Time(v)
    }
}

impl From<NaiveDateTime> for FieldValue {
    fn from(v: NaiveDateTime) -> Self {
        FieldValue::DateTime(v)
    }
}

impl From<DateTime<FixedOffset>> for FieldValue {
    fn from(v: DateTime<FixedOffset>) -> Self {
        FieldValue::DateTimeOffset(v)
    }
}

impl From<CodedMember> for FieldValue {
    fn from(v: CodedMember) -> Self {
        FieldValue::Coded(v)
    }
}

/// Conventions used to read values supplied as text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Locale {
    /// Decimal separator
    pub decimal_separator: char,
    /// Group (thousands) separator, ignored while parsing
    pub group_separator: Option<char>,
    /// Accepted date layouts (chrono `strftime` syntax)
    pub date_formats: Vec<String>,
    /// Accepted time layouts
    pub time_formats: Vec<String>,
    /// Accepted date and time layouts
    pub datetime_formats: Vec<String>,
}

impl Default for Locale {
    fn default() -> Self {
        Self::invariant()
    }
}

fn formats(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl Locale {
    /// Culture-neutral conventions (`1,234.56`, ISO dates)
    pub fn invariant() -> Self {
        Self {
            decimal_separator: '.',
            group_separator: Some(','),
            date_formats: formats(&["%Y-%m-%d", "%Y%m%d", "%m/%d/%Y"]),
            time_formats: formats(&["%H:%M:%S%.f", "%H:%M", "%H%M%S"]),
            datetime_formats: formats(&[
                "%Y-%m-%dT%H:%M:%S%.f",
                "%Y-%m-%d %H:%M:%S%.f",
                "%Y-%m-%dT%H:%M",
                "%m/%d/%Y %H:%M:%S",
            ]),
        }
    }

    /// Brazilian conventions (`1.234,56`, `dd/mm/yyyy`)
    pub fn pt_br() -> Self {
        Self {
            decimal_separator: ',',
            group_separator: Some('.'),
            date_formats: formats(&["%d/%m/%Y", "%Y-%m-%d", "%Y%m%d"]),
            time_formats: formats(&["%H:%M:%S%.f", "%H:%M", "%H%M%S"]),
            datetime_formats: formats(&[
                "%d/%m/%Y %H:%M:%S",
                "%d/%m/%Y %H:%M",
                "%Y-%m-%dT%H:%M:%S%.f",
                "%Y-%m-%d %H:%M:%S%.f",
            ]),
        }
    }

    /// Group separator, unless it collides with the decimal separator
    pub fn effective_group_separator(&self) -> Option<char> {
        self.group_separator.filter(|g| *g != self.decimal_separator)
    }

    /// Parse a decimal written with this locale's separators
    ///
    /// The decimal separator takes precedence over a group separator
    /// configured with the same character.
    pub fn parse_decimal(&self, text: &str) -> Option<Decimal> {
        let group = self.effective_group_separator();
        let mut normalized = String::with_capacity(text.len());
        for c in text.trim().chars() {
            if c == self.decimal_separator {
                normalized.push('.');
            } else if Some(c) == group || c.is_whitespace() {
                continue;
            } else {
                normalized.push(c);
            }
        }
        if normalized.is_empty() {
            return None;
        }

        Decimal::from_str(&normalized)
            .ok()
            .or_else(|| Decimal::from_scientific(&normalized).ok())
    }

    /// Parse a date, accepting date and time layouts
    pub fn parse_date(&self, text: &str) -> Option<NaiveDate> {
        let text = text.trim();
        self.date_formats
            .iter()
            .find_map(|f| NaiveDate::parse_from_str(text, f).ok())
            .or_else(|| self.parse_datetime(text).map(|dt| dt.date()))
            .or_else(|| DateTime::parse_from_rfc3339(text).ok().map(|dt| dt.date_naive()))
    }

    /// Parse a time of day, accepting date and time layouts
    pub fn parse_time(&self, text: &str) -> Option<NaiveTime> {
        let text = text.trim();
        self.time_formats
            .iter()
            .find_map(|f| NaiveTime::parse_from_str(text, f).ok())
            .or_else(|| self.parse_datetime(text).map(|dt| dt.time()))
            .or_else(|| DateTime::parse_from_rfc3339(text).ok().map(|dt| dt.time()))
    }

    /// Parse a date and time without offset; a bare date means midnight
    pub fn parse_datetime(&self, text: &str) -> Option<NaiveDateTime> {
        let text = text.trim();
        self.datetime_formats
            .iter()
            .find_map(|f| NaiveDateTime::parse_from_str(text, f).ok())
            .or_else(|| {
                self.date_formats
                    .iter()
                    .find_map(|f| NaiveDate::parse_from_str(text, f).ok())
                    .map(|d| d.and_time(NaiveTime::MIN))
            })
    }
}

/// Parse a timestamp as written in fiscal documents
///
/// Accepts `YYYY-MM-DDTHH:MM:SS`, with optional fractional seconds, an
/// optional `±HH:MM` or `Z` offset, a space instead of `T`, or a bare date.
pub fn parse_timestamp(text: &str) -> Option<FieldValue> {
    let text = text.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(FieldValue::DateTimeOffset(dt));
    }
    for layout in ["%Y-%m-%d %H:%M:%S%.f%:z", "%Y-%m-%dT%H:%M%:z"] {
        if let Ok(dt) = DateTime::parse_from_str(text, layout) {
            return Some(FieldValue::DateTimeOffset(dt));
        }
    }
    for layout in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, layout) {
            return Some(FieldValue::DateTime(dt));
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .map(|d| FieldValue::DateTime(d.and_time(NaiveTime::MIN)))
}
