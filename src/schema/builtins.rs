//! XSD built-in simple types
//!
//! Each built-in knows its white space rule and how to check a lexical
//! value, yielding the [`Atomic`] value used by the bound and digit facets.

use super::facets::WhiteSpace;
use crate::names::{is_valid_name, is_valid_ncname, is_valid_nmtoken, is_valid_qname};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

static INTEGER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[+-]?[0-9]+$").expect("valid regex"));
static DECIMAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[+-]?([0-9]+(\.[0-9]*)?|\.[0-9]+)$").expect("valid regex"));
static FLOAT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([+-]?([0-9]+(\.[0-9]*)?|\.[0-9]+)([eE][+-]?[0-9]+)?|[+-]?INF|NaN)$").expect("valid regex")
});
const TIMEZONE: &str = r"(Z|[+-]((0[0-9]|1[0-3]):[0-5][0-9]|14:00))?";
static DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(&format!(r"^-?([1-9][0-9]{{4,}}|[0-9]{{4}})-(0[1-9]|1[0-2])-(0[1-9]|[12][0-9]|3[01]){}$", TIMEZONE)).expect("valid regex"));
static TIME: Lazy<Regex> =
    Lazy::new(|| Regex::new(&format!(r"^(([01][0-9]|2[0-3]):[0-5][0-9]:[0-5][0-9](\.[0-9]+)?|24:00:00(\.0+)?){}$", TIMEZONE)).expect("valid regex"));
static DATETIME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"^-?([1-9][0-9]{{4,}}|[0-9]{{4}})-(0[1-9]|1[0-2])-(0[1-9]|[12][0-9]|3[01])T(([01][0-9]|2[0-3]):[0-5][0-9]:[0-5][0-9](\.[0-9]+)?|24:00:00(\.0+)?){}$",
        TIMEZONE
    ))
    .expect("valid regex")
});
static GYEAR: Lazy<Regex> =
    Lazy::new(|| Regex::new(&format!(r"^-?([1-9][0-9]{{4,}}|[0-9]{{4}}){}$", TIMEZONE)).expect("valid regex"));
static GYEAR_MONTH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"^-?([1-9][0-9]{{4,}}|[0-9]{{4}})-(0[1-9]|1[0-2]){}$", TIMEZONE)).expect("valid regex")
});
static GMONTH: Lazy<Regex> =
    Lazy::new(|| Regex::new(&format!(r"^--(0[1-9]|1[0-2]){}$", TIMEZONE)).expect("valid regex"));
static GDAY: Lazy<Regex> =
    Lazy::new(|| Regex::new(&format!(r"^---(0[1-9]|[12][0-9]|3[01]){}$", TIMEZONE)).expect("valid regex"));
static GMONTH_DAY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"^--(0[1-9]|1[0-2])-(0[1-9]|[12][0-9]|3[01]){}$", TIMEZONE)).expect("valid regex")
});
static DURATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^-?P([0-9]+Y)?([0-9]+M)?([0-9]+D)?(T([0-9]+H)?([0-9]+M)?([0-9]+(\.[0-9]+)?S)?)?$").expect("valid regex")
});
static LANGUAGE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z]{1,8}(-[a-zA-Z0-9]{1,8})*$").expect("valid regex"));
static HEX_BINARY: Lazy<Regex> = Lazy::new(|| Regex::new(r"^([0-9a-fA-F]{2})*$").expect("valid regex"));

/// Value of an atomic type, as far as facets need it
#[derive(Debug, Clone, PartialEq)]
pub enum Atomic {
    /// Character data; length counts characters
    Text(String),
    /// Boolean
    Boolean(bool),
    /// decimal and the integer family
    Decimal(Decimal),
    /// float and double
    Float(f64),
    /// Date and time values, compared on their lexical form
    Temporal(String),
    /// Binary data; length counts octets
    Binary(Vec<u8>),
    /// Whitespace separated list; length counts items
    List(Vec<String>),
}

impl Atomic {
    /// Order two values of the same kind
    pub fn compare(&self, other: &Atomic) -> Option<Ordering> {
        match (self, other) {
            (Atomic::Decimal(a), Atomic::Decimal(b)) => Some(a.cmp(b)),
            (Atomic::Float(a), Atomic::Float(b)) => a.partial_cmp(b),
            (Atomic::Decimal(a), Atomic::Float(b)) => a.to_string().parse::<f64>().ok()?.partial_cmp(b),
            (Atomic::Float(a), Atomic::Decimal(b)) => a.partial_cmp(&b.to_string().parse::<f64>().ok()?),
            (Atomic::Temporal(a), Atomic::Temporal(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    /// Length as measured by the length facets
    pub fn length(&self) -> Option<usize> {
        match self {
            Atomic::Text(s) => Some(s.chars().count()),
            Atomic::Binary(b) => Some(b.len()),
            Atomic::List(items) => Some(items.len()),
            _ => None,
        }
    }
}

impl fmt::Display for Atomic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Atomic::Text(s) | Atomic::Temporal(s) => write!(f, "{}", s),
            Atomic::Boolean(b) => write!(f, "{}", b),
            Atomic::Decimal(d) => write!(f, "{}", d),
            Atomic::Float(v) => write!(f, "{}", v),
            Atomic::Binary(b) => write!(f, "{} octets", b.len()),
            Atomic::List(items) => write!(f, "{}", items.join(" ")),
        }
    }
}

/// Built-in simple types known to the validator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum Builtin {
    AnySimpleType,
    String,
    NormalizedString,
    Token,
    Language,
    Name,
    NCName,
    Id,
    IdRef,
    IdRefs,
    Entity,
    Entities,
    NmToken,
    NmTokens,
    Boolean,
    Decimal,
    Integer,
    Long,
    Int,
    Short,
    Byte,
    NonNegativeInteger,
    PositiveInteger,
    NonPositiveInteger,
    NegativeInteger,
    UnsignedLong,
    UnsignedInt,
    UnsignedShort,
    UnsignedByte,
    Float,
    Double,
    Date,
    Time,
    DateTime,
    GYear,
    GYearMonth,
    GMonth,
    GDay,
    GMonthDay,
    Duration,
    Base64Binary,
    HexBinary,
    AnyUri,
    QName,
    Notation,
}

const BUILTIN_NAMES: &[(&str, Builtin)] = &[
    ("anySimpleType", Builtin::AnySimpleType),
    ("anyAtomicType", Builtin::AnySimpleType),
    ("string", Builtin::String),
    ("normalizedString", Builtin::NormalizedString),
    ("token", Builtin::Token),
    ("language", Builtin::Language),
    ("Name", Builtin::Name),
    ("NCName", Builtin::NCName),
    ("ID", Builtin::Id),
    ("IDREF", Builtin::IdRef),
    ("IDREFS", Builtin::IdRefs),
    ("ENTITY", Builtin::Entity),
    ("ENTITIES", Builtin::Entities),
    ("NMTOKEN", Builtin::NmToken),
    ("NMTOKENS", Builtin::NmTokens),
    ("boolean", Builtin::Boolean),
    ("decimal", Builtin::Decimal),
    ("integer", Builtin::Integer),
    ("long", Builtin::Long),
    ("int", Builtin::Int),
    ("short", Builtin::Short),
    ("byte", Builtin::Byte),
    ("nonNegativeInteger", Builtin::NonNegativeInteger),
    ("positiveInteger", Builtin::PositiveInteger),
    ("nonPositiveInteger", Builtin::NonPositiveInteger),
    ("negativeInteger", Builtin::NegativeInteger),
    ("unsignedLong", Builtin::UnsignedLong),
    ("unsignedInt", Builtin::UnsignedInt),
    ("unsignedShort", Builtin::UnsignedShort),
    ("unsignedByte", Builtin::UnsignedByte),
    ("float", Builtin::Float),
    ("double", Builtin::Double),
    ("date", Builtin::Date),
    ("time", Builtin::Time),
    ("dateTime", Builtin::DateTime),
    ("gYear", Builtin::GYear),
    ("gYearMonth", Builtin::GYearMonth),
    ("gMonth", Builtin::GMonth),
    ("gDay", Builtin::GDay),
    ("gMonthDay", Builtin::GMonthDay),
    ("duration", Builtin::Duration),
    ("base64Binary", Builtin::Base64Binary),
    ("hexBinary", Builtin::HexBinary),
    ("anyURI", Builtin::AnyUri),
    ("QName", Builtin::QName),
    ("NOTATION", Builtin::Notation),
];

impl Builtin {
    /// Look a built-in up by its local name in the XSD namespace
    pub fn from_name(name: &str) -> Option<Builtin> {
        BUILTIN_NAMES
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, b)| *b)
    }

    /// Local name in the XSD namespace
    pub fn name(&self) -> &'static str {
        BUILTIN_NAMES
            .iter()
            .find(|(_, b)| b == self)
            .map(|(n, _)| *n)
            .unwrap_or("anySimpleType")
    }

    /// White space rule of the type
    pub fn white_space(&self) -> WhiteSpace {
        match self {
            Builtin::String | Builtin::AnySimpleType => WhiteSpace::Preserve,
            Builtin::NormalizedString => WhiteSpace::Replace,
            _ => WhiteSpace::Collapse,
        }
    }

    fn integer_range(&self) -> Option<(Option<i128>, Option<i128>)> {
        let range = match self {
            Builtin::Integer => (None, None),
            Builtin::Long => (Some(i64::MIN as i128), Some(i64::MAX as i128)),
            Builtin::Int => (Some(i32::MIN as i128), Some(i32::MAX as i128)),
            Builtin::Short => (Some(i16::MIN as i128), Some(i16::MAX as i128)),
            Builtin::Byte => (Some(i8::MIN as i128), Some(i8::MAX as i128)),
            Builtin::NonNegativeInteger => (Some(0), None),
            Builtin::PositiveInteger => (Some(1), None),
            Builtin::NonPositiveInteger => (None, Some(0)),
            Builtin::NegativeInteger => (None, Some(-1)),
            Builtin::UnsignedLong => (Some(0), Some(u64::MAX as i128)),
            Builtin::UnsignedInt => (Some(0), Some(u32::MAX as i128)),
            Builtin::UnsignedShort => (Some(0), Some(u16::MAX as i128)),
            Builtin::UnsignedByte => (Some(0), Some(u8::MAX as i128)),
            _ => return None,
        };
        Some(range)
    }

    /// Check a value already normalized with [`Builtin::white_space`]
    pub fn parse(&self, value: &str) -> Result<Atomic, String> {
        let invalid = || format!("'{}' is not a valid xs:{}", value, self.name());
        let matches = |regex: &Regex| if regex.is_match(value) { Ok(()) } else { Err(invalid()) };

        if let Some((min, max)) = self.integer_range() {
            if !INTEGER.is_match(value) {
                return Err(invalid());
            }
            let parsed = Decimal::from_str(value.trim_start_matches('+')).map_err(|_| invalid())?;
            let as_int = parsed.mantissa();
            if min.map_or(false, |m| as_int < m) || max.map_or(false, |m| as_int > m) {
                return Err(format!("'{}' is out of range for xs:{}", value, self.name()));
            }
            return Ok(Atomic::Decimal(parsed));
        }

        match self {
            Builtin::AnySimpleType | Builtin::String | Builtin::NormalizedString => {
                Ok(Atomic::Text(value.to_string()))
            }
            Builtin::Token => {
                if value.starts_with(' ') || value.ends_with(' ') || value.contains("  ") {
                    return Err(invalid());
                }
                Ok(Atomic::Text(value.to_string()))
            }
            Builtin::Language => matches(&LANGUAGE).map(|_| Atomic::Text(value.to_string())),
            Builtin::Name => check(is_valid_name(value), value, invalid),
            Builtin::NCName | Builtin::Id | Builtin::IdRef | Builtin::Entity => {
                check(is_valid_ncname(value), value, invalid)
            }
            Builtin::NmToken => check(is_valid_nmtoken(value), value, invalid),
            Builtin::IdRefs | Builtin::Entities | Builtin::NmTokens => {
                let items: Vec<String> = value.split(' ').map(str::to_string).collect();
                let item_ok = |item: &String| match self {
                    Builtin::NmTokens => is_valid_nmtoken(item),
                    _ => is_valid_ncname(item),
                };
                if value.is_empty() || !items.iter().all(item_ok) {
                    return Err(invalid());
                }
                Ok(Atomic::List(items))
            }
            Builtin::QName | Builtin::Notation => check(is_valid_qname(value), value, invalid),
            Builtin::Boolean => match value {
                "true" | "1" => Ok(Atomic::Boolean(true)),
                "false" | "0" => Ok(Atomic::Boolean(false)),
                _ => Err(invalid()),
            },
            Builtin::Decimal => {
                matches(&DECIMAL)?;
                let text = value.trim_start_matches('+');
                let text = if text.ends_with('.') { &text[..text.len() - 1] } else { text };
                let normalized = if text.starts_with('.') {
                    format!("0{}", text)
                } else if let Some(rest) = text.strip_prefix("-.") {
                    format!("-0.{}", rest)
                } else {
                    text.to_string()
                };
                Decimal::from_str(&normalized)
                    .map(Atomic::Decimal)
                    .map_err(|_| format!("'{}' is out of range for xs:decimal", value))
            }
            Builtin::Float | Builtin::Double => {
                matches(&FLOAT)?;
                let parsed = match value {
                    "INF" | "+INF" => f64::INFINITY,
                    "-INF" => f64::NEG_INFINITY,
                    "NaN" => f64::NAN,
                    _ => value.parse::<f64>().map_err(|_| invalid())?,
                };
                Ok(Atomic::Float(parsed))
            }
            Builtin::Date => temporal(&DATE, value, invalid),
            Builtin::Time => temporal(&TIME, value, invalid),
            Builtin::DateTime => temporal(&DATETIME, value, invalid),
            Builtin::GYear => temporal(&GYEAR, value, invalid),
            Builtin::GYearMonth => temporal(&GYEAR_MONTH, value, invalid),
            Builtin::GMonth => temporal(&GMONTH, value, invalid),
            Builtin::GDay => temporal(&GDAY, value, invalid),
            Builtin::GMonthDay => temporal(&GMONTH_DAY, value, invalid),
            Builtin::Duration => {
                if !DURATION.is_match(value) || value.ends_with('P') || value.ends_with('T') {
                    return Err(invalid());
                }
                Ok(Atomic::Text(value.to_string()))
            }
            Builtin::HexBinary => {
                matches(&HEX_BINARY)?;
                let bytes = (0..value.len())
                    .step_by(2)
                    .map(|i| u8::from_str_radix(&value[i..i + 2], 16))
                    .collect::<Result<Vec<u8>, _>>()
                    .map_err(|_| invalid())?;
                Ok(Atomic::Binary(bytes))
            }
            Builtin::Base64Binary => {
                let compact: String = value.chars().filter(|c| !c.is_whitespace()).collect();
                STANDARD
                    .decode(compact)
                    .map(Atomic::Binary)
                    .map_err(|_| invalid())
            }
            Builtin::AnyUri => {
                if value.contains(['\n', '\r', '\t']) {
                    return Err(invalid());
                }
                Ok(Atomic::Text(value.to_string()))
            }
            _ => Err(invalid()),
        }
    }
}

fn check(valid: bool, value: &str, invalid: impl Fn() -> String) -> Result<Atomic, String> {
    if valid {
        Ok(Atomic::Text(value.to_string()))
    } else {
        Err(invalid())
    }
}

fn temporal(regex: &Regex, value: &str, invalid: impl Fn() -> String) -> Result<Atomic, String> {
    if regex.is_match(value) {
        Ok(Atomic::Temporal(value.to_string()))
    } else {
        Err(invalid())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok(builtin: Builtin, value: &str) -> bool {
        builtin.parse(value).is_ok()
    }

    #[test]
    fn test_lookup() {
        assert_eq!(Builtin::from_name("unsignedByte"), Some(Builtin::UnsignedByte));
        assert_eq!(Builtin::from_name("dateTime").map(|b| b.name()), Some("dateTime"));
        assert_eq!(Builtin::from_name("TString"), None);
    }

    #[test]
    fn test_string_types() {
        assert!(ok(Builtin::String, "  any\ttext "));
        assert!(ok(Builtin::Token, "a b"));
        assert!(!ok(Builtin::Token, "a  b"));
        assert!(ok(Builtin::Language, "pt-BR"));
        assert!(ok(Builtin::NCName, "infNFe"));
        assert!(!ok(Builtin::NCName, "ds:Signature"));
        assert!(ok(Builtin::Id, "NFe35240112345678000195550010000000011000000012"));
        assert!(!ok(Builtin::Id, "35240112345678000195550010000000011000000012"));
    }

    #[test]
    fn test_numeric_types() {
        assert!(ok(Builtin::Integer, "-12345678901234567890"));
        assert!(ok(Builtin::UnsignedByte, "255"));
        assert!(!ok(Builtin::UnsignedByte, "256"));
        assert!(!ok(Builtin::PositiveInteger, "0"));
        assert!(ok(Builtin::Short, "+12"));
        assert!(!ok(Builtin::Int, "1.0"));

        assert_eq!(
            Builtin::Decimal.parse("10.50").unwrap(),
            Atomic::Decimal(Decimal::new(1050, 2))
        );
        assert!(ok(Builtin::Decimal, ".5"));
        assert!(ok(Builtin::Decimal, "5."));
        assert!(!ok(Builtin::Decimal, "1,5"));
        assert!(!ok(Builtin::Decimal, "1e3"));

        assert!(ok(Builtin::Double, "1.5E10"));
        assert!(ok(Builtin::Float, "-INF"));
        assert!(!ok(Builtin::Float, "inf"));
    }

    #[test]
    fn test_boolean() {
        assert_eq!(Builtin::Boolean.parse("1").unwrap(), Atomic::Boolean(true));
        assert_eq!(Builtin::Boolean.parse("false").unwrap(), Atomic::Boolean(false));
        assert!(!ok(Builtin::Boolean, "yes"));
    }

    #[test]
    fn test_temporal_types() {
        assert!(ok(Builtin::Date, "2024-01-15"));
        assert!(!ok(Builtin::Date, "2024-13-01"));
        assert!(!ok(Builtin::Date, "20240115"));
        assert!(ok(Builtin::Time, "14:30:00"));
        assert!(ok(Builtin::DateTime, "2024-01-15T14:30:00-03:00"));
        assert!(ok(Builtin::DateTime, "2024-01-15T14:30:00.123Z"));
        assert!(!ok(Builtin::DateTime, "2024-01-15 14:30:00"));
        assert!(ok(Builtin::GYearMonth, "2024-01"));
        assert!(ok(Builtin::GMonthDay, "--12-25"));
        assert!(ok(Builtin::Duration, "P1Y2M3DT4H"));
        assert!(!ok(Builtin::Duration, "P"));
        assert!(!ok(Builtin::Duration, "P1YT"));
    }

    #[test]
    fn test_binary_types() {
        assert_eq!(Builtin::HexBinary.parse("0FB7").unwrap().length(), Some(2));
        assert!(!ok(Builtin::HexBinary, "0FB"));
        assert_eq!(Builtin::Base64Binary.parse("aGVsbG8=").unwrap().length(), Some(5));
        assert!(!ok(Builtin::Base64Binary, "***"));
    }

    #[test]
    fn test_list_types() {
        assert_eq!(Builtin::NmTokens.parse("a b c").unwrap().length(), Some(3));
        assert!(!ok(Builtin::IdRefs, ""));
    }

    #[test]
    fn test_compare() {
        let a = Builtin::Decimal.parse("1.5").unwrap();
        let b = Builtin::Integer.parse("2").unwrap();
        assert_eq!(a.compare(&b), Some(Ordering::Less));
        let d1 = Builtin::Date.parse("2024-01-01").unwrap();
        let d2 = Builtin::Date.parse("2024-02-01").unwrap();
        assert_eq!(d1.compare(&d2), Some(Ordering::Less));
        assert_eq!(a.compare(&d1), None);
    }
}
