//! Value converter
//!
//! Turns one typed field value into its canonical text and back, following
//! the field kind of its descriptor. Serialization is tolerant: text that
//! cannot be read as the declared kind makes the field empty and the length
//! rules decide whether that deserves an alert. Deserialization is strict and
//! reports malformed literals as [`Error::Format`].

use super::alerts::{Alert, AlertKind};
use super::descriptors::{FieldDescriptor, FieldKind, Layout, Scale};
use super::nodes::XmlSource;
use super::options::SerializerOptions;
use super::values::{parse_timestamp, FieldValue};
use crate::error::{Error, Result};
use chrono::{DateTime, FixedOffset, Local, NaiveDate, NaiveDateTime, NaiveTime, TimeZone};
use rust_decimal::{Decimal, RoundingStrategy};
use std::fmt;
use std::str::FromStr;

/// Outcome of converting one field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionResult {
    /// Canonical text
    pub text: String,
    /// Whether the field has no value (missing or unreadable)
    pub is_empty: bool,
    /// Length-rule violation, if any
    pub alert: Option<Alert>,
}

/// Converter function for `Custom` fields, serialize direction
pub type SerializeFn = Box<dyn Fn(Option<&FieldValue>) -> Result<String> + Send + Sync>;

/// Converter function for `Custom` fields, deserialize direction
pub type DeserializeFn = Box<dyn Fn(&str) -> Result<FieldValue> + Send + Sync>;

/// Caller-supplied conversion pair bound to one field
pub struct CustomConverter {
    serialize: SerializeFn,
    deserialize: DeserializeFn,
}

impl CustomConverter {
    /// Pair a serializer with its inverse
    pub fn new<S, D>(serialize: S, deserialize: D) -> Self
    where
        S: Fn(Option<&FieldValue>) -> Result<String> + Send + Sync + 'static,
        D: Fn(&str) -> Result<FieldValue> + Send + Sync + 'static,
    {
        Self {
            serialize: Box::new(serialize),
            deserialize: Box::new(deserialize),
        }
    }

    /// Produce the text of a value
    pub fn serialize(&self, value: Option<&FieldValue>) -> Result<String> {
        (self.serialize)(value)
    }

    /// Read a value back
    pub fn deserialize(&self, text: &str) -> Result<FieldValue> {
        (self.deserialize)(text)
    }
}

impl fmt::Debug for CustomConverter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CustomConverter")
    }
}

/// Convert a value to its canonical text and apply the length rules
///
/// Errors only come from `Custom` fields (missing or failing converter) and
/// from an out-of-range configured offset; callers turn them into alerts.
pub fn serialize_value(
    value: Option<&FieldValue>,
    descriptor: &FieldDescriptor,
    options: &SerializerOptions,
    custom: Option<&CustomConverter>,
) -> Result<ConversionResult> {
    let mut is_empty = value.is_none();
    let mut text = String::new();

    match (descriptor.kind, value) {
        (FieldKind::Custom, _) => {
            let converter = custom.ok_or_else(|| {
                Error::Configuration(format!(
                    "no converter registered for field {} <{}>",
                    descriptor.id, descriptor.name
                ))
            })?;
            text = converter.serialize(value)?;
        }
        (_, None) => {}
        (kind, Some(value)) => match convert(kind, value, descriptor, options)? {
            Some(converted) => text = converted,
            None => {
                log::warn!(
                    "field {} <{}>: '{}' is not a valid {}, treated as empty",
                    descriptor.id,
                    descriptor.name,
                    value,
                    kind.name()
                );
                is_empty = true;
            }
        },
    }

    let alert = check_lengths(descriptor, &text, is_empty, value);
    log::debug!(
        "field {} <{}> => '{}' (empty: {})",
        descriptor.id,
        descriptor.name,
        text,
        is_empty
    );

    Ok(ConversionResult {
        text,
        is_empty,
        alert,
    })
}

/// `None` when the value cannot be read as `kind`
fn convert(
    kind: FieldKind,
    value: &FieldValue,
    descriptor: &FieldDescriptor,
    options: &SerializerOptions,
) -> Result<Option<String>> {
    let locale = &options.locale;

    let text = match kind {
        FieldKind::Text => Some(value.to_string().trim().to_string()),
        FieldKind::Date(layout) => {
            let date = match value {
                FieldValue::Date(d) => Some(*d),
                FieldValue::DateTime(dt) => Some(dt.date()),
                FieldValue::DateTimeOffset(dt) => Some(dt.date_naive()),
                other => locale.parse_date(&other.to_string()),
            };
            date.map(|d| format_date(d, layout))
        }
        FieldKind::Time(layout) => {
            let time = match value {
                FieldValue::Time(t) => Some(*t),
                FieldValue::DateTime(dt) => Some(dt.time()),
                FieldValue::DateTimeOffset(dt) => Some(dt.time()),
                other => locale.parse_time(&other.to_string()),
            };
            time.map(|t| format_time(t, layout))
        }
        FieldKind::DateTime => {
            let datetime = match value {
                FieldValue::DateTime(dt) => Some(*dt),
                FieldValue::DateTimeOffset(dt) => Some(dt.naive_local()),
                FieldValue::Date(d) => Some(d.and_time(NaiveTime::MIN)),
                other => {
                    let text = other.to_string();
                    locale.parse_datetime(&text).or_else(|| {
                        parse_timestamp(&text).and_then(|v| v.into_datetime().ok())
                    })
                }
            };
            datetime.map(|dt| dt.format("%Y-%m-%dT%H:%M:%S").to_string())
        }
        FieldKind::DateTimeWithOffset => {
            datetime_with_offset(value, options)?.map(|dt| dt.format("%Y-%m-%dT%H:%M:%S%:z").to_string())
        }
        FieldKind::Decimal(scale) => {
            let decimal = match value {
                FieldValue::Decimal(d) => Some(*d),
                FieldValue::Integer(i) => Some(Decimal::from(*i)),
                other => locale.parse_decimal(&other.to_string()),
            };
            decimal.and_then(|d| format_decimal(d, scale))
        }
        FieldKind::Integer | FieldKind::PaddedNumericString => {
            Some(zero_fill(&value.to_string(), descriptor.min_length))
        }
        FieldKind::DigitsOnlyString => Some(
            value
                .to_string()
                .chars()
                .filter(|c| c.is_ascii_digit())
                .collect(),
        ),
        FieldKind::CodedEnum(_) => Some(match value {
            FieldValue::Coded(member) => member.as_text().to_string(),
            other => other.to_string(),
        }),
        FieldKind::Custom => unreachable!("custom fields are converted by their converter"),
    };

    Ok(text)
}

fn datetime_with_offset(
    value: &FieldValue,
    options: &SerializerOptions,
) -> Result<Option<DateTime<FixedOffset>>> {
    let naive = match value {
        FieldValue::DateTimeOffset(dt) => return Ok(Some(*dt)),
        FieldValue::DateTime(dt) => Some(*dt),
        FieldValue::Date(d) => Some(d.and_time(NaiveTime::MIN)),
        other => {
            let text = other.to_string();
            match parse_timestamp(&text) {
                Some(FieldValue::DateTimeOffset(dt)) => return Ok(Some(dt)),
                Some(FieldValue::DateTime(dt)) => Some(dt),
                _ => options.locale.parse_datetime(&text),
            }
        }
    };

    match naive {
        Some(naive) => attach_offset(naive, options),
        None => Ok(None),
    }
}

/// Give a naive date-time the configured offset, or the local one
fn attach_offset(
    naive: NaiveDateTime,
    options: &SerializerOptions,
) -> Result<Option<DateTime<FixedOffset>>> {
    let offset = match options.utc_offset()? {
        Some(offset) => offset,
        None => match Local.offset_from_local_datetime(&naive).earliest() {
            Some(offset) => offset,
            None => return Ok(None),
        },
    };
    Ok(offset.from_local_datetime(&naive).single())
}

/// Format a date in the requested layout
pub fn format_date(date: NaiveDate, layout: Layout) -> String {
    match layout {
        Layout::Compact => date.format("%Y%m%d").to_string(),
        Layout::Separated => date.format("%Y-%m-%d").to_string(),
    }
}

/// Format a time in the requested layout
pub fn format_time(time: NaiveTime, layout: Layout) -> String {
    match layout {
        Layout::Compact => time.format("%H%M%S").to_string(),
        Layout::Separated => time.format("%H:%M:%S").to_string(),
    }
}

/// Fixed-point text with exactly `scale` fractional digits
///
/// Midpoints round away from zero; a result of zero never carries a sign.
/// `None` when the magnitude is too large to carry `scale` digits.
pub fn format_decimal(value: Decimal, scale: Scale) -> Option<String> {
    let digits = scale.digits();
    let mut rounded = value.round_dp_with_strategy(digits, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(digits);
    if rounded.scale() != digits {
        return None;
    }
    if rounded.is_zero() {
        rounded.set_sign_positive(true);
    }
    Some(rounded.to_string())
}

/// Left-pad with `0` up to `width` characters
pub fn zero_fill(text: &str, width: usize) -> String {
    let len = text.chars().count();
    if len >= width {
        return text.to_string();
    }
    let mut filled = "0".repeat(width - len);
    filled.push_str(text);
    filled
}

/// Apply the length rules to converted text
///
/// Later rules may replace the alert of an earlier one.
fn check_lengths(
    descriptor: &FieldDescriptor,
    text: &str,
    is_empty: bool,
    raw: Option<&FieldValue>,
) -> Option<Alert> {
    let has_content = !text.trim().is_empty();
    let len = text.chars().count();

    let mut kind = None;
    if descriptor.occurrence.is_required() && is_empty && descriptor.min_length > 0 {
        kind = Some(AlertKind::Missing);
    }
    if has_content && len < descriptor.min_length && kind.is_none() && len > 1 {
        kind = Some(AlertKind::TooShort);
    }
    if has_content && len > descriptor.max_length {
        kind = Some(AlertKind::TooLong);
    }

    let kind = kind?;
    let mut message = kind.message().to_string();
    if kind == AlertKind::Missing && !is_empty {
        let raw = raw.map(|v| v.to_string()).unwrap_or_default();
        message.push_str(&format!(" [{}]", raw));
    }

    Some(Alert {
        field_id: descriptor.id.clone(),
        field_name: descriptor.name.clone(),
        field_description: descriptor.description.clone(),
        message,
    })
}

/// Read a field value back from its source
///
/// Missing sources and blank text give `Ok(None)`.
pub fn deserialize_value(
    source: Option<XmlSource<'_, '_>>,
    descriptor: &FieldDescriptor,
    custom: Option<&CustomConverter>,
) -> Result<Option<FieldValue>> {
    let source = match source {
        Some(source) => source,
        None => return Ok(None),
    };
    let text = source.text();
    if text.trim().is_empty() {
        return Ok(None);
    }

    let malformed = |what: &str| Error::format(descriptor.id.as_str(), format!("'{}' is not a valid {}", text, what));

    let value = match descriptor.kind {
        FieldKind::Integer => text
            .trim()
            .parse::<i64>()
            .map(FieldValue::Integer)
            .map_err(|_| malformed("integer"))?,
        FieldKind::Date(layout) => {
            let (pattern, width) = match layout {
                Layout::Compact => ("%Y%m%d", 8),
                Layout::Separated => ("%Y-%m-%d", 10),
            };
            if text.len() != width {
                return Err(malformed("date"));
            }
            NaiveDate::parse_from_str(&text, pattern)
                .map(FieldValue::Date)
                .map_err(|_| malformed("date"))?
        }
        FieldKind::Time(layout) => {
            let (pattern, width) = match layout {
                Layout::Compact => ("%H%M%S", 6),
                Layout::Separated => ("%H:%M:%S", 8),
            };
            if text.len() != width {
                return Err(malformed("time"));
            }
            NaiveTime::parse_from_str(&text, pattern)
                .map(FieldValue::Time)
                .map_err(|_| malformed("time"))?
        }
        FieldKind::DateTime | FieldKind::DateTimeWithOffset => {
            parse_timestamp(&text).ok_or_else(|| malformed("timestamp"))?
        }
        FieldKind::Decimal(_) => Decimal::from_str(text.trim())
            .map(FieldValue::Decimal)
            .map_err(|_| malformed("decimal"))?,
        FieldKind::CodedEnum(table) => table
            .resolve(text.trim())
            .map(FieldValue::Coded)
            .ok_or_else(|| malformed(table.name))?,
        FieldKind::Custom => {
            let converter = custom.ok_or_else(|| {
                Error::Configuration(format!(
                    "no converter registered for field {} <{}>",
                    descriptor.id, descriptor.name
                ))
            })?;
            converter.deserialize(&text)?
        }
        FieldKind::Text | FieldKind::PaddedNumericString | FieldKind::DigitsOnlyString => {
            FieldValue::Text(text.into_owned())
        }
    };

    Ok(Some(value))
}
