//! Serializer configuration

use super::alerts::DEFAULT_TEMPLATE;
use super::values::Locale;
use crate::error::{Error, Result};
use chrono::FixedOffset;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Options of a conversion session
///
/// Loadable from JSON; every field is optional there.
///
/// ```json
/// { "strip_accents": true, "locale": { "decimal_separator": "," }, "utc_offset_minutes": -180 }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerializerOptions {
    /// Replace accented characters in emitted text
    pub strip_accents: bool,

    /// Indent the rendered XML
    pub format_xml: bool,

    /// Spaces per indentation level when `format_xml` is set
    pub indent: usize,

    /// Leave the `<?xml ...?>` declaration out of rendered documents
    pub omit_declaration: bool,

    /// Alert template (`%ID%`, `%TAG%`, `%DESCRICAO%`, `%MSG%`)
    pub alert_template: String,

    /// Conventions for values supplied as text
    pub locale: Locale,

    /// Offset given to date-times without one; the local offset when unset
    pub utc_offset_minutes: Option<i32>,
}

impl Default for SerializerOptions {
    fn default() -> Self {
        Self {
            strip_accents: false,
            format_xml: true,
            indent: 2,
            omit_declaration: false,
            alert_template: DEFAULT_TEMPLATE.to_string(),
            locale: Locale::invariant(),
            utc_offset_minutes: None,
        }
    }
}

impl SerializerOptions {
    /// Create default options
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse options from JSON
    pub fn from_json(json: &str) -> Result<Self> {
        let mut options: Self = serde_json::from_str(json)
            .map_err(|e| Error::Configuration(format!("invalid serializer options: {}", e)))?;
        options.utc_offset()?;
        options.locale.group_separator = options.locale.effective_group_separator();
        Ok(options)
    }

    /// Read options from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::Configuration(format!(
                "options file not found: {}",
                path.display()
            )));
        }
        Self::from_json(&std::fs::read_to_string(path)?)
    }

    /// Set accent stripping
    pub fn with_strip_accents(mut self, strip: bool) -> Self {
        self.strip_accents = strip;
        self
    }

    /// Set the locale used to read text values
    pub fn with_locale(mut self, locale: Locale) -> Self {
        self.locale = locale;
        self
    }

    /// Set the fixed UTC offset
    pub fn with_utc_offset(mut self, offset: FixedOffset) -> Self {
        self.utc_offset_minutes = Some(offset.local_minus_utc() / 60);
        self
    }

    /// Configured offset, if any
    pub fn utc_offset(&self) -> Result<Option<FixedOffset>> {
        match self.utc_offset_minutes {
            None => Ok(None),
            Some(minutes) => minutes
                .checked_mul(60)
                .and_then(FixedOffset::east_opt)
                .map(Some)
                .ok_or_else(|| {
                    Error::Configuration(format!("UTC offset out of range: {} minutes", minutes))
                }),
        }
    }
}
