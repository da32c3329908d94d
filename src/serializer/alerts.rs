//! Conversion alerts
//!
//! Alerts are non-fatal, field-scoped diagnostics. Each one is rendered
//! through the collector template and appended in field order.

use std::fmt;

/// Template used when none is configured
pub const DEFAULT_TEMPLATE: &str = "TAG:%TAG% ID:%ID%/%TAG%(%DESCRICAO%) - %MSG%.";

/// Standard alert messages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertKind {
    /// Converted text longer than the maximum length
    TooLong,
    /// Converted text shorter than the minimum length
    TooShort,
    /// Mandatory field without value
    Missing,
    /// Content that cannot be converted
    Invalid,
    /// More fractional digits than allowed
    TooManyDecimals,
    /// More occurrences than allowed
    TooManyOccurrences,
    /// Fewer occurrences than required
    TooFewOccurrences,
    /// End of a range below its start
    RangeReversed,
    /// Referenced file not found
    FileNotFound,
    /// Mutually exclusive fields both filled
    OnlyOne,
}

impl AlertKind {
    /// Message text
    pub fn message(self) -> &'static str {
        match self {
            AlertKind::TooLong => "Tamanho maior que o máximo permitido",
            AlertKind::TooShort => "Tamanho menor que o mínimo permitido",
            AlertKind::Missing => "Nenhum valor informado",
            AlertKind::Invalid => "Conteúdo inválido",
            AlertKind::TooManyDecimals => "Numero máximo de casas decimais permitidas",
            AlertKind::TooManyOccurrences => {
                "Número de ocorrências maior que o máximo permitido - Máximo "
            }
            AlertKind::TooFewOccurrences => {
                "Número de ocorrências menor que o mínimo permitido - Mínimo "
            }
            AlertKind::RangeReversed => "O numero final não pode ser menor que o inicial",
            AlertKind::FileNotFound => "Arquivo não encontrado",
            AlertKind::OnlyOne => "Somente um campo deve ser preenchido",
        }
    }
}

impl fmt::Display for AlertKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// A diagnostic about one field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alert {
    /// Descriptor id
    pub field_id: String,
    /// Tag name
    pub field_name: String,
    /// Descriptor description
    pub field_description: String,
    /// Message text
    pub message: String,
}

impl Alert {
    /// Render through a template with `%ID%`, `%TAG%`, `%DESCRICAO%` and `%MSG%`
    pub fn render(&self, template: &str) -> String {
        template
            .replace("%ID%", &self.field_id)
            .replace("%TAG%", &format!("<{}>", self.field_name))
            .replace("%DESCRICAO%", &self.field_description)
            .replace("%MSG%", &self.message)
    }
}

/// Ordered list of rendered alerts plus the template that renders them
#[derive(Debug, Clone)]
pub struct AlertCollector {
    template: String,
    alerts: Vec<String>,
}

impl Default for AlertCollector {
    fn default() -> Self {
        Self::new(DEFAULT_TEMPLATE)
    }
}

impl AlertCollector {
    /// Create an empty collector
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            alerts: Vec::new(),
        }
    }

    /// Current template
    pub fn template(&self) -> &str {
        &self.template
    }

    /// Replace the template; alerts already rendered are kept as they are
    pub fn set_template(&mut self, template: impl Into<String>) {
        self.template = template.into();
    }

    /// Render and append an alert
    pub fn record(&mut self, alert: &Alert) {
        log::debug!("alert on {} <{}>: {}", alert.field_id, alert.field_name, alert.message);
        self.alerts.push(alert.render(&self.template));
    }

    /// Rendered alerts in recording order
    pub fn alerts(&self) -> &[String] {
        &self.alerts
    }

    /// Whether no alert has been recorded
    pub fn is_empty(&self) -> bool {
        self.alerts.is_empty()
    }

    /// Number of recorded alerts
    pub fn len(&self) -> usize {
        self.alerts.len()
    }

    /// Drop all recorded alerts
    pub fn clear(&mut self) {
        self.alerts.clear();
    }

    /// Take the recorded alerts, leaving the collector empty
    pub fn take(&mut self) -> Vec<String> {
        std::mem::take(&mut self.alerts)
    }
}
