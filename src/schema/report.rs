//! Validation results

use std::fmt;

/// Outcome of one validation call
///
/// Errors and warnings keep their emission order. Warnings never make a
/// document invalid.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    /// Schema violations and parse failures
    pub errors: Vec<String>,
    /// Ignored or unsupported constructs, lax content without declaration
    pub warnings: Vec<String>,
}

impl ValidationReport {
    /// Create an empty report
    pub fn new() -> Self {
        Self::default()
    }

    /// Report holding a single error
    pub fn failure(message: impl Into<String>) -> Self {
        let mut report = Self::new();
        report.error(message);
        report
    }

    /// `true` when no error was recorded
    pub fn ok(&self) -> bool {
        self.errors.is_empty()
    }

    /// Append an error
    pub fn error(&mut self, message: impl Into<String>) {
        let message = message.into();
        log::debug!("validation error: {}", message);
        self.errors.push(message);
    }

    /// Append a warning
    pub fn warning(&mut self, message: impl Into<String>) {
        let message = message.into();
        log::debug!("validation warning: {}", message);
        self.warnings.push(message);
    }

    /// Append the contents of another report
    pub fn extend(&mut self, other: ValidationReport) {
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
    }

    /// Split into `(ok, errors, warnings)`
    pub fn into_parts(self) -> (bool, Vec<String>, Vec<String>) {
        (self.errors.is_empty(), self.errors, self.warnings)
    }
}

/// One diagnostic with the place it refers to
///
/// Rendered as `message (path, line L, column C, source)`, leaving out the
/// parts that are unknown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaDiagnostic {
    /// What went wrong
    pub message: String,
    /// Element path inside the document (`/NFe/infNFe/ide`)
    pub path: Option<String>,
    /// 1-based line and column
    pub position: Option<(usize, usize)>,
    /// Document or schema the diagnostic refers to
    pub source: Option<String>,
}

impl SchemaDiagnostic {
    /// Create a diagnostic
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            path: None,
            position: None,
            source: None,
        }
    }

    /// Set the element path
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Set the position
    pub fn with_position(mut self, position: (usize, usize)) -> Self {
        self.position = Some(position);
        self
    }

    /// Set the source name
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

impl fmt::Display for SchemaDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;

        let mut parts = Vec::new();
        if let Some(path) = &self.path {
            parts.push(path.clone());
        }
        if let Some((line, column)) = self.position {
            parts.push(format!("line {}, column {}", line, column));
        }
        if let Some(source) = &self.source {
            parts.push(source.clone());
        }
        if !parts.is_empty() {
            write!(f, " ({})", parts.join(", "))?;
        }
        Ok(())
    }
}

impl From<SchemaDiagnostic> for String {
    fn from(diagnostic: SchemaDiagnostic) -> Self {
        diagnostic.to_string()
    }
}

/// 1-based line and column of a byte offset
pub fn line_column(text: &str, offset: usize) -> (usize, usize) {
    let mut offset = offset.min(text.len());
    while !text.is_char_boundary(offset) {
        offset -= 1;
    }
    let before = &text[..offset];
    let line = before.matches('\n').count() + 1;
    let column = match before.rfind('\n') {
        Some(nl) => before[nl + 1..].chars().count() + 1,
        None => before.chars().count() + 1,
    };
    (line, column)
}
