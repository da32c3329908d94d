//! Error types for dfe-core
//!
//! Serialization never fails outward (problems become alerts), so the
//! variants here cover deserialization, signing, certificate handling and
//! schema compilation.

use std::fmt;
use thiserror::Error;

/// Result type alias using dfe-core Error
pub type Result<T> = std::result::Result<T, Error>;

/// Boxed error used as the wrapped cause of cryptographic failures
pub type BoxedCause = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Main error type for dfe-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Missing file, unresolved insertion tag, inconsistent descriptor table,
    /// certificate not found
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Malformed literal found while reading a field back from XML
    #[error("format error in field '{field}': {message}")]
    Format {
        /// Descriptor id of the offending field
        field: String,
        /// What was wrong with the text
        message: String,
    },

    /// Signing failure; the original cause is kept as the error source
    #[error("cryptographic error: {message}")]
    Cryptographic {
        /// Summary of the failed step
        message: String,
        /// Underlying failure
        #[source]
        source: BoxedCause,
    },

    /// XML that could not be parsed where parsing is mandatory
    #[error("XML error: {0}")]
    Xml(String),

    /// Schema compilation error
    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),

    /// Limit exceeded error
    #[error("limit exceeded: {0}")]
    LimitExceeded(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Build a format error for a field
    pub fn format(field: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Format {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Wrap a cryptographic failure together with its cause
    pub fn cryptographic<E>(message: impl Into<String>, source: E) -> Self
    where
        E: Into<BoxedCause>,
    {
        Error::Cryptographic {
            message: message.into(),
            source: source.into(),
        }
    }

    /// Check whether this is a configuration error
    pub fn is_configuration(&self) -> bool {
        matches!(self, Error::Configuration(_))
    }
}

impl From<roxmltree::Error> for Error {
    fn from(err: roxmltree::Error) -> Self {
        Error::Xml(err.to_string())
    }
}

/// XML Schema compilation error
#[derive(Debug, Clone)]
pub struct SchemaError {
    /// Error message
    pub message: String,
    /// Schema file or in-memory source name
    pub location: Option<String>,
    /// Line and column inside the schema source
    pub position: Option<(u32, u32)>,
}

impl SchemaError {
    /// Create a new schema error
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            location: None,
            position: None,
        }
    }

    /// Set the location
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    /// Set the line/column position
    pub fn with_position(mut self, line: u32, column: u32) -> Self {
        self.position = Some((line, column));
        self
    }
}

impl fmt::Display for SchemaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;

        if let Some(ref loc) = self.location {
            write!(f, " ({}", loc)?;
            if let Some((line, column)) = self.position {
                write!(f, ":{}:{}", line, column)?;
            }
            write!(f, ")")?;
        }

        Ok(())
    }
}

impl std::error::Error for SchemaError {}
