//! Schema and document loading
//!
//! Only local files are read. Remote locations are refused: fiscal schemas
//! are distributed as packages and validated offline.

use crate::error::{Error, Result};
use crate::limits::Limits;
use crate::locations::Location;
use std::fs;

/// Loader for schema files
#[derive(Debug, Clone, Default)]
pub struct Loader {
    limits: Limits,
}

impl Loader {
    /// Create a new loader with default limits
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the limits
    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    /// Limits in use
    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    /// Read a schema file
    pub fn load_schema(&self, location: &Location) -> Result<String> {
        let path = match location {
            Location::Path(path) => path,
            Location::Url(url) => {
                return Err(Error::Configuration(format!(
                    "remote schemas are not allowed: {}",
                    url
                )))
            }
        };

        if !path.is_file() {
            return Err(Error::Configuration(format!(
                "schema not found: {}",
                path.display()
            )));
        }

        let size = fs::metadata(path)?.len() as usize;
        self.limits.check_schema_size(size)?;

        log::debug!("loading schema {}", path.display());
        Ok(fs::read_to_string(path)?)
    }

    /// Check a document held in memory against the size limit
    pub fn check_document(&self, text: &str) -> Result<()> {
        self.limits.check_document_size(text.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "<xs:schema/>").unwrap();

        let content = Loader::new()
            .load_schema(&Location::from_path(file.path()))
            .unwrap();
        assert!(content.contains("<xs:schema/>"));
    }

    #[test]
    fn test_missing_file() {
        let err = Loader::new()
            .load_schema(&Location::from_path("/nonexistent/nfe_v4.00.xsd"))
            .unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_remote_refused() {
        let location = Location::parse("https://example.com/nfe.xsd").unwrap();
        assert!(Loader::new().load_schema(&location).is_err());
    }

    #[test]
    fn test_size_limit() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", "x".repeat(3 * 1024 * 1024)).unwrap();

        let loader = Loader::new().with_limits(Limits::strict());
        let result = loader.load_schema(&Location::from_path(file.path()));
        assert!(matches!(result, Err(Error::LimitExceeded(_))));
    }
}
