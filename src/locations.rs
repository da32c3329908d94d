//! Schema location resolution
//!
//! `schemaLocation` attributes of `xs:include`/`xs:import` are resolved
//! against the location of the including schema.

use crate::error::{Error, Result};
use std::fmt;
use std::path::{Path, PathBuf};
use url::Url;

/// Where a schema comes from
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Location {
    /// File system path
    Path(PathBuf),
    /// Remote URL (http, https, ftp...)
    Url(Url),
}

impl Location {
    /// Interpret a string as a URL (non-`file` scheme) or a file path
    pub fn parse(s: &str) -> Result<Self> {
        if let Ok(url) = Url::parse(s) {
            if url.scheme() == "file" {
                return url
                    .to_file_path()
                    .map(Location::Path)
                    .map_err(|_| Error::Configuration(format!("invalid file URL: {}", s)));
            }
            // Single-letter schemes are Windows drive letters
            if url.scheme().len() > 1 {
                return Ok(Location::Url(url));
            }
        }
        Ok(Location::Path(PathBuf::from(s)))
    }

    /// Location for a local file
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        Location::Path(path.as_ref().to_path_buf())
    }

    /// Resolve `reference` relative to this location
    pub fn resolve(&self, reference: &str) -> Result<Location> {
        let reference = reference.trim();
        match Location::parse(reference)? {
            Location::Url(url) => Ok(Location::Url(url)),
            Location::Path(path) if path.is_absolute() => Ok(Location::Path(path)),
            Location::Path(path) => match self {
                Location::Path(base) => {
                    let dir = base.parent().unwrap_or_else(|| Path::new(""));
                    Ok(Location::Path(dir.join(path)))
                }
                Location::Url(base) => base
                    .join(reference)
                    .map(Location::Url)
                    .map_err(|e| Error::Configuration(format!("invalid schema location '{}': {}", reference, e))),
            },
        }
    }

    /// Check if this is a remote location (URL)
    pub fn is_remote(&self) -> bool {
        matches!(self, Location::Url(_))
    }

    /// Local path, if any
    pub fn as_path(&self) -> Option<&Path> {
        match self {
            Location::Path(p) => Some(p),
            Location::Url(_) => None,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Path(p) => write!(f, "{}", p.display()),
            Location::Url(u) => write!(f, "{}", u),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_from_url() {
        let loc = Location::parse("http://www.portalfiscal.inf.br/nfe/tiposBasico_v4.00.xsd").unwrap();
        assert!(loc.is_remote());
        assert!(loc.as_path().is_none());
    }

    #[test]
    fn test_location_from_path() {
        let loc = Location::parse("/tmp/nfe_v4.00.xsd").unwrap();
        assert_eq!(loc, Location::from_path("/tmp/nfe_v4.00.xsd"));
        assert!(!loc.is_remote());
    }

    #[test]
    fn test_file_url() {
        let loc = Location::parse("file:///tmp/nfe_v4.00.xsd").unwrap();
        assert_eq!(loc, Location::from_path("/tmp/nfe_v4.00.xsd"));
    }

    #[test]
    fn test_resolve_relative() {
        let base = Location::from_path("/schemas/nfe/nfe_v4.00.xsd");
        assert_eq!(
            base.resolve("leiauteNFe_v4.00.xsd").unwrap(),
            Location::from_path("/schemas/nfe/leiauteNFe_v4.00.xsd")
        );
        assert_eq!(
            base.resolve("../common/xmldsig-core-schema_v1.01.xsd").unwrap(),
            Location::from_path("/schemas/nfe/../common/xmldsig-core-schema_v1.01.xsd")
        );
        assert!(base.resolve("https://example.com/a.xsd").unwrap().is_remote());
    }

    #[test]
    fn test_resolve_against_url() {
        let base = Location::parse("https://example.com/schemas/nfe.xsd").unwrap();
        assert_eq!(
            base.resolve("tipos.xsd").unwrap().to_string(),
            "https://example.com/schemas/tipos.xsd"
        );
    }
}
