//! XSD validation of finished documents
//!
//! A schema file and everything it includes or imports is compiled once into
//! a [`SchemaSet`], which is immutable and can be shared between threads.
//! Documents are then streamed against it and every problem found ends up in
//! a [`ValidationReport`]; validation itself never fails.
//!
//! ```rust,ignore
//! use dfe_core::schema::{validate_xml, SchemaSet};
//!
//! let report = validate_xml(&xml, "schemas/nfe_v4.00.xsd");
//! if !report.ok() {
//!     for error in &report.errors {
//!         eprintln!("{}", error);
//!     }
//! }
//!
//! // Reuse the compiled schema for a batch
//! let schema = SchemaSet::from_file("schemas/nfe_v4.00.xsd")?;
//! let reports: Vec<_> = documents.iter().map(|d| schema.validate(d)).collect();
//! ```

pub mod builder;
pub mod builtins;
pub mod content;
pub mod facets;
pub mod model;
pub mod report;
pub mod validator;

pub use builder::SchemaSet;
pub use builtins::{Atomic, Builtin};
pub use content::{match_content, ContentMismatch};
pub use facets::{Facets, Pattern, WhiteSpace};
pub use model::{
    AttributeUse, ComplexType, Content, ElementDecl, NamespaceConstraint, Occurs, Particle,
    ProcessContents, SimpleType, Term, TypeRef, Variety, Wildcard,
};
pub use report::{line_column, SchemaDiagnostic, ValidationReport};

use crate::error::Error;
use crate::limits::Limits;
use std::path::Path;

/// Error reported for an empty document
pub const DOCUMENT_NOT_FOUND: &str = "document not found";

/// Error reported when the schema file cannot be read
pub const SCHEMA_NOT_FOUND: &str = "schema not found";

/// Validate `xml` against the schema at `schema_path`
pub fn validate_xml(xml: &str, schema_path: impl AsRef<Path>) -> ValidationReport {
    validate_xml_with_limits(xml, schema_path, Limits::default())
}

/// Validate `xml` against the schema at `schema_path` under `limits`
pub fn validate_xml_with_limits(
    xml: &str,
    schema_path: impl AsRef<Path>,
    limits: Limits,
) -> ValidationReport {
    if xml.is_empty() {
        return ValidationReport::failure(DOCUMENT_NOT_FOUND);
    }

    let schema_path = schema_path.as_ref();
    if !schema_path.is_file() {
        log::debug!("schema file {} does not exist", schema_path.display());
        return ValidationReport::failure(SCHEMA_NOT_FOUND);
    }

    let schema = match SchemaSet::from_file_with_limits(schema_path, limits) {
        Ok(schema) => schema,
        Err(Error::Io(e)) => {
            log::debug!("cannot read schema {}: {}", schema_path.display(), e);
            return ValidationReport::failure(SCHEMA_NOT_FOUND);
        }
        Err(e) => return ValidationReport::failure(e.to_string()),
    };

    let mut report = ValidationReport::new();
    report.warnings.extend(schema.warnings().iter().cloned());
    report.extend(schema.validate(xml));
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;
    use tempfile::TempDir;

    const SCHEMA: &str = r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
  <xs:element name="nota">
    <xs:complexType>
      <xs:sequence>
        <xs:element name="valor" type="xs:decimal"/>
      </xs:sequence>
    </xs:complexType>
    <xs:key name="k"><xs:selector xpath="."/><xs:field xpath="valor"/></xs:key>
  </xs:element>
</xs:schema>"#;

    fn schema_file(dir: &TempDir) -> std::path::PathBuf {
        let path = dir.path().join("nota.xsd");
        fs::write(&path, SCHEMA).unwrap();
        path
    }

    #[test]
    fn test_empty_document() {
        let dir = TempDir::new().unwrap();
        let report = validate_xml("", schema_file(&dir));
        assert!(!report.ok());
        assert_eq!(report.errors, vec![DOCUMENT_NOT_FOUND.to_string()]);
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn test_missing_schema() {
        let report = validate_xml("<nota/>", "/nonexistent/nota.xsd");
        assert_eq!(report.errors, vec![SCHEMA_NOT_FOUND.to_string()]);
    }

    #[test]
    fn test_schema_warnings_are_reported() {
        let dir = TempDir::new().unwrap();
        let report = validate_xml("<nota><valor>1.5</valor></nota>", schema_file(&dir));
        assert!(report.ok(), "{:?}", report.errors);
        assert_eq!(report.warnings.len(), 1);
        assert!(report.warnings[0].contains("xs:key"));
    }

    #[test]
    fn test_schema_warnings_come_before_document_warnings() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("lax.xsd");
        fs::write(
            &path,
            SCHEMA.replace(
                r#"<xs:element name="valor" type="xs:decimal"/>"#,
                r#"<xs:element name="valor" type="xs:decimal"/><xs:any processContents="lax" minOccurs="0"/>"#,
            ),
        )
        .unwrap();

        let report = validate_xml("<nota><valor>1.5</valor><extra/></nota>", &path);
        assert!(report.ok(), "{:?}", report.errors);
        assert_eq!(report.warnings.len(), 2, "{:?}", report.warnings);
        assert!(report.warnings[0].contains("xs:key"));
        assert!(report.warnings[1].contains("no declaration for element 'extra'"));
    }

    #[test]
    fn test_whitespace_only_document_is_parsed() {
        let dir = TempDir::new().unwrap();
        let report = validate_xml("  \n", schema_file(&dir));
        assert!(!report.ok());
        assert_ne!(report.errors, vec![DOCUMENT_NOT_FOUND.to_string()]);
    }

    #[test]
    fn test_invalid_value() {
        let dir = TempDir::new().unwrap();
        let report = validate_xml("<nota><valor>1,5</valor></nota>", schema_file(&dir));
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].contains("xs:decimal"), "{:?}", report.errors);
    }

    #[test]
    fn test_broken_schema_is_an_error_not_a_panic() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.xsd");
        fs::write(&path, "<xs:schema").unwrap();
        let report = validate_xml("<nota/>", &path);
        assert!(!report.ok());
    }
}
