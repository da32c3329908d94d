//! # dfe-core
//!
//! Building blocks for Brazilian electronic fiscal documents (DF-e: NF-e,
//! CT-e, CF-e/SAT, NFS-e).
//!
//! ## Features
//!
//! - Field-descriptor driven conversion of typed values to and from XML text
//! - Per-field length and presence checks collected as templated alerts
//! - Enveloped XML digital signatures (Canonical XML 1.0, RSA SHA-1/SHA-256)
//! - Certificate loading from PEM bundles and directory stores
//! - XSD validation of finished documents against the official schemas
//! - Protection against oversized input through [`Limits`]
//!
//! ## Example
//!
//! ```rust,ignore
//! use dfe_core::serializer::{ConversionSession, FieldDescriptor, FieldKind, FieldValue, Scale};
//! use dfe_core::signing::{sign, CertificateHandle};
//! use dfe_core::schema::validate_xml;
//!
//! let descriptor = FieldDescriptor::element("W16", "vNF", FieldKind::Decimal(Scale::Two))
//!     .describe("Valor total da NF-e")
//!     .required()
//!     .length(1, 15);
//! let mut session = ConversionSession::default();
//! let node = session.serialize_field(&descriptor, Some(&FieldValue::from(dec!(42.5))));
//! assert!(session.alerts().is_empty());
//!
//! let certificate = CertificateHandle::load_from_file("certificado.pem", Some("1234"))?;
//! let signed = sign(&xml, "#NFe3524...", "NFe", &certificate, false)?;
//!
//! let report = validate_xml(&signed, "schemas/nfe_v4.00.xsd");
//! assert!(report.ok());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

// Foundation
pub mod error;
pub mod limits;

// Names and resources
pub mod namespaces;
pub mod names;
pub mod locations;
pub mod loaders;

// Field conversion
pub mod serializer;
pub mod common;

// Signatures
pub mod signing;

// Schema validation
pub mod schema;

// Re-exports for convenience
pub use error::{Error, Result, SchemaError};
pub use limits::Limits;
pub use schema::{validate_xml, SchemaSet, ValidationReport};
pub use serializer::{
    ConversionResult, ConversionSession, FieldDescriptor, FieldKind, FieldValue,
    SerializerOptions,
};
pub use signing::{sign, CertificateHandle, SignatureOptions};

/// Version of the dfe-core library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
