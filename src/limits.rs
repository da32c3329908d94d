//! Resource limits for document and schema processing
//!
//! Schema validation streams the whole document and is otherwise unbounded.
//! These limits let callers guard against oversized or adversarial input.

use crate::error::{Error, Result};

/// Limits applied while loading schemas and validating documents
#[derive(Debug, Clone)]
pub struct Limits {
    /// Maximum document size in bytes
    pub max_document_size: usize,

    /// Maximum element nesting depth of a document
    pub max_document_depth: usize,

    /// Maximum number of attributes per element
    pub max_attributes: usize,

    /// Maximum schema file size in bytes
    pub max_schema_size: usize,

    /// Maximum include/import nesting depth
    pub max_schema_depth: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_document_size: 50 * 1024 * 1024, // 50 MB
            max_document_depth: 256,
            max_attributes: 256,
            max_schema_size: 10 * 1024 * 1024, // 10 MB
            max_schema_depth: 32,
        }
    }
}

impl Limits {
    /// Create a new Limits with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Limits suited to untrusted input received from third parties
    pub fn strict() -> Self {
        Self {
            max_document_size: 5 * 1024 * 1024, // 5 MB
            max_document_depth: 64,
            max_attributes: 64,
            max_schema_size: 2 * 1024 * 1024, // 2 MB
            max_schema_depth: 16,
        }
    }

    /// Create permissive limits (batch files, lot submissions)
    pub fn permissive() -> Self {
        Self {
            max_document_size: 1024 * 1024 * 1024, // 1 GB
            max_document_depth: 4096,
            max_attributes: 4096,
            max_schema_size: 100 * 1024 * 1024, // 100 MB
            max_schema_depth: 256,
        }
    }

    /// Check if a document size is within limits
    pub fn check_document_size(&self, size: usize) -> Result<()> {
        if size > self.max_document_size {
            Err(Error::LimitExceeded(format!(
                "document size {} bytes exceeds maximum {} bytes",
                size, self.max_document_size
            )))
        } else {
            Ok(())
        }
    }

    /// Check if an element depth is within limits
    pub fn check_document_depth(&self, depth: usize) -> Result<()> {
        if depth > self.max_document_depth {
            Err(Error::LimitExceeded(format!(
                "element depth {} exceeds maximum {}",
                depth, self.max_document_depth
            )))
        } else {
            Ok(())
        }
    }

    /// Check if the number of attributes on one element is within limits
    pub fn check_attributes(&self, count: usize) -> Result<()> {
        if count > self.max_attributes {
            Err(Error::LimitExceeded(format!(
                "attribute count {} exceeds maximum {}",
                count, self.max_attributes
            )))
        } else {
            Ok(())
        }
    }

    /// Check if a schema file size is within limits
    pub fn check_schema_size(&self, size: usize) -> Result<()> {
        if size > self.max_schema_size {
            Err(Error::LimitExceeded(format!(
                "schema size {} bytes exceeds maximum {} bytes",
                size, self.max_schema_size
            )))
        } else {
            Ok(())
        }
    }

    /// Check if include/import nesting is within limits
    pub fn check_schema_depth(&self, depth: usize) -> Result<()> {
        if depth > self.max_schema_depth {
            Err(Error::LimitExceeded(format!(
                "schema include depth {} exceeds maximum {}",
                depth, self.max_schema_depth
            )))
        } else {
            Ok(())
        }
    }
}
