//! XML namespace handling
//!
//! Qualified names and the well-known namespaces used by fiscal documents,
//! their schemas and their signatures.

use crate::error::{Error, Result};
use std::fmt;

/// XML Schema namespace
pub const XSD_NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema";

/// XML Schema instance namespace (`xsi:nil`, `xsi:schemaLocation`)
pub const XSI_NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema-instance";

/// XML namespace (`xml:lang`, `xml:space`)
pub const XML_NAMESPACE: &str = "http://www.w3.org/XML/1998/namespace";

/// XMLNS namespace
pub const XMLNS_NAMESPACE: &str = "http://www.w3.org/2000/xmlns/";

/// XML digital signature namespace
pub const XMLDSIG_NAMESPACE: &str = "http://www.w3.org/2000/09/xmldsig#";

/// NF-e/NFC-e document namespace
pub const NFE_NAMESPACE: &str = "http://www.portalfiscal.inf.br/nfe";

/// CT-e document namespace
pub const CTE_NAMESPACE: &str = "http://www.portalfiscal.inf.br/cte";

/// Qualified name (QName) - combination of namespace and local name
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QName {
    /// Namespace URI (None for no namespace)
    pub namespace: Option<String>,
    /// Local name
    pub local_name: String,
}

impl QName {
    /// Create a new QName
    pub fn new(namespace: Option<impl Into<String>>, local_name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.map(|s| s.into()).filter(|s: &String| !s.is_empty()),
            local_name: local_name.into(),
        }
    }

    /// Create a QName without a namespace
    pub fn local(local_name: impl Into<String>) -> Self {
        Self {
            namespace: None,
            local_name: local_name.into(),
        }
    }

    /// Create a QName with a namespace
    pub fn namespaced(namespace: impl Into<String>, local_name: impl Into<String>) -> Self {
        Self::new(Some(namespace), local_name)
    }

    /// Create a QName in the XML Schema namespace
    pub fn xsd(local_name: impl Into<String>) -> Self {
        Self::namespaced(XSD_NAMESPACE, local_name)
    }

    /// Check whether the name is in the XML Schema namespace
    pub fn is_xsd(&self) -> bool {
        self.namespace.as_deref() == Some(XSD_NAMESPACE)
    }

    /// Namespace as a string slice
    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }
}

impl fmt::Display for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{{{}}}{}", ns, self.local_name),
            None => write!(f, "{}", self.local_name),
        }
    }
}

/// Resolve a prefixed name written inside a schema node (`tipo:TString`)
///
/// Unprefixed names take the in-scope default namespace, as XSD requires for
/// type and element references.
pub fn resolve_qname(node: roxmltree::Node<'_, '_>, prefixed_name: &str) -> Result<QName> {
    let prefixed_name = prefixed_name.trim();
    match prefixed_name.split_once(':') {
        Some((prefix, local)) => {
            let namespace = node.lookup_namespace_uri(Some(prefix)).ok_or_else(|| {
                Error::Xml(format!("unknown namespace prefix '{}' in '{}'", prefix, prefixed_name))
            })?;
            Ok(QName::namespaced(namespace, local))
        }
        None => Ok(QName::new(node.lookup_namespace_uri(None), prefixed_name)),
    }
}
