//! XML name validation
//!
//! Used to check descriptor tag names before any document is produced, and
//! by the schema built-in types `Name`, `NCName`, `NMTOKEN` and `QName`.

use crate::error::{Error, Result};
use once_cell::sync::Lazy;
use regex::Regex;

const NAME_START: &str =
    r"A-Z_a-z\u{C0}-\u{D6}\u{D8}-\u{F6}\u{F8}-\u{2FF}\u{370}-\u{37D}\u{37F}-\u{1FFF}\u{200C}-\u{200D}\u{2070}-\u{218F}\u{2C00}-\u{2FEF}\u{3001}-\u{D7FF}\u{F900}-\u{FDCF}\u{FDF0}-\u{FFFD}";
const NAME_EXTRA: &str = r"\-\.0-9\u{B7}\u{300}-\u{36F}\u{203F}-\u{2040}";

static NCNAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!("^[{s}][{s}{e}]*$", s = NAME_START, e = NAME_EXTRA))
        .expect("NCName pattern is valid")
});

static NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!("^[:{s}][:{s}{e}]*$", s = NAME_START, e = NAME_EXTRA))
        .expect("Name pattern is valid")
});

static NMTOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!("^[{s}{e}:]+$", s = NAME_START, e = NAME_EXTRA))
        .expect("NMTOKEN pattern is valid")
});

/// Check if a string is a valid NCName (non-colonized name)
pub fn is_valid_ncname(name: &str) -> bool {
    NCNAME.is_match(name)
}

/// Check if a string is a valid XML Name (colons allowed)
pub fn is_valid_name(name: &str) -> bool {
    NAME.is_match(name)
}

/// Check if a string is a valid QName (`prefix:local` or `local`)
pub fn is_valid_qname(name: &str) -> bool {
    match name.split_once(':') {
        Some((prefix, local)) => is_valid_ncname(prefix) && is_valid_ncname(local),
        None => is_valid_ncname(name),
    }
}

/// Check if a string is a valid NMTOKEN
pub fn is_valid_nmtoken(token: &str) -> bool {
    NMTOKEN.is_match(token)
}

/// Validate a tag name used by a field descriptor
pub fn validate_tag_name(name: &str) -> Result<()> {
    if is_valid_qname(name) {
        Ok(())
    } else {
        Err(Error::Configuration(format!("invalid XML tag name: '{}'", name)))
    }
}

/// Split a qualified name into optional prefix and local part
pub fn split_qname(name: &str) -> (Option<&str>, &str) {
    match name.split_once(':') {
        Some((prefix, local)) => (Some(prefix), local),
        None => (None, name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ncname() {
        assert!(is_valid_ncname("infNFe"));
        assert!(is_valid_ncname("_x-1.2"));
        assert!(is_valid_ncname("descrição"));
        assert!(!is_valid_ncname("1abc"));
        assert!(!is_valid_ncname("ds:Signature"));
        assert!(!is_valid_ncname(""));
    }

    #[test]
    fn test_name_and_qname() {
        assert!(is_valid_name("ds:Signature"));
        assert!(is_valid_qname("ds:Signature"));
        assert!(!is_valid_qname("ds:"));
        assert!(!is_valid_qname("a:b:c"));
        assert!(!is_valid_name("-abc"));
    }

    #[test]
    fn test_nmtoken() {
        assert!(is_valid_nmtoken("123-abc"));
        assert!(!is_valid_nmtoken("a b"));
    }

    #[test]
    fn test_validate_tag_name() {
        assert!(validate_tag_name("cNF").is_ok());
        let err = validate_tag_name("c NF").unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_split_qname() {
        assert_eq!(split_qname("ds:Signature"), (Some("ds"), "Signature"));
        assert_eq!(split_qname("NFe"), (None, "NFe"));
    }
}
