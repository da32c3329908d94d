//! XSD constraining facets
//!
//! Facets accumulate along a restriction chain: each derivation step adds its
//! own patterns (ANDed with the base's) and may narrow the other facets.

use super::builtins::Atomic;
use crate::error::{Error, Result, SchemaError};
use regex::Regex;
use rust_decimal::Decimal;
use std::cmp::Ordering;

/// White space handling modes
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum WhiteSpace {
    /// Preserve all white space
    Preserve,
    /// Replace tabs and newlines with spaces
    Replace,
    /// Replace and collapse multiple spaces
    Collapse,
}

impl WhiteSpace {
    /// Parse the value of a `whiteSpace` facet
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim() {
            "preserve" => Ok(WhiteSpace::Preserve),
            "replace" => Ok(WhiteSpace::Replace),
            "collapse" => Ok(WhiteSpace::Collapse),
            other => Err(Error::Schema(SchemaError::new(format!(
                "invalid whiteSpace value '{}'",
                other
            )))),
        }
    }

    /// Normalize a string according to this white space mode
    pub fn normalize(&self, s: &str) -> String {
        match self {
            WhiteSpace::Preserve => s.to_string(),
            WhiteSpace::Replace => s.replace(['\t', '\n', '\r'], " "),
            WhiteSpace::Collapse => s.split_whitespace().collect::<Vec<_>>().join(" "),
        }
    }
}

/// Compiled `pattern` facet
#[derive(Debug, Clone)]
pub struct Pattern {
    /// Pattern as written in the schema
    pub source: String,
    regex: Regex,
}

impl Pattern {
    /// Compile an XSD regular expression
    ///
    /// XSD patterns match the whole value and treat `^`/`$` as ordinary
    /// characters; class subtraction `[a-z-[aeiou]]` maps to `--`.
    pub fn new(source: &str) -> Result<Self> {
        let translated = translate_pattern(source);
        let regex = Regex::new(&format!("^(?:{})$", translated)).map_err(|e| {
            Error::Schema(SchemaError::new(format!("invalid pattern '{}': {}", source, e)))
        })?;
        Ok(Self {
            source: source.to_string(),
            regex,
        })
    }

    /// Whether `value` matches
    pub fn is_match(&self, value: &str) -> bool {
        self.regex.is_match(value)
    }
}

fn translate_pattern(source: &str) -> String {
    let mut out = String::with_capacity(source.len() + 8);
    let mut chars = source.chars().peekable();
    let mut class_depth = 0usize;

    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some('i') => out.push_str(r"[_:A-Za-z\u{C0}-\u{D6}\u{D8}-\u{F6}\u{F8}-\u{2FF}\u{370}-\u{37D}\u{37F}-\u{1FFF}]"),
                Some('I') => out.push_str(r"[^_:A-Za-z\u{C0}-\u{D6}\u{D8}-\u{F6}\u{F8}-\u{2FF}\u{370}-\u{37D}\u{37F}-\u{1FFF}]"),
                Some('c') => out.push_str(r"[-._:A-Za-z0-9\u{B7}\u{C0}-\u{D6}\u{D8}-\u{F6}\u{F8}-\u{37D}\u{37F}-\u{1FFF}]"),
                Some('C') => out.push_str(r"[^-._:A-Za-z0-9\u{B7}\u{C0}-\u{D6}\u{D8}-\u{F6}\u{F8}-\u{37D}\u{37F}-\u{1FFF}]"),
                Some(other) => {
                    out.push('\\');
                    out.push(other);
                }
                None => out.push_str(r"\\"),
            },
            '[' => {
                class_depth += 1;
                out.push('[');
                if chars.peek() == Some(&'^') {
                    out.push('^');
                    chars.next();
                }
            }
            ']' if class_depth > 0 => {
                class_depth -= 1;
                out.push(']');
            }
            '-' if class_depth > 0 && chars.peek() == Some(&'[') => out.push_str("--"),
            '^' | '$' if class_depth == 0 => {
                out.push('\\');
                out.push(c);
            }
            '&' | '~' if class_depth > 0 => {
                out.push('\\');
                out.push(c);
            }
            _ => out.push(c),
        }
    }
    out
}

/// Constraining facets of a simple type
#[derive(Debug, Clone, Default)]
pub struct Facets {
    /// `whiteSpace`, when set by a derivation step
    pub white_space: Option<WhiteSpace>,
    /// `length`
    pub length: Option<usize>,
    /// `minLength`
    pub min_length: Option<usize>,
    /// `maxLength`
    pub max_length: Option<usize>,
    /// One entry per derivation step; a value must match one pattern of every step
    pub patterns: Vec<Vec<Pattern>>,
    /// `enumeration` values of the most derived step declaring any
    pub enumeration: Option<Vec<String>>,
    /// `minInclusive`
    pub min_inclusive: Option<Atomic>,
    /// `maxInclusive`
    pub max_inclusive: Option<Atomic>,
    /// `minExclusive`
    pub min_exclusive: Option<Atomic>,
    /// `maxExclusive`
    pub max_exclusive: Option<Atomic>,
    /// `totalDigits`
    pub total_digits: Option<u32>,
    /// `fractionDigits`
    pub fraction_digits: Option<u32>,
}

impl Facets {
    /// Facets of a derivation step applied on top of `self`
    pub fn restrict(&self, step: Facets) -> Facets {
        let mut patterns = self.patterns.clone();
        patterns.extend(step.patterns);
        Facets {
            white_space: step.white_space.or(self.white_space),
            length: step.length.or(self.length),
            min_length: step.min_length.or(self.min_length),
            max_length: step.max_length.or(self.max_length),
            patterns,
            enumeration: step.enumeration.or_else(|| self.enumeration.clone()),
            min_inclusive: step.min_inclusive.or_else(|| self.min_inclusive.clone()),
            max_inclusive: step.max_inclusive.or_else(|| self.max_inclusive.clone()),
            min_exclusive: step.min_exclusive.or_else(|| self.min_exclusive.clone()),
            max_exclusive: step.max_exclusive.or_else(|| self.max_exclusive.clone()),
            total_digits: step.total_digits.or(self.total_digits),
            fraction_digits: step.fraction_digits.or(self.fraction_digits),
        }
    }

    /// Lexical facets: patterns and enumeration
    pub fn check_lexical(&self, value: &str) -> std::result::Result<(), String> {
        for step in &self.patterns {
            if !step.is_empty() && !step.iter().any(|p| p.is_match(value)) {
                let sources: Vec<&str> = step.iter().map(|p| p.source.as_str()).collect();
                return Err(format!(
                    "value '{}' does not match pattern '{}'",
                    value,
                    sources.join("' | '")
                ));
            }
        }
        if let Some(values) = &self.enumeration {
            if !values.iter().any(|v| v == value) {
                return Err(format!(
                    "value '{}' is not in the enumeration [{}]",
                    value,
                    values.join(", ")
                ));
            }
        }
        Ok(())
    }

    /// Length facets against a measured length (chars, octets or list items)
    pub fn check_length(&self, value: &str, len: usize) -> std::result::Result<(), String> {
        if let Some(expected) = self.length {
            if len != expected {
                return Err(format!("value '{}' has length {}, expected {}", value, len, expected));
            }
        }
        if let Some(min) = self.min_length {
            if len < min {
                return Err(format!("value '{}' is shorter than minLength {}", value, min));
            }
        }
        if let Some(max) = self.max_length {
            if len > max {
                return Err(format!("value '{}' is longer than maxLength {}", value, max));
            }
        }
        Ok(())
    }

    /// Bounds and digit facets
    pub fn check_value(&self, value: &str, atomic: &Atomic) -> std::result::Result<(), String> {
        let out_of_range = |facet: &str, bound: &Atomic| {
            format!("value '{}' violates {} {}", value, facet, bound)
        };
        if let Some(bound) = &self.min_inclusive {
            if matches!(atomic.compare(bound), Some(Ordering::Less)) {
                return Err(out_of_range("minInclusive", bound));
            }
        }
        if let Some(bound) = &self.max_inclusive {
            if matches!(atomic.compare(bound), Some(Ordering::Greater)) {
                return Err(out_of_range("maxInclusive", bound));
            }
        }
        if let Some(bound) = &self.min_exclusive {
            if matches!(atomic.compare(bound), Some(Ordering::Less | Ordering::Equal)) {
                return Err(out_of_range("minExclusive", bound));
            }
        }
        if let Some(bound) = &self.max_exclusive {
            if matches!(atomic.compare(bound), Some(Ordering::Greater | Ordering::Equal)) {
                return Err(out_of_range("maxExclusive", bound));
            }
        }

        if let Atomic::Decimal(decimal) = atomic {
            let (digits, scale) = digits_of(decimal);
            if let Some(total) = self.total_digits {
                if digits > total || scale > total {
                    return Err(format!("value '{}' has more than {} digits", value, total));
                }
            }
            if let Some(fraction) = self.fraction_digits {
                if scale > fraction {
                    return Err(format!(
                        "value '{}' has more than {} fraction digits",
                        value, fraction
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Significant digits and fraction digits of a decimal's value
fn digits_of(value: &Decimal) -> (u32, u32) {
    let normalized = value.normalize();
    let mantissa = normalized.mantissa().unsigned_abs();
    let digits = if mantissa == 0 {
        1
    } else {
        mantissa.to_string().len() as u32
    };
    (digits, normalized.scale())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Atomic {
        Atomic::Decimal(Decimal::from_str(s).unwrap())
    }

    #[test]
    fn test_whitespace_modes() {
        assert_eq!(WhiteSpace::parse("preserve").unwrap(), WhiteSpace::Preserve);
        assert_eq!(WhiteSpace::parse("collapse").unwrap(), WhiteSpace::Collapse);
        assert!(WhiteSpace::parse("invalid").is_err());
    }

    #[test]
    fn test_whitespace_normalize() {
        let text = "  hello\t\nworld  ";
        assert_eq!(WhiteSpace::Preserve.normalize(text), text);
        assert_eq!(WhiteSpace::Replace.normalize(text), "  hello  world  ");
        assert_eq!(WhiteSpace::Collapse.normalize(text), "hello world");
    }

    #[test]
    fn test_pattern_is_anchored() {
        let pattern = Pattern::new(r"[0-9]{2}").unwrap();
        assert!(pattern.is_match("35"));
        assert!(!pattern.is_match("350"));
        assert!(!pattern.is_match("x35"));
    }

    #[test]
    fn test_fiscal_patterns() {
        let amount = Pattern::new(r"0|0\.[0-9]{2}|[1-9]{1}[0-9]{0,12}(\.[0-9]{2})?").unwrap();
        assert!(amount.is_match("10.00"));
        assert!(amount.is_match("0"));
        assert!(!amount.is_match("10.0"));

        let text = Pattern::new(r"[!-ÿ]{1}[ -ÿ]{0,}[!-ÿ]{1}|[!-ÿ]{1}").unwrap();
        assert!(text.is_match("Empresa Teste"));
        assert!(!text.is_match(" Empresa"));
    }

    #[test]
    fn test_pattern_literal_anchors_and_subtraction() {
        assert!(Pattern::new(r"R\$ [0-9]+").unwrap().is_match("R$ 10"));
        assert!(Pattern::new(r"a$b").unwrap().is_match("a$b"));
        let consonants = Pattern::new(r"[a-z-[aeiou]]+").unwrap();
        assert!(consonants.is_match("bcd"));
        assert!(!consonants.is_match("bad"));
        assert!(Pattern::new(r"\i\c*").unwrap().is_match("infNFe"));
    }

    #[test]
    fn test_pattern_steps_are_anded() {
        let base = Facets {
            patterns: vec![vec![Pattern::new("[0-9]+").unwrap()]],
            ..Default::default()
        };
        let derived = base.restrict(Facets {
            patterns: vec![vec![Pattern::new("1.*").unwrap(), Pattern::new("2.*").unwrap()]],
            ..Default::default()
        });
        assert!(derived.check_lexical("123").is_ok());
        assert!(derived.check_lexical("312").is_err());
        assert!(derived.check_lexical("1a").is_err());
    }

    #[test]
    fn test_enumeration() {
        let facets = Facets {
            enumeration: Some(vec!["1".to_string(), "2".to_string()]),
            ..Default::default()
        };
        assert!(facets.check_lexical("1").is_ok());
        let err = facets.check_lexical("3").unwrap_err();
        assert!(err.contains("not in the enumeration"));
    }

    #[test]
    fn test_length_facets() {
        let facets = Facets {
            min_length: Some(2),
            max_length: Some(4),
            ..Default::default()
        };
        assert!(facets.check_length("abc", 3).is_ok());
        assert!(facets.check_length("a", 1).is_err());
        assert!(facets.check_length("abcde", 5).is_err());
    }

    #[test]
    fn test_bounds() {
        let facets = Facets {
            min_inclusive: Some(dec("0")),
            max_exclusive: Some(dec("100")),
            ..Default::default()
        };
        assert!(facets.check_value("0", &dec("0")).is_ok());
        assert!(facets.check_value("99.99", &dec("99.99")).is_ok());
        assert!(facets.check_value("100", &dec("100")).is_err());
        assert!(facets.check_value("-1", &dec("-1")).is_err());
    }

    #[test]
    fn test_digit_facets() {
        let facets = Facets {
            total_digits: Some(15),
            fraction_digits: Some(2),
            ..Default::default()
        };
        assert!(facets.check_value("1.50", &dec("1.50")).is_ok());
        assert!(facets.check_value("1.500", &dec("1.500")).is_ok());
        assert!(facets.check_value("1.505", &dec("1.505")).is_err());

        let tight = Facets {
            total_digits: Some(3),
            ..Default::default()
        };
        assert!(tight.check_value("999", &dec("999")).is_ok());
        assert!(tight.check_value("1000", &dec("1000")).is_err());
        assert!(tight.check_value("0.05", &dec("0.05")).is_ok());
    }
}
