//! Field descriptors
//!
//! A descriptor is the immutable metadata of one field of a fiscal document:
//! tag name, documentation id, cardinality, length bounds and value kind.
//! Descriptors are grouped into a [`DescriptorTable`] once per document type
//! and shared read-only by every conversion of that type.

use super::coded::CodeTable;
use crate::error::{Error, Result};
use crate::names::validate_tag_name;
use indexmap::IndexMap;
use std::fmt;
use std::sync::Arc;

/// Layout of a date or time value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    /// `YYYYMMDD` / `HHMMSS` (CF-e/SAT style)
    Compact,
    /// `YYYY-MM-DD` / `HH:MM:SS`
    Separated,
}

/// Number of fractional digits of a decimal field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scale {
    /// Two digits (`0.00`)
    Two,
    /// Three digits
    Three,
    /// Four digits
    Four,
    /// Six digits
    Six,
    /// Ten digits
    Ten,
}

impl Scale {
    /// Number of fractional digits
    pub fn digits(self) -> u32 {
        match self {
            Scale::Two => 2,
            Scale::Three => 3,
            Scale::Four => 4,
            Scale::Six => 6,
            Scale::Ten => 10,
        }
    }

    /// Build a scale from a digit count
    pub fn from_digits(digits: u32) -> Option<Self> {
        match digits {
            2 => Some(Scale::Two),
            3 => Some(Scale::Three),
            4 => Some(Scale::Four),
            6 => Some(Scale::Six),
            10 => Some(Scale::Ten),
            _ => None,
        }
    }
}

/// How a field value is turned into text and back
#[derive(Clone, Copy, PartialEq)]
pub enum FieldKind {
    /// Free text, trimmed
    Text,
    /// Calendar date
    Date(Layout),
    /// Time of day
    Time(Layout),
    /// `YYYY-MM-DDTHH:MM:SS`
    DateTime,
    /// `YYYY-MM-DDTHH:MM:SS±HH:MM`
    DateTimeWithOffset,
    /// Fixed-point decimal
    Decimal(Scale),
    /// Integer, left-padded with zeros to the minimum length
    Integer,
    /// Numeric string, left-padded with zeros to the minimum length
    PaddedNumericString,
    /// String reduced to its digits
    DigitsOnlyString,
    /// Enumeration with external codes
    CodedEnum(&'static CodeTable),
    /// Converted by a converter registered for the field
    Custom,
}

impl FieldKind {
    /// Short name used in logs and error messages
    pub fn name(&self) -> &'static str {
        match self {
            FieldKind::Text => "text",
            FieldKind::Date(_) => "date",
            FieldKind::Time(_) => "time",
            FieldKind::DateTime => "datetime",
            FieldKind::DateTimeWithOffset => "datetime-offset",
            FieldKind::Decimal(_) => "decimal",
            FieldKind::Integer => "integer",
            FieldKind::PaddedNumericString => "padded-numeric",
            FieldKind::DigitsOnlyString => "digits-only",
            FieldKind::CodedEnum(_) => "coded-enum",
            FieldKind::Custom => "custom",
        }
    }
}

impl fmt::Debug for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldKind::Date(layout) => write!(f, "Date({:?})", layout),
            FieldKind::Time(layout) => write!(f, "Time({:?})", layout),
            FieldKind::Decimal(scale) => write!(f, "Decimal({})", scale.digits()),
            FieldKind::CodedEnum(table) => write!(f, "CodedEnum({})", table.name),
            other => f.write_str(other.name()),
        }
    }
}

/// Declared cardinality of a field within its container
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Occurrence {
    /// 0: optional
    Optional,
    /// 1: mandatory, an empty placeholder is emitted when there is no value
    Required,
    /// N: repeated
    Repeated(u32),
}

impl Occurrence {
    /// Build from the numeric cardinality used in the layout manuals
    pub fn from_count(count: u32) -> Self {
        match count {
            0 => Occurrence::Optional,
            1 => Occurrence::Required,
            n => Occurrence::Repeated(n),
        }
    }

    /// Whether exactly one occurrence is declared
    pub fn is_required(self) -> bool {
        self == Occurrence::Required
    }
}

/// Whether a field is written as an element or an attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// `<name>text</name>`
    Element,
    /// `name="text"`
    Attribute,
}

/// Immutable metadata of one field
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDescriptor {
    /// Identifier in the layout manual (e.g. `B03`)
    pub id: String,
    /// Tag or attribute name
    pub name: String,
    /// Human description
    pub description: String,
    /// Declared cardinality
    pub occurrence: Occurrence,
    /// Minimum length of the converted text
    pub min_length: usize,
    /// Maximum length of the converted text
    pub max_length: usize,
    /// Conversion rule
    pub kind: FieldKind,
    /// Element or attribute
    pub node: NodeKind,
}

impl FieldDescriptor {
    /// Describe a field written as an element
    pub fn element(id: impl Into<String>, name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            occurrence: Occurrence::Optional,
            min_length: 0,
            max_length: usize::MAX,
            kind,
            node: NodeKind::Element,
        }
    }

    /// Describe a field written as an attribute
    pub fn attribute(id: impl Into<String>, name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            node: NodeKind::Attribute,
            ..Self::element(id, name, kind)
        }
    }

    /// Set the description
    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Set the cardinality
    pub fn occurs(mut self, occurrence: Occurrence) -> Self {
        self.occurrence = occurrence;
        self
    }

    /// Shortcut for `occurs(Occurrence::Required)`
    pub fn required(self) -> Self {
        self.occurs(Occurrence::Required)
    }

    /// Set length bounds
    pub fn length(mut self, min: usize, max: usize) -> Self {
        self.min_length = min;
        self.max_length = max;
        self
    }

    /// Check the descriptor invariants
    pub fn check(&self) -> Result<()> {
        validate_tag_name(&self.name)?;
        if self.min_length > self.max_length {
            return Err(Error::Configuration(format!(
                "field {} ({}): minimum length {} exceeds maximum length {}",
                self.id, self.name, self.min_length, self.max_length
            )));
        }
        Ok(())
    }
}

/// Descriptors of one document type, in document order
#[derive(Debug, Clone)]
pub struct DescriptorTable {
    name: String,
    fields: IndexMap<String, Arc<FieldDescriptor>>,
}

impl DescriptorTable {
    /// Assemble a table, checking every descriptor and rejecting duplicate ids
    pub fn new(name: impl Into<String>, descriptors: Vec<FieldDescriptor>) -> Result<Self> {
        let name = name.into();
        let mut fields = IndexMap::with_capacity(descriptors.len());

        for descriptor in descriptors {
            descriptor.check()?;
            if fields.contains_key(&descriptor.id) {
                return Err(Error::Configuration(format!(
                    "table {}: duplicate field id {}",
                    name, descriptor.id
                )));
            }
            fields.insert(descriptor.id.clone(), Arc::new(descriptor));
        }

        Ok(Self { name, fields })
    }

    /// Name of the document type
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Look a descriptor up by id
    pub fn get(&self, id: &str) -> Option<&Arc<FieldDescriptor>> {
        self.fields.get(id)
    }

    /// Iterate descriptors in declaration order
    pub fn iter(&self) -> impl Iterator<Item = &Arc<FieldDescriptor>> {
        self.fields.values()
    }

    /// Number of descriptors
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the table is empty
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let desc = FieldDescriptor::element("B03", "cNF", FieldKind::PaddedNumericString)
            .describe("Código numérico que compõe a Chave de Acesso")
            .required()
            .length(8, 8);

        assert_eq!(desc.node, NodeKind::Element);
        assert!(desc.occurrence.is_required());
        assert_eq!((desc.min_length, desc.max_length), (8, 8));
        assert!(desc.check().is_ok());
    }

    #[test]
    fn test_min_greater_than_max_rejected() {
        let desc = FieldDescriptor::attribute("A02", "versao", FieldKind::Text).length(5, 4);
        let err = DescriptorTable::new("NFe", vec![desc]).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let a = FieldDescriptor::element("B02", "cUF", FieldKind::Integer);
        let b = FieldDescriptor::element("B02", "cNF", FieldKind::Integer);
        assert!(DescriptorTable::new("ide", vec![a, b]).is_err());
    }

    #[test]
    fn test_table_keeps_order() {
        let table = DescriptorTable::new(
            "ide",
            vec![
                FieldDescriptor::element("B02", "cUF", FieldKind::Integer),
                FieldDescriptor::element("B03", "cNF", FieldKind::PaddedNumericString),
            ],
        )
        .unwrap();

        let names: Vec<_> = table.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, ["cUF", "cNF"]);
        assert_eq!(table.get("B03").unwrap().name, "cNF");
    }

    #[test]
    fn test_occurrence_from_count() {
        assert_eq!(Occurrence::from_count(0), Occurrence::Optional);
        assert_eq!(Occurrence::from_count(1), Occurrence::Required);
        assert_eq!(Occurrence::from_count(990), Occurrence::Repeated(990));
    }

    #[test]
    fn test_kind_debug() {
        assert_eq!(format!("{:?}", FieldKind::Decimal(Scale::Four)), "Decimal(4)");
        assert_eq!(format!("{:?}", FieldKind::Integer), "integer");
    }
}
