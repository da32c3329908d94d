//! Field-descriptor driven serialization
//!
//! This module converts typed values to and from the XML of fiscal
//! documents, one field at a time:
//!
//! - [`FieldDescriptor`]: immutable metadata of one field
//! - [`serialize_value`] / [`deserialize_value`]: the value converter
//! - [`build_node`]: wraps converted text into an element or attribute
//! - [`AlertCollector`]: ordered, templated diagnostics
//! - [`ConversionSession`]: options, alerts and custom converters of one
//!   document conversion
//! - [`EntityMap`]: accessor tables that drive a whole struct

pub mod alerts;
pub mod coded;
pub mod descriptors;
pub mod entity;
pub mod nodes;
pub mod options;
pub mod primitive;
pub mod session;
pub mod values;

pub use alerts::{Alert, AlertCollector, AlertKind, DEFAULT_TEMPLATE};
pub use coded::{CodeTable, CodedEnum, CodedMember};
pub use descriptors::{
    DescriptorTable, FieldDescriptor, FieldKind, Layout, NodeKind, Occurrence, Scale,
};
pub use entity::{EntityMap, FieldAccessor, Getter, Setter};
pub use nodes::{build_node, strip_accents, XmlElement, XmlNode, XmlSource};
pub use options::SerializerOptions;
pub use primitive::{
    deserialize_value, format_decimal, serialize_value, zero_fill, ConversionResult,
    CustomConverter,
};
pub use session::ConversionSession;
pub use values::{parse_timestamp, FieldValue, Locale};
