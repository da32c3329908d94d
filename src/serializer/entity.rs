//! Per-entity accessor tables
//!
//! An [`EntityMap`] ties a Rust struct to a container element: each entry
//! pairs a field descriptor with a typed getter and setter, so a whole
//! struct can be written to and read from XML one field at a time.

use super::descriptors::{DescriptorTable, FieldDescriptor};
use super::nodes::XmlElement;
use super::session::ConversionSession;
use super::values::FieldValue;
use crate::error::{Error, Result};
use std::sync::Arc;

/// Reads a field out of an entity
pub type Getter<T> = fn(&T) -> Option<FieldValue>;

/// Stores a field value into an entity
pub type Setter<T> = fn(&mut T, FieldValue) -> Result<()>;

/// Descriptor plus typed access to one field of `T`
pub struct FieldAccessor<T> {
    /// Field metadata
    pub descriptor: Arc<FieldDescriptor>,
    /// Getter
    pub get: Getter<T>,
    /// Setter
    pub set: Setter<T>,
}

impl<T> Clone for FieldAccessor<T> {
    fn clone(&self) -> Self {
        Self {
            descriptor: Arc::clone(&self.descriptor),
            get: self.get,
            set: self.set,
        }
    }
}

/// Ordered accessors of one entity type and the element that contains them
pub struct EntityMap<T> {
    element: String,
    fields: Vec<FieldAccessor<T>>,
}

impl<T> EntityMap<T> {
    /// Start an empty map for the container element `element`
    pub fn new(element: impl Into<String>) -> Result<Self> {
        let element = element.into();
        crate::names::validate_tag_name(&element)?;
        Ok(Self {
            element,
            fields: Vec::new(),
        })
    }

    /// Append an accessor for the field `id` of `table`
    pub fn bind(
        self,
        table: &DescriptorTable,
        id: &str,
        get: Getter<T>,
        set: Setter<T>,
    ) -> Result<Self> {
        let descriptor = table.get(id).ok_or_else(|| {
            Error::Configuration(format!("table {} has no field {}", table.name(), id))
        })?;
        Ok(self.with(Arc::clone(descriptor), get, set))
    }

    /// Append an accessor for a standalone descriptor
    pub fn with(mut self, descriptor: Arc<FieldDescriptor>, get: Getter<T>, set: Setter<T>) -> Self {
        self.fields.push(FieldAccessor {
            descriptor,
            get,
            set,
        });
        self
    }

    /// Container element name
    pub fn element(&self) -> &str {
        &self.element
    }

    /// Accessors in document order
    pub fn fields(&self) -> &[FieldAccessor<T>] {
        &self.fields
    }

    /// Serialize every field of `entity` into a new container element
    ///
    /// Alerts are recorded in `session`; this never fails.
    pub fn serialize(&self, entity: &T, session: &mut ConversionSession) -> XmlElement {
        let mut element = XmlElement::new(self.element.as_str());
        for field in &self.fields {
            let value = (field.get)(entity);
            if let Some(node) = session.serialize_field(&field.descriptor, value.as_ref()) {
                element.push(node);
            }
        }
        element
    }

    /// Fill a new entity from the container element `node`
    pub fn deserialize(&self, node: roxmltree::Node<'_, '_>, session: &ConversionSession) -> Result<T>
    where
        T: Default,
    {
        let mut entity = T::default();
        for field in &self.fields {
            let descriptor = &field.descriptor;
            if let Some(value) = session.read_field(node, descriptor)? {
                (field.set)(&mut entity, value).map_err(|err| match err {
                    Error::Format { message, .. } => Error::format(descriptor.id.as_str(), message),
                    other => other,
                })?;
            }
        }
        Ok(entity)
    }

    /// Parse `xml` and deserialize the first element named like the container
    pub fn read_document(&self, xml: &str, session: &ConversionSession) -> Result<T>
    where
        T: Default,
    {
        let doc = roxmltree::Document::parse(xml)?;
        let (_, local) = crate::names::split_qname(&self.element);
        let node = doc
            .descendants()
            .find(|n| n.is_element() && n.tag_name().name() == local)
            .ok_or_else(|| Error::Xml(format!("element <{}> not found", self.element)))?;
        self.deserialize(node, session)
    }
}
