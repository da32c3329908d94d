//! Conversion session
//!
//! A session owns the state shared by every field of one document
//! conversion: options, the alert collector and the converters registered
//! for `Custom` fields. Concurrent conversions use separate sessions.

use super::alerts::{Alert, AlertCollector};
use super::descriptors::FieldDescriptor;
use super::nodes::{build_node, XmlElement, XmlNode, XmlSource};
use super::options::SerializerOptions;
use super::primitive::{deserialize_value, serialize_value, ConversionResult, CustomConverter};
use super::values::FieldValue;
use crate::error::Result;
use std::collections::HashMap;

/// State of one document conversion
#[derive(Debug)]
pub struct ConversionSession {
    options: SerializerOptions,
    alerts: AlertCollector,
    converters: HashMap<String, CustomConverter>,
}

impl Default for ConversionSession {
    fn default() -> Self {
        Self::new(SerializerOptions::default())
    }
}

impl ConversionSession {
    /// Start a session with the given options
    pub fn new(options: SerializerOptions) -> Self {
        let alerts = AlertCollector::new(options.alert_template.clone());
        Self {
            options,
            alerts,
            converters: HashMap::new(),
        }
    }

    /// Session options
    pub fn options(&self) -> &SerializerOptions {
        &self.options
    }

    /// Change the alert template for alerts recorded from now on
    pub fn set_alert_template(&mut self, template: impl Into<String>) {
        let template = template.into();
        self.alerts.set_template(template.clone());
        self.options.alert_template = template;
    }

    /// Bind a converter to the `Custom` field with id `field_id`
    pub fn register_converter(&mut self, field_id: impl Into<String>, converter: CustomConverter) {
        self.converters.insert(field_id.into(), converter);
    }

    fn converter(&self, descriptor: &FieldDescriptor) -> Option<&CustomConverter> {
        self.converters.get(&descriptor.id)
    }

    /// Convert a value without recording anything
    pub fn convert(
        &self,
        descriptor: &FieldDescriptor,
        value: Option<&FieldValue>,
    ) -> Result<ConversionResult> {
        serialize_value(value, descriptor, &self.options, self.converter(descriptor))
    }

    /// Convert a value, record its alert and build its node
    ///
    /// Never fails: a conversion error is recorded as an alert carrying the
    /// error text and no node is produced.
    pub fn serialize_field(
        &mut self,
        descriptor: &FieldDescriptor,
        value: Option<&FieldValue>,
    ) -> Option<XmlNode> {
        match self.convert(descriptor, value) {
            Ok(result) => {
                if let Some(alert) = &result.alert {
                    self.alerts.record(alert);
                }
                build_node(descriptor, &result, self.options.strip_accents)
            }
            Err(err) => {
                log::warn!("field {} <{}> failed: {}", descriptor.id, descriptor.name, err);
                self.alerts.record(&Alert {
                    field_id: descriptor.id.clone(),
                    field_name: descriptor.name.clone(),
                    field_description: descriptor.description.clone(),
                    message: err.to_string(),
                });
                None
            }
        }
    }

    /// Read a value from an element or attribute source
    pub fn deserialize_field(
        &self,
        source: Option<XmlSource<'_, '_>>,
        descriptor: &FieldDescriptor,
    ) -> Result<Option<FieldValue>> {
        deserialize_value(source, descriptor, self.converter(descriptor))
    }

    /// Read the value of `descriptor` from inside `container`
    pub fn read_field(
        &self,
        container: roxmltree::Node<'_, '_>,
        descriptor: &FieldDescriptor,
    ) -> Result<Option<FieldValue>> {
        self.deserialize_field(XmlSource::find(container, descriptor), descriptor)
    }

    /// Alerts recorded so far, rendered, in field order
    pub fn alerts(&self) -> &[String] {
        self.alerts.alerts()
    }

    /// Take the recorded alerts
    pub fn take_alerts(&mut self) -> Vec<String> {
        self.alerts.take()
    }

    /// Render an element tree with the session's formatting options
    pub fn render(&self, element: &XmlElement) -> Result<String> {
        element.to_xml(&self.options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::serializer::descriptors::{FieldKind, Occurrence};

    #[test]
    fn test_alerts_in_field_order() {
        let mut session = ConversionSession::default();
        let first = FieldDescriptor::element("B03", "cNF", FieldKind::Text)
            .describe("Código Numérico")
            .occurs(Occurrence::Required)
            .length(8, 8);
        let second = FieldDescriptor::element("B04", "natOp", FieldKind::Text).length(1, 3);

        assert_eq!(
            session.serialize_field(&first, None),
            Some(XmlNode::new(first.node, "cNF", ""))
        );
        assert!(session
            .serialize_field(&second, Some(&FieldValue::from("Venda")))
            .is_some());

        assert_eq!(
            session.alerts(),
            [
                "TAG:<cNF> ID:B03/<cNF>(Código Numérico) - Nenhum valor informado.",
                "TAG:<natOp> ID:B04/<natOp>() - Tamanho maior que o máximo permitido.",
            ]
        );
    }

    #[test]
    fn test_failing_converter_becomes_alert() {
        let mut session = ConversionSession::default();
        session.set_alert_template("%ID%: %MSG%");
        session.register_converter(
            "Z01",
            CustomConverter::new(
                |_| Err(Error::Configuration("boom".to_string())),
                |text| Ok(FieldValue::from(text)),
            ),
        );

        let desc = FieldDescriptor::element("Z01", "infCpl", FieldKind::Custom);
        assert!(session.serialize_field(&desc, None).is_none());
        assert_eq!(session.alerts(), ["Z01: configuration error: boom"]);
    }

    #[test]
    fn test_out_of_range_offset_becomes_alert() {
        let options = SerializerOptions {
            utc_offset_minutes: Some(i32::MAX),
            ..SerializerOptions::default()
        };
        let mut session = ConversionSession::new(options);
        let desc = FieldDescriptor::element("B09", "dhEmi", FieldKind::DateTimeWithOffset);

        let node = session.serialize_field(&desc, Some(&FieldValue::from("2024-01-01T10:00:00")));
        assert!(node.is_none());
        assert_eq!(session.alerts().len(), 1);
        assert!(session.alerts()[0].contains("UTC offset out of range"));
    }

    #[test]
    fn test_no_alert_when_valid() {
        let mut session = ConversionSession::default();
        let desc = FieldDescriptor::element("B02", "cUF", FieldKind::Integer).length(2, 2);
        let node = session.serialize_field(&desc, Some(&FieldValue::from(35))).unwrap();
        assert_eq!(node.text(), "35");
        assert!(session.alerts().is_empty());
    }

    #[test]
    fn test_read_field() {
        let doc = roxmltree::Document::parse("<ide><cUF>35</cUF></ide>").unwrap();
        let session = ConversionSession::default();
        let desc = FieldDescriptor::element("B02", "cUF", FieldKind::Integer);
        assert_eq!(
            session.read_field(doc.root_element(), &desc).unwrap(),
            Some(FieldValue::Integer(35))
        );
    }
}
