//! XML nodes produced by serialization
//!
//! Converted field text is wrapped into an element or an attribute
//! ([`build_node`]), nodes are collected into [`XmlElement`] trees, and
//! trees are rendered with quick-xml.

use super::descriptors::{FieldDescriptor, NodeKind};
use super::options::SerializerOptions;
use super::primitive::ConversionResult;
use crate::error::{Error, Result};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use std::borrow::Cow;

/// One serialized field
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XmlNode {
    /// Child element
    Element(XmlElement),
    /// Attribute of the container
    Attribute {
        /// Attribute name
        name: String,
        /// Attribute value (unescaped)
        value: String,
    },
}

impl XmlNode {
    /// Build a node of the given kind carrying `text`
    pub fn new(kind: NodeKind, name: impl Into<String>, text: impl Into<String>) -> Self {
        match kind {
            NodeKind::Element => XmlNode::Element(XmlElement::with_text(name, text)),
            NodeKind::Attribute => XmlNode::Attribute {
                name: name.into(),
                value: text.into(),
            },
        }
    }

    /// Node name
    pub fn name(&self) -> &str {
        match self {
            XmlNode::Element(e) => &e.name,
            XmlNode::Attribute { name, .. } => name,
        }
    }

    /// Text content
    pub fn text(&self) -> &str {
        match self {
            XmlNode::Element(e) => e.text.as_deref().unwrap_or(""),
            XmlNode::Attribute { value, .. } => value,
        }
    }

    /// Whether this node is an attribute
    pub fn is_attribute(&self) -> bool {
        matches!(self, XmlNode::Attribute { .. })
    }
}

/// Element with attributes and either text or child elements
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XmlElement {
    /// Element name, possibly prefixed
    pub name: String,
    /// Attributes in insertion order
    pub attributes: Vec<(String, String)>,
    /// Text content
    pub text: Option<String>,
    /// Child elements
    pub children: Vec<XmlElement>,
}

impl XmlElement {
    /// Create an empty element
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Create an element holding text
    pub fn with_text(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            text: Some(text.into()),
            ..Default::default()
        }
    }

    /// Add an attribute
    pub fn set_attribute(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.attributes.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.attributes.push((name, value)),
        }
    }

    /// Attribute value by name
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Append a child element
    pub fn push_child(&mut self, child: XmlElement) {
        self.children.push(child);
    }

    /// Add a serialized field: elements become children, attributes attributes
    pub fn push(&mut self, node: XmlNode) {
        match node {
            XmlNode::Element(e) => self.children.push(e),
            XmlNode::Attribute { name, value } => self.set_attribute(name, value),
        }
    }

    /// First child called `name`
    pub fn child(&self, name: &str) -> Option<&XmlElement> {
        self.children.iter().find(|c| c.name == name)
    }

    /// Render with the session's formatting options
    pub fn to_xml(&self, options: &SerializerOptions) -> Result<String> {
        let mut writer = if options.format_xml {
            Writer::new_with_indent(Vec::new(), b' ', options.indent)
        } else {
            Writer::new(Vec::new())
        };

        if !options.omit_declaration {
            writer
                .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
                .map_err(xml_error)?;
        }
        self.write_to(&mut writer)?;

        String::from_utf8(writer.into_inner()).map_err(|e| Error::Xml(e.to_string()))
    }

    fn write_to(&self, writer: &mut Writer<Vec<u8>>) -> Result<()> {
        let mut start = BytesStart::new(self.name.as_str());
        for (name, value) in &self.attributes {
            start.push_attribute((name.as_str(), value.as_str()));
        }

        let text = self.text.as_deref().filter(|t| !t.is_empty());
        if text.is_none() && self.children.is_empty() {
            return writer.write_event(Event::Empty(start)).map_err(xml_error);
        }

        writer.write_event(Event::Start(start)).map_err(xml_error)?;
        if let Some(text) = text {
            writer
                .write_event(Event::Text(BytesText::new(text)))
                .map_err(xml_error)?;
        }
        for child in &self.children {
            child.write_to(writer)?;
        }
        writer
            .write_event(Event::End(BytesEnd::new(self.name.as_str())))
            .map_err(xml_error)
    }
}

fn xml_error(err: quick_xml::Error) -> Error {
    Error::Xml(err.to_string())
}

/// Wrap a conversion result into the node the descriptor asks for
///
/// Empty results yield an empty placeholder for mandatory fields and no node
/// otherwise.
pub fn build_node(
    descriptor: &FieldDescriptor,
    result: &ConversionResult,
    strip: bool,
) -> Option<XmlNode> {
    if result.is_empty {
        return descriptor
            .occurrence
            .is_required()
            .then(|| XmlNode::new(descriptor.node, descriptor.name.as_str(), ""));
    }

    let text = if strip {
        strip_accents(&result.text)
    } else {
        Cow::Borrowed(result.text.as_str())
    };
    Some(XmlNode::new(descriptor.node, descriptor.name.as_str(), text.into_owned()))
}

/// Replace accented Latin-1 letters by their base letter
pub fn strip_accents(text: &str) -> Cow<'_, str> {
    if text.is_ascii() {
        return Cow::Borrowed(text);
    }
    Cow::Owned(text.chars().map(base_letter).collect())
}

fn base_letter(c: char) -> char {
    match c {
        'À' | 'Á' | 'Â' | 'Ã' | 'Ä' | 'Å' => 'A',
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' | 'ª' => 'a',
        'È' | 'É' | 'Ê' | 'Ë' => 'E',
        'è' | 'é' | 'ê' | 'ë' => 'e',
        'Ì' | 'Í' | 'Î' | 'Ï' => 'I',
        'ì' | 'í' | 'î' | 'ï' => 'i',
        'Ò' | 'Ó' | 'Ô' | 'Õ' | 'Ö' => 'O',
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' | 'º' => 'o',
        'Ù' | 'Ú' | 'Û' | 'Ü' => 'U',
        'ù' | 'ú' | 'û' | 'ü' => 'u',
        'Ç' => 'C',
        'ç' => 'c',
        'Ñ' => 'N',
        'ñ' => 'n',
        'Ý' => 'Y',
        'ý' | 'ÿ' => 'y',
        other => other,
    }
}

/// Source of a field read back from a document
#[derive(Debug, Clone, Copy)]
pub enum XmlSource<'a, 'input> {
    /// Element whose text content is the value
    Element(roxmltree::Node<'a, 'input>),
    /// Attribute value
    Attribute(&'a str),
}

impl<'a, 'input> XmlSource<'a, 'input> {
    /// Text of the source; for elements, the concatenated descendant text
    pub fn text(&self) -> Cow<'a, str> {
        match *self {
            XmlSource::Attribute(value) => Cow::Borrowed(value),
            XmlSource::Element(node) => {
                let mut texts = node.descendants().filter(|n| n.is_text()).filter_map(|n| n.text());
                match (texts.next(), texts.next()) {
                    (None, _) => Cow::Borrowed(""),
                    (Some(only), None) => Cow::Borrowed(only),
                    (Some(first), Some(second)) => {
                        let mut joined = format!("{}{}", first, second);
                        joined.extend(texts);
                        Cow::Owned(joined)
                    }
                }
            }
        }
    }

    /// Locate the source of `descriptor` inside `container`
    pub fn find(container: roxmltree::Node<'a, 'input>, descriptor: &FieldDescriptor) -> Option<Self> {
        let (_, local) = crate::names::split_qname(&descriptor.name);
        match descriptor.node {
            NodeKind::Attribute => container
                .attributes()
                .find(|a| a.name() == local)
                .map(|a| XmlSource::Attribute(a.value())),
            NodeKind::Element => container
                .children()
                .find(|c| c.is_element() && c.tag_name().name() == local)
                .map(XmlSource::Element),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serializer::descriptors::{FieldKind, Occurrence};

    fn result(text: &str, is_empty: bool) -> ConversionResult {
        ConversionResult {
            text: text.to_string(),
            is_empty,
            alert: None,
        }
    }

    #[test]
    fn test_strip_accents() {
        assert_eq!(strip_accents("Ação São João nº 5"), "Acao Sao Joao no 5");
        assert!(matches!(strip_accents("plain"), Cow::Borrowed(_)));
    }

    #[test]
    fn test_required_empty_gives_placeholder() {
        let desc = FieldDescriptor::element("B03", "cNF", FieldKind::Text).required();
        let node = build_node(&desc, &result("", true), false).unwrap();
        assert_eq!(node, XmlNode::Element(XmlElement::with_text("cNF", "")));

        let attr = FieldDescriptor::attribute("A03", "Id", FieldKind::Text).required();
        let node = build_node(&attr, &result("", true), false).unwrap();
        assert!(node.is_attribute());
        assert_eq!(node.text(), "");
    }

    #[test]
    fn test_optional_empty_gives_nothing() {
        let desc = FieldDescriptor::element("B03", "cNF", FieldKind::Text).occurs(Occurrence::Optional);
        assert!(build_node(&desc, &result("", true), false).is_none());
    }

    #[test]
    fn test_strip_applied_to_text() {
        let desc = FieldDescriptor::element("C03", "xNome", FieldKind::Text);
        let node = build_node(&desc, &result("Padaria Pão Quente", false), true).unwrap();
        assert_eq!(node.text(), "Padaria Pao Quente");
    }

    #[test]
    fn test_render_compact() {
        let mut root = XmlElement::new("ide");
        root.push(XmlNode::new(NodeKind::Attribute, "versao", "4.00"));
        root.push(XmlNode::new(NodeKind::Element, "cUF", "35"));
        root.push(XmlNode::new(NodeKind::Element, "natOp", "A & B"));
        root.push(XmlNode::new(NodeKind::Element, "cNF", ""));

        let options = SerializerOptions {
            format_xml: false,
            omit_declaration: true,
            ..Default::default()
        };
        assert_eq!(
            root.to_xml(&options).unwrap(),
            r#"<ide versao="4.00"><cUF>35</cUF><natOp>A &amp; B</natOp><cNF/></ide>"#
        );
    }

    #[test]
    fn test_render_indented_with_declaration() {
        let mut root = XmlElement::new("ide");
        root.push_child(XmlElement::with_text("cUF", "35"));

        let xml = root.to_xml(&SerializerOptions::default()).unwrap();
        assert_eq!(
            xml,
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<ide>\n  <cUF>35</cUF>\n</ide>"
        );
    }

    #[test]
    fn test_source_text() {
        let doc = roxmltree::Document::parse(r#"<ide versao="4.00"><natOp>Venda <b>de</b> mercadoria</natOp></ide>"#)
            .unwrap();
        let root = doc.root_element();

        let natop = FieldDescriptor::element("B04", "natOp", FieldKind::Text);
        let source = XmlSource::find(root, &natop).unwrap();
        assert_eq!(source.text(), "Venda de mercadoria");

        let versao = FieldDescriptor::attribute("A02", "versao", FieldKind::Text);
        assert_eq!(XmlSource::find(root, &versao).unwrap().text(), "4.00");

        let missing = FieldDescriptor::element("B05", "indPag", FieldKind::Integer);
        assert!(XmlSource::find(root, &missing).is_none());
    }
}
