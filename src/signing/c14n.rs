//! Canonical XML 1.0 (inclusive) over a parsed document
//!
//! Produces the byte sequence that is digested and signed. The node-set is
//! either a whole document or the subtree of one element, optionally minus
//! one excluded element (the enveloped-signature transform).

use crate::error::Result;
use crate::namespaces::XML_NAMESPACE;
use roxmltree::{Document, Node, NodeId, NodeType};

/// Canonical XML 1.0 serializer
#[derive(Debug, Clone, Copy, Default)]
pub struct Canonicalizer {
    with_comments: bool,
    exclude: Option<NodeId>,
}

/// One namespace binding: prefix (`None` for the default namespace) and URI
type Binding<'a> = (Option<&'a str>, &'a str);

impl Canonicalizer {
    /// Canonicalizer without comments
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep comment nodes in the output
    pub fn with_comments(mut self, with_comments: bool) -> Self {
        self.with_comments = with_comments;
        self
    }

    /// Leave `node` and its descendants out of the output
    pub fn excluding(mut self, node: Node<'_, '_>) -> Self {
        self.exclude = Some(node.id());
        self
    }

    /// Canonical form of a whole document
    pub fn document(&self, doc: &Document<'_>) -> String {
        let mut out = String::new();
        let mut after_root = false;
        for child in doc.root().children() {
            if self.is_excluded(child) {
                continue;
            }
            match child.node_type() {
                NodeType::Element => {
                    self.write_element(child, None, &mut out);
                    after_root = true;
                }
                NodeType::Comment if !self.with_comments => {}
                NodeType::Comment | NodeType::PI => {
                    if after_root {
                        out.push('\n');
                    }
                    self.write_node(child, &mut out);
                    if !after_root {
                        out.push('\n');
                    }
                }
                _ => {}
            }
        }
        out
    }

    /// Canonical form of the subtree rooted at `node`, with the namespace
    /// context the element has in its document
    pub fn subtree(&self, node: Node<'_, '_>) -> String {
        let mut out = String::new();
        if node.is_element() {
            if !self.is_excluded(node) {
                self.write_element(node, None, &mut out);
            }
        } else {
            self.write_node(node, &mut out);
        }
        out
    }

    fn is_excluded(&self, node: Node<'_, '_>) -> bool {
        self.exclude == Some(node.id())
    }

    fn write_node(&self, node: Node<'_, '_>, out: &mut String) {
        match node.node_type() {
            NodeType::Element => {
                if !self.is_excluded(node) {
                    self.write_element(node, node.parent_element(), out);
                }
            }
            NodeType::Text => escape_text(node.text().unwrap_or_default(), out),
            NodeType::Comment => {
                if self.with_comments {
                    out.push_str("<!--");
                    out.push_str(node.text().unwrap_or_default());
                    out.push_str("-->");
                }
            }
            NodeType::PI => {
                if let Some(pi) = node.pi() {
                    out.push_str("<?");
                    out.push_str(pi.target);
                    if let Some(value) = pi.value.filter(|v| !v.is_empty()) {
                        out.push(' ');
                        out.push_str(value);
                    }
                    out.push_str("?>");
                }
            }
            NodeType::Root => {}
        }
    }

    /// `output_parent` is the nearest ancestor already written, `None` for
    /// the apex of the node-set
    fn write_element(&self, node: Node<'_, '_>, output_parent: Option<Node<'_, '_>>, out: &mut String) {
        let name = qualified_name(node);
        out.push('<');
        out.push_str(name);

        for (prefix, uri) in rendered_namespaces(node, output_parent) {
            match prefix {
                Some(prefix) => {
                    out.push_str(" xmlns:");
                    out.push_str(prefix);
                }
                None => out.push_str(" xmlns"),
            }
            out.push_str("=\"");
            escape_attribute(uri, out);
            out.push('"');
        }

        let mut attributes: Vec<(&str, &str, String, &str)> = node
            .attributes()
            .map(|attr| {
                let uri = attr.namespace().unwrap_or("");
                let name = match attr.namespace() {
                    Some(uri) => match attribute_prefix(node, uri) {
                        Some(prefix) => format!("{}:{}", prefix, attr.name()),
                        None => attr.name().to_string(),
                    },
                    None => attr.name().to_string(),
                };
                (uri, attr.name(), name, attr.value())
            })
            .collect();

        if output_parent.is_none() {
            inherit_xml_attributes(node, &mut attributes);
        }
        attributes.sort_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));

        for (_, _, name, value) in &attributes {
            out.push(' ');
            out.push_str(name);
            out.push_str("=\"");
            escape_attribute(value, out);
            out.push('"');
        }
        out.push('>');

        for child in node.children() {
            if child.is_element() {
                if !self.is_excluded(child) {
                    self.write_element(child, Some(node), out);
                }
            } else {
                self.write_node(child, out);
            }
        }

        out.push_str("</");
        out.push_str(name);
        out.push('>');
    }
}

/// Canonical form of a whole document given as text
pub fn canonicalize(xml: &str, with_comments: bool) -> Result<String> {
    let doc = Document::parse(xml)?;
    Ok(Canonicalizer::new().with_comments(with_comments).document(&doc))
}

/// Element name as written in the source, prefix included
pub(crate) fn qualified_name<'input>(node: Node<'_, 'input>) -> &'input str {
    let text = node.document().input_text();
    let start = node.range().start + 1;
    let rest = text.get(start..).unwrap_or_default();
    let end = rest
        .find(|c: char| c.is_whitespace() || c == '/' || c == '>')
        .unwrap_or(rest.len());
    &rest[..end]
}

fn in_scope<'a>(node: Node<'a, '_>) -> Vec<Binding<'a>> {
    node.namespaces()
        .filter(|ns| ns.name() != Some("xml"))
        .map(|ns| (ns.name(), ns.uri()))
        .collect()
}

/// Namespace declarations the element must carry, sorted by prefix with the
/// default namespace first
fn rendered_namespaces<'a>(node: Node<'a, '_>, output_parent: Option<Node<'a, '_>>) -> Vec<Binding<'a>> {
    let own = in_scope(node);
    let mut rendered: Vec<Binding<'a>> = match output_parent {
        None => own.into_iter().filter(|(p, uri)| p.is_some() || !uri.is_empty()).collect(),
        Some(parent) => {
            let inherited = in_scope(parent);
            own.into_iter()
                .filter(|binding| match binding {
                    (None, "") => inherited.iter().any(|(p, uri)| p.is_none() && !uri.is_empty()),
                    _ => !inherited.contains(binding),
                })
                .collect()
        }
    };
    rendered.sort_by(|a, b| a.0.unwrap_or("").cmp(b.0.unwrap_or("")));
    rendered
}

fn attribute_prefix<'a>(node: Node<'a, '_>, uri: &str) -> Option<&'a str> {
    if uri == XML_NAMESPACE {
        return Some("xml");
    }
    node.namespaces()
        .find(|ns| ns.name().is_some() && ns.uri() == uri)
        .and_then(|ns| ns.name())
}

/// `xml:*` attributes of ancestors that the apex does not override
fn inherit_xml_attributes<'a>(node: Node<'a, '_>, attributes: &mut Vec<(&'a str, &'a str, String, &'a str)>) {
    for ancestor in node.ancestors().skip(1).filter(|n| n.is_element()) {
        for attr in ancestor.attributes() {
            if attr.namespace() != Some(XML_NAMESPACE) {
                continue;
            }
            let present = attributes
                .iter()
                .any(|(uri, local, _, _)| *uri == XML_NAMESPACE && *local == attr.name());
            if !present {
                attributes.push((
                    XML_NAMESPACE,
                    attr.name(),
                    format!("xml:{}", attr.name()),
                    attr.value(),
                ));
            }
        }
    }
}

fn escape_text(text: &str, out: &mut String) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\r' => out.push_str("&#xD;"),
            _ => out.push(c),
        }
    }
}

fn escape_attribute(value: &str, out: &mut String) {
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '"' => out.push_str("&quot;"),
            '\t' => out.push_str("&#x9;"),
            '\n' => out.push_str("&#xA;"),
            '\r' => out.push_str("&#xD;"),
            _ => out.push(c),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_empty_elements_and_attribute_order() {
        let c14n = canonicalize(r#"<?xml version="1.0"?><a z="1" b='2'><e/></a>"#, false).unwrap();
        assert_eq!(c14n, r#"<a b="2" z="1"><e></e></a>"#);
    }

    #[test]
    fn test_escaping() {
        let xml = "<a v='x&lt;&amp;\"y&#9;'>1 &lt; 2 &amp;&amp; 3 &gt; 2 \"q\"</a>";
        assert_eq!(
            canonicalize(xml, false).unwrap(),
            r#"<a v="x&lt;&amp;&quot;y&#x9;">1 &lt; 2 &amp;&amp; 3 &gt; 2 "q"</a>"#
        );
    }

    #[test]
    fn test_cdata_becomes_text() {
        assert_eq!(
            canonicalize("<a><![CDATA[<b>]]></a>", false).unwrap(),
            "<a>&lt;b&gt;</a>"
        );
    }

    #[test]
    fn test_comments_and_pis_outside_root() {
        let xml = "<?pi data?><!--c1--><a><!--c2--></a><!--c3-->";
        assert_eq!(canonicalize(xml, false).unwrap(), "<?pi data?>\n<a></a>");
        assert_eq!(
            canonicalize(xml, true).unwrap(),
            "<?pi data?>\n<!--c1-->\n<a><!--c2--></a>\n<!--c3-->"
        );
    }

    #[test]
    fn test_namespace_declarations() {
        let xml = r#"<a xmlns:b="urn:b" xmlns="urn:a"><b:c xmlns:b="urn:b" attr="1"><d xmlns=""/></b:c></a>"#;
        assert_eq!(
            canonicalize(xml, false).unwrap(),
            r#"<a xmlns="urn:a" xmlns:b="urn:b"><b:c attr="1"><d xmlns=""></d></b:c></a>"#
        );
    }

    #[test]
    fn test_prefixed_attributes_sort_by_namespace() {
        let xml = r#"<a xmlns:z="urn:a" xmlns:y="urn:b" y:k="1" z:k="2" k="3"/>"#;
        assert_eq!(
            canonicalize(xml, false).unwrap(),
            r#"<a xmlns:y="urn:b" xmlns:z="urn:a" k="3" z:k="2" y:k="1"></a>"#
        );
    }

    #[test]
    fn test_subtree_carries_inherited_namespaces() {
        let xml = r#"<NFe xmlns="http://www.portalfiscal.inf.br/nfe" xmlns:x="urn:x"><infNFe Id="NFe1" versao="4.00"><ide/></infNFe></NFe>"#;
        let doc = Document::parse(xml).unwrap();
        let inf = doc.descendants().find(|n| n.has_tag_name("infNFe")).unwrap();
        assert_eq!(
            Canonicalizer::new().subtree(inf),
            r#"<infNFe xmlns="http://www.portalfiscal.inf.br/nfe" xmlns:x="urn:x" Id="NFe1" versao="4.00"><ide></ide></infNFe>"#
        );
    }

    #[test]
    fn test_subtree_inherits_xml_attributes() {
        let xml = r#"<a xml:lang="pt-BR"><b Id="1"/></a>"#;
        let doc = Document::parse(xml).unwrap();
        let b = doc.descendants().find(|n| n.has_tag_name("b")).unwrap();
        assert_eq!(Canonicalizer::new().subtree(b), r#"<b Id="1" xml:lang="pt-BR"></b>"#);
    }

    #[test]
    fn test_excluded_node() {
        let xml = "<a><b>1</b><Signature><x/></Signature></a>";
        let doc = Document::parse(xml).unwrap();
        let sig = doc.descendants().find(|n| n.has_tag_name("Signature")).unwrap();
        assert_eq!(
            Canonicalizer::new().excluding(sig).document(&doc),
            "<a><b>1</b></a>"
        );
    }

    #[test]
    fn test_whitespace_preserved() {
        let xml = "<a>\r\n  <b> x </b>\n</a>";
        assert_eq!(canonicalize(xml, false).unwrap(), "<a>\n  <b> x </b>\n</a>");
    }
}
