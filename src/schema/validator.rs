//! Streaming document validation
//!
//! The document is read once with quick-xml's namespace-aware reader. Each
//! open element keeps a frame with its declaration, the names of its
//! children and its character data; attributes are checked when the element
//! starts, content when it ends.

use super::builder::SchemaSet;
use super::builtins::Builtin;
use super::content::match_content;
use super::model::{
    Attribution, AttributeUse, Content, ElementDecl, ProcessContents, SimpleType, TypeRef,
};
use super::report::{line_column, SchemaDiagnostic, ValidationReport};
use crate::namespaces::{QName, XSI_NAMESPACE};
use quick_xml::events::{BytesStart, Event};
use quick_xml::name::ResolveResult;
use quick_xml::reader::NsReader;
use std::collections::HashSet;

/// How an open element is validated
#[derive(Debug, Clone, Copy)]
enum Mode<'s> {
    Declared(&'s ElementDecl),
    Lax,
    Skip,
}

struct Frame<'s> {
    name: QName,
    path: String,
    mode: Mode<'s>,
    children: Vec<QName>,
    text: String,
    nil: bool,
    offset: usize,
}

impl<'s> Frame<'s> {
    fn has_text(&self) -> bool {
        !self.text.trim().is_empty()
    }
}

impl SchemaSet {
    /// Validate `xml` against the compiled schema
    ///
    /// Never fails: parse problems and schema violations are both reported
    /// as errors in the returned report.
    pub fn validate(&self, xml: &str) -> ValidationReport {
        let mut run = Run {
            schema: self,
            xml,
            report: ValidationReport::new(),
            stack: Vec::new(),
            root_seen: false,
            ids: HashSet::new(),
        };
        run.execute();
        log::debug!(
            "validation finished: {} error(s), {} warning(s)",
            run.report.errors.len(),
            run.report.warnings.len()
        );
        run.report
    }
}

struct Run<'s, 'x> {
    schema: &'s SchemaSet,
    xml: &'x str,
    report: ValidationReport,
    stack: Vec<Frame<'s>>,
    root_seen: bool,
    ids: HashSet<String>,
}

fn namespace_of(resolved: ResolveResult<'_>) -> Result<Option<String>, String> {
    match resolved {
        ResolveResult::Bound(ns) => Ok(Some(String::from_utf8_lossy(ns.into_inner()).into_owned())),
        ResolveResult::Unbound => Ok(None),
        ResolveResult::Unknown(prefix) => Err(format!(
            "unknown namespace prefix '{}'",
            String::from_utf8_lossy(&prefix)
        )),
    }
}

impl<'s, 'x> Run<'s, 'x> {
    fn error(&mut self, path: &str, offset: usize, message: impl Into<String>) {
        let diagnostic = SchemaDiagnostic::new(message)
            .with_path(path)
            .with_position(line_column(self.xml, offset));
        self.report.error(diagnostic);
    }

    fn warning(&mut self, path: &str, offset: usize, message: impl Into<String>) {
        let diagnostic = SchemaDiagnostic::new(message)
            .with_path(path)
            .with_position(line_column(self.xml, offset));
        self.report.warning(diagnostic);
    }

    /// Well-formedness failure; validation stops
    fn fatal(&mut self, offset: usize, message: impl Into<String>) {
        let diagnostic =
            SchemaDiagnostic::new(message).with_position(line_column(self.xml, offset));
        self.report.error(diagnostic);
    }

    fn current_path(&self) -> String {
        self.stack.last().map(|f| f.path.clone()).unwrap_or_default()
    }

    fn execute(&mut self) {
        if let Err(e) = self.schema.limits.check_document_size(self.xml.len()) {
            self.report.error(e.to_string());
            return;
        }

        let mut reader = NsReader::from_str(self.xml);
        reader
            .expand_empty_elements(true)
            .trim_text(false)
            .check_end_names(true);

        loop {
            let offset = reader.buffer_position();
            let (namespace, event) = match reader.read_resolved_event() {
                Ok((resolved, event)) => (namespace_of(resolved), event),
                Err(e) => {
                    let position = reader.buffer_position();
                    self.fatal(position, format!("XML parse error: {}", e));
                    return;
                }
            };

            let outcome = match event {
                Event::Start(start) => self.start(&reader, namespace, &start, offset),
                Event::End(_) => {
                    self.end();
                    Ok(())
                }
                Event::Text(text) => match text.unescape() {
                    Ok(text) => self.text(&text),
                    Err(e) => Err(format!("XML parse error: {}", e)),
                },
                Event::CData(data) => {
                    let data = data.into_inner();
                    self.text(&String::from_utf8_lossy(&data))
                }
                Event::Eof => break,
                _ => Ok(()),
            };
            if let Err(message) = outcome {
                self.fatal(offset, message);
                return;
            }
        }

        if let Some(frame) = self.stack.last() {
            let (name, offset) = (frame.name.local_name.clone(), frame.offset);
            self.fatal(offset, format!("unexpected end of document: element '{}' is not closed", name));
        } else if !self.root_seen {
            self.fatal(self.xml.len(), "document has no root element");
        }
    }

    fn text(&mut self, text: &str) -> Result<(), String> {
        match self.stack.last_mut() {
            Some(frame) => {
                if matches!(frame.mode, Mode::Declared(_)) {
                    frame.text.push_str(text);
                }
                Ok(())
            }
            None => {
                if text.trim_matches(|c: char| c.is_whitespace() || c == '\u{feff}').is_empty() {
                    Ok(())
                } else {
                    Err("text is not allowed outside the root element".to_string())
                }
            }
        }
    }

    fn start(
        &mut self,
        reader: &NsReader<&'x [u8]>,
        namespace: Result<Option<String>, String>,
        start: &BytesStart<'_>,
        offset: usize,
    ) -> Result<(), String> {
        if self.stack.is_empty() {
            if self.root_seen {
                return Err("extra content at the end of the document".to_string());
            }
            self.root_seen = true;
        }
        self.schema
            .limits
            .check_document_depth(self.stack.len() + 1)
            .map_err(|e| e.to_string())?;

        let local = String::from_utf8_lossy(start.local_name().into_inner()).into_owned();
        let name = QName::new(namespace?, local);
        let path = format!("{}/{}", self.current_path(), name.local_name);

        let mode = self.child_mode(&name, &path, offset);
        let nil = self.attributes(reader, start, mode, &path, offset)?;

        if nil {
            if let Mode::Declared(decl) = mode {
                if !decl.nillable {
                    self.error(&path, offset, "element is not nillable");
                }
            }
        }

        self.stack.push(Frame {
            name,
            path,
            mode,
            children: Vec::new(),
            text: String::new(),
            nil,
            offset,
        });
        Ok(())
    }

    /// Declaration of a new element, given the element it appears in
    fn child_mode(&mut self, name: &QName, path: &str, offset: usize) -> Mode<'s> {
        let schema = self.schema;
        let parent_mode = match self.stack.last_mut() {
            Some(parent) => {
                parent.children.push(name.clone());
                parent.mode
            }
            None => {
                return match schema.root(name) {
                    Some(decl) => Mode::Declared(decl),
                    None => {
                        self.error(
                            path,
                            offset,
                            format!("no declaration found for root element '{}'", name),
                        );
                        Mode::Skip
                    }
                };
            }
        };

        match parent_mode {
            Mode::Skip => Mode::Skip,
            Mode::Lax => self.lax(name, path, offset),
            Mode::Declared(decl) => match &decl.ty {
                TypeRef::Any => self.lax(name, path, offset),
                TypeRef::Simple(_) => Mode::Skip,
                TypeRef::Complex(id) => match &schema.complex_type(*id).content {
                    Content::Elements(particle) => match particle.attribute(name) {
                        Some(Attribution::Element(id)) => Mode::Declared(schema.element(id)),
                        Some(Attribution::Wildcard(wildcard)) => match wildcard.process {
                            ProcessContents::Skip => Mode::Skip,
                            ProcessContents::Lax => self.lax(name, path, offset),
                            ProcessContents::Strict => match schema.root(name) {
                                Some(decl) => Mode::Declared(decl),
                                None => {
                                    self.error(
                                        path,
                                        offset,
                                        format!("no declaration found for element '{}'", name),
                                    );
                                    Mode::Skip
                                }
                            },
                        },
                        None => Mode::Skip,
                    },
                    _ => Mode::Skip,
                },
            },
        }
    }

    fn lax(&mut self, name: &QName, path: &str, offset: usize) -> Mode<'s> {
        match self.schema.root(name) {
            Some(decl) => Mode::Declared(decl),
            None => {
                self.warning(
                    path,
                    offset,
                    format!("no declaration for element '{}'; content not validated", name),
                );
                Mode::Lax
            }
        }
    }

    /// Check the attributes of a starting element; returns `xsi:nil`
    fn attributes(
        &mut self,
        reader: &NsReader<&'x [u8]>,
        start: &BytesStart<'_>,
        mode: Mode<'s>,
        path: &str,
        offset: usize,
    ) -> Result<bool, String> {
        let mut count = 0;
        let mut nil = false;
        let mut present = Vec::new();

        for attribute in start.attributes() {
            let attribute = attribute.map_err(|e| format!("malformed attribute: {}", e))?;
            if attribute.key.as_namespace_binding().is_some() {
                continue;
            }
            count += 1;

            let (resolved, local) = reader.resolve_attribute(attribute.key);
            let namespace = namespace_of(resolved)?;
            let name = QName::new(namespace, String::from_utf8_lossy(local.into_inner()).into_owned());
            let value = attribute
                .unescape_value()
                .map_err(|e| format!("malformed value of attribute '{}': {}", name.local_name, e))?;

            if name.namespace() == Some(XSI_NAMESPACE) {
                match name.local_name.as_str() {
                    "nil" => nil = matches!(value.trim(), "true" | "1"),
                    "type" => self.warning(path, offset, "xsi:type is not supported and was ignored"),
                    _ => {}
                }
                continue;
            }

            if let Mode::Declared(decl) = mode {
                self.attribute(decl, &name, &value, path, offset);
            }
            present.push(name);
        }

        self.schema
            .limits
            .check_attributes(count)
            .map_err(|e| e.to_string())?;

        if let Mode::Declared(ElementDecl {
            ty: TypeRef::Complex(id),
            ..
        }) = mode
        {
            let ty = self.schema.complex_type(*id);
            for required in ty.attributes.iter().filter(|a| a.required) {
                if !present.contains(&required.name) {
                    self.error(
                        path,
                        offset,
                        format!("attribute '{}' is required but missing", required.name.local_name),
                    );
                }
            }
        }
        Ok(nil)
    }

    fn attribute(&mut self, decl: &'s ElementDecl, name: &QName, value: &str, path: &str, offset: usize) {
        let schema = self.schema;
        let id = match &decl.ty {
            TypeRef::Any => return,
            TypeRef::Simple(_) => {
                self.error(path, offset, format!("attribute '{}' is not allowed", name.local_name));
                return;
            }
            TypeRef::Complex(id) => *id,
        };
        let ty = schema.complex_type(id);

        if let Some(attribute) = ty.attribute(name) {
            self.attribute_value(attribute, value, path, offset);
            return;
        }
        match ty.any_attribute.as_ref().filter(|w| w.matches(name)) {
            Some(wildcard) => match (wildcard.process, schema.attributes.get(name)) {
                (ProcessContents::Skip, _) => {}
                (_, Some(global)) => self.attribute_value(global, value, path, offset),
                (ProcessContents::Lax, None) => {}
                (ProcessContents::Strict, None) => self.error(
                    path,
                    offset,
                    format!("no declaration found for attribute '{}'", name),
                ),
            },
            None => self.error(path, offset, format!("attribute '{}' is not allowed", name.local_name)),
        }
    }

    fn attribute_value(&mut self, attribute: &AttributeUse, value: &str, path: &str, offset: usize) {
        let label = &attribute.name.local_name;
        if let Err(reason) = attribute.ty.validate(value) {
            self.error(path, offset, format!("attribute '{}': {}", label, reason));
            return;
        }
        if let Some(fixed) = &attribute.fixed {
            let ws = attribute.ty.white_space();
            if ws.normalize(value) != ws.normalize(fixed) {
                self.error(
                    path,
                    offset,
                    format!("attribute '{}': value '{}' differs from the fixed value '{}'", label, value, fixed),
                );
                return;
            }
        }
        self.check_id(&attribute.ty, value, path, offset);
    }

    fn check_id(&mut self, ty: &SimpleType, value: &str, path: &str, offset: usize) {
        if ty.primitive() == Some(Builtin::Id) && !self.ids.insert(value.trim().to_string()) {
            self.error(path, offset, format!("duplicate ID value '{}'", value.trim()));
        }
    }

    fn end(&mut self) {
        let Some(frame) = self.stack.pop() else {
            return;
        };
        let Mode::Declared(decl) = frame.mode else {
            return;
        };

        if frame.nil {
            if !frame.children.is_empty() || frame.has_text() {
                self.error(&frame.path, frame.offset, "nilled element must be empty");
            }
            return;
        }

        let schema = self.schema;
        match &decl.ty {
            TypeRef::Any => {}
            TypeRef::Simple(ty) => self.simple_content(&frame, decl, ty),
            TypeRef::Complex(id) => {
                let ty = schema.complex_type(*id);
                match &ty.content {
                    Content::Simple(simple) => self.simple_content(&frame, decl, simple),
                    Content::Empty => {
                        if let Some(child) = frame.children.first() {
                            self.error(
                                &frame.path,
                                frame.offset,
                                format!("element '{}' is not expected: content must be empty", child.local_name),
                            );
                        } else if !ty.mixed && frame.has_text() {
                            self.error(&frame.path, frame.offset, "character content is not allowed");
                        }
                    }
                    Content::Elements(particle) => {
                        if !ty.mixed && frame.has_text() {
                            self.error(&frame.path, frame.offset, "character content is not allowed");
                        }
                        if let Err(mismatch) = match_content(particle, &frame.children) {
                            self.error(&frame.path, frame.offset, mismatch.describe(&frame.children));
                        }
                    }
                }
            }
        }
    }

    fn simple_content(&mut self, frame: &Frame<'s>, decl: &ElementDecl, ty: &SimpleType) {
        if let Some(child) = frame.children.first() {
            self.error(
                &frame.path,
                frame.offset,
                format!("element '{}' is not expected: content must be text only", child.local_name),
            );
            return;
        }

        let value = if frame.text.is_empty() {
            decl.default
                .as_deref()
                .or(decl.fixed.as_deref())
                .unwrap_or_default()
        } else {
            frame.text.as_str()
        };
        if let Err(reason) = ty.validate(value) {
            self.error(&frame.path, frame.offset, reason);
            return;
        }
        if let Some(fixed) = &decl.fixed {
            let ws = ty.white_space();
            if ws.normalize(value) != ws.normalize(fixed) {
                self.error(
                    &frame.path,
                    frame.offset,
                    format!("value '{}' differs from the fixed value '{}'", value, fixed),
                );
                return;
            }
        }
        self.check_id(ty, value, &frame.path, frame.offset);
    }
}
