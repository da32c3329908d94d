//! Schema loading and compilation
//!
//! A schema file and everything it includes or imports from local files is
//! parsed with roxmltree, indexed by global component name and compiled into
//! a [`SchemaSet`]. Components are compiled on first reference and memoized;
//! named complex types and global elements get their arena slot before their
//! body is compiled so recursive references resolve to the slot.

use super::builtins::Builtin;
use super::facets::{Facets, Pattern, WhiteSpace};
use super::model::{
    AttributeUse, ComplexId, ComplexType, Content, ElementDecl, ElementId, NamespaceConstraint,
    Occurs, Particle, ProcessContents, SimpleType, Term, TypeRef, Variety, Wildcard,
};
use crate::error::{Error, Result, SchemaError};
use crate::limits::Limits;
use crate::loaders::Loader;
use crate::locations::Location;
use crate::namespaces::{resolve_qname, QName, XML_NAMESPACE, XSD_NAMESPACE};
use indexmap::IndexMap;
use roxmltree::{Document, Node, NodeId, ParsingOptions};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// Compiled set of schema components, ready to validate documents
///
/// The set owns plain data only and is `Send + Sync`; one compiled set can
/// validate documents from several threads.
#[derive(Debug, Clone)]
pub struct SchemaSet {
    pub(crate) elements: Vec<ElementDecl>,
    pub(crate) complex_types: Vec<ComplexType>,
    pub(crate) roots: IndexMap<QName, ElementId>,
    pub(crate) attributes: HashMap<QName, AttributeUse>,
    warnings: Vec<String>,
    sources: Vec<String>,
    pub(crate) limits: Limits,
}

impl SchemaSet {
    /// Load and compile the schema at `path` with default limits
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_file_with_limits(path, Limits::default())
    }

    /// Load and compile the schema at `path`
    pub fn from_file_with_limits(path: impl AsRef<Path>, limits: Limits) -> Result<Self> {
        let location = Location::from_path(canonical(path.as_ref()));
        let loader = Loader::new().with_limits(limits);
        let text = loader.load_schema(&location)?;
        Self::compile(&loader, location, text)
    }

    /// Compile a schema held in memory; relative `schemaLocation`s resolve
    /// against `base`
    pub fn from_text(text: &str, base: Location, limits: Limits) -> Result<Self> {
        let loader = Loader::new().with_limits(limits);
        loader.limits().check_schema_size(text.len())?;
        Self::compile(&loader, base, text.to_string())
    }

    fn compile(loader: &Loader, location: Location, text: String) -> Result<Self> {
        let mut warnings = Vec::new();
        let mut sources = Vec::new();
        let mut seen = HashSet::new();
        seen.insert((location.clone(), None));
        collect(loader, location, text, None, 0, &mut sources, &mut seen, &mut warnings)?;

        let options = ParsingOptions {
            allow_dtd: true,
            ..ParsingOptions::default()
        };
        let mut parsed = Vec::with_capacity(sources.len());
        for source in &sources {
            let doc = Document::parse_with_options(&source.text, options)
                .map_err(|e| SchemaError::new(e.to_string()).with_location(source.location.to_string()))?;
            let root = doc.root_element();
            parsed.push(Parsed {
                element_form: Form::parse(root.attribute("elementFormDefault")).unwrap_or_default(),
                attribute_form: Form::parse(root.attribute("attributeFormDefault")).unwrap_or_default(),
                doc,
                target_namespace: source.target_namespace.clone(),
                chameleon: source.chameleon,
                location: source.location.to_string(),
            });
        }

        let mut compiler = Compiler::new(&parsed);
        compiler.warnings = warnings;
        compiler.index()?;
        compiler.compile_globals()?;

        log::debug!(
            "compiled {} schema document(s): {} global elements, {} complex types",
            parsed.len(),
            compiler.roots.len(),
            compiler.complex_types.len()
        );

        Ok(SchemaSet {
            elements: compiler.elements,
            complex_types: compiler.complex_types,
            roots: compiler.roots,
            attributes: compiler.global_attributes,
            warnings: compiler.warnings,
            sources: parsed.iter().map(|p| p.location.clone()).collect(),
            limits: loader.limits().clone(),
        })
    }

    /// Warnings raised while compiling (ignored constructs, skipped imports)
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Schema documents the set was compiled from
    pub fn sources(&self) -> &[String] {
        &self.sources
    }

    /// Names of the global elements, in declaration order
    pub fn root_names(&self) -> impl Iterator<Item = &QName> {
        self.roots.keys()
    }

    /// Global element declaration named `name`
    pub fn root(&self, name: &QName) -> Option<&ElementDecl> {
        self.roots.get(name).map(|&id| &self.elements[id])
    }

    /// Element declaration by arena index
    pub fn element(&self, id: ElementId) -> &ElementDecl {
        &self.elements[id]
    }

    /// Complex type by arena index
    pub fn complex_type(&self, id: ComplexId) -> &ComplexType {
        &self.complex_types[id]
    }

    /// Limits applied when validating documents
    pub fn limits(&self) -> &Limits {
        &self.limits
    }
}

fn canonical(path: &Path) -> std::path::PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

/// `elementFormDefault`/`attributeFormDefault` and `form`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Form {
    #[default]
    Unqualified,
    Qualified,
}

impl Form {
    fn parse(value: Option<&str>) -> Option<Form> {
        match value.map(str::trim) {
            Some("qualified") => Some(Form::Qualified),
            Some("unqualified") => Some(Form::Unqualified),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Kind {
    Element,
    Attribute,
    ComplexType,
    SimpleType,
    Group,
    AttributeGroup,
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Kind::Element => "element",
            Kind::Attribute => "attribute",
            Kind::ComplexType => "complex type",
            Kind::SimpleType => "simple type",
            Kind::Group => "group",
            Kind::AttributeGroup => "attribute group",
        };
        f.write_str(name)
    }
}

struct Source {
    location: Location,
    text: String,
    target_namespace: Option<String>,
    chameleon: bool,
}

struct Parsed<'input> {
    doc: Document<'input>,
    target_namespace: Option<String>,
    chameleon: bool,
    element_form: Form,
    attribute_form: Form,
    location: String,
}

/// Gather a schema document and its local includes/imports, depth first
#[allow(clippy::too_many_arguments)]
fn collect(
    loader: &Loader,
    location: Location,
    text: String,
    inherited_namespace: Option<String>,
    depth: usize,
    sources: &mut Vec<Source>,
    seen: &mut HashSet<(Location, Option<String>)>,
    warnings: &mut Vec<String>,
) -> Result<()> {
    loader.limits().check_schema_depth(depth)?;

    let (target_namespace, chameleon, references) = {
        let options = ParsingOptions {
            allow_dtd: true,
            ..ParsingOptions::default()
        };
        let doc = Document::parse_with_options(&text, options)
            .map_err(|e| SchemaError::new(e.to_string()).with_location(location.to_string()))?;
        let root = doc.root_element();
        if !root.has_tag_name((XSD_NAMESPACE, "schema")) {
            return Err(SchemaError::new(format!(
                "root element '{}' is not xs:schema",
                root.tag_name().name()
            ))
            .with_location(location.to_string())
            .into());
        }

        let declared = root
            .attribute("targetNamespace")
            .filter(|ns| !ns.is_empty())
            .map(String::from);
        let (target_namespace, chameleon) = match (declared, &inherited_namespace) {
            (Some(ns), _) => (Some(ns), false),
            (None, Some(ns)) => (Some(ns.clone()), true),
            (None, None) => (None, false),
        };

        let mut references = Vec::new();
        for child in xsd_children(root) {
            match child.tag_name().name() {
                "include" => {
                    let href = child.attribute("schemaLocation").ok_or_else(|| {
                        SchemaError::new("xs:include without schemaLocation")
                            .with_location(location.to_string())
                    })?;
                    references.push((location.resolve(href)?, target_namespace.clone(), true));
                }
                "import" => match child.attribute("schemaLocation") {
                    None => warnings.push(format!(
                        "import of namespace '{}' without schemaLocation ignored",
                        child.attribute("namespace").unwrap_or_default()
                    )),
                    Some(href) => {
                        let target = location.resolve(href)?;
                        if target.is_remote() {
                            warnings.push(format!("remote import '{}' ignored", target));
                        } else {
                            references.push((target, None, false));
                        }
                    }
                },
                "redefine" | "override" => warnings.push(format!(
                    "xs:{} is not supported and was ignored ({})",
                    child.tag_name().name(),
                    location
                )),
                _ => {}
            }
        }
        (target_namespace, chameleon, references)
    };

    log::debug!("collected schema {} (target namespace {:?})", location, target_namespace);
    sources.push(Source {
        location,
        text,
        target_namespace: target_namespace.clone(),
        chameleon,
    });

    for (target, namespace, is_include) in references {
        let target = match target {
            Location::Path(path) => Location::Path(canonical(&path)),
            other => other,
        };
        if !seen.insert((target.clone(), namespace.clone())) {
            continue;
        }
        let text = loader.load_schema(&target)?;
        let inherited = if is_include { namespace } else { None };
        collect(loader, target, text, inherited, depth + 1, sources, seen, warnings)?;
    }
    Ok(())
}

/// Schema children of `node`, annotations left out
fn xsd_children<'a, 'input>(node: Node<'a, 'input>) -> impl Iterator<Item = Node<'a, 'input>> {
    node.children().filter(|c| {
        c.is_element()
            && c.tag_name().namespace() == Some(XSD_NAMESPACE)
            && c.tag_name().name() != "annotation"
    })
}

fn xsd_child<'a, 'input>(node: Node<'a, 'input>, name: &str) -> Option<Node<'a, 'input>> {
    xsd_children(node).find(|c| c.tag_name().name() == name)
}

fn bool_attribute(node: Node<'_, '_>, name: &str) -> bool {
    matches!(node.attribute(name).map(str::trim), Some("true") | Some("1"))
}

struct Compiler<'a, 'input> {
    docs: &'a [Parsed<'input>],
    globals: IndexMap<(Kind, QName), (usize, NodeId)>,
    elements: Vec<ElementDecl>,
    complex_types: Vec<ComplexType>,
    roots: IndexMap<QName, ElementId>,
    named_complex: HashMap<QName, ComplexId>,
    named_simple: HashMap<QName, Arc<SimpleType>>,
    global_attributes: HashMap<QName, AttributeUse>,
    in_progress: HashSet<(Kind, QName)>,
    warnings: Vec<String>,
}

impl<'a, 'input> Compiler<'a, 'input> {
    fn new(docs: &'a [Parsed<'input>]) -> Self {
        Self {
            docs,
            globals: IndexMap::new(),
            elements: Vec::new(),
            complex_types: Vec::new(),
            roots: IndexMap::new(),
            named_complex: HashMap::new(),
            named_simple: HashMap::new(),
            global_attributes: HashMap::new(),
            in_progress: HashSet::new(),
            warnings: Vec::new(),
        }
    }

    fn warn(&mut self, message: String) {
        if !self.warnings.contains(&message) {
            log::warn!("{}", message);
            self.warnings.push(message);
        }
    }

    fn error(&self, doc: usize, node: Node<'_, '_>, message: impl Into<String>) -> Error {
        let parsed = &self.docs[doc];
        let pos = parsed.doc.text_pos_at(node.range().start);
        SchemaError::new(message)
            .with_location(parsed.location.clone())
            .with_position(pos.row, pos.col)
            .into()
    }

    fn target_namespace(&self, doc: usize) -> Option<String> {
        self.docs[doc].target_namespace.clone()
    }

    /// Resolve a QName-valued attribute (`type`, `ref`, `base`...)
    fn reference(&self, doc: usize, node: Node<'_, '_>, value: &str) -> Result<QName> {
        let qname = resolve_qname(node, value).map_err(|e| self.error(doc, node, e.to_string()))?;
        if qname.namespace.is_none() && self.docs[doc].chameleon {
            return Ok(QName::new(self.target_namespace(doc), qname.local_name));
        }
        Ok(qname)
    }

    fn required<'n>(&self, doc: usize, node: Node<'n, '_>, name: &str) -> Result<&'n str> {
        node.attribute(name).ok_or_else(|| {
            self.error(
                doc,
                node,
                format!("xs:{} requires the '{}' attribute", node.tag_name().name(), name),
            )
        })
    }

    fn lookup(&self, kind: Kind, name: &QName) -> Option<(usize, Node<'a, 'input>)> {
        let docs = self.docs;
        let &(doc, id) = self.globals.get(&(kind, name.clone()))?;
        docs[doc].doc.get_node(id).map(|node| (doc, node))
    }

    fn lookup_or_error(
        &self,
        kind: Kind,
        name: &QName,
        doc: usize,
        node: Node<'_, '_>,
    ) -> Result<(usize, Node<'a, 'input>)> {
        self.lookup(kind, name)
            .ok_or_else(|| self.error(doc, node, format!("unknown {} '{}'", kind, name)))
    }

    fn index(&mut self) -> Result<()> {
        let docs = self.docs;
        for (i, parsed) in docs.iter().enumerate() {
            for child in xsd_children(parsed.doc.root_element()) {
                let kind = match child.tag_name().name() {
                    "element" => Kind::Element,
                    "attribute" => Kind::Attribute,
                    "complexType" => Kind::ComplexType,
                    "simpleType" => Kind::SimpleType,
                    "group" => Kind::Group,
                    "attributeGroup" => Kind::AttributeGroup,
                    _ => continue,
                };
                let local = self.required(i, child, "name")?;
                let name = QName::new(parsed.target_namespace.clone(), local);
                if self.globals.contains_key(&(kind, name.clone())) {
                    log::debug!("duplicate global {} '{}' ignored", kind, name);
                    continue;
                }
                self.globals.insert((kind, name), (i, child.id()));
            }
        }
        Ok(())
    }

    fn compile_globals(&mut self) -> Result<()> {
        let keys: Vec<(Kind, QName)> = self.globals.keys().cloned().collect();
        for (kind, name) in keys {
            match kind {
                Kind::Element => {
                    self.global_element(&name)?;
                }
                Kind::ComplexType => {
                    self.global_complex(&name)?;
                }
                Kind::SimpleType => {
                    self.global_simple(&name)?;
                }
                Kind::Attribute => {
                    self.global_attribute(&name)?;
                }
                Kind::Group | Kind::AttributeGroup => {}
            }
        }
        Ok(())
    }

    // Elements

    fn global_element(&mut self, name: &QName) -> Result<ElementId> {
        if let Some(&id) = self.roots.get(name) {
            return Ok(id);
        }
        let (doc, node) = self
            .lookup(Kind::Element, name)
            .ok_or_else(|| Error::Schema(SchemaError::new(format!("unknown element '{}'", name))))?;
        let id = self.reserve_element(name.clone());
        self.roots.insert(name.clone(), id);
        self.elements[id] = self.element_decl(doc, node, name.clone())?;
        Ok(id)
    }

    fn reserve_element(&mut self, name: QName) -> ElementId {
        self.elements.push(ElementDecl {
            name,
            ty: TypeRef::Any,
            nillable: false,
            fixed: None,
            default: None,
        });
        self.elements.len() - 1
    }

    fn element_decl(&mut self, doc: usize, node: Node<'a, 'input>, name: QName) -> Result<ElementDecl> {
        if node.attribute("substitutionGroup").is_some() {
            self.warn(format!(
                "substitution group of element '{}' is not supported",
                name.local_name
            ));
        }
        for child in xsd_children(node) {
            if let kind @ ("key" | "keyref" | "unique") = child.tag_name().name() {
                self.warn(format!(
                    "identity constraint xs:{} on element '{}' ignored",
                    kind, name.local_name
                ));
            }
        }

        let ty = if let Some(type_name) = node.attribute("type") {
            let type_name = self.reference(doc, node, type_name)?;
            self.type_ref(&type_name, doc, node)?
        } else if let Some(complex) = xsd_child(node, "complexType") {
            TypeRef::Complex(self.complex_type(doc, complex, None)?)
        } else if let Some(simple) = xsd_child(node, "simpleType") {
            TypeRef::Simple(self.simple_type(doc, simple, None)?)
        } else {
            TypeRef::Any
        };

        Ok(ElementDecl {
            name,
            ty,
            nillable: bool_attribute(node, "nillable"),
            fixed: node.attribute("fixed").map(String::from),
            default: node.attribute("default").map(String::from),
        })
    }

    fn type_ref(&mut self, name: &QName, doc: usize, node: Node<'_, '_>) -> Result<TypeRef> {
        if name.is_xsd() && name.local_name == "anyType" {
            return Ok(TypeRef::Any);
        }
        if self.globals.contains_key(&(Kind::ComplexType, name.clone())) {
            return self.global_complex(name).map(TypeRef::Complex);
        }
        self.simple_ref(name, doc, node).map(TypeRef::Simple)
    }

    // Simple types

    fn simple_ref(&mut self, name: &QName, doc: usize, node: Node<'_, '_>) -> Result<Arc<SimpleType>> {
        if let Some(ty) = self.named_simple.get(name) {
            return Ok(ty.clone());
        }
        if name.is_xsd() {
            let builtin = Builtin::from_name(&name.local_name)
                .ok_or_else(|| self.error(doc, node, format!("unknown built-in type 'xs:{}'", name.local_name)))?;
            let ty = Arc::new(SimpleType::builtin(builtin));
            self.named_simple.insert(name.clone(), ty.clone());
            return Ok(ty);
        }
        if self.lookup(Kind::SimpleType, name).is_none() {
            return Err(self.error(doc, node, format!("unknown simple type '{}'", name)));
        }
        self.global_simple(name)
    }

    fn global_simple(&mut self, name: &QName) -> Result<Arc<SimpleType>> {
        if let Some(ty) = self.named_simple.get(name) {
            return Ok(ty.clone());
        }
        let (doc, node) = self
            .lookup(Kind::SimpleType, name)
            .ok_or_else(|| Error::Schema(SchemaError::new(format!("unknown simple type '{}'", name))))?;
        let key = (Kind::SimpleType, name.clone());
        if !self.in_progress.insert(key.clone()) {
            return Err(self.error(doc, node, format!("circular definition of simple type '{}'", name)));
        }
        let ty = self.simple_type(doc, node, Some(name.clone()));
        self.in_progress.remove(&key);
        let ty = ty?;
        self.named_simple.insert(name.clone(), ty.clone());
        Ok(ty)
    }

    fn simple_type(
        &mut self,
        doc: usize,
        node: Node<'a, 'input>,
        name: Option<QName>,
    ) -> Result<Arc<SimpleType>> {
        let body = xsd_children(node)
            .next()
            .ok_or_else(|| self.error(doc, node, "empty xs:simpleType"))?;

        let ty = match body.tag_name().name() {
            "restriction" => {
                let base = self.simple_base(doc, body)?;
                let step = self.facets(doc, body, &base)?;
                SimpleType {
                    name,
                    variety: base.variety.clone(),
                    facets: base.facets.restrict(step),
                }
            }
            "list" => {
                let item = match body.attribute("itemType") {
                    Some(item) => {
                        let item = self.reference(doc, body, item)?;
                        self.simple_ref(&item, doc, body)?
                    }
                    None => {
                        let inline = xsd_child(body, "simpleType")
                            .ok_or_else(|| self.error(doc, body, "xs:list without item type"))?;
                        self.simple_type(doc, inline, None)?
                    }
                };
                SimpleType {
                    name,
                    variety: Variety::List(item),
                    facets: Facets::default(),
                }
            }
            "union" => {
                let mut members = Vec::new();
                for member in body.attribute("memberTypes").unwrap_or_default().split_whitespace() {
                    let member = self.reference(doc, body, member)?;
                    members.push(self.simple_ref(&member, doc, body)?);
                }
                for inline in xsd_children(body).filter(|c| c.tag_name().name() == "simpleType") {
                    members.push(self.simple_type(doc, inline, None)?);
                }
                if members.is_empty() {
                    return Err(self.error(doc, body, "xs:union without member types"));
                }
                SimpleType {
                    name,
                    variety: Variety::Union(members),
                    facets: Facets::default(),
                }
            }
            other => {
                return Err(self.error(doc, body, format!("unexpected xs:{} in xs:simpleType", other)))
            }
        };
        Ok(Arc::new(ty))
    }

    /// Base of a simple type restriction: `base` attribute or inline type
    fn simple_base(&mut self, doc: usize, restriction: Node<'a, 'input>) -> Result<Arc<SimpleType>> {
        match restriction.attribute("base") {
            Some(base) => {
                let base = self.reference(doc, restriction, base)?;
                self.simple_ref(&base, doc, restriction)
            }
            None => {
                let inline = xsd_child(restriction, "simpleType")
                    .ok_or_else(|| self.error(doc, restriction, "xs:restriction without base type"))?;
                self.simple_type(doc, inline, None)
            }
        }
    }

    /// Facets declared by one restriction step
    fn facets(&mut self, doc: usize, restriction: Node<'a, 'input>, base: &SimpleType) -> Result<Facets> {
        let mut step = Facets::default();
        let mut patterns = Vec::new();
        let mut enumeration = Vec::new();

        for facet in xsd_children(restriction) {
            let kind = facet.tag_name().name();
            match kind {
                "simpleType" | "attribute" | "attributeGroup" | "anyAttribute" => continue,
                "assertion" | "assert" => {
                    self.warn(format!("xs:{} is not supported and was ignored", kind));
                    continue;
                }
                _ => {}
            }
            let value = self.required(doc, facet, "value")?;
            match kind {
                "length" => step.length = Some(self.number(doc, facet, value)?),
                "minLength" => step.min_length = Some(self.number(doc, facet, value)?),
                "maxLength" => step.max_length = Some(self.number(doc, facet, value)?),
                "totalDigits" => step.total_digits = Some(self.number(doc, facet, value)? as u32),
                "fractionDigits" => step.fraction_digits = Some(self.number(doc, facet, value)? as u32),
                "pattern" => match Pattern::new(value) {
                    Ok(pattern) => patterns.push(pattern),
                    Err(e) => self.warn(format!("pattern '{}' ignored: {}", value, e)),
                },
                "enumeration" => enumeration.push(base.white_space().normalize(value)),
                "whiteSpace" => {
                    step.white_space =
                        Some(WhiteSpace::parse(value).map_err(|e| self.error(doc, facet, e.to_string()))?)
                }
                "minInclusive" => step.min_inclusive = Some(self.bound(doc, facet, base, value)?),
                "maxInclusive" => step.max_inclusive = Some(self.bound(doc, facet, base, value)?),
                "minExclusive" => step.min_exclusive = Some(self.bound(doc, facet, base, value)?),
                "maxExclusive" => step.max_exclusive = Some(self.bound(doc, facet, base, value)?),
                other => self.warn(format!("facet xs:{} is not supported and was ignored", other)),
            }
        }

        if !patterns.is_empty() {
            step.patterns.push(patterns);
        }
        if !enumeration.is_empty() {
            step.enumeration = Some(enumeration);
        }
        Ok(step)
    }

    fn number(&self, doc: usize, node: Node<'_, '_>, value: &str) -> Result<usize> {
        value.trim().parse().map_err(|_| {
            self.error(
                doc,
                node,
                format!("xs:{} value '{}' is not a non-negative integer", node.tag_name().name(), value),
            )
        })
    }

    fn bound(
        &self,
        doc: usize,
        node: Node<'_, '_>,
        base: &SimpleType,
        value: &str,
    ) -> Result<super::builtins::Atomic> {
        base.parse_bound(value)
            .map_err(|message| self.error(doc, node, format!("invalid xs:{}: {}", node.tag_name().name(), message)))
    }

    // Complex types

    fn global_complex(&mut self, name: &QName) -> Result<ComplexId> {
        if let Some(&id) = self.named_complex.get(name) {
            return Ok(id);
        }
        let (doc, node) = self
            .lookup(Kind::ComplexType, name)
            .ok_or_else(|| Error::Schema(SchemaError::new(format!("unknown complex type '{}'", name))))?;
        self.complex_type(doc, node, Some(name.clone()))
    }

    fn complex_type(&mut self, doc: usize, node: Node<'a, 'input>, name: Option<QName>) -> Result<ComplexId> {
        let id = self.complex_types.len();
        self.complex_types.push(ComplexType::placeholder(name.clone()));
        if let Some(name) = &name {
            self.named_complex.insert(name.clone(), id);
        }

        let mut ty = ComplexType::placeholder(name);
        ty.mixed = bool_attribute(node, "mixed");
        for child in xsd_children(node) {
            match child.tag_name().name() {
                "sequence" | "choice" | "all" | "group" => {
                    ty.content = Content::Elements(self.particle(doc, child)?)
                }
                "simpleContent" => self.simple_content(doc, child, &mut ty)?,
                "complexContent" => self.complex_content(doc, child, &mut ty)?,
                "attribute" | "attributeGroup" | "anyAttribute" => self.attribute_decl(doc, child, &mut ty)?,
                "assert" | "openContent" => self.warn(format!(
                    "xs:{} is not supported and was ignored",
                    child.tag_name().name()
                )),
                other => {
                    return Err(self.error(doc, child, format!("unexpected xs:{} in xs:complexType", other)))
                }
            }
        }

        self.complex_types[id] = ty;
        Ok(id)
    }

    fn derivation(&self, doc: usize, node: Node<'a, 'input>) -> Result<(Node<'a, 'input>, QName)> {
        let body = xsd_children(node)
            .find(|c| matches!(c.tag_name().name(), "extension" | "restriction"))
            .ok_or_else(|| self.error(doc, node, "expected xs:extension or xs:restriction"))?;
        let base = self.required(doc, body, "base")?;
        let base = self.reference(doc, body, base)?;
        Ok((body, base))
    }

    fn simple_content(&mut self, doc: usize, node: Node<'a, 'input>, ty: &mut ComplexType) -> Result<()> {
        let (body, base_name) = self.derivation(doc, node)?;

        let base_simple = match self.type_ref(&base_name, doc, body)? {
            TypeRef::Simple(simple) => simple,
            TypeRef::Complex(id) => {
                let base = self.complex_types[id].clone();
                ty.attributes = base.attributes;
                ty.any_attribute = base.any_attribute;
                match base.content {
                    Content::Simple(simple) => simple,
                    _ => Arc::new(SimpleType::builtin(Builtin::AnySimpleType)),
                }
            }
            TypeRef::Any => Arc::new(SimpleType::builtin(Builtin::AnySimpleType)),
        };

        let content = if body.tag_name().name() == "restriction" {
            let restricted = match xsd_child(body, "simpleType") {
                Some(inline) => self.simple_type(doc, inline, None)?,
                None => base_simple,
            };
            let step = self.facets(doc, body, &restricted)?;
            Arc::new(SimpleType {
                name: None,
                variety: restricted.variety.clone(),
                facets: restricted.facets.restrict(step),
            })
        } else {
            base_simple
        };
        ty.content = Content::Simple(content);

        for child in xsd_children(body) {
            if matches!(child.tag_name().name(), "attribute" | "attributeGroup" | "anyAttribute") {
                self.attribute_decl(doc, child, ty)?;
            }
        }
        Ok(())
    }

    fn complex_content(&mut self, doc: usize, node: Node<'a, 'input>, ty: &mut ComplexType) -> Result<()> {
        if bool_attribute(node, "mixed") {
            ty.mixed = true;
        }
        let (body, base_name) = self.derivation(doc, node)?;
        let base = if base_name.is_xsd() && base_name.local_name == "anyType" {
            None
        } else {
            self.lookup_or_error(Kind::ComplexType, &base_name, doc, body)?;
            let id = self.global_complex(&base_name)?;
            Some(self.complex_types[id].clone())
        };

        let own = match xsd_children(body)
            .find(|c| matches!(c.tag_name().name(), "sequence" | "choice" | "all" | "group"))
        {
            Some(group) => Some(self.particle(doc, group)?),
            None => None,
        };

        if let Some(base) = &base {
            ty.attributes = base.attributes.clone();
            ty.any_attribute = base.any_attribute.clone();
        }

        ty.content = if body.tag_name().name() == "extension" {
            let base_content = base.map(|b| {
                ty.mixed |= b.mixed;
                b.content
            });
            match (base_content, own) {
                (Some(Content::Elements(inherited)), Some(own)) => Content::Elements(Particle::new(
                    Occurs::once(),
                    Term::Sequence(vec![inherited, own]),
                )),
                (Some(Content::Elements(inherited)), None) => Content::Elements(inherited),
                (_, Some(own)) => Content::Elements(own),
                (Some(content), None) => content,
                (None, None) => Content::Empty,
            }
        } else {
            own.map(Content::Elements).unwrap_or(Content::Empty)
        };

        for child in xsd_children(body) {
            if matches!(child.tag_name().name(), "attribute" | "attributeGroup" | "anyAttribute") {
                self.attribute_decl(doc, child, ty)?;
            }
        }
        Ok(())
    }

    // Attributes

    fn attribute_decl(&mut self, doc: usize, node: Node<'a, 'input>, ty: &mut ComplexType) -> Result<()> {
        match node.tag_name().name() {
            "attribute" => {
                let (name, attribute) = self.attribute_use(doc, node)?;
                ty.attributes.retain(|a| a.name != name);
                if let Some(attribute) = attribute {
                    ty.attributes.push(attribute);
                }
            }
            "attributeGroup" => {
                let name = self.required(doc, node, "ref")?;
                let name = self.reference(doc, node, name)?;
                let (group_doc, group) = self.lookup_or_error(Kind::AttributeGroup, &name, doc, node)?;
                let key = (Kind::AttributeGroup, name.clone());
                if !self.in_progress.insert(key.clone()) {
                    return Err(self.error(doc, node, format!("circular attribute group '{}'", name)));
                }
                let mut result = Ok(());
                for child in xsd_children(group) {
                    result = self.attribute_decl(group_doc, child, ty);
                    if result.is_err() {
                        break;
                    }
                }
                self.in_progress.remove(&key);
                result?;
            }
            "anyAttribute" => ty.any_attribute = Some(self.wildcard(doc, node)?),
            _ => {}
        }
        Ok(())
    }

    /// Attribute use; `None` when prohibited
    fn attribute_use(&mut self, doc: usize, node: Node<'a, 'input>) -> Result<(QName, Option<AttributeUse>)> {
        let usage = node.attribute("use").map(str::trim).unwrap_or("optional");

        let mut attribute = if let Some(reference) = node.attribute("ref") {
            let name = self.reference(doc, node, reference)?;
            if name.namespace() == Some(XML_NAMESPACE) && self.lookup(Kind::Attribute, &name).is_none() {
                AttributeUse {
                    name,
                    ty: Arc::new(SimpleType::builtin(Builtin::AnySimpleType)),
                    required: false,
                    fixed: None,
                    default: None,
                }
            } else {
                self.lookup_or_error(Kind::Attribute, &name, doc, node)?;
                self.global_attribute(&name)?
            }
        } else {
            let local = self.required(doc, node, "name")?;
            let form = Form::parse(node.attribute("form")).unwrap_or(self.docs[doc].attribute_form);
            let name = match form {
                Form::Qualified => QName::new(self.target_namespace(doc), local),
                Form::Unqualified => QName::local(local),
            };
            let ty = self.attribute_type(doc, node)?;
            AttributeUse {
                name,
                ty,
                required: false,
                fixed: None,
                default: None,
            }
        };

        attribute.required = usage == "required";
        if let Some(fixed) = node.attribute("fixed") {
            attribute.fixed = Some(fixed.to_string());
        }
        if let Some(default) = node.attribute("default") {
            attribute.default = Some(default.to_string());
        }
        if usage == "prohibited" {
            return Ok((attribute.name, None));
        }
        Ok((attribute.name.clone(), Some(attribute)))
    }

    fn attribute_type(&mut self, doc: usize, node: Node<'a, 'input>) -> Result<Arc<SimpleType>> {
        if let Some(type_name) = node.attribute("type") {
            let type_name = self.reference(doc, node, type_name)?;
            return self.simple_ref(&type_name, doc, node);
        }
        match xsd_child(node, "simpleType") {
            Some(inline) => self.simple_type(doc, inline, None),
            None => Ok(Arc::new(SimpleType::builtin(Builtin::AnySimpleType))),
        }
    }

    fn global_attribute(&mut self, name: &QName) -> Result<AttributeUse> {
        if let Some(attribute) = self.global_attributes.get(name) {
            return Ok(attribute.clone());
        }
        let (doc, node) = self
            .lookup(Kind::Attribute, name)
            .ok_or_else(|| Error::Schema(SchemaError::new(format!("unknown attribute '{}'", name))))?;
        let attribute = AttributeUse {
            name: name.clone(),
            ty: self.attribute_type(doc, node)?,
            required: false,
            fixed: node.attribute("fixed").map(String::from),
            default: node.attribute("default").map(String::from),
        };
        self.global_attributes.insert(name.clone(), attribute.clone());
        Ok(attribute)
    }

    fn wildcard(&self, doc: usize, node: Node<'_, '_>) -> Result<Wildcard> {
        let target = self.target_namespace(doc);
        let namespaces = NamespaceConstraint::from_attribute(
            node.attribute("namespace").unwrap_or("##any"),
            target.as_deref(),
        )
        .map_err(|message| self.error(doc, node, message))?;
        let process = match node.attribute("processContents") {
            None => ProcessContents::Strict,
            Some(value) => ProcessContents::from_attribute(value)
                .ok_or_else(|| self.error(doc, node, format!("invalid processContents '{}'", value)))?,
        };
        Ok(Wildcard { namespaces, process })
    }

    // Particles

    fn particle(&mut self, doc: usize, node: Node<'a, 'input>) -> Result<Particle> {
        let occurs = Occurs::parse(node.attribute("minOccurs"), node.attribute("maxOccurs"))
            .map_err(|message| self.error(doc, node, message))?;

        match node.tag_name().name() {
            "element" => self.element_particle(doc, node, occurs),
            "any" => Ok(Particle::new(occurs, Term::Any(self.wildcard(doc, node)?))),
            kind @ ("sequence" | "choice" | "all") => {
                let mut items = Vec::new();
                for child in xsd_children(node) {
                    items.push(self.particle(doc, child)?);
                }
                let term = match kind {
                    "sequence" => Term::Sequence(items),
                    "choice" => Term::Choice(items),
                    _ => Term::All(items),
                };
                Ok(Particle::new(occurs, term))
            }
            "group" => {
                let name = self.required(doc, node, "ref")?;
                let name = self.reference(doc, node, name)?;
                let (group_doc, group) = self.lookup_or_error(Kind::Group, &name, doc, node)?;
                let model = xsd_children(group)
                    .next()
                    .ok_or_else(|| self.error(group_doc, group, format!("empty group '{}'", name)))?;

                let key = (Kind::Group, name.clone());
                if !self.in_progress.insert(key.clone()) {
                    return Err(self.error(doc, node, format!("circular group '{}'", name)));
                }
                let inner = self.particle(group_doc, model);
                self.in_progress.remove(&key);
                let inner = inner?;

                if inner.occurs == Occurs::once() {
                    Ok(Particle::new(occurs, inner.term))
                } else {
                    Ok(Particle::new(occurs, Term::Sequence(vec![inner])))
                }
            }
            other => Err(self.error(doc, node, format!("unexpected xs:{} in content model", other))),
        }
    }

    fn element_particle(&mut self, doc: usize, node: Node<'a, 'input>, occurs: Occurs) -> Result<Particle> {
        if let Some(reference) = node.attribute("ref") {
            let name = self.reference(doc, node, reference)?;
            self.lookup_or_error(Kind::Element, &name, doc, node)?;
            let id = self.global_element(&name)?;
            return Ok(Particle::new(occurs, Term::Element(name, id)));
        }

        let local = self.required(doc, node, "name")?;
        let form = Form::parse(node.attribute("form")).unwrap_or(self.docs[doc].element_form);
        let name = match form {
            Form::Qualified => QName::new(self.target_namespace(doc), local),
            Form::Unqualified => QName::local(local),
        };
        let id = self.reserve_element(name.clone());
        self.elements[id] = self.element_decl(doc, node, name.clone())?;
        Ok(Particle::new(occurs, Term::Element(name, id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::namespaces::NFE_NAMESPACE;
    use std::fs;
    use tempfile::TempDir;

    const SCHEMA: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema"
           xmlns="http://www.portalfiscal.inf.br/nfe"
           targetNamespace="http://www.portalfiscal.inf.br/nfe"
           elementFormDefault="qualified">
  <xs:simpleType name="TString">
    <xs:restriction base="xs:string">
      <xs:whiteSpace value="preserve"/>
      <xs:pattern value="[!-ÿ]{1}[ -ÿ]{0,}[!-ÿ]{1}|[!-ÿ]{1}"/>
    </xs:restriction>
  </xs:simpleType>
  <xs:simpleType name="TCodUf">
    <xs:restriction base="xs:string">
      <xs:enumeration value="35"/>
      <xs:enumeration value="41"/>
    </xs:restriction>
  </xs:simpleType>
  <xs:complexType name="TNode">
    <xs:sequence>
      <xs:element name="cUF" type="TCodUf"/>
      <xs:element name="child" type="TNode" minOccurs="0"/>
    </xs:sequence>
    <xs:attribute name="versao" type="xs:string" use="required"/>
  </xs:complexType>
  <xs:element name="node" type="TNode">
    <xs:unique name="u"><xs:selector xpath="."/><xs:field xpath="@versao"/></xs:unique>
  </xs:element>
</xs:schema>"#;

    fn schema(text: &str) -> Result<SchemaSet> {
        SchemaSet::from_text(text, Location::from_path("inline.xsd"), Limits::default())
    }

    #[test]
    fn test_compile_recursive_type() {
        let set = schema(SCHEMA).unwrap();
        let root = set.root(&QName::namespaced(NFE_NAMESPACE, "node")).unwrap();
        let TypeRef::Complex(id) = root.ty else {
            panic!("expected a complex type");
        };
        let ty = set.complex_type(id);
        assert_eq!(ty.attributes.len(), 1);
        assert!(ty.attributes[0].required);

        let Content::Elements(particle) = &ty.content else {
            panic!("expected element content");
        };
        let Term::Sequence(items) = &particle.term else {
            panic!("expected a sequence");
        };
        let Term::Element(name, child_id) = &items[1].term else {
            panic!("expected an element");
        };
        assert_eq!(name, &QName::namespaced(NFE_NAMESPACE, "child"));
        assert!(matches!(set.element(*child_id).ty, TypeRef::Complex(c) if c == id));
    }

    #[test]
    fn test_identity_constraint_warning() {
        let set = schema(SCHEMA).unwrap();
        assert_eq!(
            set.warnings(),
            &["identity constraint xs:unique on element 'node' ignored".to_string()]
        );
    }

    #[test]
    fn test_unknown_type_is_an_error() {
        let text = r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
  <xs:element name="a" type="Missing"/>
</xs:schema>"#;
        let err = schema(text).unwrap_err();
        assert!(err.to_string().contains("unknown simple type 'Missing'"), "{}", err);
    }

    #[test]
    fn test_not_a_schema() {
        assert!(matches!(schema("<root/>"), Err(Error::Schema(_))));
    }

    #[test]
    fn test_extension_appends_content() {
        let text = r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
  <xs:complexType name="Base">
    <xs:sequence><xs:element name="a" type="xs:string"/></xs:sequence>
    <xs:attribute name="id" type="xs:ID"/>
  </xs:complexType>
  <xs:complexType name="Derived">
    <xs:complexContent>
      <xs:extension base="Base">
        <xs:sequence><xs:element name="b" type="xs:int"/></xs:sequence>
        <xs:attribute name="extra" type="xs:string"/>
      </xs:extension>
    </xs:complexContent>
  </xs:complexType>
  <xs:element name="d" type="Derived"/>
</xs:schema>"#;
        let set = schema(text).unwrap();
        let TypeRef::Complex(id) = set.root(&QName::local("d")).unwrap().ty else {
            panic!("expected a complex type");
        };
        let ty = set.complex_type(id);
        let names: Vec<&str> = ty.attributes.iter().map(|a| a.name.local_name.as_str()).collect();
        assert_eq!(names, vec!["id", "extra"]);
        let Content::Elements(particle) = &ty.content else {
            panic!("expected element content");
        };
        assert!(matches!(&particle.term, Term::Sequence(parts) if parts.len() == 2));
    }

    #[test]
    fn test_chameleon_include_and_local_import() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("types.xsd"),
            r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
  <xs:simpleType name="TCode"><xs:restriction base="xs:string"><xs:length value="2"/></xs:restriction></xs:simpleType>
</xs:schema>"#,
        )
        .unwrap();
        fs::write(
            dir.path().join("ext.xsd"),
            r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema" targetNamespace="urn:ext">
  <xs:element name="extra" type="xs:string"/>
</xs:schema>"#,
        )
        .unwrap();
        fs::write(
            dir.path().join("main.xsd"),
            r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema" xmlns:t="urn:main" xmlns:e="urn:ext"
           targetNamespace="urn:main" elementFormDefault="qualified">
  <xs:include schemaLocation="types.xsd"/>
  <xs:import namespace="urn:ext" schemaLocation="ext.xsd"/>
  <xs:import namespace="http://www.w3.org/2000/09/xmldsig#"/>
  <xs:element name="code" type="t:TCode"/>
</xs:schema>"#,
        )
        .unwrap();

        let set = SchemaSet::from_file(dir.path().join("main.xsd")).unwrap();
        assert_eq!(set.sources().len(), 3);
        assert!(set.root(&QName::namespaced("urn:main", "code")).is_some());
        assert!(set.root(&QName::namespaced("urn:ext", "extra")).is_some());
        assert_eq!(set.warnings().len(), 1);
        assert!(set.warnings()[0].contains("without schemaLocation"));
    }

    #[test]
    fn test_include_cycle_terminates() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("a.xsd"),
            r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema"><xs:include schemaLocation="b.xsd"/><xs:element name="a"/></xs:schema>"#,
        )
        .unwrap();
        fs::write(
            dir.path().join("b.xsd"),
            r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema"><xs:include schemaLocation="a.xsd"/><xs:element name="b"/></xs:schema>"#,
        )
        .unwrap();
        let set = SchemaSet::from_file(dir.path().join("a.xsd")).unwrap();
        assert_eq!(set.sources().len(), 2);
        assert_eq!(set.root_names().count(), 2);
    }

    #[test]
    fn test_missing_include_fails() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("a.xsd"),
            r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema"><xs:include schemaLocation="gone.xsd"/></xs:schema>"#,
        )
        .unwrap();
        let err = SchemaSet::from_file(dir.path().join("a.xsd")).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_schema_set_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<SchemaSet>();
    }
}
