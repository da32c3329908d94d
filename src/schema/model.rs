//! Compiled schema components
//!
//! Element declarations and complex types live in arenas owned by the
//! [`SchemaSet`](super::SchemaSet) and refer to each other by index, which
//! keeps recursive content models representable without reference cycles.

use super::builtins::{Atomic, Builtin};
use super::facets::{Facets, WhiteSpace};
use crate::namespaces::QName;
use std::collections::HashSet;
use std::sync::Arc;

/// Index of an element declaration
pub type ElementId = usize;
/// Index of a complex type
pub type ComplexId = usize;

/// Occurrence bounds of a particle (minOccurs, maxOccurs)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Occurs {
    /// Minimum number of occurrences
    pub min: u32,
    /// Maximum number of occurrences; `None` is unbounded
    pub max: Option<u32>,
}

impl Occurs {
    /// Default occurrence (1, 1)
    pub fn once() -> Self {
        Self { min: 1, max: Some(1) }
    }

    /// Parse the `minOccurs`/`maxOccurs` attributes
    pub fn parse(min_occurs: Option<&str>, max_occurs: Option<&str>) -> Result<Self, String> {
        let mut occurs = Occurs::once();
        if let Some(min) = min_occurs {
            occurs.min = min
                .trim()
                .parse()
                .map_err(|_| format!("minOccurs '{}' is not a non-negative integer", min))?;
        }
        match max_occurs.map(str::trim) {
            Some("unbounded") => occurs.max = None,
            Some(max) => {
                let max: u32 = max
                    .parse()
                    .map_err(|_| format!("maxOccurs '{}' must be an integer or 'unbounded'", max))?;
                occurs.max = Some(max);
            }
            None => {}
        }
        if let Some(max) = occurs.max {
            if occurs.min > max {
                return Err(format!(
                    "minOccurs {} is greater than maxOccurs {}",
                    occurs.min, max
                ));
            }
        }
        Ok(occurs)
    }

    /// `true` when `count` occurrences stay within maxOccurs
    pub fn allows(&self, count: u32) -> bool {
        self.max.map_or(true, |max| count <= max)
    }
}

/// `processContents` of a wildcard
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProcessContents {
    /// Content must be declared and valid
    #[default]
    Strict,
    /// Validate when a declaration is found
    Lax,
    /// Accept anything
    Skip,
}

impl ProcessContents {
    /// Parse the attribute value
    pub fn from_attribute(s: &str) -> Option<Self> {
        match s.trim() {
            "strict" => Some(Self::Strict),
            "lax" => Some(Self::Lax),
            "skip" => Some(Self::Skip),
            _ => None,
        }
    }
}

/// Namespace constraint of a wildcard
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum NamespaceConstraint {
    /// `##any`
    #[default]
    Any,
    /// `##other`: any namespace except the target namespace and no namespace
    Other(Option<String>),
    /// Explicit list; the empty string stands for no namespace (`##local`)
    Enumeration(HashSet<String>),
}

impl NamespaceConstraint {
    /// Parse a `namespace` attribute value
    pub fn from_attribute(value: &str, target_namespace: Option<&str>) -> Result<Self, String> {
        match value.trim() {
            "##any" => Ok(Self::Any),
            "##other" => Ok(Self::Other(target_namespace.map(String::from))),
            list => {
                let mut namespaces = HashSet::new();
                for ns in list.split_whitespace() {
                    match ns {
                        "##local" => namespaces.insert(String::new()),
                        "##targetNamespace" => {
                            namespaces.insert(target_namespace.unwrap_or_default().to_string())
                        }
                        other if other.starts_with("##") => {
                            return Err(format!("wrong value '{}' in 'namespace' attribute", other))
                        }
                        uri => namespaces.insert(uri.to_string()),
                    };
                }
                Ok(Self::Enumeration(namespaces))
            }
        }
    }

    /// Whether a name in `namespace` is allowed
    pub fn is_allowed(&self, namespace: Option<&str>) -> bool {
        match self {
            Self::Any => true,
            Self::Other(target) => match namespace {
                None => false,
                Some(ns) => target.as_deref() != Some(ns),
            },
            Self::Enumeration(set) => set.contains(namespace.unwrap_or_default()),
        }
    }
}

/// `xs:any` or `xs:anyAttribute`
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Wildcard {
    /// Allowed namespaces
    pub namespaces: NamespaceConstraint,
    /// How matched content is validated
    pub process: ProcessContents,
}

impl Wildcard {
    /// Whether the wildcard matches `name`
    pub fn matches(&self, name: &QName) -> bool {
        self.namespaces.is_allowed(name.namespace())
    }
}

/// Variety of a simple type
#[derive(Debug, Clone)]
pub enum Variety {
    /// Derived from a built-in primitive
    Atomic(Builtin),
    /// Whitespace separated items of the item type
    List(Arc<SimpleType>),
    /// Any of the member types
    Union(Vec<Arc<SimpleType>>),
}

/// Simple type with its accumulated facets
#[derive(Debug, Clone)]
pub struct SimpleType {
    /// Name of a global type, `None` for anonymous ones
    pub name: Option<QName>,
    /// Variety and base built-in
    pub variety: Variety,
    /// Facets of the whole derivation chain
    pub facets: Facets,
}

impl SimpleType {
    /// The built-in type itself
    pub fn builtin(builtin: Builtin) -> Self {
        Self {
            name: Some(QName::xsd(builtin.name())),
            variety: Variety::Atomic(builtin),
            facets: Facets::default(),
        }
    }

    /// Built-in behind an atomic type
    pub fn primitive(&self) -> Option<Builtin> {
        match self.variety {
            Variety::Atomic(builtin) => Some(builtin),
            _ => None,
        }
    }

    /// Effective white space rule
    pub fn white_space(&self) -> WhiteSpace {
        self.facets.white_space.unwrap_or(match &self.variety {
            Variety::Atomic(builtin) => builtin.white_space(),
            _ => WhiteSpace::Collapse,
        })
    }

    /// Display name used in diagnostics
    pub fn display_name(&self) -> String {
        match &self.name {
            Some(name) if name.is_xsd() => format!("xs:{}", name.local_name),
            Some(name) => name.local_name.clone(),
            None => "anonymous type".to_string(),
        }
    }

    /// Check a value, returning the reason it is invalid
    pub fn validate(&self, value: &str) -> Result<(), String> {
        let normalized = self.white_space().normalize(value);
        match &self.variety {
            Variety::Atomic(builtin) => {
                let atomic = builtin.parse(&normalized)?;
                if let Some(len) = atomic.length() {
                    if !matches!(builtin, Builtin::QName | Builtin::Notation) {
                        self.facets.check_length(&normalized, len)?;
                    }
                }
                self.facets.check_lexical(&normalized)?;
                self.facets.check_value(&normalized, &atomic)
            }
            Variety::List(item) => {
                let items: Vec<&str> = normalized.split(' ').filter(|s| !s.is_empty()).collect();
                for it in &items {
                    item.validate(it)?;
                }
                self.facets.check_length(&normalized, items.len())?;
                self.facets.check_lexical(&normalized)
            }
            Variety::Union(members) => {
                if !members.iter().any(|m| m.validate(&normalized).is_ok()) {
                    return Err(format!(
                        "value '{}' is not valid for any member of {}",
                        normalized,
                        self.display_name()
                    ));
                }
                self.facets.check_lexical(&normalized)
            }
        }
    }

    /// Parse a facet bound against this type
    pub(crate) fn parse_bound(&self, value: &str) -> Result<Atomic, String> {
        match &self.variety {
            Variety::Atomic(builtin) => builtin.parse(&builtin.white_space().normalize(value)),
            _ => Err(format!("bound '{}' on a non-atomic type", value)),
        }
    }
}

/// Attribute allowed on a complex type
#[derive(Debug, Clone)]
pub struct AttributeUse {
    /// Attribute name
    pub name: QName,
    /// Value type
    pub ty: Arc<SimpleType>,
    /// `use="required"`
    pub required: bool,
    /// Fixed value
    pub fixed: Option<String>,
    /// Default value
    pub default: Option<String>,
}

/// Term of a particle
#[derive(Debug, Clone)]
pub enum Term {
    /// Element declaration, with its name copied for matching
    Element(QName, ElementId),
    /// `xs:sequence`
    Sequence(Vec<Particle>),
    /// `xs:choice`
    Choice(Vec<Particle>),
    /// `xs:all`
    All(Vec<Particle>),
    /// `xs:any`
    Any(Wildcard),
}

/// Term with its occurrence bounds
#[derive(Debug, Clone)]
pub struct Particle {
    /// minOccurs/maxOccurs
    pub occurs: Occurs,
    /// What occurs
    pub term: Term,
}

impl Particle {
    /// Particle with the given bounds
    pub fn new(occurs: Occurs, term: Term) -> Self {
        Self { occurs, term }
    }

    /// How a child named `name` is attributed to this content model
    pub fn attribute(&self, name: &QName) -> Option<Attribution<'_>> {
        self.find_element(name)
            .map(Attribution::Element)
            .or_else(|| self.find_wildcard(name).map(Attribution::Wildcard))
    }

    fn find_element(&self, name: &QName) -> Option<ElementId> {
        match &self.term {
            Term::Element(n, id) if n == name => Some(*id),
            Term::Sequence(items) | Term::Choice(items) | Term::All(items) => {
                items.iter().find_map(|p| p.find_element(name))
            }
            _ => None,
        }
    }

    fn find_wildcard(&self, name: &QName) -> Option<&Wildcard> {
        match &self.term {
            Term::Any(wildcard) if wildcard.matches(name) => Some(wildcard),
            Term::Sequence(items) | Term::Choice(items) | Term::All(items) => {
                items.iter().find_map(|p| p.find_wildcard(name))
            }
            _ => None,
        }
    }
}

/// Declaration or wildcard a child element is attributed to
#[derive(Debug, Clone, Copy)]
pub enum Attribution<'a> {
    /// Declared element
    Element(ElementId),
    /// Matched by `xs:any`
    Wildcard(&'a Wildcard),
}

/// Content type of a complex type
#[derive(Debug, Clone)]
pub enum Content {
    /// No children and no text (unless mixed)
    Empty,
    /// Text only, of the given type
    Simple(Arc<SimpleType>),
    /// Element content
    Elements(Particle),
}

/// Compiled complex type
#[derive(Debug, Clone)]
pub struct ComplexType {
    /// Name of a global type
    pub name: Option<QName>,
    /// Declared attributes, base type's first
    pub attributes: Vec<AttributeUse>,
    /// `xs:anyAttribute`
    pub any_attribute: Option<Wildcard>,
    /// Content
    pub content: Content,
    /// Text allowed between children
    pub mixed: bool,
}

impl ComplexType {
    pub(crate) fn placeholder(name: Option<QName>) -> Self {
        Self {
            name,
            attributes: Vec::new(),
            any_attribute: None,
            content: Content::Empty,
            mixed: false,
        }
    }

    /// Declared attribute named `name`
    pub fn attribute(&self, name: &QName) -> Option<&AttributeUse> {
        self.attributes.iter().find(|a| &a.name == name)
    }
}

/// Type of an element declaration
#[derive(Debug, Clone)]
pub enum TypeRef {
    /// `xs:anyType`: any attributes and content
    Any,
    /// Simple type
    Simple(Arc<SimpleType>),
    /// Complex type in the arena
    Complex(ComplexId),
}

/// Compiled element declaration
#[derive(Debug, Clone)]
pub struct ElementDecl {
    /// Qualified element name
    pub name: QName,
    /// Type
    pub ty: TypeRef,
    /// `nillable="true"`
    pub nillable: bool,
    /// Fixed value
    pub fixed: Option<String>,
    /// Default value
    pub default: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::facets::Pattern;

    #[test]
    fn test_occurs_parse() {
        assert_eq!(Occurs::parse(None, None).unwrap(), Occurs::once());
        let unbounded = Occurs::parse(Some("0"), Some("unbounded")).unwrap();
        assert_eq!(unbounded.max, None);
        assert!(unbounded.allows(1000));
        assert!(Occurs::parse(Some("2"), Some("1")).is_err());
        assert!(Occurs::parse(Some("-1"), None).is_err());
    }

    #[test]
    fn test_namespace_constraint() {
        let other = NamespaceConstraint::from_attribute("##other", Some("urn:a")).unwrap();
        assert!(other.is_allowed(Some("urn:b")));
        assert!(!other.is_allowed(Some("urn:a")));
        assert!(!other.is_allowed(None));

        let list = NamespaceConstraint::from_attribute("##local urn:x", Some("urn:a")).unwrap();
        assert!(list.is_allowed(None));
        assert!(list.is_allowed(Some("urn:x")));
        assert!(!list.is_allowed(Some("urn:a")));
        assert!(NamespaceConstraint::from_attribute("##bogus", None).is_err());
    }

    #[test]
    fn test_simple_type_validate() {
        let mut cnpj = SimpleType::builtin(Builtin::String);
        cnpj.name = Some(QName::local("TCnpj"));
        cnpj.facets.patterns.push(vec![Pattern::new("[0-9]{14}").unwrap()]);
        assert!(cnpj.validate("12345678000195").is_ok());
        assert!(cnpj.validate("1234").is_err());

        let list = SimpleType {
            name: None,
            variety: Variety::List(Arc::new(SimpleType::builtin(Builtin::Int))),
            facets: Facets {
                max_length: Some(2),
                ..Default::default()
            },
        };
        assert!(list.validate(" 1  2 ").is_ok());
        assert!(list.validate("1 2 3").is_err());
        assert!(list.validate("1 x").is_err());

        let union = SimpleType {
            name: None,
            variety: Variety::Union(vec![
                Arc::new(SimpleType::builtin(Builtin::Date)),
                Arc::new(SimpleType::builtin(Builtin::Int)),
            ]),
            facets: Facets::default(),
        };
        assert!(union.validate("2024-01-01").is_ok());
        assert!(union.validate("12").is_ok());
        assert!(union.validate("x").is_err());
    }

    #[test]
    fn test_attribution() {
        let a = QName::local("a");
        let particle = Particle::new(
            Occurs::once(),
            Term::Sequence(vec![
                Particle::new(Occurs::once(), Term::Element(a.clone(), 3)),
                Particle::new(
                    Occurs::once(),
                    Term::Any(Wildcard {
                        namespaces: NamespaceConstraint::from_attribute("##other", None).unwrap(),
                        process: ProcessContents::Lax,
                    }),
                ),
            ]),
        );
        assert!(matches!(particle.attribute(&a), Some(Attribution::Element(3))));
        assert!(matches!(
            particle.attribute(&QName::namespaced("urn:x", "b")),
            Some(Attribution::Wildcard(_))
        ));
        assert!(particle.attribute(&QName::local("b")).is_none());
    }
}
