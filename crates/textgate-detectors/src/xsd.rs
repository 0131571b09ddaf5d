//! Minimal XML Schema (XSD) subset validation
//!
//! Supports the structural core needed to validate detector content:
//! top-level `xs:element` declarations, inline `xs:complexType` with
//! `xs:sequence` children (honoring `minOccurs`/`maxOccurs`), and the
//! common built-in simple types. Unsupported constructs degrade to
//! permissive validation rather than failing the schema.

use std::collections::HashMap;

pub const XSD_NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema";

/// XSD processing errors
#[derive(Debug, thiserror::Error)]
pub enum XsdError {
    /// The schema text is not well-formed XML
    #[error("schema is not well-formed XML: {0}")]
    Parse(String),

    /// The schema document's root is not `xs:schema`
    #[error("document root is not an XML Schema")]
    NotASchema,

    /// The instance document failed validation
    #[error("validation failed: {0}")]
    Mismatch(String),
}

#[derive(Debug, Clone)]
enum ElementKind {
    /// Built-in simple content type
    Simple(SimpleType),
    /// Ordered sequence of child element declarations
    Complex(Vec<ChildDecl>),
    /// No usable type information; accept anything
    Any,
}

#[derive(Debug, Clone, Copy)]
enum SimpleType {
    String,
    Integer,
    Decimal,
    Boolean,
}

#[derive(Debug, Clone)]
struct ElementDecl {
    name: String,
    kind: ElementKind,
}

#[derive(Debug, Clone)]
struct ChildDecl {
    decl: ElementDecl,
    min_occurs: usize,
    max_occurs: Option<usize>,
}

/// A parsed XSD subset, ready to validate instance documents
pub struct Schema {
    roots: HashMap<String, ElementDecl>,
}

impl Schema {
    /// Parse schema text into a validator.
    ///
    /// The root element must be `{http://www.w3.org/2001/XMLSchema}schema`.
    pub fn parse(schema_src: &str) -> Result<Self, XsdError> {
        let doc = roxmltree::Document::parse(schema_src)
            .map_err(|error| XsdError::Parse(error.to_string()))?;
        let root = doc.root_element();
        if root.tag_name().name() != "schema" || root.tag_name().namespace() != Some(XSD_NAMESPACE)
        {
            return Err(XsdError::NotASchema);
        }

        let mut roots = HashMap::new();
        for node in root.children().filter(|n| n.is_element()) {
            if is_xsd(&node, "element") {
                if let Some(decl) = parse_element(&node) {
                    roots.insert(decl.name.clone(), decl);
                }
            }
        }

        Ok(Self { roots })
    }

    /// Validate instance document text against this schema
    pub fn validate_str(&self, content: &str) -> Result<(), XsdError> {
        let doc = roxmltree::Document::parse(content)
            .map_err(|error| XsdError::Parse(error.to_string()))?;
        let root = doc.root_element();

        let decl = self.roots.get(root.tag_name().name()).ok_or_else(|| {
            XsdError::Mismatch(format!(
                "element '{}' is not declared by the schema",
                root.tag_name().name()
            ))
        })?;

        validate_element(&root, decl)
    }
}

fn is_xsd(node: &roxmltree::Node, name: &str) -> bool {
    node.tag_name().name() == name && node.tag_name().namespace() == Some(XSD_NAMESPACE)
}

fn parse_element(node: &roxmltree::Node) -> Option<ElementDecl> {
    let name = node.attribute("name")?.to_string();

    let kind = if let Some(type_name) = node.attribute("type") {
        match simple_type(type_name) {
            Some(simple) => ElementKind::Simple(simple),
            None => ElementKind::Any,
        }
    } else if let Some(complex) = node.children().find(|n| is_xsd(n, "complexType")) {
        match complex.children().find(|n| is_xsd(n, "sequence")) {
            Some(sequence) => {
                let children = sequence
                    .children()
                    .filter(|n| is_xsd(n, "element"))
                    .filter_map(|child| {
                        let decl = parse_element(&child)?;
                        Some(ChildDecl {
                            decl,
                            min_occurs: occurs(&child, "minOccurs").unwrap_or(1),
                            max_occurs: match child.attribute("maxOccurs") {
                                Some("unbounded") => None,
                                other => Some(
                                    other.and_then(|v| v.parse().ok()).unwrap_or(1),
                                ),
                            },
                        })
                    })
                    .collect();
                ElementKind::Complex(children)
            }
            None => ElementKind::Any,
        }
    } else {
        ElementKind::Any
    };

    Some(ElementDecl { name, kind })
}

fn occurs(node: &roxmltree::Node, attribute: &str) -> Option<usize> {
    node.attribute(attribute).and_then(|v| v.parse().ok())
}

// strip an `xs:`-style prefix before matching the built-in name
fn simple_type(type_name: &str) -> Option<SimpleType> {
    let local = type_name.rsplit(':').next().unwrap_or(type_name);
    match local {
        "string" | "normalizedString" | "token" => Some(SimpleType::String),
        "int" | "integer" | "long" | "short" | "nonNegativeInteger" | "positiveInteger" => {
            Some(SimpleType::Integer)
        }
        "decimal" | "float" | "double" => Some(SimpleType::Decimal),
        "boolean" => Some(SimpleType::Boolean),
        _ => None,
    }
}

fn validate_element(node: &roxmltree::Node, decl: &ElementDecl) -> Result<(), XsdError> {
    match &decl.kind {
        ElementKind::Any => Ok(()),
        ElementKind::Simple(simple) => {
            let text = node.text().unwrap_or("").trim();
            let ok = match simple {
                SimpleType::String => true,
                SimpleType::Integer => text.parse::<i64>().is_ok(),
                SimpleType::Decimal => text.parse::<f64>().is_ok(),
                SimpleType::Boolean => matches!(text, "true" | "false" | "0" | "1"),
            };
            if ok {
                Ok(())
            } else {
                Err(XsdError::Mismatch(format!(
                    "element '{}' has invalid simple content {text:?}",
                    decl.name
                )))
            }
        }
        ElementKind::Complex(children) => {
            let elements: Vec<_> = node.children().filter(|n| n.is_element()).collect();
            let mut position = 0;

            for child_decl in children {
                let mut seen = 0;
                while position < elements.len()
                    && elements[position].tag_name().name() == child_decl.decl.name
                {
                    validate_element(&elements[position], &child_decl.decl)?;
                    position += 1;
                    seen += 1;
                    if let Some(max) = child_decl.max_occurs {
                        if seen == max {
                            break;
                        }
                    }
                }
                if seen < child_decl.min_occurs {
                    return Err(XsdError::Mismatch(format!(
                        "element '{}' requires at least {} '{}' child(ren), found {seen}",
                        decl.name, child_decl.min_occurs, child_decl.decl.name
                    )));
                }
            }

            if position < elements.len() {
                return Err(XsdError::Mismatch(format!(
                    "unexpected element '{}' inside '{}'",
                    elements[position].tag_name().name(),
                    decl.name
                )));
            }
            Ok(())
        }
    }
}
