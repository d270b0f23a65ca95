//! The configuration collaborator interface.
//!
//! An index is declared by a [`ConfigNode`]: a bag of properties taken from a
//! declarative configuration document. Parsing that document is not our concern;
//! what matters here is that every node carries a process-unique [`NodeId`].
//! Nodes are compared by that identity, never by their property values, so two
//! syntactically identical declarations in one document denote two distinct
//! indexes and never collide in the directory cache.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use thiserror::Error;

static NEXT_NODE_ID: AtomicU64 = AtomicU64::new(0);

/// The stable identity of one configuration node.
///
/// Ids are drawn from a process-wide counter and are never reused within a
/// process lifetime.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NodeId(u64);

impl NodeId {
    fn next() -> Self {
        NodeId(NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

/// The property vocabulary understood by the index assembler.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Property {
    /// Where the index stores its data: the `"mem"` sentinel, a literal path,
    /// or a `file:` resource.
    Directory,
    /// Analyzer selection for term normalization.
    Analyzer,
    /// Analyzer selection for query-time normalization.
    QueryAnalyzer,
    /// The default field queries run against.
    EntityMap,
    /// Whether entries keep their language tags.
    MultilingualSupport,
    /// Whether lookups return the stored literal values.
    StoreValues,
}

impl fmt::Display for Property {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Property::Directory => "directory",
            Property::Analyzer => "analyzer",
            Property::QueryAnalyzer => "queryAnalyzer",
            Property::EntityMap => "entityMap",
            Property::MultilingualSupport => "multilingualSupport",
            Property::StoreValues => "storeValues",
        };
        f.write_str(name)
    }
}

/// The value of a configuration property.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PropertyValue {
    /// A plain literal.
    Literal(String),
    /// A reference to another resource, given as an IRI.
    Resource(String),
}

/// One node of the declarative configuration document.
#[derive(Debug)]
pub struct ConfigNode {
    id: NodeId,
    properties: Vec<(Property, PropertyValue)>,
}

impl ConfigNode {
    pub fn new(properties: Vec<(Property, PropertyValue)>) -> Self {
        Self {
            id: NodeId::next(),
            properties,
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Returns the first value for `property`, if any.
    pub fn property(&self, property: Property) -> Option<&PropertyValue> {
        self.properties
            .iter()
            .find(|(p, _)| *p == property)
            .map(|(_, value)| value)
    }

    /// Returns the value for `property`, requiring that the node carries it
    /// exactly once.
    pub fn exactly_one(&self, property: Property) -> Result<&PropertyValue, ConfigError> {
        let mut values = self
            .properties
            .iter()
            .filter(|(p, _)| *p == property)
            .map(|(_, value)| value);
        match (values.next(), values.next()) {
            (Some(value), None) => Ok(value),
            (None, _) => Err(ConfigError::MissingProperty {
                node: self.id,
                property,
            }),
            (Some(_), Some(_)) => Err(ConfigError::DuplicateProperty {
                node: self.id,
                property,
            }),
        }
    }

    /// Parses an optional boolean toggle.
    pub fn boolean(&self, property: Property) -> Result<Option<bool>, ConfigError> {
        match self.property(property) {
            None => Ok(None),
            Some(PropertyValue::Literal(value)) => {
                value
                    .parse()
                    .map(Some)
                    .map_err(|_| ConfigError::NotBoolean {
                        property,
                        value: value.clone(),
                    })
            }
            Some(PropertyValue::Resource(iri)) => Err(ConfigError::NotBoolean {
                property,
                value: iri.clone(),
            }),
        }
    }
}

/// An error in the declarative configuration of an index.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no `{property}` property on {node}")]
    MissingProperty { node: NodeId, property: Property },
    #[error("more than one `{property}` property on {node}")]
    DuplicateProperty { node: NodeId, property: Property },
    #[error("`{property}` property must be a boolean literal, got `{value}`")]
    NotBoolean { property: Property, value: String },
    #[error("`{property}` property must be a literal, got resource `{value}`")]
    NotLiteral { property: Property, value: String },
    #[error("unknown analyzer `{0}`")]
    UnknownAnalyzer(String),
    #[error("directory resource `{0}` does not resolve to a file path")]
    UnresolvableDirectory(String),
}
