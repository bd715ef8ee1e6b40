use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::value::{PropBag, PropKind, PropValue};

/// Read-only view handed to suppliers, validators, and decorators: the
/// in-progress prop bag plus the instance's state object.
pub struct NormalizeContext<'a> {
    pub props: &'a PropBag,
    pub state: &'a Value,
}

pub type PropSupplier = Arc<dyn Fn(&NormalizeContext<'_>) -> Option<PropValue> + Send + Sync>;

pub type PropValidator =
    Arc<dyn Fn(&PropValue, &NormalizeContext<'_>) -> Result<(), String> + Send + Sync>;

pub type PropDecorator = Arc<dyn Fn(PropValue, &NormalizeContext<'_>) -> PropValue + Send + Sync>;

/// Child-side decorator. Unlike [`PropDecorator`] it also runs for props
/// the parent never sent, so it can synthesize a value.
pub type ChildDecorator =
    Arc<dyn Fn(Option<PropValue>, &NormalizeContext<'_>) -> Option<PropValue> + Send + Sync>;

pub type QueryValueFn = Arc<dyn Fn(&PropValue) -> Option<Value> + Send + Sync>;

/// How a prop appears in the component URL's query string.
#[derive(Clone, Default)]
pub enum QueryParam {
    /// Not written into the query at all.
    #[default]
    Off,
    /// Written under the prop's own name.
    Name,
    Renamed(String),
    Computed(Arc<dyn Fn(&str, &PropValue) -> String + Send + Sync>),
}

/// Wire form for object and array query values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Serialization {
    Json,
    Base64,
    /// Flattened into dotted keys (`foo.bar=1`), scalar arrays joined with
    /// commas under `key[]`.
    #[default]
    Dotify,
}

/// Everything a component declares about one prop. Construct with
/// [`PropDefinition::new`] / [`PropDefinition::optional`] and override
/// fields with struct update syntax.
#[derive(Clone)]
pub struct PropDefinition {
    pub kind: PropKind,
    pub required: bool,
    pub alias: Option<String>,
    pub default: Option<PropSupplier>,
    pub value: Option<PropSupplier>,
    pub validate: Option<PropValidator>,
    pub decorate: Option<PropDecorator>,
    pub child_decorate: Option<ChildDecorator>,
    pub query_param: QueryParam,
    pub query_value: Option<QueryValueFn>,
    pub serialization: Serialization,
    pub send_to_child: bool,
    pub allow_delegate: bool,
    /// Only delivered to the child when it shares the parent's origin.
    pub same_domain: bool,
}

impl PropDefinition {
    pub fn new(kind: PropKind) -> Self {
        Self {
            kind,
            required: true,
            alias: None,
            default: None,
            value: None,
            validate: None,
            decorate: None,
            child_decorate: None,
            query_param: QueryParam::Off,
            query_value: None,
            serialization: Serialization::default(),
            send_to_child: true,
            allow_delegate: false,
            same_domain: false,
        }
    }

    pub fn optional(kind: PropKind) -> Self {
        Self {
            required: false,
            ..Self::new(kind)
        }
    }
}

/// A component's prop declarations, keyed by canonical name.
#[derive(Clone, Default)]
pub struct PropSchema {
    defs: BTreeMap<String, PropDefinition>,
}

impl PropSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn define(&mut self, name: impl Into<String>, def: PropDefinition) {
        self.defs.insert(name.into(), def);
    }

    pub fn get(&self, name: &str) -> Option<&PropDefinition> {
        self.defs.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.defs.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &PropDefinition)> {
        self.defs.iter().map(|(name, def)| (name.as_str(), def))
    }

    pub fn len(&self) -> usize {
        self.defs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }

    /// Overlays `other`; its definitions win on conflicts.
    pub fn merge(&mut self, other: PropSchema) {
        for (name, def) in other.defs {
            self.defs.insert(name, def);
        }
    }
}

impl FromIterator<(String, PropDefinition)> for PropSchema {
    fn from_iter<I: IntoIterator<Item = (String, PropDefinition)>>(iter: I) -> Self {
        let mut schema = PropSchema::new();
        for (name, def) in iter {
            schema.define(name, def);
        }
        schema
    }
}
