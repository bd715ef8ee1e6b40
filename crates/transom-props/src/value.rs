use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

use transom_transport::WindowHandle;

use crate::function::PropFunction;

/// The semantic kinds a prop definition can declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropKind {
    Boolean,
    String,
    Number,
    Function,
    Object,
    Array,
}

impl PropKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PropKind::Boolean => "boolean",
            PropKind::String => "string",
            PropKind::Number => "number",
            PropKind::Function => "function",
            PropKind::Object => "object",
            PropKind::Array => "array",
        }
    }
}

impl fmt::Display for PropKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A prop's runtime value: plain data, an invocable callback, or a window
/// reference. `Json(Value::Null)` counts as undefined everywhere.
#[derive(Clone)]
pub enum PropValue {
    Json(Value),
    Function(PropFunction),
    Window(WindowHandle),
}

impl PropValue {
    pub fn is_defined(&self) -> bool {
        !matches!(self, PropValue::Json(Value::Null))
    }

    /// The kind this value reads as for type checks. Window references
    /// check as objects, like any other opaque handle.
    pub fn kind(&self) -> Option<PropKind> {
        match self {
            PropValue::Json(Value::Bool(_)) => Some(PropKind::Boolean),
            PropValue::Json(Value::Number(_)) => Some(PropKind::Number),
            PropValue::Json(Value::String(_)) => Some(PropKind::String),
            PropValue::Json(Value::Object(_)) => Some(PropKind::Object),
            PropValue::Json(Value::Array(_)) => Some(PropKind::Array),
            PropValue::Json(Value::Null) => None,
            PropValue::Function(_) => Some(PropKind::Function),
            PropValue::Window(_) => Some(PropKind::Object),
        }
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            PropValue::Json(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        self.as_json().and_then(Value::as_bool)
    }

    pub fn as_f64(&self) -> Option<f64> {
        self.as_json().and_then(Value::as_f64)
    }

    pub fn as_str(&self) -> Option<&str> {
        self.as_json().and_then(Value::as_str)
    }

    pub fn as_function(&self) -> Option<&PropFunction> {
        match self {
            PropValue::Function(function) => Some(function),
            _ => None,
        }
    }

    pub fn as_window(&self) -> Option<&WindowHandle> {
        match self {
            PropValue::Window(window) => Some(window),
            _ => None,
        }
    }
}

impl fmt::Debug for PropValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropValue::Json(value) => write!(f, "{value}"),
            PropValue::Function(_) => f.write_str("<function>"),
            PropValue::Window(window) => write!(f, "<window {}>", window.id()),
        }
    }
}

impl From<bool> for PropValue {
    fn from(value: bool) -> Self {
        PropValue::Json(Value::Bool(value))
    }
}

impl From<f64> for PropValue {
    fn from(value: f64) -> Self {
        PropValue::Json(serde_json::json!(value))
    }
}

impl From<i64> for PropValue {
    fn from(value: i64) -> Self {
        PropValue::Json(Value::from(value))
    }
}

impl From<&str> for PropValue {
    fn from(value: &str) -> Self {
        PropValue::Json(Value::String(value.to_string()))
    }
}

impl From<String> for PropValue {
    fn from(value: String) -> Self {
        PropValue::Json(Value::String(value))
    }
}

impl From<Value> for PropValue {
    fn from(value: Value) -> Self {
        PropValue::Json(value)
    }
}

impl From<PropFunction> for PropValue {
    fn from(function: PropFunction) -> Self {
        PropValue::Function(function)
    }
}

impl From<WindowHandle> for PropValue {
    fn from(window: WindowHandle) -> Self {
        PropValue::Window(window)
    }
}

/// An ordered name-to-value map. Setting a null value removes the entry, so
/// "present" and "defined" stay the same thing.
#[derive(Clone, Default)]
pub struct PropBag {
    entries: BTreeMap<String, PropValue>,
}

impl PropBag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&PropValue> {
        self.entries.get(name)
    }

    pub fn set(&mut self, name: impl Into<String>, value: PropValue) {
        if value.is_defined() {
            self.entries.insert(name.into(), value);
        } else {
            self.entries.remove(&name.into());
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<PropValue> {
        self.entries.remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &PropValue)> {
        self.entries.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Overlays `other` on top of this bag; `other` wins on conflicts.
    pub fn merge(&mut self, other: PropBag) {
        for (name, value) in other.entries {
            self.entries.insert(name, value);
        }
    }
}

impl FromIterator<(String, PropValue)> for PropBag {
    fn from_iter<I: IntoIterator<Item = (String, PropValue)>>(iter: I) -> Self {
        let mut bag = PropBag::new();
        for (name, value) in iter {
            bag.set(name, value);
        }
        bag
    }
}

impl fmt::Debug for PropBag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.entries.iter()).finish()
    }
}
