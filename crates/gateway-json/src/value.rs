use std::fmt;

use bytes::Bytes;
use indexmap::IndexMap;

use crate::path::{Path, PathElement};

/// Error raised when a [`Value::Deferred`] fragment fails to parse, or when a
/// structural walk expects one shape and finds another.
#[derive(Debug, thiserror::Error)]
pub enum ValueError {
    #[error("malformed deferred JSON fragment: {0}")]
    Deferred(#[from] serde_json::Error),
    #[error("expected an object at `{path}`, found {found}")]
    NotAnObject { path: Path, found: &'static str },
    #[error("expected a list at `{path}`, found {found}")]
    NotAList { path: Path, found: &'static str },
}

/// A dynamic, order-preserving JSON-like value.
///
/// Object keys are kept in insertion order (backed by [`IndexMap`]) because
/// the serializer must reproduce the client's selection order exactly.
///
/// [`Value::Deferred`] holds a byte-level JSON fragment read directly off a
/// subgraph response body without being parsed. Callers that only ever graft
/// or bubble along a handful of insertion paths never pay the cost of
/// parsing the rest of a large response; [`Value::materialize`] parses a
/// deferred fragment in place the first time something needs to look inside
/// it.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Number(serde_json::Number),
    String(String),
    List(Vec<Value>),
    Object(IndexMap<String, Value>),
    Deferred(Bytes),
}

impl Default for Value {
    fn default() -> Self {
        Value::Null
    }
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::List(_) => "list",
            Value::Object(_) => "object",
            Value::Deferred(_) => "deferred",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Parses a [`Value::Deferred`] fragment in place. A no-op on every other
    /// variant, including already-materialized ones.
    pub fn materialize(&mut self) -> Result<(), ValueError> {
        if let Value::Deferred(bytes) = self {
            let parsed: Value = serde_json::from_slice(bytes)?;
            *self = parsed;
        }
        Ok(())
    }

    pub fn as_object(&self) -> Option<&IndexMap<String, Value>> {
        match self {
            Value::Object(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_object_mut(&mut self) -> Option<&mut IndexMap<String, Value>> {
        match self {
            Value::Object(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_list_mut(&mut self) -> Option<&mut Vec<Value>> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Descends through objects and (element-wise, for every item) lists
    /// along `path`, invoking `visit` on every leaf node reached. Lists are
    /// expanded: a `Field` segment applies to every element of a `List`
    /// encountered along the way, matching how insertion paths cross list
    /// boundaries implicitly (§4.6).
    pub fn for_each_at_path<'a>(
        &'a mut self,
        path: &[PathElement],
        visit: &mut dyn FnMut(&mut Value) -> Result<(), ValueError>,
    ) -> Result<(), ValueError> {
        self.materialize()?;
        match path.split_first() {
            None => visit(self),
            Some((PathElement::Index(i), rest)) => {
                if let Value::List(items) = self {
                    if let Some(item) = items.get_mut(*i) {
                        item.for_each_at_path(rest, visit)?;
                    }
                    Ok(())
                } else if matches!(self, Value::Null) {
                    Ok(())
                } else {
                    Err(ValueError::NotAList {
                        path: Path(path.to_vec()),
                        found: self.type_name(),
                    })
                }
            }
            Some((field @ PathElement::Field(_), rest)) => match self {
                Value::List(items) => {
                    for item in items.iter_mut() {
                        item.for_each_at_path(path, visit)?;
                    }
                    Ok(())
                }
                Value::Object(map) => {
                    let PathElement::Field(name) = field else {
                        unreachable!()
                    };
                    if let Some(child) = map.get_mut(name) {
                        child.for_each_at_path(rest, visit)?;
                    }
                    Ok(())
                }
                Value::Null => Ok(()),
                other => Err(ValueError::NotAnObject {
                    path: Path(path.to_vec()),
                    found: other.type_name(),
                }),
            },
        }
    }

    /// Deep-merges `other` into `self`: overlapping object keys recurse,
    /// disjoint keys are copied, and lists are merged element-wise by
    /// position (used only when two results target the exact same list,
    /// e.g. two namespace steps contributing to the same parent).
    pub fn deep_merge(&mut self, other: Value) -> Result<(), ValueError> {
        self.materialize()?;
        let mut other = other;
        other.materialize()?;
        match (self, other) {
            (Value::Object(base), Value::Object(incoming)) => {
                for (key, value) in incoming {
                    match base.get_mut(&key) {
                        Some(existing) => existing.deep_merge(value)?,
                        None => {
                            base.insert(key, value);
                        }
                    }
                }
                Ok(())
            }
            (Value::List(base), Value::List(incoming)) => {
                for (i, value) in incoming.into_iter().enumerate() {
                    match base.get_mut(i) {
                        Some(existing) => existing.deep_merge(value)?,
                        None => base.push(value),
                    }
                }
                Ok(())
            }
            (slot, incoming) => {
                *slot = incoming;
                Ok(())
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Deferred(bytes) => f.write_str(&String::from_utf8_lossy(bytes)),
            other => write!(f, "{}", serde_json::to_string(&SerializeRef(other)).unwrap_or_default()),
        }
    }
}

/// Thin wrapper so `Value` can `Serialize` without cloning deferred bytes
/// into a parsed tree first.
struct SerializeRef<'a>(&'a Value);

impl serde::Serialize for SerializeRef<'_> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::{SerializeMap, SerializeSeq};
        match self.0 {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Number(n) => n.serialize(serializer),
            Value::String(s) => serializer.serialize_str(s),
            Value::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(&SerializeRef(item))?;
                }
                seq.end()
            }
            Value::Object(map) => {
                let mut ser_map = serializer.serialize_map(Some(map.len()))?;
                for (k, v) in map {
                    ser_map.serialize_entry(k, &SerializeRef(v))?;
                }
                ser_map.end()
            }
            Value::Deferred(bytes) => {
                let raw: serde_json::Value = serde_json::from_slice(bytes).map_err(serde::ser::Error::custom)?;
                raw.serialize(serializer)
            }
        }
    }
}

impl serde::Serialize for Value {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        SerializeRef(self).serialize(serializer)
    }
}

impl<'de> serde::Deserialize<'de> for Value {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = serde_json::Value::deserialize(deserializer)?;
        Ok(Value::from(raw))
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n),
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => Value::List(items.into_iter().map(Value::from).collect()),
            serde_json::Value::Object(map) => {
                Value::Object(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}
