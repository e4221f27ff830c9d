//! The expression evaluator's value model.
//!
//! `global`, `let`, and every intermediate evaluation result is a [`Value`].
//! Unlike `hcl::Value` (which models only well-known HCL data), this type
//! adds `Null` and `Unknown` so the evaluator can represent "deliberately
//! absent" versus "not yet resolved" distinctly, per the globals engine's
//! lazy-typed evaluation model.

use std::cmp::Ordering;
use std::fmt;

/// A numeric value, keeping integers exact where possible.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    pub fn as_f64(self) -> f64 {
        match self {
            Number::Int(i) => i as f64,
            Number::Float(f) => f,
        }
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Number::Int(i) => write!(f, "{i}"),
            Number::Float(n) => write!(f, "{n}"),
        }
    }
}

impl PartialOrd for Number {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        self.as_f64().partial_cmp(&other.as_f64())
    }
}

/// An ordered string-keyed map. Insertion order is preserved because
/// generated HCL/JSON/YAML output must be deterministic between runs.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ValueMap(pub Vec<(String, Value)>);

impl ValueMap {
    pub fn new() -> Self {
        ValueMap(Vec::new())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Value> {
        self.0.iter_mut().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        let key = key.into();
        if let Some(slot) = self.0.iter_mut().find(|(k, _)| *k == key) {
            slot.1 = value;
        } else {
            self.0.push((key, value));
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &(String, Value)> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// The evaluator's runtime value. See module docs for why `Null` and
/// `Unknown` are distinct from each other and from "no such key".
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Unknown,
    Bool(bool),
    Number(Number),
    String(String),
    List(Vec<Value>),
    Map(ValueMap),
}

impl Value {
    pub fn string(s: impl Into<String>) -> Self {
        Value::String(s.into())
    }

    pub fn int(i: i64) -> Self {
        Value::Number(Number::Int(i))
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Bool(b) => *b,
            Value::Null => false,
            Value::Unknown => false,
            Value::Number(n) => n.as_f64() != 0.0,
            Value::String(s) => !s.is_empty(),
            Value::List(l) => !l.is_empty(),
            Value::Map(m) => !m.is_empty(),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Unknown => "unknown",
            Value::Bool(_) => "bool",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::List(_) => "list",
            Value::Map(_) => "object",
        }
    }

    /// Index access for `a[b]`/`a.b` traversal steps.
    pub fn index(&self, key: &Value) -> Option<Value> {
        match (self, key) {
            (Value::Map(m), Value::String(k)) => m.get(k).cloned(),
            (Value::List(l), Value::Number(n)) => {
                let idx = n.as_f64() as i64;
                if idx < 0 {
                    return None;
                }
                l.get(idx as usize).cloned()
            }
            _ => None,
        }
    }

    /// Deep-merge `other` into `self`, `other` winning on scalar conflicts.
    /// Objects merge key-by-key recursively; anything else is a full
    /// replacement. This is the container-merge rule used when a
    /// shorter-origin global statement's result becomes the container a
    /// longer-origin statement writes into.
    pub fn merge_into(self, other: Value) -> Value {
        match (self, other) {
            (Value::Map(mut base), Value::Map(overlay)) => {
                for (k, v) in overlay.0 {
                    let merged = match base.get(&k) {
                        Some(existing) => existing.clone().merge_into(v),
                        None => v,
                    };
                    base.insert(k, merged);
                }
                Value::Map(base)
            }
            (_, other) => other,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&ValueMap> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Unknown => write!(f, "(unknown)"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => write!(f, "{n}"),
            Value::String(s) => write!(f, "{s}"),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Value::Map(m) => {
                write!(f, "{{")?;
                for (i, (k, v)) in m.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{k} = {v}")?;
                }
                write!(f, "}}")
            }
        }
    }
}

/// Convert a serde_json value into our `Value`, used by `tm_jsondecode` and
/// friends.
pub fn from_json(v: serde_json::Value) -> Value {
    match v {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(b),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::int(i)
            } else {
                Value::Number(Number::Float(n.as_f64().unwrap_or(0.0)))
            }
        }
        serde_json::Value::String(s) => Value::String(s),
        serde_json::Value::Array(items) => Value::List(items.into_iter().map(from_json).collect()),
        serde_json::Value::Object(map) => {
            let mut out = ValueMap::new();
            for (k, v) in map {
                out.insert(k, from_json(v));
            }
            Value::Map(out)
        }
    }
}

pub fn to_json(v: &Value) -> serde_json::Value {
    match v {
        Value::Null | Value::Unknown => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Number(Number::Int(i)) => serde_json::Value::Number((*i).into()),
        Value::Number(Number::Float(n)) => serde_json::Number::from_f64(*n)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Value::String(s) => serde_json::Value::String(s.clone()),
        Value::List(items) => serde_json::Value::Array(items.iter().map(to_json).collect()),
        Value::Map(m) => {
            let mut obj = serde_json::Map::new();
            for (k, v) in m.iter() {
                obj.insert(k.clone(), to_json(v));
            }
            serde_json::Value::Object(obj)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_into_merges_maps_recursively_with_overlay_precedence() {
        let mut a = ValueMap::new();
        a.insert("d", Value::int(1));
        let mut base = ValueMap::new();
        base.insert("c", Value::Map(a));
        let base = Value::Map(base);

        let mut e = ValueMap::new();
        e.insert("e", Value::int(2));
        let mut overlay = ValueMap::new();
        overlay.insert("c", Value::Map(e));
        let overlay = Value::Map(overlay);

        let merged = base.merge_into(overlay);
        let c = merged.as_map().unwrap().get("c").unwrap().as_map().unwrap();
        assert_eq!(c.get("d"), Some(&Value::int(1)));
        assert_eq!(c.get("e"), Some(&Value::int(2)));
    }

    #[test]
    fn json_roundtrip_preserves_structure() {
        let mut m = ValueMap::new();
        m.insert("a", Value::int(1));
        m.insert("b", Value::List(vec![Value::string("x")]));
        let v = Value::Map(m);
        let json = to_json(&v);
        let back = from_json(json);
        assert_eq!(back, v);
    }

    #[test]
    fn truthiness_matches_hcl_conventions() {
        assert!(!Value::Null.is_truthy());
        assert!(!Value::Unknown.is_truthy());
        assert!(Value::int(1).is_truthy());
        assert!(!Value::int(0).is_truthy());
        assert!(!Value::String(String::new()).is_truthy());
    }
}
