use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Attribute map of an entity, base or variant. Ordered so encoding is stable.
pub type Attributes = BTreeMap<String, Value>;

/// A decoded attribute value.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Value {
    Bool(bool),
    Int(i64),
    Text(String),
    /// Reference to another entity by canonical name.
    Ref(String),
}

impl Value {
    pub fn text(s: impl Into<String>) -> Self {
        Value::Text(s.into())
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Name usable as an entity key (table first column, variant names).
    pub fn as_name(&self) -> String {
        match self {
            Value::Bool(b) => b.to_string(),
            Value::Int(n) => n.to_string(),
            Value::Text(s) | Value::Ref(s) => s.clone(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Text(_) => "text",
            Value::Ref(_) => "ref",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(n) => write!(f, "{n}"),
            Value::Text(s) => write!(f, "{s}"),
            Value::Ref(name) => write!(f, "&{name}"),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

/// A named entity in the state tree.
///
/// Entities are created on first mention and only ever merged into; nothing
/// in the state log removes them, so history stays replayable.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    pub attributes: Attributes,
}

impl Entity {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: None,
            attributes: Attributes::new(),
        }
    }

    pub fn with_attributes(name: impl Into<String>, attributes: Attributes) -> Self {
        Self {
            name: name.into(),
            kind: None,
            attributes,
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    /// Field-level merge: overlapping keys take `other`'s value, all other
    /// keys persist. A `None` kind in `other` keeps the current kind.
    pub fn merge(&mut self, other: &Entity) {
        if other.kind.is_some() {
            self.kind.clone_from(&other.kind);
        }
        for (key, value) in &other.attributes {
            self.attributes.insert(key.clone(), value.clone());
        }
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(kind) = &self.kind {
            write!(f, "{kind}({})", self.name)?;
        } else {
            write!(f, "{}", self.name)?;
        }
        write!(f, "{{")?;
        for (i, (key, value)) in self.attributes.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{key}:{value}")?;
        }
        write!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attrs(pairs: &[(&str, Value)]) -> Attributes {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_merge_overrides_overlapping_keys_only() {
        let mut e = Entity::with_attributes("A", attrs(&[("x", 1.into()), ("y", 2.into())]));
        let update = Entity::with_attributes("A", attrs(&[("y", 3.into()), ("z", 4.into())]));
        e.merge(&update);

        assert_eq!(e.get("x"), Some(&Value::Int(1)));
        assert_eq!(e.get("y"), Some(&Value::Int(3)));
        assert_eq!(e.get("z"), Some(&Value::Int(4)));
    }

    #[test]
    fn test_merge_keeps_kind_when_update_has_none() {
        let mut e = Entity::new("John");
        e.kind = Some("User".to_string());
        e.merge(&Entity::new("John"));
        assert_eq!(e.kind.as_deref(), Some("User"));
    }

    #[test]
    fn test_display() {
        let mut e = Entity::with_attributes("A", attrs(&[("IP", "1.1.1.1".into())]));
        assert_eq!(e.to_string(), "A{IP:1.1.1.1}");
        e.kind = Some("Host".to_string());
        assert_eq!(e.to_string(), "Host(A){IP:1.1.1.1}");
    }

    #[test]
    fn test_as_name() {
        assert_eq!(Value::Int(7).as_name(), "7");
        assert_eq!(Value::Ref("Cfg".into()).as_name(), "Cfg");
        assert_eq!(Value::Bool(true).as_name(), "true");
    }
}
