//! Token-level encoding. Anything the parser would read back differently
//! from how it was written gets quoted.

use crate::lexer::{is_special, quote};
use crate::registry::SymbolRegistry;
use crate::value::{Attributes, Value};

fn lexically_unsafe(s: &str) -> bool {
    s.is_empty() || s.contains('`') || s.chars().any(is_special)
}

/// Raw token: quoted only when the lexer would split it.
pub(crate) fn raw(s: &str) -> String {
    if lexically_unsafe(s) {
        quote(s)
    } else {
        s.to_string()
    }
}

/// Key or entity name: also quoted when it collides with an alias.
pub(crate) fn name(s: &str, registry: &SymbolRegistry) -> String {
    if lexically_unsafe(s) || registry.is_alias(s) {
        quote(s)
    } else {
        s.to_string()
    }
}

/// Path segment: like [`name`], and dots force quoting.
pub(crate) fn segment(s: &str, registry: &SymbolRegistry) -> String {
    if s.contains('.') {
        quote(s)
    } else {
        name(s, registry)
    }
}

pub(crate) fn value(v: &Value, registry: &SymbolRegistry) -> String {
    match v {
        Value::Bool(b) => b.to_string(),
        Value::Int(n) => n.to_string(),
        Value::Text(s) => {
            let scalar_like = s == "true" || s == "false" || s.parse::<i64>().is_ok();
            if scalar_like || lexically_unsafe(s) || registry.is_alias(s) {
                quote(s)
            } else {
                s.clone()
            }
        }
        Value::Ref(target) => format!("&{}", name(target, registry)),
    }
}

/// `{k:v<sep>k:v}`
pub(crate) fn attributes(attrs: &Attributes, sep: char, registry: &SymbolRegistry) -> String {
    let body: Vec<String> = attrs
        .iter()
        .map(|(k, v)| format!("{}:{}", name(k, registry), value(v, registry)))
        .collect();
    format!("{{{}}}", body.join(&sep.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_quoting() {
        let reg = SymbolRegistry::new();
        assert_eq!(value(&Value::text("1.1.1.1"), &reg), "1.1.1.1");
        assert_eq!(value(&Value::text("42"), &reg), "\"42\"");
        assert_eq!(value(&Value::text("true"), &reg), "\"true\"");
        assert_eq!(value(&Value::text("a b"), &reg), "\"a b\"");
        assert_eq!(value(&Value::text(""), &reg), "\"\"");
        assert_eq!(value(&Value::Int(-3), &reg), "-3");
        assert_eq!(value(&Value::Ref("Cfg.Net".into()), &reg), "&Cfg.Net");
    }

    #[test]
    fn test_alias_collision_is_quoted() {
        let mut reg = SymbolRegistry::new();
        reg.define("A", "Active").unwrap();
        assert_eq!(value(&Value::text("A"), &reg), "\"A\"");
        assert_eq!(name("A", &reg), "\"A\"");
        assert_eq!(raw("A"), "A");
    }

    #[test]
    fn test_segment_with_dot_is_quoted() {
        let reg = SymbolRegistry::new();
        assert_eq!(segment("a.b", &reg), "\"a.b\"");
        assert_eq!(segment("Port", &reg), "Port");
    }
}
