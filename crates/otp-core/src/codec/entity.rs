//! Entity literals: `Root{Child1:V1|Child2:V2}` and typed `U(John){S:A|R:Admin}`.

use crate::error::Result;
use crate::lexer::{TokenKind, quote};
use crate::registry::SymbolRegistry;
use crate::value::{Attributes, Entity};

use super::emit;
use super::parser::Parser;
use super::path::{Path, encode_path};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EntityLiteral {
    pub kind: Option<String>,
    pub name: String,
    pub attributes: Attributes,
}

impl EntityLiteral {
    pub fn to_entity(&self) -> Entity {
        Entity {
            name: self.name.clone(),
            kind: self.kind.clone(),
            attributes: self.attributes.clone(),
        }
    }
}

impl Parser {
    /// Continue an entity literal whose head path is already parsed.
    pub(crate) fn parse_entity_rest(
        &mut self,
        head: Path,
        registry: &SymbolRegistry,
    ) -> Result<EntityLiteral> {
        let head = head.to_string();
        let (kind, name) = if self.eat(&TokenKind::LParen) {
            let name = self.parse_name(registry, "an entity name")?;
            self.expect(&TokenKind::RParen, "')'")?;
            (Some(head), name)
        } else {
            (None, head)
        };
        let attributes = self.parse_attributes(registry)?;
        Ok(EntityLiteral {
            kind,
            name,
            attributes,
        })
    }
}

/// Encode a dotted name in head position, falling back to one quoted
/// segment when the name cannot be split cleanly.
fn head(name: &str, registry: &SymbolRegistry) -> String {
    match Path::new(name.split('.').map(String::from).collect()) {
        Some(path) => encode_path(&path, registry),
        None => quote(name),
    }
}

pub fn encode_entity(literal: &EntityLiteral, registry: &SymbolRegistry) -> String {
    let attrs = emit::attributes(&literal.attributes, '|', registry);
    match &literal.kind {
        Some(kind) => format!(
            "{}({}){attrs}",
            head(kind, registry),
            emit::name(&literal.name, registry)
        ),
        None => format!("{}{attrs}", head(&literal.name, registry)),
    }
}
