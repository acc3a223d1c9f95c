//! Delta-encoded object families: a base attribute set plus variants that
//! override or add keys.
//!
//! ```text
//! @Base{A:1,B:2};[Base|Base{B:3}|Base(web){A:0}]
//! ```
//!
//! A variant list without a leading `@Base{..}` uses the base defined by an
//! earlier turn.

use crate::error::{CodecError, Result};
use crate::lexer::TokenKind;
use crate::registry::SymbolRegistry;
use crate::value::{Attributes, Entity};

use super::emit;
use super::parser::Parser;

/// The reserved base name that introduces a symbol map instead.
pub const MAP_MARKER: &str = "Map";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Variant {
    /// Explicit entity name; defaults to `Base[i]`.
    pub name: Option<String>,
    pub overrides: Attributes,
}

impl Variant {
    pub fn inherit() -> Self {
        Self {
            name: None,
            overrides: Attributes::new(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeltaBlock {
    pub base: String,
    /// `None` when the block is a bare variant list referring to an earlier base.
    pub base_attributes: Option<Attributes>,
    pub variants: Vec<Variant>,
}

impl DeltaBlock {
    pub fn variant_name(&self, index: usize) -> String {
        self.variants
            .get(index)
            .and_then(|v| v.name.clone())
            .unwrap_or_else(|| format!("{}[{index}]", self.base))
    }

    /// Materialize every variant against `base`. Each entity gets its own
    /// flat copy of the base keys with the variant's overrides laid on top,
    /// so nothing is shared between variants or with the base.
    pub fn materialize(&self, base: &Attributes) -> Vec<Entity> {
        self.variants
            .iter()
            .enumerate()
            .map(|(i, variant)| {
                let mut attributes = base.clone();
                for (key, value) in &variant.overrides {
                    attributes.insert(key.clone(), value.clone());
                }
                Entity {
                    name: self.variant_name(i),
                    kind: Some(self.base.clone()),
                    attributes,
                }
            })
            .collect()
    }
}

fn malformed(err: CodecError) -> CodecError {
    match err {
        CodecError::Syntax { offset, message } => {
            CodecError::MalformedDelta(format!("{message} (byte {offset})"))
        }
        other => other,
    }
}

impl Parser {
    /// Parse `@Base{..}` with an optional following variant list.
    pub(crate) fn parse_delta_base(&mut self, registry: &SymbolRegistry) -> Result<DeltaBlock> {
        self.parse_delta_base_inner(registry).map_err(malformed)
    }

    fn parse_delta_base_inner(&mut self, registry: &SymbolRegistry) -> Result<DeltaBlock> {
        self.expect(&TokenKind::At, "'@'")?;
        let base = self.parse_name(registry, "a base name")?;
        let base_attributes = self.parse_attributes(registry)?;

        let has_variants = match (self.peek_kind(), self.peek_at(1)) {
            (TokenKind::LBracket, _) => !self.peek().newline,
            (TokenKind::Semi, TokenKind::LBracket) => {
                self.advance();
                true
            }
            _ => false,
        };

        let variants = if has_variants {
            let (named, variants) = self.parse_variant_list(registry)?;
            if named != base {
                return Err(CodecError::MalformedDelta(format!(
                    "variant list refers to '{named}' but the base is '{base}'"
                )));
            }
            variants
        } else {
            Vec::new()
        };

        Ok(DeltaBlock {
            base,
            base_attributes: Some(base_attributes),
            variants,
        })
    }

    /// Parse a bare `[Base|Base{..}]` list.
    pub(crate) fn parse_variant_block(&mut self, registry: &SymbolRegistry) -> Result<DeltaBlock> {
        let (base, variants) = self.parse_variant_list(registry).map_err(malformed)?;
        Ok(DeltaBlock {
            base,
            base_attributes: None,
            variants,
        })
    }

    fn parse_variant_list(&mut self, registry: &SymbolRegistry) -> Result<(String, Vec<Variant>)> {
        self.expect(&TokenKind::LBracket, "'['")?;
        let mut base: Option<String> = None;
        let mut variants = Vec::new();

        loop {
            let referenced = self.parse_name(registry, "a variant base")?;
            match &base {
                Some(b) if *b != referenced => {
                    return Err(CodecError::MalformedDelta(format!(
                        "variant refers to '{referenced}', expected '{b}'"
                    )));
                }
                Some(_) => {}
                None => base = Some(referenced),
            }

            let name = if self.eat(&TokenKind::LParen) {
                let name = self.parse_name(registry, "a variant name")?;
                self.expect(&TokenKind::RParen, "')'")?;
                Some(name)
            } else {
                None
            };
            let overrides = if matches!(self.peek_kind(), TokenKind::LBrace) {
                self.parse_attributes(registry)?
            } else {
                Attributes::new()
            };
            variants.push(Variant { name, overrides });

            match self.peek_kind() {
                TokenKind::Pipe => {
                    self.advance();
                }
                TokenKind::RBracket => {
                    self.advance();
                    break;
                }
                other => {
                    return Err(self.error(format!(
                        "expected '|' or ']' in variant list, found {}",
                        other.describe()
                    )));
                }
            }
        }

        let base = base.ok_or_else(|| CodecError::MalformedDelta("empty variant list".into()))?;
        Ok((base, variants))
    }
}

/// Decode a single delta block (base with optional variants, or a bare list).
pub fn decode_delta(input: &str, registry: &SymbolRegistry) -> Result<DeltaBlock> {
    let mut parser = Parser::new(input).map_err(malformed)?;
    let block = match parser.peek_kind() {
        TokenKind::At => parser.parse_delta_base(registry)?,
        TokenKind::LBracket => parser.parse_variant_block(registry)?,
        other => {
            return Err(CodecError::MalformedDelta(format!(
                "expected '@' or '[', found {}",
                other.describe()
            )));
        }
    };
    parser.finish_statement().map_err(malformed)?;
    if !parser.is_eof() {
        return Err(CodecError::MalformedDelta("trailing input after delta block".into()));
    }
    Ok(block)
}

fn base_name(name: &str, registry: &SymbolRegistry) -> String {
    if name == MAP_MARKER {
        crate::lexer::quote(name)
    } else {
        emit::name(name, registry)
    }
}

pub fn encode_delta(block: &DeltaBlock, registry: &SymbolRegistry) -> String {
    let base = base_name(&block.base, registry);
    let list = if block.variants.is_empty() {
        None
    } else {
        let items: Vec<String> = block
            .variants
            .iter()
            .map(|v| {
                let mut item = emit::name(&block.base, registry);
                if let Some(name) = &v.name {
                    item.push('(');
                    item.push_str(&emit::name(name, registry));
                    item.push(')');
                }
                if !v.overrides.is_empty() {
                    item.push_str(&emit::attributes(&v.overrides, ',', registry));
                }
                item
            })
            .collect();
        Some(format!("[{}]", items.join("|")))
    };

    match (&block.base_attributes, list) {
        (Some(attrs), Some(list)) => {
            format!("@{base}{};{list}", emit::attributes(attrs, ',', registry))
        }
        (Some(attrs), None) => format!("@{base}{}", emit::attributes(attrs, ',', registry)),
        (None, Some(list)) => list,
        (None, None) => format!("[{}]", emit::name(&block.base, registry)),
    }
}
