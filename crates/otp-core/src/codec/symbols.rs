//! Symbol map header: `@Map{U=User,S=Status}`.
//!
//! Entries are read raw: neither side is alias-expanded.

use crate::error::Result;
use crate::lexer::TokenKind;
use crate::registry::{Binding, SymbolRegistry};

use super::delta::MAP_MARKER;
use super::emit;
use super::parser::Parser;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MapBlock {
    /// (alias, canonical) in definition order.
    pub entries: Vec<(String, String)>,
}

impl MapBlock {
    /// Define every entry in order. Stops at the first failure; callers that
    /// need all-or-nothing journal the registry first (see
    /// [`SymbolRegistry::begin`]).
    pub fn apply(&self, registry: &mut SymbolRegistry) -> Result<Vec<Binding>> {
        self.entries
            .iter()
            .map(|(alias, canonical)| registry.define(alias, canonical))
            .collect()
    }
}

impl Parser {
    /// Parse `@Map{..}` starting at `@`.
    pub(crate) fn parse_map(&mut self) -> Result<MapBlock> {
        self.expect(&TokenKind::At, "'@'")?;
        match self.peek_kind() {
            TokenKind::Word(w) if w == MAP_MARKER => {
                self.advance();
            }
            other => {
                return Err(self.error(format!("expected 'Map', found {}", other.describe())));
            }
        }
        self.expect(&TokenKind::LBrace, "'{'")?;

        let mut entries = Vec::new();
        if self.eat(&TokenKind::RBrace) {
            return Ok(MapBlock { entries });
        }
        loop {
            let alias = self.parse_raw_name("an alias")?;
            self.expect(&TokenKind::Equals, "'=' after alias")?;
            let canonical = self.parse_raw_name("a canonical name")?;
            entries.push((alias, canonical));

            match self.peek_kind() {
                TokenKind::Comma | TokenKind::Pipe => {
                    self.advance();
                }
                TokenKind::RBrace => {
                    self.advance();
                    return Ok(MapBlock { entries });
                }
                other => {
                    return Err(self.error(format!(
                        "expected ',' or '}}' in symbol map, found {}",
                        other.describe()
                    )));
                }
            }
        }
    }
}

pub fn encode_map(map: &MapBlock) -> String {
    let body: Vec<String> = map
        .entries
        .iter()
        .map(|(alias, canonical)| format!("{}={}", emit::raw(alias), emit::raw(canonical)))
        .collect();
    format!("@{MAP_MARKER}{{{}}}", body.join(","))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CodecError;

    fn parse(input: &str) -> Result<MapBlock> {
        Parser::new(input)?.parse_map()
    }

    #[test]
    fn test_parse_map() {
        let map = parse("@Map{U=User,S=Status|A=\"Active user\"}").unwrap();
        assert_eq!(
            map.entries,
            vec![
                ("U".to_string(), "User".to_string()),
                ("S".to_string(), "Status".to_string()),
                ("A".to_string(), "Active user".to_string()),
            ]
        );
        assert_eq!(encode_map(&map), "@Map{U=User,S=Status,A=\"Active user\"}");
    }

    #[test]
    fn test_apply_defines_in_order() {
        let mut reg = SymbolRegistry::new();
        let map = parse("@Map{U=User,S=Status}").unwrap();
        map.apply(&mut reg).unwrap();
        assert_eq!(reg.resolve("S").unwrap(), "Status");
    }

    #[test]
    fn test_apply_conflict() {
        let mut reg = SymbolRegistry::new();
        let map = parse("@Map{U=User,U=Unit}").unwrap();
        assert!(matches!(
            map.apply(&mut reg),
            Err(CodecError::DuplicateAlias { .. })
        ));
    }

    #[test]
    fn test_missing_equals() {
        assert!(parse("@Map{U:User}").is_err());
    }
}
