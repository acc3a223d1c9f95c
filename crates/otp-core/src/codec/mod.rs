//! Structure codec: statement-level decode/encode over the literal forms.
//!
//! A message is a sequence of statements separated by `;` or newlines.
//! The leading syntax selects the form:
//!
//! | lead          | form                       |
//! |---------------|----------------------------|
//! | `@Map{`       | symbol map                 |
//! | `#T(`         | table                      |
//! | `@Name{`      | delta base (+ variants)    |
//! | `[`           | variant list               |
//! | `path{` `path(`| entity literal            |
//! | `path:`       | path assignment            |
//! | `path ?`      | ternary                    |

pub mod delta;
pub mod entity;
pub(crate) mod emit;
pub(crate) mod parser;
pub mod path;
pub mod symbols;
pub mod table;

use crate::error::Result;
use crate::lexer::{TokenKind, strip_fences};
use crate::registry::SymbolRegistry;

use delta::{DeltaBlock, MAP_MARKER, encode_delta};
use entity::{EntityLiteral, encode_entity};
use parser::Parser;
use path::{Assignment, Ternary, encode_assignment, encode_ternary};
use symbols::{MapBlock, encode_map};
use table::{TableBlock, encode_table};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Statement {
    Map(MapBlock),
    Table(TableBlock),
    Delta(DeltaBlock),
    Entity(EntityLiteral),
    Assign(Assignment),
    Ternary(Ternary),
}

impl Statement {
    pub fn form(&self) -> &'static str {
        match self {
            Statement::Map(_) => "map",
            Statement::Table(_) => "table",
            Statement::Delta(_) => "delta",
            Statement::Entity(_) => "entity",
            Statement::Assign(_) => "assign",
            Statement::Ternary(_) => "ternary",
        }
    }

    pub fn encode(&self, registry: &SymbolRegistry) -> String {
        match self {
            Statement::Map(m) => encode_map(m),
            Statement::Table(t) => encode_table(t, registry),
            Statement::Delta(d) => encode_delta(d, registry),
            Statement::Entity(e) => encode_entity(e, registry),
            Statement::Assign(a) => encode_assignment(a, registry),
            Statement::Ternary(t) => encode_ternary(t, registry),
        }
    }
}

/// Pull-based statement decoder.
///
/// The registry is passed per statement so a symbol map earlier in the
/// message is visible to everything after it.
pub struct Decoder {
    parser: Parser,
}

impl Decoder {
    pub fn new(input: &str) -> Result<Self> {
        Ok(Self {
            parser: Parser::new(strip_fences(input))?,
        })
    }

    pub fn next_statement(&mut self, registry: &SymbolRegistry) -> Result<Option<Statement>> {
        let p = &mut self.parser;
        p.skip_separators();
        if p.is_eof() {
            return Ok(None);
        }

        let statement = match p.peek_kind().clone() {
            TokenKind::At => {
                if matches!(p.peek_at(1), TokenKind::Word(w) if w == MAP_MARKER) {
                    Statement::Map(p.parse_map()?)
                } else {
                    Statement::Delta(p.parse_delta_base(registry)?)
                }
            }
            TokenKind::Hash => Statement::Table(p.parse_table(registry)?),
            TokenKind::LBracket => Statement::Delta(p.parse_variant_block(registry)?),
            TokenKind::Word(_) | TokenKind::Quoted(_) => {
                let head = p.parse_path(registry)?;
                match p.peek_kind() {
                    TokenKind::LBrace | TokenKind::LParen => {
                        Statement::Entity(p.parse_entity_rest(head, registry)?)
                    }
                    TokenKind::Colon => Statement::Assign(p.parse_assignment_rest(head, registry)?),
                    TokenKind::Question => Statement::Ternary(p.parse_ternary_rest(head, registry)?),
                    other => {
                        return Err(p.error(format!(
                            "expected '{{', '(', ':' or '?' after '{head}', found {}",
                            other.describe()
                        )));
                    }
                }
            }
            other => {
                return Err(p.error(format!(
                    "expected the start of a statement, found {}",
                    other.describe()
                )));
            }
        };

        p.finish_statement()?;
        Ok(Some(statement))
    }
}

/// Decode every statement, applying symbol maps to `registry` as they occur.
pub fn decode(input: &str, registry: &mut SymbolRegistry) -> Result<Vec<Statement>> {
    let mut decoder = Decoder::new(input)?;
    let mut statements = Vec::new();
    while let Some(statement) = decoder.next_statement(registry)? {
        if let Statement::Map(map) = &statement {
            map.apply(registry)?;
        }
        statements.push(statement);
    }
    Ok(statements)
}

/// Inverse of [`decode`]: encodes with the registry as it stood before each
/// statement, applying symbol maps along the way.
pub fn encode(statements: &[Statement], registry: &mut SymbolRegistry) -> Result<String> {
    let mut parts = Vec::with_capacity(statements.len());
    for statement in statements {
        parts.push(statement.encode(registry));
        if let Statement::Map(map) = statement {
            map.apply(registry)?;
        }
    }
    Ok(parts.join("; "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CodecError;
    use crate::value::Value;

    #[test]
    fn test_decode_mixed_message() {
        let mut reg = SymbolRegistry::new();
        let input = "@Map{U=User,S=Status,A=Active,R=Role}; U(John){S:A|R:Admin}\n\
                     #T(Host,IP){a|1.1.1.1}; Cfg.Debug:true; Cfg.Debug ? Log:Verbose : Log:Info";
        let statements = decode(input, &mut reg).unwrap();
        let forms: Vec<&str> = statements.iter().map(Statement::form).collect();
        assert_eq!(forms, vec!["map", "entity", "table", "assign", "ternary"]);

        let Statement::Entity(lit) = &statements[1] else {
            panic!("expected entity literal");
        };
        assert_eq!(lit.kind.as_deref(), Some("User"));
        assert_eq!(lit.attributes.get("Status"), Some(&Value::text("Active")));
    }

    #[test]
    fn test_fenced_input() {
        let mut reg = SymbolRegistry::new();
        let statements = decode("```\nA{x:1}\n```", &mut reg).unwrap();
        assert_eq!(statements.len(), 1);
    }

    #[test]
    fn test_stray_separators_ignored() {
        let mut reg = SymbolRegistry::new();
        let statements = decode(";; A{x:1};; B{y:2};", &mut reg).unwrap();
        assert_eq!(statements.len(), 2);
    }

    #[test]
    fn test_missing_separator_rejected() {
        let mut reg = SymbolRegistry::new();
        assert!(matches!(
            decode("A{x:1} B{y:2}", &mut reg),
            Err(CodecError::Syntax { .. })
        ));
    }

    #[test]
    fn test_bare_word_rejected() {
        let mut reg = SymbolRegistry::new();
        assert!(decode("hello world", &mut reg).is_err());
    }

    #[test]
    fn test_encode_inverts_decode() {
        let mut reg = SymbolRegistry::new();
        let input = "@Map{S=Status}; Job{S:queued}; @Base{Tier:1};[Base|Base{Tier:2}]; \"S\"{x:1}";
        let statements = decode(input, &mut reg).unwrap();

        let mut enc_reg = SymbolRegistry::new();
        let text = encode(&statements, &mut enc_reg).unwrap();
        let mut dec_reg = SymbolRegistry::new();
        assert_eq!(decode(&text, &mut dec_reg).unwrap(), statements);
    }
}
