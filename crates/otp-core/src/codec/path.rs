//! Flattened paths, path assignments and ternaries.
//!
//! `Cfg.Net.Port:80` is a path assignment; `Cfg.Debug ? Log:Verbose : Log:Info`
//! is a ternary whose branches are either assignments or plain values.

use std::fmt;

use crate::error::{CodecError, Result};
use crate::lexer::{Token, TokenKind};
use crate::registry::SymbolRegistry;
use crate::value::Value;

use super::emit;
use super::parser::Parser;

/// Dotted attribute path. Never empty; no segment is empty.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Path {
    segments: Vec<String>,
}

impl Path {
    pub fn new(segments: Vec<String>) -> Option<Self> {
        if segments.is_empty() || segments.iter().any(String::is_empty) {
            None
        } else {
            Some(Self { segments })
        }
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn root(&self) -> &str {
        &self.segments[0]
    }

    pub fn leaf(&self) -> &str {
        &self.segments[self.segments.len() - 1]
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Canonical entity name of the first `n` segments.
    pub fn prefix_name(&self, n: usize) -> String {
        self.segments[..n].join(".")
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments.join("."))
    }
}

/// `path:value`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Assignment {
    pub path: Path,
    pub value: Value,
}

/// One arm of a ternary.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Branch {
    Assign(Assignment),
    Value(Value),
}

impl fmt::Display for Branch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Branch::Assign(a) => write!(f, "{}:{}", a.path, a.value),
            Branch::Value(v) => write!(f, "{v}"),
        }
    }
}

/// `condition ? then : otherwise`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Ternary {
    pub condition: Path,
    pub then: Branch,
    pub otherwise: Branch,
}

impl Ternary {
    pub fn select(&self, condition: bool) -> &Branch {
        if condition { &self.then } else { &self.otherwise }
    }
}

// --- Decode ---

impl Parser {
    pub(crate) fn parse_assignment_rest(
        &mut self,
        path: Path,
        registry: &SymbolRegistry,
    ) -> Result<Assignment> {
        self.expect(&TokenKind::Colon, "':'")?;
        let value = self.parse_value(registry)?;
        Ok(Assignment { path, value })
    }

    /// Parse the branches after `condition ?` up to the end of the statement.
    pub(crate) fn parse_ternary_rest(
        &mut self,
        condition: Path,
        registry: &SymbolRegistry,
    ) -> Result<Ternary> {
        let question = self.expect(&TokenKind::Question, "'?'")?;
        let tokens = self.take_statement_tokens();
        let body = &tokens[..tokens.len() - 1];

        let colons: Vec<usize> = body
            .iter()
            .enumerate()
            .filter(|(_, t)| t.kind == TokenKind::Colon)
            .map(|(i, _)| i)
            .collect();

        let split = match colons.as_slice() {
            [only] => *only,
            [_, middle, _] => *middle,
            [a, b] => match (body[*a].spaced, body[*b].spaced) {
                (true, false) => *a,
                (false, true) => *b,
                _ => {
                    return Err(CodecError::syntax(
                        body[*a].offset,
                        "ambiguous ternary: surround the branch separator ':' with spaces",
                    ));
                }
            },
            _ => {
                return Err(CodecError::syntax(
                    question.offset,
                    "ternary needs exactly one ':' between its branches",
                ));
            }
        };

        let then = parse_branch(&body[..split], body[split].offset, registry)?;
        let end = tokens[tokens.len() - 1].offset;
        let otherwise = parse_branch(&body[split + 1..], end, registry)?;
        Ok(Ternary {
            condition,
            then,
            otherwise,
        })
    }
}

fn parse_branch(tokens: &[Token], end: usize, registry: &SymbolRegistry) -> Result<Branch> {
    let mut owned = tokens.to_vec();
    owned.push(Token {
        kind: TokenKind::Eof,
        offset: end,
        spaced: false,
        newline: false,
    });
    let has_colon = tokens.iter().any(|t| t.kind == TokenKind::Colon);
    let mut parser = Parser::from_tokens(owned);

    let branch = if has_colon {
        let path = parser.parse_path(registry)?;
        Branch::Assign(parser.parse_assignment_rest(path, registry)?)
    } else {
        Branch::Value(parser.parse_value(registry)?)
    };

    if !parser.is_eof() {
        return Err(parser.error(format!(
            "unexpected {} in ternary branch",
            parser.peek_kind().describe()
        )));
    }
    Ok(branch)
}

/// Decode a bare dotted path.
pub fn decode_path(input: &str, registry: &SymbolRegistry) -> Result<Path> {
    let mut parser = Parser::new(input)?;
    let path = parser.parse_path(registry)?;
    if !parser.is_eof() {
        return Err(parser.error("trailing input after path"));
    }
    Ok(path)
}

/// Decode a single `condition ? A : B` statement.
pub fn decode_ternary(input: &str, registry: &SymbolRegistry) -> Result<Ternary> {
    let mut parser = Parser::new(input)?;
    let condition = parser.parse_path(registry)?;
    let ternary = parser.parse_ternary_rest(condition, registry)?;
    parser.finish_statement()?;
    if !parser.is_eof() {
        return Err(parser.error("trailing input after ternary"));
    }
    Ok(ternary)
}

// --- Encode ---

pub fn encode_path(path: &Path, registry: &SymbolRegistry) -> String {
    path.segments
        .iter()
        .map(|s| emit::segment(s, registry))
        .collect::<Vec<_>>()
        .join(".")
}

pub fn encode_assignment(assignment: &Assignment, registry: &SymbolRegistry) -> String {
    format!(
        "{}:{}",
        encode_path(&assignment.path, registry),
        emit::value(&assignment.value, registry)
    )
}

fn encode_branch(branch: &Branch, registry: &SymbolRegistry) -> String {
    match branch {
        Branch::Assign(a) => encode_assignment(a, registry),
        Branch::Value(v) => emit::value(v, registry),
    }
}

pub fn encode_ternary(ternary: &Ternary, registry: &SymbolRegistry) -> String {
    format!(
        "{} ? {} : {}",
        encode_path(&ternary.condition, registry),
        encode_branch(&ternary.then, registry),
        encode_branch(&ternary.otherwise, registry)
    )
}
