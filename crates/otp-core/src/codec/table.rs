//! Schema-first tables: `#T(Host,IP){A|1.1.1.1;B|2.2.2.2}`.

use std::collections::HashSet;

use crate::error::{CodecError, Result};
use crate::lexer::TokenKind;
use crate::registry::SymbolRegistry;
use crate::value::{Entity, Value};

use super::emit;
use super::parser::Parser;

/// Ordered header plus rows of equal arity.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TableBlock {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl TableBlock {
    /// Build a table, checking every row against the header arity.
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Result<Self> {
        let table = Self { columns, rows };
        table.validate()?;
        Ok(table)
    }

    pub fn validate(&self) -> Result<()> {
        if self.columns.is_empty() {
            return Err(CodecError::MalformedTable("header has no columns".into()));
        }
        let mut seen = HashSet::new();
        for column in &self.columns {
            if !seen.insert(column.as_str()) {
                return Err(CodecError::MalformedTable(format!(
                    "duplicate column '{column}'"
                )));
            }
        }
        for (i, row) in self.rows.iter().enumerate() {
            if row.len() != self.columns.len() {
                return Err(CodecError::ArityMismatch {
                    row: i,
                    expected: self.columns.len(),
                    found: row.len(),
                });
            }
        }
        Ok(())
    }

    /// One entity per row, keyed by the first column's value. The remaining
    /// columns become attributes; a repeated key merges field by field.
    pub fn entities(&self) -> Vec<Entity> {
        let mut out: Vec<Entity> = Vec::with_capacity(self.rows.len());
        for row in &self.rows {
            let Some(key) = row.first() else { continue };
            let name = key.as_name();
            let mut entity = Entity::new(name.clone());
            for (column, value) in self.columns.iter().zip(row).skip(1) {
                entity.attributes.insert(column.clone(), value.clone());
            }
            match out.iter_mut().find(|e| e.name == name) {
                Some(existing) => existing.merge(&entity),
                None => out.push(entity),
            }
        }
        out
    }
}

fn malformed(err: CodecError) -> CodecError {
    match err {
        CodecError::Syntax { offset, message } => {
            CodecError::MalformedTable(format!("{message} (byte {offset})"))
        }
        other => other,
    }
}

impl Parser {
    /// Parse a table starting at `#`.
    pub(crate) fn parse_table(&mut self, registry: &SymbolRegistry) -> Result<TableBlock> {
        self.parse_table_inner(registry).map_err(malformed)
    }

    fn parse_table_inner(&mut self, registry: &SymbolRegistry) -> Result<TableBlock> {
        self.expect(&TokenKind::Hash, "'#'")?;
        match self.peek_kind() {
            TokenKind::Word(w) if w == "T" => {
                self.advance();
            }
            other => {
                return Err(self.error(format!(
                    "expected table marker 'T' after '#', found {}",
                    other.describe()
                )));
            }
        }

        self.expect(&TokenKind::LParen, "'(' to open the table header")?;
        let mut columns = Vec::new();
        loop {
            columns.push(self.parse_name(registry, "a column name")?);
            match self.peek_kind() {
                TokenKind::Comma | TokenKind::Pipe => {
                    self.advance();
                }
                TokenKind::RParen => {
                    self.advance();
                    break;
                }
                other => {
                    return Err(self.error(format!(
                        "expected ',' or ')' in table header, found {}",
                        other.describe()
                    )));
                }
            }
        }

        self.expect(&TokenKind::LBrace, "'{' to open the table body")?;
        let mut rows = Vec::new();
        if !self.eat(&TokenKind::RBrace) {
            let mut row = vec![self.parse_value(registry)?];
            loop {
                match self.peek_kind() {
                    TokenKind::Pipe => {
                        self.advance();
                        row.push(self.parse_value(registry)?);
                    }
                    TokenKind::Semi => {
                        self.advance();
                        rows.push(std::mem::take(&mut row));
                        if self.eat(&TokenKind::RBrace) {
                            break;
                        }
                        row.push(self.parse_value(registry)?);
                    }
                    TokenKind::RBrace => {
                        self.advance();
                        rows.push(row);
                        break;
                    }
                    other => {
                        return Err(self.error(format!(
                            "expected '|', ';' or '}}' in table body, found {}",
                            other.describe()
                        )));
                    }
                }
            }
        }

        TableBlock::new(columns, rows)
    }
}

/// Decode a single table literal.
pub fn decode_table(input: &str, registry: &SymbolRegistry) -> Result<TableBlock> {
    let mut parser = Parser::new(input).map_err(malformed)?;
    let table = parser.parse_table(registry)?;
    parser.finish_statement().map_err(malformed)?;
    if !parser.is_eof() {
        return Err(CodecError::MalformedTable("trailing input after table".into()));
    }
    Ok(table)
}

pub fn encode_table(table: &TableBlock, registry: &SymbolRegistry) -> String {
    let header: Vec<String> = table
        .columns
        .iter()
        .map(|c| emit::name(c, registry))
        .collect();
    let rows: Vec<String> = table
        .rows
        .iter()
        .map(|row| {
            row.iter()
                .map(|v| emit::value(v, registry))
                .collect::<Vec<_>>()
                .join("|")
        })
        .collect();
    format!("#T({}){{{}}}", header.join(","), rows.join(";"))
}
