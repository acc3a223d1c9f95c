use crate::error::{CodecError, Result};
use crate::lexer::{Token, TokenKind, tokenize};
use crate::registry::SymbolRegistry;
use crate::value::{Attributes, Value};

use super::path::Path;

/// Token cursor shared by every literal form.
///
/// Bare words are alias-expanded through the registry passed to each call;
/// quoted strings never are.
pub(crate) struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    pub fn new(input: &str) -> Result<Self> {
        Ok(Self::from_tokens(tokenize(input)?))
    }

    /// `tokens` must end with an `Eof` token.
    pub fn from_tokens(tokens: Vec<Token>) -> Self {
        Self { tokens, pos: 0 }
    }

    pub fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    pub fn peek_kind(&self) -> &TokenKind {
        &self.peek().kind
    }

    pub fn peek_at(&self, n: usize) -> &TokenKind {
        &self.tokens[(self.pos + n).min(self.tokens.len() - 1)].kind
    }

    pub fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    pub fn is_eof(&self) -> bool {
        matches!(self.peek_kind(), TokenKind::Eof)
    }

    pub fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.peek_kind() == kind {
            self.advance();
            true
        } else {
            false
        }
    }

    pub fn expect(&mut self, kind: &TokenKind, what: &str) -> Result<Token> {
        if self.peek_kind() == kind {
            Ok(self.advance())
        } else {
            Err(self.error(format!(
                "expected {what}, found {}",
                self.peek_kind().describe()
            )))
        }
    }

    pub fn error(&self, message: impl Into<String>) -> CodecError {
        CodecError::syntax(self.peek().offset, message)
    }

    /// True when the next token closes the current statement.
    pub fn at_statement_end(&self) -> bool {
        let token = self.peek();
        matches!(token.kind, TokenKind::Eof | TokenKind::Semi) || (self.pos > 0 && token.newline)
    }

    pub fn finish_statement(&mut self) -> Result<()> {
        if self.eat(&TokenKind::Semi) || self.at_statement_end() {
            Ok(())
        } else {
            Err(self.error(format!(
                "expected ';' or end of statement, found {}",
                self.peek_kind().describe()
            )))
        }
    }

    /// Skip empty statements (stray `;`).
    pub fn skip_separators(&mut self) {
        while self.eat(&TokenKind::Semi) {}
    }

    /// Collect the remaining tokens of the current statement without
    /// consuming the terminator.
    pub fn take_statement_tokens(&mut self) -> Vec<Token> {
        let mut taken = Vec::new();
        while !self.at_statement_end() {
            taken.push(self.advance());
        }
        let end = self.peek().offset;
        taken.push(Token {
            kind: TokenKind::Eof,
            offset: end,
            spaced: false,
            newline: false,
        });
        taken
    }

    /// A name without alias expansion (alias definitions, map entries).
    pub fn parse_raw_name(&mut self, what: &str) -> Result<String> {
        match self.peek_kind().clone() {
            TokenKind::Word(w) | TokenKind::Quoted(w) => {
                self.advance();
                Ok(w)
            }
            other => Err(self.error(format!("expected {what}, found {}", other.describe()))),
        }
    }

    /// An attribute key or entity name, alias-expanded when bare.
    pub fn parse_name(&mut self, registry: &SymbolRegistry, what: &str) -> Result<String> {
        match self.peek_kind().clone() {
            TokenKind::Word(w) => {
                self.advance();
                Ok(registry.expand(&w).to_string())
            }
            TokenKind::Quoted(q) => {
                self.advance();
                Ok(q)
            }
            other => Err(self.error(format!("expected {what}, found {}", other.describe()))),
        }
    }

    pub fn parse_value(&mut self, registry: &SymbolRegistry) -> Result<Value> {
        match self.peek_kind().clone() {
            TokenKind::Word(w) => {
                self.advance();
                Ok(scalar_from_word(&w, registry))
            }
            TokenKind::Quoted(q) => {
                self.advance();
                Ok(Value::Text(q))
            }
            TokenKind::Amp => {
                self.advance();
                let name = self.parse_name(registry, "a reference target")?;
                Ok(Value::Ref(name))
            }
            other => Err(self.error(format!("expected a value, found {}", other.describe()))),
        }
    }

    /// `{key:value, key:value}`; entries may be separated by `,` or `|`.
    pub fn parse_attributes(&mut self, registry: &SymbolRegistry) -> Result<Attributes> {
        self.expect(&TokenKind::LBrace, "'{'")?;
        let mut attributes = Attributes::new();
        if self.eat(&TokenKind::RBrace) {
            return Ok(attributes);
        }
        loop {
            let key = self.parse_name(registry, "an attribute key")?;
            self.expect(&TokenKind::Colon, "':' after attribute key")?;
            let value = self.parse_value(registry)?;
            attributes.insert(key, value);

            match self.peek_kind() {
                TokenKind::Comma | TokenKind::Pipe => {
                    self.advance();
                }
                TokenKind::RBrace => {
                    self.advance();
                    return Ok(attributes);
                }
                other => {
                    return Err(self.error(format!(
                        "expected ',' or '}}' in attribute list, found {}",
                        other.describe()
                    )));
                }
            }
        }
    }

    /// A dotted path. Adjacent quoted tokens form literal segments, so
    /// `Cfg."a.b".Port` has three segments.
    pub fn parse_path(&mut self, registry: &SymbolRegistry) -> Result<Path> {
        let start = self.peek().offset;
        let mut run: Vec<TokenKind> = Vec::new();
        loop {
            let token = self.peek();
            let joinable = matches!(token.kind, TokenKind::Word(_) | TokenKind::Quoted(_));
            if !joinable || (!run.is_empty() && token.spaced) {
                break;
            }
            run.push(self.advance().kind);
        }
        if run.is_empty() {
            return Err(self.error(format!(
                "expected a path, found {}",
                self.peek_kind().describe()
            )));
        }

        let mut segments = Vec::new();
        let last = run.len() - 1;
        for (i, kind) in run.iter().enumerate() {
            match kind {
                TokenKind::Quoted(q) => {
                    if i > 0 && matches!(run[i - 1], TokenKind::Quoted(_)) {
                        return Err(CodecError::syntax(
                            start,
                            "quoted path segments need a '.' between them",
                        ));
                    }
                    segments.push(q.clone());
                }
                TokenKind::Word(w) => {
                    let mut body = w.as_str();
                    if i > 0 {
                        body = body.strip_prefix('.').ok_or_else(|| {
                            CodecError::syntax(start, "expected '.' after quoted path segment")
                        })?;
                    }
                    if i < last && !(i > 0 && body.is_empty()) {
                        body = body.strip_suffix('.').ok_or_else(|| {
                            CodecError::syntax(start, "expected '.' before quoted path segment")
                        })?;
                    }
                    if body.is_empty() {
                        if i > 0 && i < last {
                            continue;
                        }
                        return Err(CodecError::syntax(start, "empty path segment"));
                    }
                    for piece in body.split('.') {
                        if piece.is_empty() {
                            return Err(CodecError::syntax(start, "empty path segment"));
                        }
                        segments.push(registry.expand(piece).to_string());
                    }
                }
                _ => {}
            }
        }

        Path::new(segments).ok_or_else(|| CodecError::syntax(start, "empty path segment"))
    }
}

/// Interpret a bare word: booleans, integers, otherwise alias-expanded text.
pub(crate) fn scalar_from_word(word: &str, registry: &SymbolRegistry) -> Value {
    match word {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => match word.parse::<i64>() {
            Ok(n) => Value::Int(n),
            Err(_) => Value::Text(registry.expand(word).to_string()),
        },
    }
}
