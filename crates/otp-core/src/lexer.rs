//! Tokenizer for the compact literal syntax.
//!
//! Punctuation is a fixed set of single characters; everything else up to
//! the next punctuation or whitespace is a bare word. Dots are word
//! characters, so `1.1.1.1` and `Cfg.Debug` each lex as one word and paths
//! are split later by the parser.

use crate::error::{CodecError, Result};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TokenKind {
    Word(String),
    Quoted(String),
    Hash,
    At,
    Amp,
    LBrace,
    RBrace,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Pipe,
    Semi,
    Comma,
    Colon,
    Equals,
    Question,
    Eof,
}

impl TokenKind {
    pub fn describe(&self) -> String {
        match self {
            TokenKind::Word(w) => format!("'{w}'"),
            TokenKind::Quoted(q) => format!("\"{q}\""),
            TokenKind::Eof => "end of input".to_string(),
            other => format!("'{}'", punct_char(other).unwrap_or('?')),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    /// Byte offset of the token start.
    pub offset: usize,
    /// Whitespace precedes the token.
    pub spaced: bool,
    /// A newline precedes the token.
    pub newline: bool,
}

const PUNCT: &[(char, TokenKind)] = &[
    ('#', TokenKind::Hash),
    ('@', TokenKind::At),
    ('&', TokenKind::Amp),
    ('{', TokenKind::LBrace),
    ('}', TokenKind::RBrace),
    ('(', TokenKind::LParen),
    (')', TokenKind::RParen),
    ('[', TokenKind::LBracket),
    (']', TokenKind::RBracket),
    ('|', TokenKind::Pipe),
    (';', TokenKind::Semi),
    (',', TokenKind::Comma),
    (':', TokenKind::Colon),
    ('=', TokenKind::Equals),
    ('?', TokenKind::Question),
];

fn punct_kind(c: char) -> Option<TokenKind> {
    PUNCT
        .iter()
        .find(|(p, _)| *p == c)
        .map(|(_, kind)| kind.clone())
}

fn punct_char(kind: &TokenKind) -> Option<char> {
    PUNCT.iter().find(|(_, k)| k == kind).map(|(c, _)| *c)
}

/// Characters that end a bare word.
pub fn is_special(c: char) -> bool {
    c == '"' || c.is_whitespace() || punct_kind(c).is_some()
}

/// Tokenize `input`. The returned vector always ends with an `Eof` token.
pub fn tokenize(input: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();
    let mut spaced = false;
    let mut newline = false;

    while let Some(&(offset, c)) = chars.peek() {
        if c.is_whitespace() {
            spaced = true;
            newline |= c == '\n';
            chars.next();
            continue;
        }

        let kind = if c == '"' {
            chars.next();
            let mut text = String::new();
            let mut closed = false;
            while let Some((_, ch)) = chars.next() {
                match ch {
                    '"' => {
                        closed = true;
                        break;
                    }
                    '\\' => match chars.next() {
                        Some((_, 'n')) => text.push('\n'),
                        Some((_, esc)) => text.push(esc),
                        None => break,
                    },
                    other => text.push(other),
                }
            }
            if !closed {
                return Err(CodecError::syntax(offset, "unterminated quoted string"));
            }
            TokenKind::Quoted(text)
        } else if let Some(kind) = punct_kind(c) {
            chars.next();
            kind
        } else {
            let mut word = String::new();
            while let Some(&(_, ch)) = chars.peek() {
                if is_special(ch) {
                    break;
                }
                word.push(ch);
                chars.next();
            }
            TokenKind::Word(word)
        };

        tokens.push(Token {
            kind,
            offset,
            spaced,
            newline,
        });
        spaced = false;
        newline = false;
    }

    tokens.push(Token {
        kind: TokenKind::Eof,
        offset: input.len(),
        spaced,
        newline,
    });
    Ok(tokens)
}

/// Quote `s` as a string literal, escaping quotes, backslashes and newlines.
pub fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            other => out.push(other),
        }
    }
    out.push('"');
    out
}

/// Strip Markdown code fences and wrapping backticks from model output.
pub fn strip_fences(input: &str) -> &str {
    let mut text = input.trim();
    if let Some(rest) = text.strip_prefix("```") {
        // Drop the info string (e.g. ```otp) up to the first newline. A
        // fence closed on the same line has no info string.
        text = rest.split_once('\n').map_or(rest, |(_, body)| body);
        text = text.trim_end();
        text = text.strip_suffix("```").unwrap_or(text);
    } else if text.len() >= 2 && text.starts_with('`') && text.ends_with('`') {
        text = &text[1..text.len() - 1];
    }
    text.trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<TokenKind> {
        tokenize(input).unwrap().into_iter().map(|t| t.kind).collect()
    }

    fn word(s: &str) -> TokenKind {
        TokenKind::Word(s.to_string())
    }

    #[test]
    fn test_table_tokens() {
        assert_eq!(
            kinds("#T(Host,IP){A|1.1.1.1}"),
            vec![
                TokenKind::Hash,
                word("T"),
                TokenKind::LParen,
                word("Host"),
                TokenKind::Comma,
                word("IP"),
                TokenKind::RParen,
                TokenKind::LBrace,
                word("A"),
                TokenKind::Pipe,
                word("1.1.1.1"),
                TokenKind::RBrace,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_quoted_escapes() {
        assert_eq!(
            kinds(r#""a \"b\" \\ c\nd""#),
            vec![TokenKind::Quoted("a \"b\" \\ c\nd".to_string()), TokenKind::Eof]
        );
    }

    #[test]
    fn test_unterminated_quote() {
        assert!(matches!(
            tokenize("\"open"),
            Err(CodecError::Syntax { offset: 0, .. })
        ));
    }

    #[test]
    fn test_spacing_flags() {
        let tokens = tokenize("a ? b:c\nd").unwrap();
        assert!(!tokens[0].spaced);
        assert!(tokens[1].spaced);
        assert!(!tokens[3].spaced);
        assert!(tokens[5].newline);
        assert_eq!(tokens[5].kind, word("d"));
    }

    #[test]
    fn test_quote_roundtrip_through_lexer() {
        let s = "tab\there \"q\" back\\slash\nline";
        assert_eq!(kinds(&quote(s)), vec![TokenKind::Quoted(s.to_string()), TokenKind::Eof]);
    }

    #[test]
    fn test_strip_fences() {
        assert_eq!(strip_fences("```\n@Map{U=User}\n```"), "@Map{U=User}");
        assert_eq!(strip_fences("```otp\nA{x:1}\n```\n"), "A{x:1}");
        assert_eq!(strip_fences("`A{x:1}`"), "A{x:1}");
        assert_eq!(strip_fences("  A{x:1}  "), "A{x:1}");
    }

    #[test]
    fn test_strip_single_line_fence() {
        assert_eq!(strip_fences("```A{x:1}```"), "A{x:1}");
        assert_eq!(strip_fences("``` Cfg.Debug:true ```\n"), "Cfg.Debug:true");
    }
}
