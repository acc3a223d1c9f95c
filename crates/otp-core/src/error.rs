//! Codec and session error taxonomy.
//!
//! Every variant is recoverable at the turn level: a failed decode discards
//! the offending message and leaves the session at its last good state.

/// Errors raised while decoding compressed text or querying session state.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    /// Alias is already bound to a different canonical name.
    #[error("alias '{alias}' is already bound to '{existing}' (attempted '{attempted}')")]
    DuplicateAlias {
        alias: String,
        existing: String,
        attempted: String,
    },

    /// Alias is not registered in this session.
    #[error("unknown alias '{0}'")]
    UnknownAlias(String),

    /// Alias token is not identifier-shaped.
    #[error("invalid alias '{0}': aliases must match [A-Za-z_][A-Za-z0-9_]*")]
    InvalidAlias(String),

    /// Table header or body is structurally broken.
    #[error("malformed table: {0}")]
    MalformedTable(String),

    /// A table row does not have the header's arity.
    #[error("table row {row} has {found} cells, header has {expected}")]
    ArityMismatch {
        row: usize,
        expected: usize,
        found: usize,
    },

    /// Path root (or an intermediate segment) is not present in current state.
    #[error("unresolved path '{0}'")]
    UnresolvedPath(String),

    /// Ternary condition did not resolve to a boolean.
    #[error("path '{path}' is not a boolean (found {found})")]
    NotBoolean { path: String, found: String },

    /// Base block or variant list is structurally broken.
    #[error("malformed delta: {0}")]
    MalformedDelta(String),

    /// Variant list references a base no earlier turn defined.
    #[error("unknown delta base '{0}'")]
    UnknownBase(String),

    /// Generic syntax error at a byte offset in the input.
    #[error("syntax error at byte {offset}: {message}")]
    Syntax { offset: usize, message: String },

    /// Reconstruction requested past the end of the log.
    #[error("turn {index} does not exist (log has {len} turns)")]
    UnknownTurn { index: usize, len: usize },
}

impl CodecError {
    pub(crate) fn syntax(offset: usize, message: impl Into<String>) -> Self {
        CodecError::Syntax {
            offset,
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CodecError>;
