use std::fmt;

use otp_core::{CodecError, ImportError};

#[derive(Debug)]
pub enum StoreError {
    Sqlite(rusqlite::Error),
    /// A turn failed to decode, new or replayed.
    Codec(CodecError),
    Import(ImportError),
    Config(String),
    Io(String),
    NotFound(String),
    InvalidData(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Sqlite(e) => write!(f, "SQLite error: {e}"),
            StoreError::Codec(e) => write!(f, "turn rejected: {e}"),
            StoreError::Import(e) => write!(f, "import failed: {e}"),
            StoreError::Config(msg) => write!(f, "config error: {msg}"),
            StoreError::Io(msg) => write!(f, "I/O error: {msg}"),
            StoreError::NotFound(what) => write!(f, "not found: {what}"),
            StoreError::InvalidData(msg) => write!(f, "invalid data: {msg}"),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::Sqlite(e) => Some(e),
            StoreError::Codec(e) => Some(e),
            StoreError::Import(e) => Some(e),
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Sqlite(e)
    }
}

impl From<CodecError> for StoreError {
    fn from(e: CodecError) -> Self {
        StoreError::Codec(e)
    }
}

impl From<ImportError> for StoreError {
    fn from(e: ImportError) -> Self {
        StoreError::Import(e)
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
