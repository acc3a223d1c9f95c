//! JSON serde for the session wire format.
//!
//! A session travels as its turns in literal syntax plus the head snapshot.
//! Import re-decodes the turns in a fresh session and checks the result
//! against the recorded snapshot, so a hand-edited file cannot smuggle in
//! state the turns do not produce.

use serde::{Deserialize, Serialize};

use crate::error::CodecError;
use crate::prompt::DEFAULT_MODEL;
use crate::session::Session;
use crate::state::Snapshot;

pub const CURRENT_VERSION: &str = "1";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct WireSession {
    pub version: String,
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(rename = "exportedAt", default, skip_serializing_if = "Option::is_none")]
    pub exported_at: Option<String>,
    pub turns: Vec<String>,
    /// Omitted snapshots are not checked on import.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<Snapshot>,
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

impl WireSession {
    pub fn from_session(session: &Session, name: &str, model: &str) -> Result<Self, CodecError> {
        Ok(Self {
            version: CURRENT_VERSION.to_string(),
            name: name.to_string(),
            model: model.to_string(),
            exported_at: None,
            turns: session.export_turns()?,
            snapshot: Some(session.snapshot().clone()),
        })
    }

    pub fn into_session(self) -> Result<Session, ImportError> {
        let mut session = Session::new();
        for (turn, text) in self.turns.iter().enumerate() {
            session
                .append(text)
                .map_err(|source| ImportError::Codec { turn, source })?;
        }
        if let Some(expected) = &self.snapshot
            && expected != session.snapshot()
        {
            return Err(ImportError::SnapshotMismatch);
        }
        Ok(session)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("invalid session JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unsupported session format version '{0}'")]
    Version(String),

    #[error("turn {turn} does not decode: {source}")]
    Codec { turn: usize, source: CodecError },

    #[error("replayed turns do not reproduce the recorded snapshot")]
    SnapshotMismatch,

    #[error("session does not encode: {0}")]
    Encode(CodecError),
}

pub fn parse_json(json: &str) -> Result<WireSession, ImportError> {
    let wire: WireSession = serde_json::from_str(json)?;
    if wire.version != CURRENT_VERSION {
        return Err(ImportError::Version(wire.version));
    }
    Ok(wire)
}

/// Parse and replay a JSON export into a fresh session.
pub fn import_json(json: &str) -> Result<Session, ImportError> {
    parse_json(json)?.into_session()
}

pub fn export_json(session: &Session, name: &str, model: &str) -> Result<String, ImportError> {
    let wire = WireSession::from_session(session, name, model).map_err(ImportError::Encode)?;
    Ok(serde_json::to_string_pretty(&wire)?)
}
