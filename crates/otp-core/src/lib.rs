//! Origami Thought Protocol core: a deterministic codec and state log for
//! symbolically compressed conversation state.
//!
//! Three pieces:
//!
//! - [`SymbolRegistry`]: session-scoped alias ↔ canonical name map.
//! - [`codec`]: decode/encode of the literal forms (symbol maps, tables,
//!   delta families, entity literals, flattened paths, ternaries).
//! - [`StateStore`]: append-only log of turns with point-in-time replay.
//!
//! [`Session`] ties them together. Zero I/O: transport, persistence and the
//! model call live in other crates.

pub mod codec;
pub mod error;
pub mod lexer;
pub mod prompt;
pub mod registry;
pub mod serde_compat;
pub mod session;
pub mod state;
pub mod value;

pub use codec::path::{Assignment, Branch, Path, Ternary};
pub use codec::{Decoder, Statement, decode, encode};
pub use error::{CodecError, Result};
pub use prompt::{Completion, DEFAULT_MODEL, MODELS, PromptFrame, SYSTEM_PROMPT, is_known_model};
pub use registry::{Binding, SymbolRegistry};
pub use serde_compat::{CURRENT_VERSION, ImportError, WireSession, export_json, import_json};
pub use session::{AppendOutcome, Resolution, Session};
pub use state::{Change, Snapshot, StateDelta, StateStore};
pub use value::{Attributes, Entity, Value};
