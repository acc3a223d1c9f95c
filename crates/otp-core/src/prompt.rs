//! The seam to an external text-completion model.
//!
//! The core never talks to a model itself. It builds a [`PromptFrame`] from
//! the session and hands it to a [`Completion`]; the reply goes back through
//! [`Session::append`](crate::Session::append) like any other message.

use serde::Serialize;

use crate::session::Session;

/// Model names offered by the CLI. Other names are accepted as-is.
pub const MODELS: &[&str] = &[
    "gemini-3-pro-preview",
    "gemini-2.5-pro",
    "gemini-2.5-flash",
    "gemini-2.5-flash-lite",
    "gemini-2.0-flash",
    "gemini-2.0-flash-lite",
];

pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

pub const SYSTEM_PROMPT: &str = "\
You maintain conversation state in a compact symbolic notation. Reply with \
notation only: no prose, no explanations, no Markdown outside a single code \
fence.

Statements are separated by ';' or newlines. Available forms:

  @Map{U=User,S=Status}            define aliases for names used more than twice
  #T(Host,IP){a|1.1.1.1;b|2.2.2.2} table: one record per row, keyed by the first column
  @Base{A:1,B:2};[Base|Base{B:3}]  base object plus variants that override keys
  Base(web){A:0}                   named variant inside a variant list
  Root{Child:V|Other:W}            entity with attributes
  U(John){S:Active}                typed entity
  Cfg.Net.Port:80                  flattened nested path
  Cfg.Debug ? Log:Verbose : Log:Info   conditional on a boolean path

Values are true/false, integers, bare words, \"quoted text\" or &Name \
references. Reuse aliases from CURRENT STATE instead of redefining them; an \
alias can never be rebound to a different name.";

pub fn is_known_model(name: &str) -> bool {
    MODELS.contains(&name)
}

/// Everything a completion backend needs for one turn.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PromptFrame {
    pub model: String,
    pub system: String,
    /// The session so far in literal syntax.
    pub state: String,
    pub user: String,
}

impl PromptFrame {
    pub fn for_session(session: &Session, model: &str, user: &str) -> crate::Result<Self> {
        Ok(Self {
            model: model.to_string(),
            system: SYSTEM_PROMPT.to_string(),
            state: session.export_state()?,
            user: user.to_string(),
        })
    }

    /// Flatten into one prompt string for backends without a separate
    /// system channel.
    pub fn render(&self) -> String {
        let mut out = String::with_capacity(
            self.system.len() + self.state.len() + self.user.len() + 64,
        );
        out.push_str(&self.system);
        out.push_str("\n\nCURRENT STATE:\n");
        if self.state.is_empty() {
            out.push_str("(empty)");
        } else {
            out.push_str(&self.state);
        }
        out.push_str("\n\nINPUT:\n");
        out.push_str(&self.user);
        out.push('\n');
        out
    }
}

/// A text-completion backend.
pub trait Completion {
    type Error: std::error::Error + Send + Sync + 'static;

    fn complete(&self, frame: &PromptFrame) -> Result<String, Self::Error>;
}
