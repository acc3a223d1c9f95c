//! `config.toml` in the data directory.
//!
//! ```toml
//! model = "gemini-2.5-flash"
//!
//! [inference]
//! command = "gemini-wrapper"
//! args = ["--json"]
//! ```

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use otp_core::DEFAULT_MODEL;

use crate::error::{Result, StoreError};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub inference: InferenceConfig,
}

/// External command that turns a prompt on stdin into a reply on stdout.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InferenceConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model: default_model(),
            inference: InferenceConfig::default(),
        }
    }
}

impl Config {
    /// Read `path`; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        match fs::read_to_string(path) {
            Ok(text) => Self::parse(&text)
                .map_err(|e| StoreError::Config(format!("{}: {e}", path.display()))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(StoreError::Io(format!(
                "failed to read {}: {e}",
                path.display()
            ))),
        }
    }

    pub fn parse(text: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let text = toml::to_string_pretty(self)
            .map_err(|e| StoreError::Config(format!("failed to serialize config: {e}")))?;
        fs::write(path, text)
            .map_err(|e| StoreError::Io(format!("failed to write {}: {e}", path.display())))
    }
}
