use std::path::{Path, PathBuf};
use std::{env, fs};

use otp_core::Session;

use crate::config::Config;
use crate::error::{Result, StoreError};
use crate::store::{SessionRecord, Store};
use crate::time::{file_stamp, now_unix_secs};

/// Overrides the data directory (tests, multiple profiles).
pub const DATA_DIR_ENV: &str = "OTP_DATA_DIR";

const DB_FILE: &str = "otp.db";
const CONFIG_FILE: &str = "config.toml";
const EXPORTS_DIR: &str = "exports";
const DEFAULT_SESSION: &str = "default";

/// Files written by [`Workspace::export_text`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextExport {
    /// Literal-syntax dump, one turn per line.
    pub state: PathBuf,
    /// Header plus every message in `[timestamp] ROLE:` form.
    pub transcript: PathBuf,
}

/// `$OTP_DATA_DIR`, else `~/.otp`.
pub fn default_base_dir() -> PathBuf {
    env::var_os(DATA_DIR_ENV)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| dirs_home().join(".otp"))
}

fn dirs_home() -> PathBuf {
    env::var("HOME")
        .or_else(|_| env::var("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
}

/// The data directory: database, config and text exports.
pub struct Workspace {
    base: PathBuf,
    store: Store,
    config: Config,
}

impl Workspace {
    /// Open (creating as needed) the data directory.
    /// `base_dir` overrides [`default_base_dir`].
    pub fn open(base_dir: Option<&Path>) -> Result<Self> {
        let base = base_dir.map(PathBuf::from).unwrap_or_else(default_base_dir);
        fs::create_dir_all(&base).map_err(|e| {
            StoreError::Io(format!("failed to create {}: {e}", base.display()))
        })?;

        let store = Store::open(&base.join(DB_FILE))?;
        let config = Config::load(&base.join(CONFIG_FILE))?;
        Ok(Self {
            base,
            store,
            config,
        })
    }

    /// In-memory store with default config; `base` only receives exports.
    pub fn open_in_memory(base: &Path) -> Result<Self> {
        Ok(Self {
            base: base.to_path_buf(),
            store: Store::open_in_memory()?,
            config: Config::default(),
        })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Persist a new default model.
    pub fn set_default_model(&mut self, model: &str) -> Result<()> {
        self.config.model = model.to_string();
        self.config.save(&self.base.join(CONFIG_FILE))
    }

    /// Select a session: by name/id when given, else the current one, else
    /// the most recent, else a fresh `default` session. The choice becomes
    /// current.
    pub fn resolve_session(&self, selector: Option<&str>) -> Result<SessionRecord> {
        let record = match selector {
            Some(sel) => self.store.find_session(sel)?,
            None => match self.store.current_session_id()? {
                Some(id) => self.store.get_session(id)?,
                None => match self.store.list_sessions()?.pop() {
                    Some(latest) => latest,
                    None => self
                        .store
                        .create_session(DEFAULT_SESSION, &self.config.model)?,
                },
            },
        };
        self.store.set_current_session(record.id)?;
        Ok(record)
    }

    pub fn create_session(&self, name: &str, model: Option<&str>) -> Result<SessionRecord> {
        let record = self
            .store
            .create_session(name, model.unwrap_or(&self.config.model))?;
        self.store.set_current_session(record.id)?;
        Ok(record)
    }

    pub fn load(&self, selector: Option<&str>) -> Result<(SessionRecord, Session)> {
        let record = self.resolve_session(selector)?;
        let session = self.store.load_session(record.id)?;
        Ok((record, session))
    }

    /// Write the session to `exports/`: the literal-syntax dump as `.otp`
    /// and the message transcript beside it as `.txt`.
    pub fn export_text(&self, record: &SessionRecord, session: &Session) -> Result<TextExport> {
        let dir = self.base.join(EXPORTS_DIR);
        fs::create_dir_all(&dir)
            .map_err(|e| StoreError::Io(format!("failed to create {}: {e}", dir.display())))?;

        let stem = format!("{}-{}", sanitize(&record.name), file_stamp(now_unix_secs()));
        let state = dir.join(format!("{stem}.otp"));
        let mut body = format!(
            "# session: {}\n# model: {}\n# turns: {}\n",
            record.name,
            record.model,
            session.turns()
        );
        body.push_str(&session.export_state()?);
        body.push('\n');
        write_file(&state, &body)?;

        let transcript = dir.join(format!("{stem}.txt"));
        write_file(&transcript, &self.render_transcript(record)?)?;

        tracing::info!("exported session '{}' to {}", record.name, state.display());
        Ok(TextExport { state, transcript })
    }

    fn render_transcript(&self, record: &SessionRecord) -> Result<String> {
        let rule = |c: char| c.to_string().repeat(40);
        let mut out = format!("OTP - Chat Export\n{}\n\n", rule('='));
        out.push_str(&format!(
            "Session: {}\nModel: {}\nCreated: {}\n\n{}\n\n",
            record.name,
            record.model,
            record.created_at,
            rule('-')
        ));
        for msg in self.store.transcript(record.id)? {
            out.push_str(&format!("{msg}\n\n"));
        }
        Ok(out)
    }
}

fn write_file(path: &Path, body: &str) -> Result<()> {
    fs::write(path, body)
        .map_err(|e| StoreError::Io(format!("failed to write {}: {e}", path.display())))
}

fn sanitize(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '-'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "session".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::store::Role;

    #[test]
    fn test_open_creates_files() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("nested").join("otp");
        let ws = Workspace::open(Some(&base)).unwrap();
        assert!(base.join(DB_FILE).exists());
        assert_eq!(ws.config(), &Config::default());
    }

    #[test]
    fn test_resolve_creates_default_once() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::open_in_memory(dir.path()).unwrap();
        let first = ws.resolve_session(None).unwrap();
        assert_eq!(first.name, DEFAULT_SESSION);
        let again = ws.resolve_session(None).unwrap();
        assert_eq!(again.id, first.id);
        assert_eq!(ws.store().list_sessions().unwrap().len(), 1);
    }

    #[test]
    fn test_selector_switches_current() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::open_in_memory(dir.path()).unwrap();
        let a = ws.create_session("a", None).unwrap();
        let b = ws.create_session("b", Some("gemini-2.5-pro")).unwrap();
        assert_eq!(ws.resolve_session(None).unwrap().id, b.id);
        ws.resolve_session(Some("a")).unwrap();
        assert_eq!(ws.resolve_session(None).unwrap().id, a.id);
        assert_eq!(b.model, "gemini-2.5-pro");
    }

    #[test]
    fn test_set_default_model_persists() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut ws = Workspace::open(Some(dir.path())).unwrap();
            ws.set_default_model("gemini-2.0-flash").unwrap();
        }
        let ws = Workspace::open(Some(dir.path())).unwrap();
        assert_eq!(ws.config().model, "gemini-2.0-flash");
    }

    #[test]
    fn test_export_text() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::open_in_memory(dir.path()).unwrap();
        let (record, mut session) = ws.load(None).unwrap();
        ws.store()
            .commit_turn(record.id, &mut session, "#T(Host,IP){A|1.1.1.1}")
            .unwrap();

        ws.store()
            .add_message(record.id, Role::User, "#T(Host,IP){A|1.1.1.1}")
            .unwrap();
        ws.store()
            .add_message(record.id, Role::Assistant, "ok")
            .unwrap();

        let export = ws.export_text(&record, &session).unwrap();
        let text = fs::read_to_string(&export.state).unwrap();
        assert!(export.state.starts_with(dir.path().join(EXPORTS_DIR)));
        assert!(text.contains("# turns: 1"));
        assert!(text.ends_with("#T(Host,IP){A|1.1.1.1}\n"));

        let transcript = fs::read_to_string(&export.transcript).unwrap();
        assert!(transcript.starts_with("OTP - Chat Export\n"));
        assert!(transcript.contains("Session: default\n"));
        let user = transcript.find("] USER:\n#T(Host,IP){A|1.1.1.1}\n").unwrap();
        let reply = transcript.find("] ASSISTANT:\nok\n").unwrap();
        assert!(user < reply);
    }

    #[test]
    fn test_sanitize() {
        assert_eq!(sanitize("my chat/1"), "my-chat-1");
        assert_eq!(sanitize(""), "session");
    }
}
