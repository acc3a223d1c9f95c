use std::fs;
use std::path::Path;

use otp_core::serde_compat::{WireSession, parse_json};

use crate::error::{Result, StoreError};
use crate::store::{SessionRecord, Store, write_turns};
use crate::time::now_iso8601;

impl Store {
    /// Serialize a stored session (turns plus replayed snapshot) as JSON.
    pub fn export_json_string(&self, record: &SessionRecord) -> Result<String> {
        let session = self.load_session(record.id)?;
        let mut wire = WireSession::from_session(&session, &record.name, &record.model)?;
        wire.exported_at = Some(now_iso8601());
        serde_json::to_string_pretty(&wire)
            .map_err(|e| StoreError::InvalidData(format!("JSON export failed: {e}")))
    }

    pub fn export_json_file(&self, record: &SessionRecord, path: &Path) -> Result<()> {
        let json = self.export_json_string(record)?;
        fs::write(path, json)
            .map_err(|e| StoreError::Io(format!("failed to write {}: {e}", path.display())))
    }

    /// Import a JSON export as a new session. The turns are replayed and
    /// checked before anything is written, and the session row and its turns
    /// are written in one transaction. `name` overrides the stored name.
    pub fn import_json_str(&self, json: &str, name: Option<&str>) -> Result<SessionRecord> {
        let wire = parse_json(json)?;
        let name = [name.unwrap_or_default(), wire.name.as_str()]
            .into_iter()
            .find(|n| !n.trim().is_empty())
            .unwrap_or("imported")
            .to_string();
        let model = wire.model.clone();
        let turns = wire.turns.clone();
        wire.into_session()?;

        let tx = self.conn().unchecked_transaction()?;
        let record = self.create_session(&name, &model)?;
        write_turns(&tx, record.id, &turns)?;
        tx.commit()?;
        tracing::info!("imported {} turns into session '{}'", turns.len(), record.name);
        self.get_session(record.id)
    }

    pub fn import_json_file(&self, path: &Path, name: Option<&str>) -> Result<SessionRecord> {
        let json = fs::read_to_string(path)
            .map_err(|e| StoreError::Io(format!("failed to read {}: {e}", path.display())))?;
        self.import_json_str(&json, name)
    }
}
