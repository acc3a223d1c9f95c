use std::fmt;
use std::path::Path;
use std::str::FromStr;

use rusqlite::{Connection, OptionalExtension, params};
use serde::Serialize;
use uuid::Uuid;

use otp_core::{AppendOutcome, Session};

use crate::error::{Result, StoreError};
use crate::schema;
use crate::time::now_iso8601;

const CURRENT_SESSION_KEY: &str = "current_session";

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SessionRecord {
    pub id: Uuid,
    pub name: String,
    pub model: String,
    pub created_at: String,
    pub turns: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            "system" => Ok(Role::System),
            other => Err(StoreError::InvalidData(format!("unknown role '{other}'"))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MessageRecord {
    pub role: Role,
    pub content: String,
    pub created_at: String,
}

/// `[YYYY-MM-DD HH:MM:SS] ROLE:` then the content on its own line.
impl fmt::Display for MessageRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stamp = self.created_at.get(..19).unwrap_or(&self.created_at);
        writeln!(
            f,
            "[{}] {}:",
            stamp.replace('T', " "),
            self.role.as_str().to_uppercase()
        )?;
        write!(f, "{}", self.content)
    }
}

pub struct Store {
    conn: Connection,
}

impl Store {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        schema::initialize(&conn)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        schema::initialize(&conn)?;
        Ok(Self { conn })
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    // --- Metadata ---

    pub fn get_metadata(&self, key: &str) -> Result<Option<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT value FROM metadata WHERE key = ?1")?;
        Ok(stmt.query_row([key], |row| row.get(0)).optional()?)
    }

    pub fn set_metadata(&self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO metadata (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }

    // --- Sessions ---

    pub fn create_session(&self, name: &str, model: &str) -> Result<SessionRecord> {
        let name = name.trim();
        if name.is_empty() {
            return Err(StoreError::InvalidData("session name is empty".into()));
        }
        if self.session_by_name(name)?.is_some() {
            return Err(StoreError::InvalidData(format!(
                "a session named '{name}' already exists"
            )));
        }

        let record = SessionRecord {
            id: Uuid::new_v4(),
            name: name.to_string(),
            model: model.to_string(),
            created_at: now_iso8601(),
            turns: 0,
        };
        self.conn.execute(
            "INSERT INTO sessions (id, name, model, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                record.id.to_string(),
                record.name,
                record.model,
                record.created_at
            ],
        )?;
        tracing::info!("created session '{}' ({})", record.name, record.id);
        Ok(record)
    }

    pub fn list_sessions(&self) -> Result<Vec<SessionRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT s.id, s.name, s.model, s.created_at,
                    (SELECT COUNT(*) FROM turns t WHERE t.session_id = s.id)
             FROM sessions s ORDER BY s.created_at, s.rowid",
        )?;
        let rows: Vec<(String, String, String, String, i64)> = stmt
            .query_map([], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
            })?
            .collect::<std::result::Result<_, _>>()?;
        rows.into_iter().map(into_record).collect()
    }

    pub fn get_session(&self, id: Uuid) -> Result<SessionRecord> {
        self.list_sessions()?
            .into_iter()
            .find(|s| s.id == id)
            .ok_or_else(|| StoreError::NotFound(format!("session {id}")))
    }

    fn session_by_name(&self, name: &str) -> Result<Option<SessionRecord>> {
        Ok(self.list_sessions()?.into_iter().find(|s| s.name == name))
    }

    /// Find a session by exact name, full id, or unambiguous id prefix.
    pub fn find_session(&self, selector: &str) -> Result<SessionRecord> {
        let sessions = self.list_sessions()?;
        if let Some(s) = sessions.iter().find(|s| s.name == selector) {
            return Ok(s.clone());
        }
        let mut matches = sessions
            .iter()
            .filter(|s| s.id.to_string().starts_with(selector));
        match (matches.next(), matches.next()) {
            (Some(s), None) if !selector.is_empty() => Ok(s.clone()),
            (Some(_), Some(_)) => Err(StoreError::InvalidData(format!(
                "'{selector}' matches more than one session"
            ))),
            _ => Err(StoreError::NotFound(format!("session '{selector}'"))),
        }
    }

    pub fn delete_session(&self, id: Uuid) -> Result<()> {
        let deleted = self
            .conn
            .execute("DELETE FROM sessions WHERE id = ?1", [id.to_string()])?;
        if deleted == 0 {
            return Err(StoreError::NotFound(format!("session {id}")));
        }
        if self.current_session_id()? == Some(id) {
            self.conn.execute(
                "DELETE FROM metadata WHERE key = ?1",
                [CURRENT_SESSION_KEY],
            )?;
        }
        tracing::info!("deleted session {id}");
        Ok(())
    }

    pub fn set_session_model(&self, id: Uuid, model: &str) -> Result<()> {
        let updated = self.conn.execute(
            "UPDATE sessions SET model = ?1 WHERE id = ?2",
            params![model, id.to_string()],
        )?;
        if updated == 0 {
            return Err(StoreError::NotFound(format!("session {id}")));
        }
        Ok(())
    }

    pub fn current_session_id(&self) -> Result<Option<Uuid>> {
        self.get_metadata(CURRENT_SESSION_KEY)?
            .map(|s| parse_uuid(&s))
            .transpose()
    }

    pub fn set_current_session(&self, id: Uuid) -> Result<()> {
        self.set_metadata(CURRENT_SESSION_KEY, &id.to_string())
    }

    // --- Turns ---

    /// Persist an accepted turn at the next index.
    pub fn append_turn(&self, id: Uuid, text: &str) -> Result<usize> {
        let next: i64 = self.conn.query_row(
            "SELECT COALESCE(MAX(idx) + 1, 0) FROM turns WHERE session_id = ?1",
            [id.to_string()],
            |row| row.get(0),
        )?;
        self.conn.execute(
            "INSERT INTO turns (session_id, idx, text, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![id.to_string(), next, text, now_iso8601()],
        )?;
        Ok(next as usize)
    }

    pub fn load_turns(&self, id: Uuid) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT text FROM turns WHERE session_id = ?1 ORDER BY idx")?;
        let turns = stmt
            .query_map([id.to_string()], |row| row.get(0))?
            .collect::<std::result::Result<_, _>>()?;
        Ok(turns)
    }

    /// Rebuild the in-memory session by replaying its stored turns.
    pub fn load_session(&self, id: Uuid) -> Result<Session> {
        let turns = self.load_turns(id)?;
        let session = Session::replay(&turns)?;
        tracing::debug!("replayed {} turns for session {id}", turns.len());
        Ok(session)
    }

    /// Decode `text` into `session` and persist it only if it was accepted.
    pub fn commit_turn(&self, id: Uuid, session: &mut Session, text: &str) -> Result<AppendOutcome> {
        let outcome = match session.append(text) {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!("rejected turn for session {id}: {e}");
                return Err(e.into());
            }
        };
        let stored = match self.append_turn(id, text) {
            Ok(stored) => stored,
            Err(e) => {
                // Keep memory in step with what was persisted.
                *session = self.load_session(id)?;
                return Err(e);
            }
        };
        if stored != outcome.index {
            return Err(StoreError::InvalidData(format!(
                "turn index drift: stored {stored}, session {}",
                outcome.index
            )));
        }
        tracing::debug!("appended turn {} to session {id}", outcome.index);
        Ok(outcome)
    }

    // --- Messages ---

    pub fn add_message(&self, id: Uuid, role: Role, content: &str) -> Result<()> {
        self.conn.execute(
            "INSERT INTO messages (session_id, role, content, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![id.to_string(), role.as_str(), content, now_iso8601()],
        )?;
        Ok(())
    }

    /// The last `limit` messages, oldest first.
    pub fn messages(&self, id: Uuid, limit: usize) -> Result<Vec<MessageRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT role, content, created_at FROM (
                 SELECT id, role, content, created_at FROM messages
                 WHERE session_id = ?1 ORDER BY id DESC LIMIT ?2
             ) ORDER BY id",
        )?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows: Vec<(String, String, String)> = stmt
            .query_map(params![id.to_string(), limit], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?))
            })?
            .collect::<std::result::Result<_, _>>()?;
        rows.into_iter()
            .map(|(role, content, created_at)| {
                Ok(MessageRecord {
                    role: role.parse()?,
                    content,
                    created_at,
                })
            })
            .collect()
    }

    /// Every message of a session, oldest first.
    pub fn transcript(&self, id: Uuid) -> Result<Vec<MessageRecord>> {
        self.messages(id, usize::MAX)
    }
}

/// Insert `turns` from index 0 on whatever transaction `conn` is in.
pub(crate) fn write_turns(conn: &Connection, id: Uuid, turns: &[String]) -> Result<()> {
    let mut insert = conn.prepare(
        "INSERT INTO turns (session_id, idx, text, created_at) VALUES (?1, ?2, ?3, ?4)",
    )?;
    let now = now_iso8601();
    for (idx, text) in turns.iter().enumerate() {
        insert.execute(params![id.to_string(), idx as i64, text, now])?;
    }
    Ok(())
}

fn into_record(row: (String, String, String, String, i64)) -> Result<SessionRecord> {
    let (id, name, model, created_at, turns) = row;
    Ok(SessionRecord {
        id: parse_uuid(&id)?,
        name,
        model,
        created_at,
        turns: turns as usize,
    })
}

fn parse_uuid(s: &str) -> Result<Uuid> {
    Uuid::parse_str(s).map_err(|e| StoreError::InvalidData(format!("bad UUID '{s}': {e}")))
}
