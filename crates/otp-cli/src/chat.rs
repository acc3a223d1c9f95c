use anyhow::{Context, Result};
use otp_core::{AppendOutcome, Completion, PromptFrame, Session};
use otp_store::{Role, SessionRecord, Workspace};

use crate::inference::CommandCompletion;

/// An open session plus the backend that turns free text into literal syntax.
pub struct Chat {
    pub workspace: Workspace,
    pub record: SessionRecord,
    pub session: Session,
    backend: Option<CommandCompletion>,
    /// Model output from the latest [`submit`](Self::submit), kept even
    /// when it failed to decode.
    last_reply: Option<String>,
}

impl Chat {
    pub fn open(workspace: Workspace, selector: Option<&str>) -> Result<Self> {
        let (record, session) = workspace
            .load(selector)
            .context("failed to load session")?;
        let backend = CommandCompletion::from_config(&workspace.config().inference);
        Ok(Self {
            workspace,
            record,
            session,
            backend,
            last_reply: None,
        })
    }

    pub fn has_backend(&self) -> bool {
        self.backend.is_some()
    }

    /// Send `input` through the inference command when one is configured
    /// (otherwise take it as literal syntax) and commit the result as a turn.
    /// Failures are recorded in the transcript as system messages.
    pub fn submit(&mut self, input: &str) -> Result<AppendOutcome> {
        self.last_reply = None;
        self.record(Role::User, input)?;
        let result = self.submit_inner(input);
        if let Err(e) = &result {
            self.record(Role::System, &format!("Error: {e:#}"))?;
        }
        result
    }

    /// Commit literal syntax directly, bypassing inference.
    pub fn append(&mut self, text: &str) -> Result<AppendOutcome> {
        self.record(Role::User, text)?;
        let result = self.commit(text);
        if let Err(e) = &result {
            self.record(Role::System, &format!("Error: {e:#}"))?;
        }
        result
    }

    fn submit_inner(&mut self, input: &str) -> Result<AppendOutcome> {
        let Some(backend) = &self.backend else {
            return self.commit(input);
        };
        let frame = PromptFrame::for_session(&self.session, &self.record.model, input)
            .context("failed to build prompt")?;
        let reply = backend.complete(&frame).context("inference failed")?;
        self.record(Role::Assistant, &reply)?;
        let result = self.commit(&reply);
        self.last_reply = Some(reply);
        result
    }

    pub fn last_reply(&self) -> Option<&str> {
        self.last_reply.as_deref()
    }

    fn commit(&mut self, text: &str) -> Result<AppendOutcome> {
        let outcome = self
            .workspace
            .store()
            .commit_turn(self.record.id, &mut self.session, text)?;
        self.record.turns = self.session.turns();
        Ok(outcome)
    }

    fn record(&self, role: Role, content: &str) -> Result<()> {
        self.workspace
            .store()
            .add_message(self.record.id, role, content)
            .context("failed to record message")
    }

    /// Switch model for this session and make it the default.
    pub fn set_model(&mut self, model: &str) -> Result<()> {
        self.workspace
            .store()
            .set_session_model(self.record.id, model)?;
        self.workspace.set_default_model(model)?;
        self.record.model = model.to_string();
        Ok(())
    }
}
