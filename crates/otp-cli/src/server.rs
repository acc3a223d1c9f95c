use std::sync::Arc;

use otp_core::Session;
use otp_store::{SessionRecord, StoreError, Workspace};
use rmcp::handler::server::router::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::*;
use rmcp::{ErrorData as McpError, ServerHandler, tool, tool_handler, tool_router};
use schemars::JsonSchema;
use serde::Deserialize;
use tokio::sync::Mutex;

#[derive(Clone)]
pub struct OtpServer {
    state: Arc<Mutex<ServerState>>,
    tool_router: ToolRouter<Self>,
}

struct ServerState {
    workspace: Workspace,
    record: SessionRecord,
    session: Session,
}

impl OtpServer {
    pub fn new(workspace: Workspace, selector: Option<&str>) -> std::result::Result<Self, String> {
        let (record, session) = workspace
            .load(selector)
            .map_err(|e| format!("failed to load session: {e}"))?;
        tracing::info!(
            "serving session '{}' ({} turns)",
            record.name,
            session.turns()
        );
        Ok(Self {
            state: Arc::new(Mutex::new(ServerState {
                workspace,
                record,
                session,
            })),
            tool_router: Self::tool_router(),
        })
    }

    fn session_json(record: &SessionRecord, session: &Session) -> serde_json::Value {
        serde_json::json!({
            "name": record.name,
            "model": record.model,
            "turns": session.turns(),
        })
    }
}

fn json_result(value: &serde_json::Value) -> CallToolResult {
    CallToolResult::success(vec![Content::text(
        serde_json::to_string_pretty(value).unwrap_or_default(),
    )])
}

/// Codec rejections are the caller's input; everything else is ours.
fn store_error(e: StoreError) -> McpError {
    match e {
        StoreError::Codec(e) => McpError::invalid_params(e.to_string(), None),
        other => McpError::internal_error(other.to_string(), None),
    }
}

// --- Tool parameter types ---

#[derive(Debug, Deserialize, JsonSchema)]
struct AppendRequest {
    /// One turn in literal syntax: @Map{..}, #T(..){..}, @Base{..}, [..],
    /// Entity(name){..}, Path.To:value or cond ? a : b statements separated
    /// by ';' or newlines
    text: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct ReconstructRequest {
    /// Zero-based turn index; the state includes that turn
    turn: usize,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct ResolveRequest {
    /// Dotted path, e.g. Cfg.Net.Port
    path: String,
}

#[tool_router]
impl OtpServer {
    #[tool(
        description = "Append one turn of literal syntax to the session. The whole turn is applied or rejected: on a codec error (duplicate alias, arity mismatch, unknown base, unresolved path) nothing changes and the error is returned. Returns the turn index, statement count, touched entities and ternary resolutions."
    )]
    async fn otp_append(
        &self,
        Parameters(req): Parameters<AppendRequest>,
    ) -> Result<CallToolResult, McpError> {
        let mut state = self.state.lock().await;
        let ServerState {
            workspace,
            record,
            session,
        } = &mut *state;

        let outcome = workspace
            .store()
            .commit_turn(record.id, session, &req.text)
            .map_err(store_error)?;
        record.turns = session.turns();

        let result = serde_json::to_value(&outcome)
            .map_err(|e| McpError::internal_error(e.to_string(), None))?;
        Ok(json_result(&result))
    }

    #[tool(
        description = "Export the whole session as literal syntax, one line per turn. Decoding the export in a fresh session yields the same state."
    )]
    async fn otp_export(&self) -> Result<CallToolResult, McpError> {
        let state = self.state.lock().await;
        let exported = state
            .session
            .export_state()
            .map_err(|e| McpError::internal_error(e.to_string(), None))?;

        let mut result = Self::session_json(&state.record, &state.session);
        result["state"] = exported.into();
        Ok(json_result(&result))
    }

    #[tool(
        description = "Show the state as it was right after the given turn: entities, globals, bases and alias bindings."
    )]
    async fn otp_reconstruct(
        &self,
        Parameters(req): Parameters<ReconstructRequest>,
    ) -> Result<CallToolResult, McpError> {
        let state = self.state.lock().await;
        let snapshot = state
            .session
            .reconstruct(req.turn)
            .map_err(|e| McpError::invalid_params(e.to_string(), None))?;

        let result = serde_json::json!({
            "turn": req.turn,
            "text": snapshot.to_string(),
            "snapshot": snapshot,
        });
        Ok(json_result(&result))
    }

    #[tool(description = "Resolve a dotted path (global or entity attribute) against current state.")]
    async fn otp_resolve(
        &self,
        Parameters(req): Parameters<ResolveRequest>,
    ) -> Result<CallToolResult, McpError> {
        let state = self.state.lock().await;
        let value = state
            .session
            .resolve(&req.path)
            .map_err(|e| McpError::invalid_params(e.to_string(), None))?;

        let result = serde_json::json!({
            "path": req.path,
            "value": value.to_string(),
        });
        Ok(json_result(&result))
    }

    #[tool(description = "List the session's alias bindings (alias -> canonical name).")]
    async fn otp_symbols(&self) -> Result<CallToolResult, McpError> {
        let state = self.state.lock().await;
        let result = serde_json::json!({
            "symbols": state.session.registry().symbols(),
        });
        Ok(json_result(&result))
    }
}

#[tool_handler]
impl ServerHandler for OtpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "A persistent structured session in compact literal syntax.\n\n\
                 - Call otp_symbols and otp_export first to learn existing aliases and state.\n\
                 - Write new facts with otp_append. Reuse existing aliases; an alias can never \
                   be rebound to a different name.\n\
                 - A rejected turn changes nothing. Fix the reported error and resend the turn.\n\
                 - Use otp_resolve for single values and otp_reconstruct to look at earlier turns."
                    .into(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}
