mod chat;
mod inference;
mod repl;
mod server;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use otp_core::{AppendOutcome, Session, is_known_model};
use otp_store::{SessionRecord, Workspace};
use rmcp::{ServiceExt, transport::stdio};

use crate::chat::Chat;

#[derive(Parser)]
#[command(name = "otp", about = "Origami Thought Protocol: CLI, REPL and MCP server")]
struct Cli {
    /// Session name or id (defaults to the current session)
    #[arg(long, global = true)]
    session: Option<String>,

    /// Enable verbose debug output
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a session and make it current
    New {
        name: String,
        /// Model for this session (defaults to the configured model)
        #[arg(long)]
        model: Option<String>,
    },

    /// List sessions
    Sessions,

    /// Make a session current
    Use {
        /// Session name, id or id prefix
        selector: String,
    },

    /// Delete a session and its history
    Delete {
        /// Session name, id or id prefix
        selector: String,
    },

    /// Append literal syntax as one turn
    Append {
        #[arg(required = true)]
        text: Vec<String>,
    },

    /// Submit a file's contents as one turn (through inference when configured)
    File { path: PathBuf },

    /// Export the session: literal syntax to the data dir, or JSON with --json
    Export {
        #[arg(long)]
        json: Option<PathBuf>,
    },

    /// Import a JSON session export as a new session
    Import {
        path: PathBuf,
        /// Name for the imported session
        #[arg(long)]
        name: Option<String>,
    },

    /// Show state as of a turn (0-based)
    Reconstruct { turn: usize },

    /// Resolve a dotted path against current state
    Get { path: String },

    /// List alias bindings
    Symbols,

    /// Show the session transcript
    History {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },

    /// Show or change the model
    Model { name: Option<String> },

    /// Interactive session
    Repl,

    /// Start MCP server on stdio transport
    Serve,
}

fn open_workspace() -> Result<Workspace> {
    Workspace::open(None).context("failed to open data directory")
}

fn open_session(cli: &Cli) -> Result<(Workspace, SessionRecord, Session)> {
    let workspace = open_workspace()?;
    let (record, session) = workspace
        .load(cli.session.as_deref())
        .context("failed to load session")?;
    Ok((workspace, record, session))
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into())
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match &cli.command {
        Commands::Serve => cmd_serve(&cli).await,
        Commands::New { name, model } => cmd_new(name, model.as_deref()),
        Commands::Sessions => cmd_sessions(),
        Commands::Use { selector } => cmd_use(selector),
        Commands::Delete { selector } => cmd_delete(selector),
        Commands::Append { text } => cmd_append(&cli, &text.join(" ")),
        Commands::File { path } => cmd_file(&cli, path),
        Commands::Export { json } => cmd_export(&cli, json.as_deref()),
        Commands::Import { path, name } => cmd_import(path, name.as_deref()),
        Commands::Reconstruct { turn } => cmd_reconstruct(&cli, *turn),
        Commands::Get { path } => cmd_get(&cli, path),
        Commands::Symbols => cmd_symbols(&cli),
        Commands::History { limit } => cmd_history(&cli, *limit),
        Commands::Model { name } => cmd_model(&cli, name.as_deref()),
        Commands::Repl => cmd_repl(&cli),
    }
}

// ---------------------------------------------------------------------------
// Output helpers shared with the REPL
// ---------------------------------------------------------------------------

pub(crate) fn print_outcome(outcome: &AppendOutcome) {
    println!(
        "turn {}: {} statement{}",
        outcome.index,
        outcome.statements,
        if outcome.statements == 1 { "" } else { "s" }
    );
    if !outcome.entities.is_empty() {
        println!("entities: {}", outcome.entities.join(", "));
    }
    for r in &outcome.resolutions {
        println!("{} is {} -> {}", r.condition, r.value, r.branch);
    }
}

/// Submit through the chat, echoing the model reply before the outcome.
pub(crate) fn submit_and_print(chat: &mut Chat, input: &str) -> Result<()> {
    let result = chat.submit(input);
    if let Some(reply) = chat.last_reply() {
        println!("OTP: {reply}");
    }
    print_outcome(&result?);
    Ok(())
}

pub(crate) fn print_symbols(session: &Session) {
    let symbols = session.registry().symbols();
    if symbols.is_empty() {
        println!("(no symbols)");
    }
    for (alias, canonical) in symbols {
        println!("{alias} = {canonical}");
    }
}

pub(crate) fn print_history(
    workspace: &Workspace,
    record: &SessionRecord,
    limit: usize,
) -> Result<()> {
    let messages = workspace
        .store()
        .messages(record.id, limit)
        .context("failed to load history")?;
    if messages.is_empty() {
        println!("(no messages)");
    }
    for msg in messages {
        println!("{msg}\n");
    }
    Ok(())
}

pub(crate) fn warn_unknown_model(name: &str) {
    if !is_known_model(name) {
        tracing::warn!("'{name}' is not a known model; using it anyway");
    }
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

async fn cmd_serve(cli: &Cli) -> Result<()> {
    let workspace = open_workspace()?;
    let server = server::OtpServer::new(workspace, cli.session.as_deref())
        .map_err(|e| anyhow::anyhow!("{e}"))?;
    tracing::info!("starting MCP server");

    let service = server
        .serve(stdio())
        .await
        .context("failed to start MCP server")?;
    service.waiting().await?;
    Ok(())
}

fn cmd_new(name: &str, model: Option<&str>) -> Result<()> {
    if let Some(model) = model {
        warn_unknown_model(model);
    }
    let workspace = open_workspace()?;
    let record = workspace
        .create_session(name, model)
        .with_context(|| format!("failed to create session '{name}'"))?;
    println!("created session '{}' ({}, {})", record.name, record.model, record.id);
    Ok(())
}

fn cmd_sessions() -> Result<()> {
    let workspace = open_workspace()?;
    let store = workspace.store();
    let current = store.current_session_id()?;
    let sessions = store.list_sessions().context("failed to list sessions")?;
    if sessions.is_empty() {
        println!("(no sessions)");
    }
    for s in sessions {
        let marker = if Some(s.id) == current { "*" } else { " " };
        println!(
            "{marker} {:<20} {:>5} turns  {:<22} {}  {}",
            s.name,
            s.turns,
            s.model,
            s.created_at,
            &s.id.to_string()[..8]
        );
    }
    Ok(())
}

fn cmd_use(selector: &str) -> Result<()> {
    let workspace = open_workspace()?;
    let record = workspace.resolve_session(Some(selector))?;
    println!("using session '{}' ({} turns)", record.name, record.turns);
    Ok(())
}

fn cmd_delete(selector: &str) -> Result<()> {
    let workspace = open_workspace()?;
    let store = workspace.store();
    let record = store.find_session(selector)?;
    store.delete_session(record.id)?;
    println!("deleted session '{}'", record.name);
    Ok(())
}

fn cmd_append(cli: &Cli, text: &str) -> Result<()> {
    let mut chat = Chat::open(open_workspace()?, cli.session.as_deref())?;
    let outcome = chat.append(text)?;
    print_outcome(&outcome);
    Ok(())
}

fn cmd_file(cli: &Cli, path: &Path) -> Result<()> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let mut chat = Chat::open(open_workspace()?, cli.session.as_deref())?;
    submit_and_print(&mut chat, text.trim())
}

fn cmd_export(cli: &Cli, json: Option<&Path>) -> Result<()> {
    let (workspace, record, session) = open_session(cli)?;
    match json {
        Some(path) => {
            workspace
                .store()
                .export_json_file(&record, path)
                .context("failed to export JSON")?;
            println!("exported to {}", path.display());
        }
        None => {
            let export = workspace
                .export_text(&record, &session)
                .context("failed to export session")?;
            println!("exported to {}", export.state.display());
            println!("transcript: {}", export.transcript.display());
        }
    }
    Ok(())
}

fn cmd_import(path: &Path, name: Option<&str>) -> Result<()> {
    let workspace = open_workspace()?;
    let record = workspace
        .store()
        .import_json_file(path, name)
        .context("failed to import JSON")?;
    workspace.store().set_current_session(record.id)?;
    println!(
        "imported '{}' from {} ({} turns)",
        record.name,
        path.display(),
        record.turns
    );
    Ok(())
}

fn cmd_reconstruct(cli: &Cli, turn: usize) -> Result<()> {
    let (_, _, session) = open_session(cli)?;
    let snapshot = session.reconstruct(turn)?;
    if snapshot.is_empty() {
        println!("(empty)");
    } else {
        print!("{snapshot}");
    }
    Ok(())
}

fn cmd_get(cli: &Cli, path: &str) -> Result<()> {
    let (_, _, session) = open_session(cli)?;
    println!("{}", session.resolve(path)?);
    Ok(())
}

fn cmd_symbols(cli: &Cli) -> Result<()> {
    let (_, _, session) = open_session(cli)?;
    print_symbols(&session);
    Ok(())
}

fn cmd_history(cli: &Cli, limit: usize) -> Result<()> {
    let (workspace, record, _) = open_session(cli)?;
    print_history(&workspace, &record, limit)
}

fn cmd_model(cli: &Cli, name: Option<&str>) -> Result<()> {
    let Some(name) = name else {
        let (workspace, record, _) = open_session(cli)?;
        println!("session model: {}", record.model);
        println!("default model: {}", workspace.config().model);
        for model in otp_core::MODELS {
            let marker = if *model == record.model { "*" } else { " " };
            println!("{marker} {model}");
        }
        return Ok(());
    };
    if name.trim().is_empty() {
        bail!("model name cannot be empty");
    }
    warn_unknown_model(name);
    let mut chat = Chat::open(open_workspace()?, cli.session.as_deref())?;
    chat.set_model(name)?;
    println!("session '{}' now uses {name}", chat.record.name);
    Ok(())
}

fn cmd_repl(cli: &Cli) -> Result<()> {
    let mut chat = Chat::open(open_workspace()?, cli.session.as_deref())?;
    repl::run(&mut chat)
}
