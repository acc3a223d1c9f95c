//! Interactive loop. Lines starting with `/` are commands; anything else is
//! a turn.

use std::io::{BufRead, Write};
use std::path::Path;

use anyhow::{Context, Result};

use crate::chat::Chat;
use crate::{print_history, print_symbols, submit_and_print, warn_unknown_model};

const HELP: &str = "\
Commands:
  /model [name]      - Show or change the model
  /export            - Write the session and its transcript to the data dir
  /file <path>       - Submit a file's contents as one turn
  /history [n]       - Show the last n transcript messages
  /symbols           - List alias bindings
  /reconstruct <n>   - Show state as of turn n
  /get <path>        - Resolve a path against current state
  /help              - Show this help
  /quit              - Exit";

enum Flow {
    Continue,
    Quit,
}

pub fn run(chat: &mut Chat) -> Result<()> {
    let stdin = std::io::stdin();
    let mut out = std::io::stdout();

    println!("otp  session: {}  model: {}", chat.record.name, chat.record.model);
    if !chat.has_backend() {
        println!("no inference command configured; input is decoded as literal syntax");
    }
    println!("Type /help for commands");

    let mut line = String::new();
    loop {
        write!(out, "\n> ")?;
        out.flush()?;

        line.clear();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let input = line.trim();
        if input.is_empty() {
            continue;
        }

        match handle(chat, input) {
            Ok(Flow::Quit) => break,
            Ok(Flow::Continue) => {}
            Err(e) => println!("[ERROR] {e:#}"),
        }
    }
    println!("session '{}' saved ({} turns)", chat.record.name, chat.record.turns);
    Ok(())
}

fn handle(chat: &mut Chat, input: &str) -> Result<Flow> {
    let Some(command) = input.strip_prefix('/') else {
        submit_and_print(chat, input)?;
        return Ok(Flow::Continue);
    };

    let (name, arg) = match command.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (command, ""),
    };

    match name.to_ascii_lowercase().as_str() {
        "quit" | "exit" => return Ok(Flow::Quit),
        "help" => println!("{HELP}"),
        "model" if arg.is_empty() => {
            println!("model: {}", chat.record.model);
            for model in otp_core::MODELS {
                println!("  {model}");
            }
        }
        "model" => {
            warn_unknown_model(arg);
            chat.set_model(arg)?;
            println!("[OK] now using {arg}");
        }
        "export" => {
            let export = chat.workspace.export_text(&chat.record, &chat.session)?;
            println!("[OK] exported to {}", export.state.display());
            println!("[OK] transcript: {}", export.transcript.display());
        }
        "file" if arg.is_empty() => println!("usage: /file <path>"),
        "file" => {
            let path = Path::new(arg);
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            submit_and_print(chat, text.trim())?;
        }
        "history" => {
            let limit: usize = if arg.is_empty() {
                20
            } else {
                arg.parse().context("usage: /history [n]")?
            };
            print_history(&chat.workspace, &chat.record, limit)?;
        }
        "symbols" => print_symbols(&chat.session),
        "reconstruct" => {
            let turn: usize = arg.parse().context("usage: /reconstruct <turn>")?;
            print!("{}", chat.session.reconstruct(turn)?);
        }
        "get" if arg.is_empty() => println!("usage: /get <path>"),
        "get" => println!("{}", chat.session.resolve(arg)?),
        other => println!("unknown command '/{other}', try /help"),
    }
    Ok(Flow::Continue)
}
