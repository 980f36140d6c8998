//! Interactive editing session
//!
//! Reads lines from stdin. Lines starting with `:` are commands, any other
//! line is appended to the document body. While a leave confirmation is
//! pending, the next line answers it.

use anyhow::{bail, Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::debug;

use geditor_core::{
    Config, DocumentId, FileNavigation, LeaveChoice, NavigationContext, SessionCommand,
    SessionHandle,
};

use super::start_session;
use crate::output::Output;

const HELP: &str = "\
Commands:
  :list           Refresh the document list
  :open ID        Open a document
  :title TEXT     Set the title
  :text TEXT      Replace the body
  :append TEXT    Append a line to the body (same as typing a plain line)
  :save           Save (creates a new document if none is open)
  :update         Update the open document
  :new            Start a new document
  :show           Show the draft
  :help           Show this help
  :quit           Leave the session";

/// A parsed input line
#[derive(Debug, Clone, PartialEq, Eq)]
enum Input {
    List,
    Open(String),
    Title(String),
    Text(String),
    Append(String),
    Save,
    Update,
    New,
    Show,
    Help,
    Quit,
}

fn parse_line(line: &str) -> Result<Input> {
    let Some(command) = line.strip_prefix(':') else {
        return Ok(Input::Append(line.to_string()));
    };

    let (name, arg) = match command.split_once(' ') {
        Some((name, arg)) => (name, arg.to_string()),
        None => (command.trim_end(), String::new()),
    };

    let input = match name {
        "list" | "ls" => Input::List,
        "open" | "o" => {
            if arg.trim().is_empty() {
                bail!("Usage: :open ID");
            }
            Input::Open(arg.trim().to_string())
        }
        "title" => Input::Title(arg),
        "text" => Input::Text(arg),
        "append" | "a" => Input::Append(arg),
        "save" | "w" => Input::Save,
        "update" | "u" => Input::Update,
        "new" | "n" => Input::New,
        "show" | "p" => Input::Show,
        "help" | "h" | "?" => Input::Help,
        "quit" | "q" | "exit" => Input::Quit,
        other => bail!("Unknown command ':{}'. Type :help for the list.", other),
    };
    Ok(input)
}

/// Body text with `line` appended
fn append_line(text: &str, line: &str) -> String {
    if text.is_empty() {
        line.to_string()
    } else {
        format!("{}\n{}", text, line)
    }
}

/// Run the interactive session
pub async fn run(
    config: &Config,
    doc: Option<String>,
    credential: Option<String>,
    output: &Output,
) -> Result<()> {
    let mut navigation = FileNavigation::open(config.location_path(), &config.app_url)
        .context("Failed to restore navigation context")?;
    if let Some(doc) = doc {
        let id = DocumentId::parse(&doc).with_context(|| format!("Invalid document ID: {:?}", doc))?;
        navigation.set_current(Some(&id))?;
    }

    let mut session = start_session(config, credential, navigation)?;
    output.message(&format!(
        "Connecting to {}... (type :help for commands)",
        config.server_url
    ));

    let result = repl(&mut session, output).await;
    session.shutdown().await;
    result
}

async fn repl(session: &mut SessionHandle, output: &Output) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut awaiting_choice = false;

    loop {
        tokio::select! {
            event = session.event_rx.recv() => {
                let Some(event) = event else {
                    bail!("Session ended unexpectedly");
                };
                output.print_event(&event);
            }

            line = lines.next_line() => {
                let Some(line) = line? else {
                    debug!("Input closed");
                    return Ok(());
                };

                if awaiting_choice {
                    match line.parse::<LeaveChoice>() {
                        Ok(choice) => {
                            awaiting_choice = false;
                            session.send(SessionCommand::ResolveLeave(choice)).await;
                        }
                        Err(e) => output.message(&e.to_string()),
                    }
                    continue;
                }

                match parse_line(&line) {
                    Ok(Input::Quit) => return Ok(()),
                    Ok(input) => awaiting_choice = handle_input(session, input, output).await,
                    Err(e) => output.message(&e.to_string()),
                }
            }
        }
    }
}

/// Forward one input line; returns true if the session now waits for a
/// leave choice
async fn handle_input(session: &SessionHandle, input: Input, output: &Output) -> bool {
    let command = match input {
        Input::List => SessionCommand::List,
        Input::Open(id) => SessionCommand::Open(id),
        Input::Title(title) => SessionCommand::EditTitle(title),
        Input::Text(text) => SessionCommand::EditText(text),
        Input::Append(line) => {
            let Some(view) = session.inspect().await else {
                return false;
            };
            SessionCommand::EditText(append_line(&view.draft.text, &line))
        }
        Input::Save => SessionCommand::Save,
        Input::Update => SessionCommand::Update,
        Input::New => {
            session.send(SessionCommand::NewDocument).await;
            return session
                .inspect()
                .await
                .map_or(false, |view| view.awaiting_confirmation);
        }
        Input::Show => {
            if let Some(view) = session.inspect().await {
                let marker = if view.dirty { " (unsaved changes)" } else { "" };
                let id = view
                    .open_document
                    .as_ref()
                    .map(|id| id.to_string())
                    .unwrap_or_else(|| "new document".to_string());
                output.message(&format!("── {}{} ──", id, marker));
                output.message(&format!("Title: {}", view.draft.title));
                output.message(&view.draft.text);
            }
            return false;
        }
        Input::Help => {
            output.message(HELP);
            return false;
        }
        Input::Quit => return false,
    };
    session.send(command).await;
    false
}
