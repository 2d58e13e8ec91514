//! Line-based chat loop.
//!
//! Renders the streamed completion events; `@Agent` addresses one of the
//! main recipients, `/upload` stages files into the latest upload
//! partition, `/verbose` toggles intermediate output, `exit` quits.

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use crossterm::style::Stylize;
use tokio::io::{AsyncBufReadExt, BufReader};

use hive_core::backend::Role;
use hive_core::{Agency, AgencyEvent, FileEntry, MemorySource};

pub async fn run(agency: Arc<Agency>) -> Result<()> {
    let recipients = agency.main_recipient_names();
    println!(
        "Connected. Main recipients: {}. Address one with '@Name message'.",
        recipients.join(", ")
    );
    println!("Commands: /upload <path>..., /verbose, exit\n");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("👤 USER: ");
        use std::io::Write;
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim().to_string();

        if line.is_empty() {
            continue;
        }
        if line.eq_ignore_ascii_case("exit") {
            break;
        }
        if let Some(rest) = line.strip_prefix("/upload") {
            stage_uploads(&agency, rest);
            continue;
        }
        if line == "/verbose" {
            let next = !agency.memory().display_all();
            agency.memory().set_display_all(next);
            println!("Intermediate output {}.", if next { "on" } else { "off" });
            continue;
        }

        let (recipient, mut message) = parse_recipient(&recipients, &line);
        if let (None, true) = (&recipient, line.starts_with('@')) {
            println!("{}", "Recipient agent not found.".red());
            continue;
        }

        // Tell the entry agent about fresh uploads exactly once.
        if let Some(annotation) = agency.memory().upload_annotation() {
            message = format!("{message}\n\n{annotation}");
        }

        let mut completion = match agency.get_completion(message, Vec::new(), recipient.as_deref())
        {
            Ok(completion) => completion,
            Err(e) => {
                println!("{}", format!("{e}").red());
                continue;
            }
        };

        while let Some(event) = completion.next_event().await {
            render(&agency, &event);
        }
        if let Err(e) = completion.finish().await {
            println!("{}", format!("Exchange failed: {e}").red());
        }
        println!();
    }

    Ok(())
}

/// `@Name message` addressing; names may contain spaces, so match the
/// longest recipient name that prefixes the text after '@'.
fn parse_recipient(recipients: &[String], line: &str) -> (Option<String>, String) {
    let Some(rest) = line.strip_prefix('@') else {
        return (None, line.to_string());
    };

    let mut best: Option<&String> = None;
    for name in recipients {
        let matches = rest
            .get(..name.len())
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case(name));
        if matches && best.map_or(true, |b| b.len() < name.len()) {
            best = Some(name);
        }
    }

    match best {
        Some(name) => (
            Some(name.clone()),
            rest[name.len()..].trim().to_string(),
        ),
        None => (None, line.to_string()),
    }
}

fn stage_uploads(agency: &Arc<Agency>, rest: &str) {
    let entries: Vec<FileEntry> = rest
        .split_whitespace()
        .map(|path| {
            let name = Path::new(path)
                .file_name()
                .map(|name| name.to_string_lossy().to_string())
                .unwrap_or_else(|| path.to_string());
            FileEntry::new(name, path)
        })
        .collect();

    if entries.is_empty() {
        println!("Usage: /upload <path>...");
        return;
    }

    println!("Staged {} file(s) into the latest upload memory.", entries.len());
    agency.memory().set_latest(MemorySource::Upload, entries);
}

fn render(agency: &Arc<Agency>, event: &AgencyEvent) {
    let verbose = agency.memory().display_all();

    match event {
        AgencyEvent::Message {
            sender,
            receiver,
            role,
            content,
        } => {
            // The user's own message is already on screen.
            if *role == Role::User && sender == "User" {
                return;
            }
            let user_facing = receiver == "User";
            if !verbose && !user_facing {
                return;
            }
            println!(
                "🤖 {} 🗣️ {}:\n{}",
                sender.clone().bold(),
                receiver,
                content
            );
        }
        AgencyEvent::ToolCall { agent, tool, .. } => {
            if verbose {
                println!("{}", format!("⚙ {agent} is invoking `{tool}`...").dim());
            }
        }
        AgencyEvent::ToolOutput {
            tool,
            output,
            is_error,
            ..
        } => {
            if verbose {
                let preview = preview(output, 200);
                let line = format!("⚙ `{tool}` returned: {preview}");
                if *is_error {
                    println!("{}", line.red());
                } else {
                    println!("{}", line.dim());
                }
            }
        }
        AgencyEvent::Error { thread, error } => {
            println!("{}", format!("✖ [{thread}] {error}").red());
        }
    }
}

fn preview(text: &str, limit: usize) -> String {
    let mut boundary = limit.min(text.len());
    while boundary > 0 && !text.is_char_boundary(boundary) {
        boundary -= 1;
    }
    if boundary < text.len() {
        format!("{}…", &text[..boundary])
    } else {
        text.to_string()
    }
}
