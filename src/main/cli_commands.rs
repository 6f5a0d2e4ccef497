// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

use std::path::Path;

use anyhow::Context;

use parlance::chat::ChatService;
use parlance::cli::{HistoryArgs, HistoryCommands};
use parlance::config::Settings;
use parlance::history::SessionRecord;
use parlance::utils::parse_session_id;

use super::repl::register_echo;

pub(super) async fn run_history_command(
    service: &ChatService,
    args: HistoryArgs,
) -> anyhow::Result<()> {
    match args.command.unwrap_or(HistoryCommands::List { limit: 10 }) {
        HistoryCommands::List { limit } => {
            let sessions = service.get_history();
            if sessions.is_empty() {
                println!("\nNo sessions in history.\n");
                return Ok(());
            }

            println!("\nRecent sessions:\n");
            for detail in sessions.into_iter().take(limit) {
                println!("  {} | {}", detail.session_id, detail.title);
            }
            println!();
        }

        HistoryCommands::Remove { session_id } => {
            let id = parse_session_id(&session_id)?;
            if service.remove_history_entry(&id) {
                service.save_state().await?;
                println!("Removed session {}", id);
            } else {
                println!("No session {} in history.", id);
            }
        }
    }
    Ok(())
}

pub(super) fn run_export(service: &ChatService, session_id: &str) -> anyhow::Result<()> {
    let id = parse_session_id(session_id)?;
    let record = service
        .history_entry(&id)
        .ok_or_else(|| anyhow::anyhow!("No saved session {}", id))?;
    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}

/// Load a transcript as an imported session and persist it.
pub(super) async fn run_import(
    service: &ChatService,
    settings: &Settings,
    file: &Path,
) -> anyhow::Result<()> {
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read {}", file.display()))?;
    let mut record: SessionRecord = serde_json::from_str(&content)
        .with_context(|| format!("{} is not a session record", file.display()))?;
    record.is_imported = true;

    let registrations = register_echo(service, settings)?;
    let model = service.load_session_from_content(record);
    model.wait_for_initialization().await?;
    service.save_state().await?;
    for registration in registrations {
        registration.dispose();
    }

    println!(
        "Imported session {} ({} requests)",
        model.session_id(),
        model.request_count()
    );
    Ok(())
}
