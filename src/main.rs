// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Parlance - chat sessions with persisted history
//!
//! Entry point for the Parlance CLI application.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;

use parlance::chat::ChatService;
use parlance::cli::{ChatArgs, Cli, Commands};
use parlance::config::Settings;
use parlance::history::FileStorage;

#[path = "main/cli_commands.rs"]
mod cli_commands;
#[path = "main/repl.rs"]
mod repl;

use cli_commands::{run_export, run_history_command, run_import};
use repl::run_chat;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut env_filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(tracing::Level::WARN.into());

    // `-v` turns on the service's own diagnostics; `RUST_LOG` still applies.
    let level = match cli.verbose {
        0 => None,
        1 => Some("parlance=debug"),
        _ => Some("parlance=trace"),
    };
    if let Some(directive) = level {
        if let Ok(parsed) = directive.parse() {
            env_filter = env_filter.add_directive(parsed);
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    let settings = Settings::load().context("failed to load settings")?;

    let workspace = match cli.directory {
        Some(dir) => dir,
        None => std::env::current_dir().context("cannot determine working directory")?,
    };
    let service = open_service(&settings, workspace).await;

    match cli.command {
        None => run_chat(&service, &settings, ChatArgs::default()).await?,
        Some(Commands::Chat(args)) => run_chat(&service, &settings, args).await?,
        Some(Commands::History(args)) => run_history_command(&service, args).await?,
        Some(Commands::Export { session_id }) => run_export(&service, &session_id)?,
        Some(Commands::Import { file }) => run_import(&service, &settings, &file).await?,
    }

    Ok(())
}

async fn open_service(settings: &Settings, workspace: PathBuf) -> ChatService {
    let path = settings.workspace_storage_path(&workspace);
    tracing::debug!(target: "parlance", path = %path.display(), "opening workspace store");
    ChatService::builder(Arc::new(FileStorage::new(path)))
        .settings(settings)
        .build()
        .await
}
