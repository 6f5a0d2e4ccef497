// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! CLI argument definitions using Clap

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Parlance - chat sessions with persisted history
#[derive(Parser, Debug)]
#[command(name = "parlance")]
#[command(version, about = "Chat sessions with persisted history")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Workspace directory (defaults to current)
    #[arg(short = 'C', long, global = true)]
    pub directory: Option<PathBuf>,

    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start an interactive chat session (default when no command given)
    Chat(ChatArgs),

    /// List or remove past sessions
    History(HistoryArgs),

    /// Print a persisted session as JSON
    Export {
        /// Session ID
        session_id: String,
    },

    /// Load a session from a JSON file into this workspace
    Import {
        /// Path to the session JSON
        file: PathBuf,
    },
}

/// Arguments for the chat subcommand
#[derive(clap::Args, Debug, Default)]
pub struct ChatArgs {
    /// Resume a past session by ID
    #[arg(short, long)]
    pub resume: Option<String>,
}

/// Arguments for history management
#[derive(clap::Args, Debug)]
pub struct HistoryArgs {
    #[command(subcommand)]
    pub command: Option<HistoryCommands>,
}

/// History subcommands
#[derive(Subcommand, Debug)]
pub enum HistoryCommands {
    /// List past sessions, newest first
    List {
        /// Maximum number of sessions to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// Remove a session from history
    Remove {
        /// Session ID
        session_id: String,
    },
}
