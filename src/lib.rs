// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Parlance - chat session orchestration.
//!
//! This crate exposes the runtime used by the `parlance` CLI (`src/main.rs`):
//!
//! - `chat`: sessions, providers, slash commands, the cancelable request
//!   pipeline and the `ChatService` façade
//! - `history`: persisted session records and their storage backends
//! - `telemetry`, `host`: narrow interfaces to the embedding application
//! - `providers`: the built-in echo provider
//! - `config`, `cli`: settings and command-line arguments

pub mod chat;
pub mod cli;
pub mod config;
pub mod error;
pub mod history;
pub mod host;
pub mod providers;
pub mod telemetry;
pub mod utils;

pub use error::{ParlanceError, Result};
