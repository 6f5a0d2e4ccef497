// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Chat session orchestration
//!
//! Sessions (`model`), pluggable reply backends (`provider`, `registry`),
//! slash-command handling (`slash`), the cancelable request pipeline
//! (`pipeline`) and the `ChatService` façade that ties them together.

pub mod model;
pub mod pipeline;
pub mod provider;
pub mod registry;
pub mod service;
pub mod slash;
pub mod types;

pub use model::{ChatModel, ChatModelChange, ChatRequestModel, ChatResponseModel, SessionState};
pub use pipeline::{RequestOutcome, ResponseCompletion, EMPTY_RESPONSE_MESSAGE};
pub use provider::{ChatProvider, ProgressReporter, ProviderCapabilities, SlashCommandProvider};
pub use registry::{ProviderRegistry, Registration};
pub use service::{ChatService, ChatServiceBuilder, INVALID_COMMAND_ID};
pub use types::*;
