// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Chat provider traits
//!
//! Defines the contract between the chat service and pluggable reply
//! backends, plus the auxiliary slash-command providers scoped to them.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::chat::types::{
    ChatDynamicRequest, ChatProgress, ChatSessionHandle, CompleteResponse, ReplyFollowup,
    ReplyRequest, SlashCommand, WelcomeItem,
};
use crate::error::Result;

/// Optional provider features the service may call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProviderCapabilities {
    /// `provide_followups` is implemented
    pub followups: bool,
    /// `provide_slash_commands` is implemented
    pub slash_commands: bool,
    /// `resolve_request` is implemented
    pub resolve_request: bool,
}

/// Main trait for chat providers
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Unique provider id (e.g., "copilot", "echo")
    fn id(&self) -> &str;

    /// Name shown to users
    fn display_name(&self) -> &str {
        self.id()
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities::default()
    }

    /// Create the provider side of a session.
    ///
    /// `state` is the opaque state persisted with a restored session. Returning
    /// `Ok(None)` means the provider declined to open a session.
    async fn prepare_session(
        &self,
        state: Option<serde_json::Value>,
        token: CancellationToken,
    ) -> Result<Option<ChatSessionHandle>>;

    /// Welcome content for fresh sessions
    async fn provide_welcome_message(
        &self,
        _token: CancellationToken,
    ) -> Result<Option<Vec<WelcomeItem>>> {
        Ok(None)
    }

    /// Produce a reply, streaming partial results through `progress`.
    ///
    /// `Ok(None)` is treated as an empty response by the service.
    async fn provide_reply(
        &self,
        request: ReplyRequest,
        progress: ProgressReporter,
        token: CancellationToken,
    ) -> Result<Option<CompleteResponse>>;

    async fn provide_followups(
        &self,
        _session: &ChatSessionHandle,
        _token: CancellationToken,
    ) -> Result<Option<Vec<ReplyFollowup>>> {
        Ok(None)
    }

    async fn provide_slash_commands(
        &self,
        _session: &ChatSessionHandle,
        _token: CancellationToken,
    ) -> Result<Option<Vec<SlashCommand>>> {
        Ok(None)
    }

    /// Turn an opaque host context into a request.
    async fn resolve_request(
        &self,
        _session: &ChatSessionHandle,
        _context: serde_json::Value,
        _token: CancellationToken,
    ) -> Result<Option<ChatDynamicRequest>> {
        Ok(None)
    }

    /// Notification that a request was removed from the session.
    async fn remove_request(&self, _session: &ChatSessionHandle, _request_id: &str) {}
}

/// Contributes extra slash commands to one chat provider
#[async_trait]
pub trait SlashCommandProvider: Send + Sync {
    /// Id of the chat provider these commands belong to
    fn chat_provider_id(&self) -> &str;

    async fn provide_slash_commands(
        &self,
        token: CancellationToken,
    ) -> Result<Option<Vec<SlashCommand>>>;

    /// Rewrite `/command args` input before it reaches the chat provider.
    async fn resolve_slash_command(
        &self,
        command: &str,
        token: CancellationToken,
    ) -> Result<Option<String>>;
}

/// Callback handed to `provide_reply` for streaming progress
#[derive(Clone)]
pub struct ProgressReporter {
    sink: Arc<dyn Fn(ChatProgress) + Send + Sync>,
}

impl ProgressReporter {
    pub fn new(sink: impl Fn(ChatProgress) + Send + Sync + 'static) -> Self {
        Self {
            sink: Arc::new(sink),
        }
    }

    /// A reporter that drops everything
    pub fn noop() -> Self {
        Self::new(|_| {})
    }

    pub fn report(&self, progress: ChatProgress) {
        (self.sink)(progress);
    }

    pub fn content(&self, text: impl Into<String>) {
        self.report(ChatProgress::Content(text.into()));
    }

    pub fn request_id(&self, id: impl Into<String>) {
        self.report(ChatProgress::RequestId(id.into()));
    }
}

impl fmt::Debug for ProgressReporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressReporter").finish_non_exhaustive()
    }
}
