// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Echo provider
//!
//! Streams the user's message back word by word. Used by the CLI and handy
//! for exercising the service without a model backend.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::chat::provider::{
    ChatProvider, ProgressReporter, ProviderCapabilities, SlashCommandProvider,
};
use crate::chat::types::{
    ChatDynamicRequest, ChatSessionHandle, CompleteResponse, ErrorDetails, ReplyFollowup,
    ReplyRequest, ResponseTimings, SlashCommand, WelcomeItem,
};
use crate::config::EchoConfig;
use crate::error::Result;

pub const ECHO_PROVIDER_ID: &str = "echo";

const REVERSE_COMMAND: &str = "reverse";
const UPPER_COMMAND: &str = "upper";

/// Replies with the request text
pub struct EchoProvider {
    chunk_delay: Duration,
    next_session: AtomicU64,
    next_reply: AtomicU64,
}

impl Default for EchoProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl EchoProvider {
    pub fn new() -> Self {
        Self::with_chunk_delay(Duration::ZERO)
    }

    pub fn with_chunk_delay(chunk_delay: Duration) -> Self {
        Self {
            chunk_delay,
            next_session: AtomicU64::new(1),
            next_reply: AtomicU64::new(1),
        }
    }

    pub fn from_config(config: &EchoConfig) -> Self {
        Self::with_chunk_delay(Duration::from_millis(config.chunk_delay_ms))
    }

    /// The text the provider answers with
    fn reply_text(message: &str) -> String {
        match message.strip_prefix(&format!("/{}", REVERSE_COMMAND)) {
            Some(rest) => rest.trim().chars().rev().collect(),
            None => message.to_string(),
        }
    }
}

#[async_trait]
impl ChatProvider for EchoProvider {
    fn id(&self) -> &str {
        ECHO_PROVIDER_ID
    }

    fn display_name(&self) -> &str {
        "Echo"
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            followups: true,
            slash_commands: true,
            resolve_request: true,
        }
    }

    async fn prepare_session(
        &self,
        _state: Option<serde_json::Value>,
        _token: CancellationToken,
    ) -> Result<Option<ChatSessionHandle>> {
        let id = self.next_session.fetch_add(1, Ordering::Relaxed);
        let mut session = ChatSessionHandle::new(id, "you", "echo");
        session.input_placeholder = Some("Say something".to_string());
        Ok(Some(session))
    }

    async fn provide_welcome_message(
        &self,
        _token: CancellationToken,
    ) -> Result<Option<Vec<WelcomeItem>>> {
        Ok(Some(vec![
            WelcomeItem::Markdown("I repeat whatever you say.".to_string()),
            WelcomeItem::Followups(vec![
                ReplyFollowup::new("/reverse hello world").with_title("Try /reverse")
            ]),
        ]))
    }

    async fn provide_reply(
        &self,
        request: ReplyRequest,
        progress: ProgressReporter,
        token: CancellationToken,
    ) -> Result<Option<CompleteResponse>> {
        let reply = Self::reply_text(request.message.text());
        if reply.trim().is_empty() {
            return Ok(Some(CompleteResponse::error(ErrorDetails::new(
                "Nothing to echo",
            ))));
        }

        let reply_id = self.next_reply.fetch_add(1, Ordering::Relaxed);
        progress.request_id(format!("echo-{}", reply_id));

        let started = Instant::now();
        let mut first_progress = None;
        for word in reply.split_inclusive(' ') {
            if !self.chunk_delay.is_zero() {
                tokio::select! {
                    _ = token.cancelled() => return Ok(None),
                    _ = tokio::time::sleep(self.chunk_delay) => {}
                }
            }
            if token.is_cancelled() {
                return Ok(None);
            }
            progress.content(word);
            first_progress.get_or_insert_with(|| started.elapsed());
        }

        Ok(Some(CompleteResponse::success().with_timings(ResponseTimings {
            first_progress: first_progress.unwrap_or_default().as_millis() as u64,
            total_elapsed: started.elapsed().as_millis() as u64,
        })))
    }

    async fn provide_followups(
        &self,
        _session: &ChatSessionHandle,
        _token: CancellationToken,
    ) -> Result<Option<Vec<ReplyFollowup>>> {
        Ok(Some(vec![ReplyFollowup::new("Tell me more")]))
    }

    async fn provide_slash_commands(
        &self,
        _session: &ChatSessionHandle,
        _token: CancellationToken,
    ) -> Result<Option<Vec<SlashCommand>>> {
        Ok(Some(vec![
            SlashCommand::new(REVERSE_COMMAND).with_detail("Echo the message backwards")
        ]))
    }

    /// Accepts a bare string or `{"message": "..."}`.
    async fn resolve_request(
        &self,
        _session: &ChatSessionHandle,
        context: serde_json::Value,
        _token: CancellationToken,
    ) -> Result<Option<ChatDynamicRequest>> {
        let message = match &context {
            serde_json::Value::String(text) => Some(text.clone()),
            other => other
                .get("message")
                .and_then(|m| m.as_str())
                .map(str::to_string),
        };
        Ok(message.map(|message| ChatDynamicRequest {
            message,
            metadata: Some(context),
        }))
    }
}

/// Adds `/upper` to the echo provider
#[derive(Debug, Default)]
pub struct EchoSlashCommands;

#[async_trait]
impl SlashCommandProvider for EchoSlashCommands {
    fn chat_provider_id(&self) -> &str {
        ECHO_PROVIDER_ID
    }

    async fn provide_slash_commands(
        &self,
        _token: CancellationToken,
    ) -> Result<Option<Vec<SlashCommand>>> {
        Ok(Some(vec![
            SlashCommand::new(UPPER_COMMAND).with_detail("Echo the message in capitals")
        ]))
    }

    async fn resolve_slash_command(
        &self,
        command: &str,
        _token: CancellationToken,
    ) -> Result<Option<String>> {
        let rest = command
            .strip_prefix(&format!("/{}", UPPER_COMMAND))
            .map(str::trim)
            .unwrap_or_default();
        if rest.is_empty() {
            return Ok(None);
        }
        Ok(Some(rest.to_uppercase()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::types::ChatProgress;
    use std::sync::{Arc, Mutex};

    fn collecting_reporter() -> (ProgressReporter, Arc<Mutex<Vec<ChatProgress>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        (
            ProgressReporter::new(move |p| sink.lock().unwrap().push(p)),
            seen,
        )
    }

    async fn reply(provider: &EchoProvider, text: &str) -> (Option<CompleteResponse>, String) {
        let session = provider
            .prepare_session(None, CancellationToken::new())
            .await
            .unwrap()
            .unwrap();
        let (reporter, seen) = collecting_reporter();
        let response = provider
            .provide_reply(
                ReplyRequest {
                    session,
                    message: text.into(),
                },
                reporter,
                CancellationToken::new(),
            )
            .await
            .unwrap();
        let content: String = seen
            .lock()
            .unwrap()
            .iter()
            .filter_map(|p| match p {
                ChatProgress::Content(c) => Some(c.as_str()),
                ChatProgress::RequestId(_) => None,
            })
            .collect();
        (response, content)
    }

    #[tokio::test]
    async fn test_echoes_word_by_word() {
        let provider = EchoProvider::new();
        let (reply_id_reporter, seen) = collecting_reporter();
        let session = ChatSessionHandle::new(1, "you", "echo");
        provider
            .provide_reply(
                ReplyRequest {
                    session,
                    message: "one two three".into(),
                },
                reply_id_reporter,
                CancellationToken::new(),
            )
            .await
            .unwrap();

        let seen = seen.lock().unwrap();
        assert!(matches!(seen[0], ChatProgress::RequestId(_)));
        assert_eq!(seen[1], ChatProgress::Content("one ".into()));
        assert_eq!(seen.len(), 4);
    }

    #[tokio::test]
    async fn test_reverse_command() {
        let (response, content) = reply(&EchoProvider::new(), "/reverse abc").await;
        assert_eq!(content, "cba");
        assert!(response.unwrap().error_details.is_none());
    }

    #[tokio::test]
    async fn test_blank_reply_is_an_error() {
        let (response, content) = reply(&EchoProvider::new(), "/reverse   ").await;
        assert!(content.is_empty());
        assert_eq!(response.unwrap().error_details.unwrap().message, "Nothing to echo");
    }

    #[tokio::test]
    async fn test_cancelled_before_first_chunk() {
        let provider = EchoProvider::with_chunk_delay(Duration::from_millis(50));
        let token = CancellationToken::new();
        token.cancel();
        let response = provider
            .provide_reply(
                ReplyRequest {
                    session: ChatSessionHandle::new(1, "you", "echo"),
                    message: "hi".into(),
                },
                ProgressReporter::noop(),
                token,
            )
            .await
            .unwrap();
        assert!(response.is_none());
    }

    #[tokio::test]
    async fn test_upper_resolution() {
        let upper = EchoSlashCommands;
        let token = CancellationToken::new();
        assert_eq!(
            upper
                .resolve_slash_command("/upper make noise", token.clone())
                .await
                .unwrap()
                .as_deref(),
            Some("MAKE NOISE")
        );
        assert_eq!(upper.resolve_slash_command("/upper", token).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_resolve_request_accepts_string_or_object() {
        let provider = EchoProvider::new();
        let session = ChatSessionHandle::new(1, "you", "echo");
        let token = CancellationToken::new();

        let from_string = provider
            .resolve_request(&session, serde_json::json!("hey"), token.clone())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(from_string.message, "hey");

        let from_object = provider
            .resolve_request(&session, serde_json::json!({"message": "yo"}), token.clone())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(from_object.message, "yo");

        assert!(provider
            .resolve_request(&session, serde_json::json!(42), token)
            .await
            .unwrap()
            .is_none());
    }
}
