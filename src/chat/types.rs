// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Value types exchanged between the chat service, its providers and callers.

use std::fmt;
use std::sync::{Arc, Weak};

use serde::{Deserialize, Serialize};

use crate::chat::provider::SlashCommandProvider;

/// A structured follow-up the user can send back as a reply
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyFollowup {
    /// Message sent to the provider when the follow-up is chosen
    pub message: String,
    /// Label shown instead of the message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tooltip: Option<String>,
    /// Opaque provider data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl ReplyFollowup {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            title: None,
            tooltip: None,
            metadata: None,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }
}

/// What the user asked: free text or a chosen follow-up
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChatMessage {
    Text(String),
    Followup(ReplyFollowup),
}

impl ChatMessage {
    /// The text that would be shown for this message
    pub fn text(&self) -> &str {
        match self {
            ChatMessage::Text(text) => text,
            ChatMessage::Followup(followup) => &followup.message,
        }
    }

    /// Only plain strings starting with `/` are slash commands.
    pub fn is_slash_command(&self) -> bool {
        matches!(self, ChatMessage::Text(text) if text.starts_with('/'))
    }

    pub fn request_type(&self) -> RequestType {
        match self {
            ChatMessage::Text(text) if text.starts_with('/') => RequestType::SlashCommand,
            ChatMessage::Text(_) => RequestType::String,
            ChatMessage::Followup(_) => RequestType::Followup,
        }
    }
}

impl From<&str> for ChatMessage {
    fn from(text: &str) -> Self {
        ChatMessage::Text(text.to_string())
    }
}

impl From<String> for ChatMessage {
    fn from(text: String) -> Self {
        ChatMessage::Text(text)
    }
}

impl From<ReplyFollowup> for ChatMessage {
    fn from(followup: ReplyFollowup) -> Self {
        ChatMessage::Followup(followup)
    }
}

/// Request classification reported with provider telemetry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RequestType {
    String,
    Followup,
    SlashCommand,
}

/// A partial result streamed by a provider while it is producing a reply
#[derive(Debug, Clone, PartialEq)]
pub enum ChatProgress {
    /// Content to append to the response
    Content(String),
    /// Provider-side identifier for the request
    RequestId(String),
}

/// Error information attached to a provider reply
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorDetails {
    pub message: String,
    #[serde(default)]
    pub response_is_incomplete: bool,
    #[serde(default)]
    pub response_is_filtered: bool,
}

impl ErrorDetails {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            response_is_incomplete: false,
            response_is_filtered: false,
        }
    }

    pub fn filtered(message: impl Into<String>) -> Self {
        Self {
            response_is_filtered: true,
            ..Self::new(message)
        }
    }
}

/// Provider-measured timings, in milliseconds
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseTimings {
    pub first_progress: u64,
    pub total_elapsed: u64,
}

/// Final result of a provider reply
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompleteResponse {
    pub error_details: Option<ErrorDetails>,
    pub timings: Option<ResponseTimings>,
}

impl CompleteResponse {
    pub fn success() -> Self {
        Self::default()
    }

    pub fn error(details: ErrorDetails) -> Self {
        Self {
            error_details: Some(details),
            timings: None,
        }
    }

    pub fn with_timings(mut self, timings: ResponseTimings) -> Self {
        self.timings = Some(timings);
        self
    }
}

/// An exchange that was answered outside of the provider pipeline
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompletedExchange {
    pub message: String,
    pub error_details: Option<ErrorDetails>,
}

/// Provider-side session object returned by `prepare_session`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSessionHandle {
    pub id: u64,
    pub requester_username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requester_avatar_uri: Option<String>,
    pub responder_username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub responder_avatar_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_placeholder: Option<String>,
}

impl ChatSessionHandle {
    pub fn new(
        id: u64,
        requester_username: impl Into<String>,
        responder_username: impl Into<String>,
    ) -> Self {
        Self {
            id,
            requester_username: requester_username.into(),
            requester_avatar_uri: None,
            responder_username: responder_username.into(),
            responder_avatar_uri: None,
            input_placeholder: None,
        }
    }
}

/// Arguments for `ChatProvider::provide_reply`
#[derive(Debug, Clone, PartialEq)]
pub struct ReplyRequest {
    pub session: ChatSessionHandle,
    pub message: ChatMessage,
}

/// A request produced by a provider's `resolve_request`
#[derive(Debug, Clone, PartialEq)]
pub struct ChatDynamicRequest {
    pub message: String,
    pub metadata: Option<serde_json::Value>,
}

impl ChatDynamicRequest {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            metadata: None,
        }
    }
}

/// One element of a welcome message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WelcomeItem {
    Markdown(String),
    Followups(Vec<ReplyFollowup>),
}

/// A slash command offered to the user.
///
/// Commands contributed by an auxiliary provider keep a weak reference to it
/// so `/command` input can later be routed back for resolution.
#[derive(Clone)]
pub struct SlashCommand {
    pub command: String,
    pub detail: Option<String>,
    pub provider: Option<Weak<dyn SlashCommandProvider>>,
}

impl SlashCommand {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            detail: None,
            provider: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub(crate) fn tagged(mut self, provider: &Arc<dyn SlashCommandProvider>) -> Self {
        self.provider = Some(Arc::downgrade(provider));
        self
    }

    /// The contributing provider, if it is still registered somewhere.
    pub fn resolver(&self) -> Option<Arc<dyn SlashCommandProvider>> {
        self.provider.as_ref().and_then(Weak::upgrade)
    }
}

impl fmt::Debug for SlashCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlashCommand")
            .field("command", &self.command)
            .field("detail", &self.detail)
            .field("tagged", &self.provider.is_some())
            .finish()
    }
}

/// Entry in the list of past sessions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatDetail {
    pub session_id: String,
    pub title: String,
}

/// Public description of a registered provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderInfo {
    pub id: String,
    pub display_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum VoteDirection {
    Up,
    Down,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CopyKind {
    Action,
    Toolbar,
}

/// Something the user did with a response
#[derive(Debug, Clone, PartialEq)]
pub enum UserAction {
    Vote { direction: VoteDirection },
    Copy { copy_kind: CopyKind },
    Insert { new_file: bool },
    Command { command_id: String },
    RunInTerminal { language_id: Option<String> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct UserActionEvent {
    pub provider_id: String,
    pub session_id: String,
    pub request_id: Option<String>,
    pub action: UserAction,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_type_classification() {
        assert_eq!(
            ChatMessage::from("/explain foo").request_type(),
            RequestType::SlashCommand
        );
        assert_eq!(
            ChatMessage::from("hello").request_type(),
            RequestType::String
        );
        assert_eq!(
            ChatMessage::from(ReplyFollowup::new("/not a command")).request_type(),
            RequestType::Followup
        );
    }

    #[test]
    fn test_followup_is_never_a_slash_command() {
        let message = ChatMessage::from(ReplyFollowup::new("/upper"));
        assert!(!message.is_slash_command());
        assert_eq!(message.text(), "/upper");
    }

    #[test]
    fn test_message_serializes_untagged() {
        let text = serde_json::to_value(ChatMessage::from("hi")).unwrap();
        assert_eq!(text, serde_json::json!("hi"));

        let followup: ChatMessage =
            serde_json::from_value(serde_json::json!({"message": "more", "title": "More"}))
                .unwrap();
        assert_eq!(
            followup,
            ChatMessage::Followup(ReplyFollowup::new("more").with_title("More"))
        );
    }

    #[test]
    fn test_request_type_serializes_camel_case() {
        assert_eq!(
            serde_json::to_value(RequestType::SlashCommand).unwrap(),
            serde_json::json!("slashCommand")
        );
    }

    #[test]
    fn test_error_details_defaults_flags() {
        let details: ErrorDetails =
            serde_json::from_value(serde_json::json!({"message": "nope"})).unwrap();
        assert!(!details.response_is_filtered);
        assert!(!details.response_is_incomplete);
        assert!(ErrorDetails::filtered("x").response_is_filtered);
    }

    #[test]
    fn test_untagged_slash_command_has_no_resolver() {
        let command = SlashCommand::new("explain").with_detail("Explain code");
        assert!(command.resolver().is_none());
        assert!(format!("{:?}", command).contains("explain"));
    }
}
