// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Serializable session records
//!
//! These are the JSON shapes written to the workspace store.

use serde::{Deserialize, Serialize};

use crate::chat::types::{ChatMessage, ErrorDetails, ReplyFollowup, VoteDirection, WelcomeItem};

/// A persisted session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub session_id: String,
    pub provider_id: String,
    /// Milliseconds since the Unix epoch
    #[serde(default)]
    pub creation_date: i64,
    #[serde(default)]
    pub is_imported: bool,
    #[serde(default)]
    pub requester_username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requester_avatar_uri: Option<String>,
    #[serde(default)]
    pub responder_username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub responder_avatar_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub welcome_message: Option<Vec<WelcomeItem>>,
    #[serde(default)]
    pub requests: Vec<RequestRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_state: Option<serde_json::Value>,
}

impl SessionRecord {
    pub fn new(session_id: impl Into<String>, provider_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            provider_id: provider_id.into(),
            creation_date: chrono::Utc::now().timestamp_millis(),
            is_imported: false,
            requester_username: String::new(),
            requester_avatar_uri: None,
            responder_username: String::new(),
            responder_avatar_uri: None,
            welcome_message: None,
            requests: Vec::new(),
            provider_state: None,
        }
    }

    /// First request's message, or empty
    pub fn title(&self) -> String {
        self.requests
            .first()
            .map(|r| r.message.text().to_string())
            .unwrap_or_default()
    }

    pub fn has_requests(&self) -> bool {
        !self.requests.is_empty()
    }
}

/// A persisted request and its response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_request_id: Option<String>,
    pub message: ChatMessage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_error_details: Option<ErrorDetails>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub followups: Option<Vec<ReplyFollowup>>,
    #[serde(default)]
    pub is_canceled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vote: Option<VoteDirection>,
}

impl RequestRecord {
    pub fn new(message: impl Into<ChatMessage>, response: Option<String>) -> Self {
        Self {
            provider_request_id: None,
            message: message.into(),
            response,
            response_error_details: None,
            followups: None,
            is_canceled: false,
            vote: None,
        }
    }
}
