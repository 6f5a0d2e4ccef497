// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Chat session model
//!
//! A `ChatModel` is one session: its requests, the provider session handle,
//! the welcome message and an initialization barrier other operations wait
//! on. State lives behind a mutex that is never held across an await.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use tokio::sync::{broadcast, watch};

use crate::chat::types::{
    ChatMessage, ChatProgress, ChatSessionHandle, CompleteResponse, ErrorDetails, ReplyFollowup,
    VoteDirection, WelcomeItem,
};
use crate::error::{ParlanceError, Result};
use crate::history::record::{RequestRecord, SessionRecord};
use crate::utils::lock_or_recover;

const CHANGE_CHANNEL_CAPACITY: usize = 256;

static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(0);

fn next_request_id() -> String {
    format!("request_{}", NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed))
}

/// Lifecycle of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Initializing,
    Ready,
    Disposed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ResponseState {
    #[default]
    Pending,
    Complete,
    Cancelled,
}

/// Response being produced for a request
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatResponseModel {
    /// Accumulated content
    pub content: String,
    pub state: ResponseState,
    pub error_details: Option<ErrorDetails>,
    pub followups: Option<Vec<ReplyFollowup>>,
    pub vote: Option<VoteDirection>,
}

impl ChatResponseModel {
    pub fn is_pending(&self) -> bool {
        self.state == ResponseState::Pending
    }

    pub fn is_complete(&self) -> bool {
        self.state == ResponseState::Complete
    }

    pub fn is_cancelled(&self) -> bool {
        self.state == ResponseState::Cancelled
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequestModel {
    pub id: String,
    /// Id reported by the provider through progress
    pub provider_request_id: Option<String>,
    pub message: ChatMessage,
    pub response: ChatResponseModel,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WelcomeMessage {
    pub items: Vec<WelcomeItem>,
    pub responder_username: String,
    pub responder_avatar_uri: Option<String>,
}

/// Notifications emitted when a model changes
#[derive(Debug, Clone, PartialEq)]
pub enum ChatModelChange {
    Initialized,
    RequestAdded { request_id: String },
    ResponseProgress { request_id: String, progress: ChatProgress },
    ResponseCompleted { request_id: String },
    RequestCancelled { request_id: String },
    FollowupsReady { request_id: String },
    RequestRemoved { request_id: String },
    Disposed,
}

#[derive(Debug, Default)]
struct ModelInner {
    requests: Vec<ChatRequestModel>,
    session: Option<ChatSessionHandle>,
    welcome: Option<WelcomeMessage>,
    initialization_error: Option<String>,
    requester_username: String,
    requester_avatar_uri: Option<String>,
    responder_username: String,
    responder_avatar_uri: Option<String>,
}

/// One chat session
pub struct ChatModel {
    session_id: String,
    provider_id: String,
    creation_date: i64,
    is_imported: bool,
    provider_state: Option<serde_json::Value>,
    inner: Mutex<ModelInner>,
    state: watch::Sender<SessionState>,
    changes: broadcast::Sender<ChatModelChange>,
}

impl ChatModel {
    /// Create a session, optionally seeded from a persisted record.
    ///
    /// A restored session keeps the record's id, creation date, requests and
    /// welcome message.
    pub fn new(provider_id: impl Into<String>, history: Option<&SessionRecord>) -> Self {
        let (state, _) = watch::channel(SessionState::Uninitialized);
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);

        let mut inner = ModelInner::default();
        let (session_id, creation_date, is_imported, provider_state) = match history {
            Some(record) => {
                inner.requests = record.requests.iter().map(restore_request).collect();
                inner.requester_username = record.requester_username.clone();
                inner.requester_avatar_uri = record.requester_avatar_uri.clone();
                inner.responder_username = record.responder_username.clone();
                inner.responder_avatar_uri = record.responder_avatar_uri.clone();
                inner.welcome = record.welcome_message.clone().map(|items| WelcomeMessage {
                    items,
                    responder_username: record.responder_username.clone(),
                    responder_avatar_uri: record.responder_avatar_uri.clone(),
                });
                (
                    record.session_id.clone(),
                    record.creation_date,
                    record.is_imported,
                    record.provider_state.clone(),
                )
            }
            None => (
                uuid::Uuid::new_v4().to_string(),
                chrono::Utc::now().timestamp_millis(),
                false,
                None,
            ),
        };

        Self {
            session_id,
            provider_id: provider_id.into(),
            creation_date,
            is_imported,
            provider_state,
            inner: Mutex::new(inner),
            state,
            changes,
        }
    }

    fn lock(&self) -> MutexGuard<'_, ModelInner> {
        lock_or_recover(&self.inner, "chat model")
    }

    fn emit(&self, change: ChatModelChange) {
        // No subscribers is fine.
        let _ = self.changes.send(change);
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn provider_id(&self) -> &str {
        &self.provider_id
    }

    /// Milliseconds since the Unix epoch
    pub fn creation_date(&self) -> i64 {
        self.creation_date
    }

    pub fn is_imported(&self) -> bool {
        self.is_imported
    }

    pub fn provider_state(&self) -> Option<serde_json::Value> {
        self.provider_state.clone()
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    pub fn is_disposed(&self) -> bool {
        self.state() == SessionState::Disposed
    }

    /// Subscribe to change notifications
    pub fn subscribe(&self) -> broadcast::Receiver<ChatModelChange> {
        self.changes.subscribe()
    }

    /// Provider session handle, present once the model is ready
    pub fn session(&self) -> Option<ChatSessionHandle> {
        self.lock().session.clone()
    }

    pub fn welcome_message(&self) -> Option<WelcomeMessage> {
        self.lock().welcome.clone()
    }

    pub fn initialization_error(&self) -> Option<String> {
        self.lock().initialization_error.clone()
    }

    pub fn responder_username(&self) -> String {
        self.lock().responder_username.clone()
    }

    pub fn requests(&self) -> Vec<ChatRequestModel> {
        self.lock().requests.clone()
    }

    pub fn request(&self, request_id: &str) -> Option<ChatRequestModel> {
        self.lock()
            .requests
            .iter()
            .find(|r| r.id == request_id)
            .cloned()
    }

    pub fn request_count(&self) -> usize {
        self.lock().requests.len()
    }

    /// Title derived from the first request
    pub fn title(&self) -> String {
        self.lock()
            .requests
            .first()
            .map(|r| r.message.text().to_string())
            .unwrap_or_default()
    }

    pub(crate) fn start_initialization(&self) {
        self.state.send_if_modified(|state| {
            if *state == SessionState::Uninitialized {
                *state = SessionState::Initializing;
                true
            } else {
                false
            }
        });
    }

    /// Attach the provider session and mark the model ready.
    ///
    /// Returns false if the model was disposed in the meantime. Disposal is
    /// final: a model that is disposed concurrently stays disposed.
    pub fn initialize(
        &self,
        session: ChatSessionHandle,
        welcome: Option<Vec<WelcomeItem>>,
    ) -> bool {
        if self.is_disposed() {
            return false;
        }
        {
            let mut inner = self.lock();
            inner.requester_username = session.requester_username.clone();
            inner.requester_avatar_uri = session.requester_avatar_uri.clone();
            inner.responder_username = session.responder_username.clone();
            inner.responder_avatar_uri = session.responder_avatar_uri.clone();
            if let Some(items) = welcome {
                inner.welcome = Some(WelcomeMessage {
                    items,
                    responder_username: session.responder_username.clone(),
                    responder_avatar_uri: session.responder_avatar_uri.clone(),
                });
            }
            inner.session = Some(session);
        }

        let ready = self.state.send_if_modified(|state| {
            if *state == SessionState::Disposed {
                false
            } else {
                *state = SessionState::Ready;
                true
            }
        });
        if ready {
            self.emit(ChatModelChange::Initialized);
        }
        ready
    }

    pub fn set_initialization_error(&self, error: impl Into<String>) {
        self.lock().initialization_error = Some(error.into());
    }

    /// Dispose the model. Waiters on the initialization barrier are released
    /// with an error.
    pub fn dispose(&self) {
        let previous = self.state.send_replace(SessionState::Disposed);
        if previous != SessionState::Disposed {
            self.emit(ChatModelChange::Disposed);
        }
    }

    /// Wait until initialization has settled.
    pub async fn wait_for_initialization(&self) -> Result<()> {
        let mut rx = self.state.subscribe();
        let settled = rx
            .wait_for(|state| matches!(state, SessionState::Ready | SessionState::Disposed))
            .await
            .map(|state| *state)
            .map_err(|_| ParlanceError::SessionDisposed(self.session_id.clone()))?;

        match settled {
            SessionState::Ready => Ok(()),
            _ => match self.initialization_error() {
                Some(err) => Err(ParlanceError::SessionInitialization(err)),
                None => Err(ParlanceError::SessionDisposed(self.session_id.clone())),
            },
        }
    }

    /// Append a new pending request and return its id.
    pub fn add_request(&self, message: ChatMessage) -> String {
        let id = next_request_id();
        self.lock().requests.push(ChatRequestModel {
            id: id.clone(),
            provider_request_id: None,
            message,
            response: ChatResponseModel::default(),
        });
        self.emit(ChatModelChange::RequestAdded {
            request_id: id.clone(),
        });
        id
    }

    pub fn accept_response_progress(&self, request_id: &str, progress: ChatProgress) -> bool {
        {
            let mut inner = self.lock();
            let Some(request) = inner.requests.iter_mut().find(|r| r.id == request_id) else {
                return false;
            };
            match &progress {
                ChatProgress::Content(content) => request.response.content.push_str(content),
                ChatProgress::RequestId(id) => request.provider_request_id = Some(id.clone()),
            }
        }
        self.emit(ChatModelChange::ResponseProgress {
            request_id: request_id.to_string(),
            progress,
        });
        true
    }

    pub fn complete_response(&self, request_id: &str, response: &CompleteResponse) -> bool {
        {
            let mut inner = self.lock();
            let Some(request) = inner.requests.iter_mut().find(|r| r.id == request_id) else {
                return false;
            };
            request.response.state = ResponseState::Complete;
            request.response.error_details = response.error_details.clone();
        }
        self.emit(ChatModelChange::ResponseCompleted {
            request_id: request_id.to_string(),
        });
        true
    }

    pub fn cancel_request(&self, request_id: &str) -> bool {
        {
            let mut inner = self.lock();
            let Some(request) = inner.requests.iter_mut().find(|r| r.id == request_id) else {
                return false;
            };
            request.response.state = ResponseState::Cancelled;
        }
        self.emit(ChatModelChange::RequestCancelled {
            request_id: request_id.to_string(),
        });
        true
    }

    pub fn set_followups(&self, request_id: &str, followups: Option<Vec<ReplyFollowup>>) -> bool {
        {
            let mut inner = self.lock();
            let Some(request) = inner.requests.iter_mut().find(|r| r.id == request_id) else {
                return false;
            };
            request.response.followups = followups;
        }
        self.emit(ChatModelChange::FollowupsReady {
            request_id: request_id.to_string(),
        });
        true
    }

    pub fn set_vote(&self, request_id: &str, vote: Option<VoteDirection>) -> bool {
        let mut inner = self.lock();
        match inner.requests.iter_mut().find(|r| r.id == request_id) {
            Some(request) => {
                request.response.vote = vote;
                true
            }
            None => false,
        }
    }

    pub fn remove_request(&self, request_id: &str) -> bool {
        let removed = {
            let mut inner = self.lock();
            let before = inner.requests.len();
            inner.requests.retain(|r| r.id != request_id);
            inner.requests.len() < before
        };
        if removed {
            self.emit(ChatModelChange::RequestRemoved {
                request_id: request_id.to_string(),
            });
        }
        removed
    }

    /// Serializable snapshot of the session
    pub fn to_record(&self) -> SessionRecord {
        let inner = self.lock();
        SessionRecord {
            session_id: self.session_id.clone(),
            provider_id: self.provider_id.clone(),
            creation_date: self.creation_date,
            is_imported: self.is_imported,
            requester_username: inner.requester_username.clone(),
            requester_avatar_uri: inner.requester_avatar_uri.clone(),
            responder_username: inner.responder_username.clone(),
            responder_avatar_uri: inner.responder_avatar_uri.clone(),
            welcome_message: inner.welcome.as_ref().map(|w| w.items.clone()),
            requests: inner.requests.iter().map(request_record).collect(),
            provider_state: self.provider_state.clone(),
        }
    }
}

impl std::fmt::Debug for ChatModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatModel")
            .field("session_id", &self.session_id)
            .field("provider_id", &self.provider_id)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

fn restore_request(record: &RequestRecord) -> ChatRequestModel {
    ChatRequestModel {
        id: next_request_id(),
        provider_request_id: record.provider_request_id.clone(),
        message: record.message.clone(),
        response: ChatResponseModel {
            content: record.response.clone().unwrap_or_default(),
            state: if record.is_canceled {
                ResponseState::Cancelled
            } else {
                ResponseState::Complete
            },
            error_details: record.response_error_details.clone(),
            followups: record.followups.clone(),
            vote: record.vote,
        },
    }
}

fn request_record(request: &ChatRequestModel) -> RequestRecord {
    let response = &request.response;
    RequestRecord {
        provider_request_id: request.provider_request_id.clone(),
        message: request.message.clone(),
        response: (!response.is_pending() || !response.content.is_empty())
            .then(|| response.content.clone()),
        response_error_details: response.error_details.clone(),
        followups: response.followups.clone(),
        is_canceled: response.is_cancelled(),
        vote: response.vote,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    fn handle() -> ChatSessionHandle {
        ChatSessionHandle::new(1, "user", "bot")
    }

    #[test]
    fn test_new_model_is_uninitialized() {
        let model = ChatModel::new("p1", None);
        assert_eq!(model.state(), SessionState::Uninitialized);
        assert_eq!(model.provider_id(), "p1");
        assert!(uuid::Uuid::parse_str(model.session_id()).is_ok());
        assert!(model.session().is_none());
        assert_eq!(model.request_count(), 0);
    }

    #[test]
    fn test_progress_accumulates_content() {
        let model = ChatModel::new("p1", None);
        let id = model.add_request("hello".into());

        model.accept_response_progress(&id, ChatProgress::Content("He".into()));
        model.accept_response_progress(&id, ChatProgress::Content("llo".into()));
        model.accept_response_progress(&id, ChatProgress::RequestId("prov-7".into()));

        let request = model.request(&id).unwrap();
        assert_eq!(request.response.content, "Hello");
        assert_eq!(request.provider_request_id.as_deref(), Some("prov-7"));
        assert!(request.response.is_pending());
    }

    #[test]
    fn test_complete_and_cancel() {
        let model = ChatModel::new("p1", None);
        let a = model.add_request("a".into());
        let b = model.add_request("b".into());

        model.complete_response(&a, &CompleteResponse::error(ErrorDetails::new("bad")));
        model.cancel_request(&b);

        let requests = model.requests();
        assert!(requests[0].response.is_complete());
        assert_eq!(
            requests[0].response.error_details.as_ref().unwrap().message,
            "bad"
        );
        assert!(requests[1].response.is_cancelled());
        assert!(!model.cancel_request("missing"));
    }

    #[test]
    fn test_remove_request() {
        let model = ChatModel::new("p1", None);
        let a = model.add_request("a".into());
        assert!(model.remove_request(&a));
        assert!(!model.remove_request(&a));
        assert_eq!(model.request_count(), 0);
    }

    #[test]
    fn test_record_roundtrip_preserves_requests() {
        let model = ChatModel::new("p1", None);
        model.initialize(handle(), Some(vec![WelcomeItem::Markdown("hi".into())]));
        let id = model.add_request("question".into());
        model.accept_response_progress(&id, ChatProgress::Content("answer".into()));
        model.complete_response(&id, &CompleteResponse::success());
        model.set_vote(&id, Some(VoteDirection::Up));

        let record = model.to_record();
        assert_eq!(record.responder_username, "bot");
        assert_eq!(record.requests.len(), 1);
        assert_eq!(record.requests[0].response.as_deref(), Some("answer"));
        assert_eq!(record.requests[0].vote, Some(VoteDirection::Up));

        let restored = ChatModel::new("p1", Some(&record));
        assert_eq!(restored.session_id(), model.session_id());
        assert_eq!(restored.creation_date(), model.creation_date());
        let requests = restored.requests();
        assert_eq!(requests[0].response.content, "answer");
        assert!(requests[0].response.is_complete());
        assert_eq!(
            restored.welcome_message().unwrap().items,
            vec![WelcomeItem::Markdown("hi".into())]
        );
    }

    #[test]
    fn test_pending_request_without_content_has_no_response() {
        let model = ChatModel::new("p1", None);
        model.add_request("q".into());
        assert!(model.to_record().requests[0].response.is_none());
    }

    #[tokio::test]
    async fn test_wait_for_initialization_ready() {
        let model = Arc::new(ChatModel::new("p1", None));
        model.start_initialization();
        assert_eq!(model.state(), SessionState::Initializing);

        let waiter = {
            let model = Arc::clone(&model);
            tokio::spawn(async move { model.wait_for_initialization().await })
        };
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(model.initialize(handle(), None));

        waiter.await.unwrap().unwrap();
        assert_eq!(model.session().unwrap().responder_username, "bot");
    }

    #[tokio::test]
    async fn test_wait_for_initialization_failure() {
        let model = ChatModel::new("p1", None);
        model.set_initialization_error("boom");
        model.dispose();

        let err = model.wait_for_initialization().await.unwrap_err();
        assert!(matches!(err, ParlanceError::SessionInitialization(ref m) if m == "boom"));
    }

    #[tokio::test]
    async fn test_wait_for_initialization_disposed() {
        let model = ChatModel::new("p1", None);
        model.dispose();
        assert!(matches!(
            model.wait_for_initialization().await,
            Err(ParlanceError::SessionDisposed(_))
        ));
        assert!(!model.initialize(handle(), None));
    }

    #[test]
    fn test_dispose_racing_initialize_stays_disposed() {
        use std::sync::Barrier;

        for _ in 0..2000 {
            let model = Arc::new(ChatModel::new("p1", None));
            model.start_initialization();
            let mut rx = model.subscribe();
            let barrier = Arc::new(Barrier::new(2));

            let initializer = {
                let model = Arc::clone(&model);
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    model.initialize(handle(), None)
                })
            };
            barrier.wait();
            model.dispose();
            let initialized = initializer.join().unwrap();

            assert_eq!(model.state(), SessionState::Disposed);
            let mut changes = Vec::new();
            while let Ok(change) = rx.try_recv() {
                changes.push(change);
            }
            // Initialized is only reported for a model that reached Ready
            // before it was disposed.
            let count =
                |wanted: &ChatModelChange| changes.iter().filter(|c| *c == wanted).count();
            assert_eq!(count(&ChatModelChange::Disposed), 1);
            assert_eq!(count(&ChatModelChange::Initialized), usize::from(initialized));
        }
    }

    #[test]
    fn test_title_from_first_request() {
        let model = ChatModel::new("p1", None);
        assert_eq!(model.title(), "");
        model.add_request("first".into());
        model.add_request("second".into());
        assert_eq!(model.title(), "first");
    }

    #[tokio::test]
    async fn test_changes_are_broadcast() {
        let model = ChatModel::new("p1", None);
        let mut rx = model.subscribe();
        let id = model.add_request("x".into());
        model.accept_response_progress(&id, ChatProgress::Content("y".into()));

        assert_eq!(
            rx.recv().await.unwrap(),
            ChatModelChange::RequestAdded {
                request_id: id.clone()
            }
        );
        assert_eq!(
            rx.recv().await.unwrap(),
            ChatModelChange::ResponseProgress {
                request_id: id,
                progress: ChatProgress::Content("y".into())
            }
        );
    }
}
