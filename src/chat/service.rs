// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Chat service
//!
//! The orchestrator callers talk to. It owns the live sessions, the
//! persisted history, the provider registry and the pending-request map,
//! and wires them together.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;

use crate::chat::model::ChatModel;
use crate::chat::pipeline::{PendingRequests, RequestJob, ResponseCompletion};
use crate::chat::provider::{ChatProvider, SlashCommandProvider};
use crate::chat::registry::{ProviderRegistry, Registration};
use crate::chat::slash::collect_slash_commands;
use crate::chat::types::{
    ChatDetail, ChatDynamicRequest, ChatMessage, ChatProgress, CompleteResponse,
    CompletedExchange, ProviderInfo, SlashCommand, UserAction, UserActionEvent,
};
use crate::config::Settings;
use crate::error::{ParlanceError, Result};
use crate::history::{HistoryStore, SessionRecord, StorageBackend, MAX_PERSISTED_SESSIONS};
use crate::host::{activation_event, CommandLookup, ExtensionActivator, NoCommands, NoopActivator};
use crate::telemetry::{
    CommandEvent, CopyEvent, InsertEvent, RunInTerminalEvent, TelemetryEvent, TelemetrySink,
    TracingTelemetry, VoteEvent,
};
use crate::utils::{lock_or_recover, preview};

const USER_ACTION_CHANNEL_CAPACITY: usize = 64;

/// Command id reported for commands the host does not know
pub const INVALID_COMMAND_ID: &str = "INVALID";

/// Builder for [`ChatService`]
pub struct ChatServiceBuilder {
    storage: Arc<dyn StorageBackend>,
    storage_key: String,
    max_sessions: usize,
    telemetry: Arc<dyn TelemetrySink>,
    activator: Arc<dyn ExtensionActivator>,
    commands: Arc<dyn CommandLookup>,
}

impl ChatServiceBuilder {
    pub fn new(storage: Arc<dyn StorageBackend>) -> Self {
        let defaults = Settings::default();
        Self {
            storage,
            storage_key: defaults.history.storage_key,
            max_sessions: MAX_PERSISTED_SESSIONS,
            telemetry: Arc::new(TracingTelemetry),
            activator: Arc::new(NoopActivator),
            commands: Arc::new(NoCommands),
        }
    }

    /// Take the storage key and retention limit from settings.
    pub fn settings(mut self, settings: &Settings) -> Self {
        self.storage_key = settings.history.storage_key.clone();
        self.max_sessions = settings.history.max_persisted_sessions;
        self
    }

    pub fn storage_key(mut self, key: impl Into<String>) -> Self {
        self.storage_key = key.into();
        self
    }

    pub fn max_persisted_sessions(mut self, max: usize) -> Self {
        self.max_sessions = max;
        self
    }

    pub fn telemetry(mut self, telemetry: Arc<dyn TelemetrySink>) -> Self {
        self.telemetry = telemetry;
        self
    }

    pub fn activator(mut self, activator: Arc<dyn ExtensionActivator>) -> Self {
        self.activator = activator;
        self
    }

    pub fn commands(mut self, commands: Arc<dyn CommandLookup>) -> Self {
        self.commands = commands;
        self
    }

    /// Load persisted history and create the service.
    pub async fn build(self) -> ChatService {
        let history = HistoryStore::load(self.storage, self.storage_key, self.max_sessions).await;
        let (user_actions, _) = broadcast::channel(USER_ACTION_CHANNEL_CAPACITY);
        ChatService {
            inner: Arc::new(ServiceInner {
                registry: ProviderRegistry::new(),
                sessions: Mutex::new(Vec::new()),
                pending: PendingRequests::new(),
                history,
                telemetry: self.telemetry,
                activator: self.activator,
                commands: self.commands,
                user_actions,
            }),
        }
    }
}

struct ServiceInner {
    registry: ProviderRegistry,
    // Creation order; the first entry is the default target of `add_request`.
    sessions: Mutex<Vec<Arc<ChatModel>>>,
    pending: PendingRequests,
    history: HistoryStore,
    telemetry: Arc<dyn TelemetrySink>,
    activator: Arc<dyn ExtensionActivator>,
    commands: Arc<dyn CommandLookup>,
    user_actions: broadcast::Sender<UserActionEvent>,
}

/// Session orchestrator. Cheap to clone; clones share state.
///
/// Session-starting methods spawn onto the current tokio runtime.
#[derive(Clone)]
pub struct ChatService {
    inner: Arc<ServiceInner>,
}

impl ChatService {
    pub fn builder(storage: Arc<dyn StorageBackend>) -> ChatServiceBuilder {
        ChatServiceBuilder::new(storage)
    }

    fn sessions(&self) -> MutexGuard<'_, Vec<Arc<ChatModel>>> {
        lock_or_recover(&self.inner.sessions, "live sessions")
    }

    fn trace(&self, method: &str, message: &str) {
        tracing::trace!(target: "parlance.chat.service", method, "{}", message);
    }

    fn remove_live(&self, model: &Arc<ChatModel>) {
        self.sessions().retain(|m| !Arc::ptr_eq(m, model));
    }

    fn live_session(&self, session_id: &str) -> Result<Arc<ChatModel>> {
        self.get_session(session_id)
            .ok_or_else(|| ParlanceError::UnknownSession(session_id.to_string()))
    }

    fn provider_for(&self, model: &ChatModel) -> Result<Arc<dyn ChatProvider>> {
        self.inner
            .registry
            .get(model.provider_id())
            .ok_or_else(|| ParlanceError::UnknownProvider(model.provider_id().to_string()))
    }

    // ---- sessions ----

    /// Create a session and start initializing it in the background.
    ///
    /// The model is live immediately. If initialization fails it is disposed
    /// and dropped from the live set; the error stays readable on the model.
    pub fn start_session(&self, provider_id: &str, token: CancellationToken) -> Arc<ChatModel> {
        self.trace("startSession", &format!("providerId={}", provider_id));
        self.start_session_with(provider_id, None, token)
    }

    fn start_session_with(
        &self,
        provider_id: &str,
        history: Option<&SessionRecord>,
        token: CancellationToken,
    ) -> Arc<ChatModel> {
        let model = {
            let mut sessions = self.sessions();
            // A restoration of an id that is already live yields the live model.
            if let Some(record) = history {
                if let Some(live) = sessions
                    .iter()
                    .find(|m| m.session_id() == record.session_id)
                {
                    return Arc::clone(live);
                }
            }
            let model = Arc::new(ChatModel::new(provider_id, history));
            model.start_initialization();
            sessions.push(Arc::clone(&model));
            model
        };

        let service = self.clone();
        let restored = history.is_some();
        let init_model = Arc::clone(&model);
        tokio::spawn(async move {
            service
                .initialize_session(init_model, restored, token)
                .await;
        });
        model
    }

    async fn initialize_session(
        &self,
        model: Arc<ChatModel>,
        restored: bool,
        token: CancellationToken,
    ) {
        match self.prepare_session(&model, restored, token).await {
            Ok(true) => {}
            Ok(false) => {
                self.remove_live(&model);
                model.dispose();
            }
            Err(e) => {
                self.trace(
                    "startSession",
                    &format!("initializeSession failed: {}", e),
                );
                model.set_initialization_error(e.to_string());
                self.remove_live(&model);
                model.dispose();
            }
        }
    }

    /// Returns false when the provider declined or the model went away.
    async fn prepare_session(
        &self,
        model: &ChatModel,
        restored: bool,
        token: CancellationToken,
    ) -> Result<bool> {
        self.inner
            .activator
            .activate_by_event(&activation_event(model.provider_id()))
            .await;

        let provider = self.provider_for(model)?;

        let session = match provider
            .prepare_session(model.provider_state(), token.clone())
            .await
        {
            Ok(session) => session,
            Err(e) => {
                self.trace(
                    "initializeSession",
                    &format!("Provider initializeSession threw: {}", e),
                );
                return Err(e);
            }
        };
        let Some(session) = session else {
            self.trace("startSession", "Provider returned no session");
            return Ok(false);
        };
        self.trace("startSession", "Provider returned session");

        let welcome = if restored {
            None
        } else {
            provider.provide_welcome_message(token).await?
        };
        Ok(model.initialize(session, welcome))
    }

    /// Live session by id
    pub fn get_session(&self, session_id: &str) -> Option<Arc<ChatModel>> {
        self.sessions()
            .iter()
            .find(|m| m.session_id() == session_id)
            .cloned()
    }

    /// Live sessions, oldest first
    pub fn live_sessions(&self) -> Vec<Arc<ChatModel>> {
        self.sessions().clone()
    }

    pub fn live_session_ids(&self) -> HashSet<String> {
        self.sessions()
            .iter()
            .map(|m| m.session_id().to_string())
            .collect()
    }

    /// The live session, or a restoration of the persisted one.
    pub fn get_or_restore_session(&self, session_id: &str) -> Option<Arc<ChatModel>> {
        if let Some(model) = self.get_session(session_id) {
            return Some(model);
        }
        let record = self.inner.history.get(session_id)?;
        Some(self.start_session_with(
            &record.provider_id,
            Some(&record),
            CancellationToken::new(),
        ))
    }

    /// Start a session seeded from an external record.
    ///
    /// A record whose id is already live yields the live session.
    pub fn load_session_from_content(&self, record: SessionRecord) -> Arc<ChatModel> {
        self.start_session_with(&record.provider_id, Some(&record), CancellationToken::new())
    }

    /// Snapshot a session into history, dispose it and cancel its request.
    pub fn clear_session(&self, session_id: &str) -> Result<()> {
        self.trace("clearSession", &format!("sessionId: {}", session_id));
        let model = self.live_session(session_id)?;

        self.inner.history.insert(model.to_record());
        model.dispose();
        self.remove_live(&model);
        self.inner.pending.cancel(session_id);
        Ok(())
    }

    // ---- requests ----

    /// Submit a message.
    ///
    /// `Ok(None)` means the request was not accepted: the message was blank
    /// or the session already has a request in flight. Unknown sessions and
    /// providers are errors.
    pub async fn send_request(
        &self,
        session_id: &str,
        message: impl Into<ChatMessage>,
    ) -> Result<Option<ResponseCompletion>> {
        let message = message.into();
        self.trace(
            "sendRequest",
            &format!(
                "sessionId: {}, message: {}",
                session_id,
                preview(message.text())
            ),
        );
        if message.text().trim().is_empty() {
            self.trace("sendRequest", "Rejected empty message");
            return Ok(None);
        }

        let model = self.live_session(session_id)?;
        model.wait_for_initialization().await?;
        let provider = self.provider_for(&model)?;

        let Some(guard) = self.inner.pending.try_begin(session_id) else {
            self.trace(
                "sendRequest",
                &format!("Session {} already has a pending request", session_id),
            );
            return Ok(None);
        };
        let session = model
            .session()
            .ok_or_else(|| ParlanceError::SessionDisposed(session_id.to_string()))?;

        let request_id = model.add_request(message.clone());
        let job = RequestJob {
            model,
            provider,
            session,
            registry: self.inner.registry.clone(),
            telemetry: Arc::clone(&self.inner.telemetry),
            request_id,
            message,
        };
        Ok(Some(job.spawn(guard)))
    }

    /// Whether a request is in flight for the session
    pub fn has_pending_request(&self, session_id: &str) -> bool {
        self.inner.pending.contains(session_id)
    }

    pub fn cancel_current_request_for_session(&self, session_id: &str) {
        self.trace(
            "cancelCurrentRequestForSession",
            &format!("sessionId: {}", session_id),
        );
        self.inner.pending.cancel(session_id);
    }

    /// Drop a request from the session and tell the provider.
    pub async fn remove_request(&self, session_id: &str, request_id: &str) -> Result<()> {
        let model = self.live_session(session_id)?;
        model.wait_for_initialization().await?;
        let provider = self.provider_for(&model)?;

        model.remove_request(request_id);
        if let Some(session) = model.session() {
            provider.remove_request(&session, request_id).await;
        }
        Ok(())
    }

    /// Record an exchange that was answered elsewhere. Returns the request id.
    pub async fn add_complete_request(
        &self,
        session_id: &str,
        message: impl Into<ChatMessage>,
        response: CompletedExchange,
    ) -> Result<String> {
        let message = message.into();
        self.trace(
            "addCompleteRequest",
            &format!("message: {}", preview(message.text())),
        );
        let model = self.live_session(session_id)?;
        model.wait_for_initialization().await?;

        let request_id = model.add_request(message);
        model.accept_response_progress(&request_id, ChatProgress::Content(response.message));
        model.complete_response(
            &request_id,
            &CompleteResponse {
                error_details: response.error_details,
                timings: None,
            },
        );
        Ok(request_id)
    }

    /// Hand an opaque host context to the first live session's provider and
    /// send whatever request it resolves to.
    pub async fn add_request(
        &self,
        context: serde_json::Value,
    ) -> Result<Option<ResponseCompletion>> {
        let Some(model) = self.sessions().first().cloned() else {
            self.trace("addRequest", "No session available");
            return Ok(None);
        };
        model.wait_for_initialization().await?;

        let provider = match self.inner.registry.get(model.provider_id()) {
            Some(provider) if provider.capabilities().resolve_request => provider,
            _ => {
                self.trace("addRequest", "No provider available");
                return Ok(None);
            }
        };
        let Some(session) = model.session() else {
            return Ok(None);
        };

        self.trace(
            "addRequest",
            &format!("Calling resolveRequest for session {}", model.session_id()),
        );
        let Some(request) = provider
            .resolve_request(&session, context, CancellationToken::new())
            .await?
        else {
            self.trace(
                "addRequest",
                &format!(
                    "Provider returned no request for session {}",
                    model.session_id()
                ),
            );
            return Ok(None);
        };

        self.trace(
            "addRequest",
            &format!("Sending resolved request for session {}", model.session_id()),
        );
        self.send_request(model.session_id(), request.message).await
    }

    pub async fn send_request_to_provider(
        &self,
        session_id: &str,
        request: ChatDynamicRequest,
    ) -> Result<Option<ResponseCompletion>> {
        self.trace(
            "sendRequestToProvider",
            &format!("sessionId: {}", session_id),
        );
        self.send_request(session_id, request.message).await
    }

    /// Slash commands available in a session.
    ///
    /// `Ok(None)` if the session's provider offers no slash commands.
    pub async fn get_slash_commands(
        &self,
        session_id: &str,
        token: CancellationToken,
    ) -> Result<Option<Vec<SlashCommand>>> {
        let model = self.live_session(session_id)?;
        model.wait_for_initialization().await?;
        let provider = self.provider_for(&model)?;
        let session = model
            .session()
            .ok_or_else(|| ParlanceError::SessionDisposed(session_id.to_string()))?;

        let secondaries = self
            .inner
            .registry
            .slash_command_providers_for(model.provider_id());
        collect_slash_commands(&provider, &session, secondaries, token).await
    }

    // ---- history ----

    /// Past sessions, newest first, excluding live and imported ones
    pub fn get_history(&self) -> Vec<ChatDetail> {
        self.inner.history.history(&self.live_session_ids())
    }

    /// Persisted record for a session, if any
    pub fn history_entry(&self, session_id: &str) -> Option<SessionRecord> {
        self.inner.history.get(session_id)
    }

    pub fn remove_history_entry(&self, session_id: &str) -> bool {
        self.inner.history.remove(session_id)
    }

    /// Persist live and archived sessions. Returns how many were written.
    pub async fn save_state(&self) -> Result<usize> {
        let live: Vec<SessionRecord> = self.live_sessions().iter().map(|m| m.to_record()).collect();
        let count = self.inner.history.save(live).await?;
        self.trace("onWillSaveState", &format!("Persisting {} sessions", count));
        Ok(count)
    }

    // ---- providers ----

    pub fn register_provider(&self, provider: Arc<dyn ChatProvider>) -> Result<Registration> {
        self.trace("registerProvider", "Adding new chat provider");
        self.inner.registry.register(provider)
    }

    pub fn register_slash_command_provider(
        &self,
        provider: Arc<dyn SlashCommandProvider>,
    ) -> Registration {
        self.trace("registerProvider", "Adding new slash command provider");
        self.inner.registry.register_slash_command_provider(provider)
    }

    pub fn get_providers(&self) -> Vec<String> {
        self.inner.registry.provider_ids()
    }

    pub fn get_provider_infos(&self) -> Vec<ProviderInfo> {
        self.inner.registry.provider_infos()
    }

    /// Whether any chat provider is registered
    pub fn has_provider(&self) -> watch::Receiver<bool> {
        self.inner.registry.has_provider()
    }

    // ---- user actions ----

    /// Report a user action to telemetry and to subscribers.
    pub fn notify_user_action(&self, event: UserActionEvent) {
        let provider_id = event.provider_id.clone();
        let telemetry = match &event.action {
            UserAction::Vote { direction } => TelemetryEvent::Vote(VoteEvent {
                provider_id,
                direction: *direction,
            }),
            UserAction::Copy { copy_kind } => TelemetryEvent::Copy(CopyEvent {
                provider_id,
                copy_kind: *copy_kind,
            }),
            UserAction::Insert { new_file } => TelemetryEvent::Insert(InsertEvent {
                provider_id,
                new_file: *new_file,
            }),
            UserAction::Command { command_id } => {
                let command_id = if self.inner.commands.has_command(command_id) {
                    command_id.clone()
                } else {
                    INVALID_COMMAND_ID.to_string()
                };
                TelemetryEvent::Command(CommandEvent {
                    provider_id,
                    command_id,
                })
            }
            UserAction::RunInTerminal { language_id } => {
                TelemetryEvent::RunInTerminal(RunInTerminalEvent {
                    provider_id,
                    language_id: language_id.clone().unwrap_or_default(),
                })
            }
        };
        self.inner.telemetry.public_log(telemetry);

        // No subscribers is fine.
        let _ = self.inner.user_actions.send(event);
    }

    pub fn subscribe_user_actions(&self) -> broadcast::Receiver<UserActionEvent> {
        self.inner.user_actions.subscribe()
    }
}
