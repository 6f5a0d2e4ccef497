// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Request pipeline
//!
//! Runs one provider reply as a cancelable task. Each session has at most one
//! pending request; the pending entry is dropped whenever the task settles,
//! whether it completed, failed or was cancelled.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::chat::model::ChatModel;
use crate::chat::provider::{ChatProvider, ProgressReporter};
use crate::chat::registry::ProviderRegistry;
use crate::chat::slash::{collect_slash_commands, resolve_slash_command};
use crate::chat::types::{
    ChatMessage, ChatProgress, ChatSessionHandle, CompleteResponse, ErrorDetails, ReplyRequest,
};
use crate::error::{ParlanceError, Result};
use crate::telemetry::{ProviderInvokedEvent, ProviderResult, TelemetryEvent, TelemetrySink};
use crate::utils::lock_or_recover;

/// Message used when a provider finishes without a response
pub const EMPTY_RESPONSE_MESSAGE: &str = "Provider returned null response";

struct PendingEntry {
    generation: u64,
    token: CancellationToken,
}

#[derive(Default)]
struct PendingMap {
    entries: HashMap<String, PendingEntry>,
    next_generation: u64,
}

/// In-flight requests keyed by session id
#[derive(Clone, Default)]
pub struct PendingRequests {
    inner: Arc<Mutex<PendingMap>>,
}

impl PendingRequests {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, PendingMap> {
        lock_or_recover(&self.inner, "pending requests")
    }

    /// Claim the session's pending slot. Returns `None` if a request is
    /// already in flight.
    pub fn try_begin(&self, session_id: &str) -> Option<PendingGuard> {
        let mut map = self.lock();
        if map.entries.contains_key(session_id) {
            return None;
        }
        map.next_generation += 1;
        let generation = map.next_generation;
        let token = CancellationToken::new();
        map.entries.insert(
            session_id.to_string(),
            PendingEntry {
                generation,
                token: token.clone(),
            },
        );
        Some(PendingGuard {
            pending: self.clone(),
            session_id: session_id.to_string(),
            generation,
            token,
        })
    }

    /// Cancel the session's pending request and free its slot.
    ///
    /// Returns false if nothing was pending.
    pub fn cancel(&self, session_id: &str) -> bool {
        let entry = self.lock().entries.remove(session_id);
        match entry {
            Some(entry) => {
                entry.token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, session_id: &str) -> bool {
        self.lock().entries.contains_key(session_id)
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Holds a session's pending slot; releases it on drop.
///
/// A slot that was cancelled and then claimed again by a newer request is
/// left alone.
pub struct PendingGuard {
    pending: PendingRequests,
    session_id: String,
    generation: u64,
    token: CancellationToken,
}

impl PendingGuard {
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        let mut map = self.pending.lock();
        if map
            .entries
            .get(&self.session_id)
            .is_some_and(|e| e.generation == self.generation)
        {
            map.entries.remove(&self.session_id);
        }
    }
}

/// How a request task ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    Completed,
    Cancelled,
}

/// Handle to an accepted request
#[derive(Debug)]
pub struct ResponseCompletion {
    request_id: String,
    handle: JoinHandle<RequestOutcome>,
}

impl ResponseCompletion {
    /// Id of the request in the session model
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// Wait for the request to settle.
    pub async fn wait(self) -> Result<RequestOutcome> {
        self.handle
            .await
            .map_err(|e| ParlanceError::provider(format!("request task failed: {}", e)))
    }
}

/// Map a finished response to its telemetry result.
pub fn classify(response: &CompleteResponse, got_progress: bool) -> ProviderResult {
    match &response.error_details {
        Some(details) if details.response_is_filtered => ProviderResult::Filtered,
        Some(_) if got_progress => ProviderResult::ErrorWithOutput,
        Some(_) => ProviderResult::Error,
        None => ProviderResult::Success,
    }
}

/// Everything a request task needs
pub(crate) struct RequestJob {
    pub model: Arc<ChatModel>,
    pub provider: Arc<dyn ChatProvider>,
    pub session: ChatSessionHandle,
    pub registry: ProviderRegistry,
    pub telemetry: Arc<dyn TelemetrySink>,
    pub request_id: String,
    pub message: ChatMessage,
}

impl RequestJob {
    /// Start the task. The guard moves into it and frees the pending slot
    /// when the task settles.
    pub(crate) fn spawn(self, guard: PendingGuard) -> ResponseCompletion {
        let request_id = self.request_id.clone();
        let handle = tokio::spawn(async move {
            let outcome = self.run(guard.token()).await;
            drop(guard);
            outcome
        });
        ResponseCompletion { request_id, handle }
    }

    async fn run(self, token: CancellationToken) -> RequestOutcome {
        let started = Instant::now();
        let request_type = self.message.request_type();
        let got_progress = Arc::new(AtomicBool::new(false));
        let reporter = self.progress_reporter(token.clone(), Arc::clone(&got_progress));

        let reply = tokio::select! {
            biased;
            _ = token.cancelled() => None,
            reply = self.invoke(reporter, token.clone()) => Some(reply),
        };

        let reply = match reply {
            Some(reply) if !token.is_cancelled() => reply,
            _ => {
                tracing::trace!(
                    target: "parlance.chat.pipeline",
                    session_id = self.model.session_id(),
                    "request was cancelled"
                );
                self.telemetry
                    .public_log(TelemetryEvent::ProviderInvoked(ProviderInvokedEvent {
                        provider_id: self.provider.id().to_string(),
                        time_to_first_progress: -1,
                        total_time: started.elapsed().as_millis() as u64,
                        result: ProviderResult::Cancelled,
                        request_type,
                    }));
                self.model.cancel_request(&self.request_id);
                return RequestOutcome::Cancelled;
            }
        };

        let response = match reply {
            Ok(Some(response)) => response,
            Ok(None) => {
                tracing::trace!(
                    target: "parlance.chat.pipeline",
                    session_id = self.model.session_id(),
                    "provider returned no response"
                );
                CompleteResponse::error(ErrorDetails::new(EMPTY_RESPONSE_MESSAGE))
            }
            Err(e) => {
                tracing::error!(
                    target: "parlance.chat.pipeline",
                    session_id = self.model.session_id(),
                    provider_id = self.provider.id(),
                    error = %e,
                    "provider failed to reply"
                );
                CompleteResponse::error(ErrorDetails::new(e.to_string()))
            }
        };

        let result = classify(&response, got_progress.load(Ordering::SeqCst));
        let timings = response.timings.unwrap_or_default();
        self.telemetry
            .public_log(TelemetryEvent::ProviderInvoked(ProviderInvokedEvent {
                provider_id: self.provider.id().to_string(),
                time_to_first_progress: timings.first_progress as i64,
                total_time: timings.total_elapsed,
                result,
                request_type,
            }));
        self.model.complete_response(&self.request_id, &response);
        tracing::trace!(
            target: "parlance.chat.pipeline",
            session_id = self.model.session_id(),
            result = ?result,
            "provider returned response"
        );

        if self.provider.capabilities().followups {
            self.spawn_followups();
        }
        RequestOutcome::Completed
    }

    /// Resolve slash commands, then ask the provider for a reply.
    async fn invoke(
        &self,
        reporter: ProgressReporter,
        token: CancellationToken,
    ) -> Result<Option<CompleteResponse>> {
        let message = if self.message.is_slash_command() {
            ChatMessage::Text(self.resolve_slash_command(self.message.text()).await)
        } else {
            self.message.clone()
        };

        self.provider
            .provide_reply(
                ReplyRequest {
                    session: self.session.clone(),
                    message,
                },
                reporter,
                token,
            )
            .await
    }

    async fn resolve_slash_command(&self, text: &str) -> String {
        let secondaries = self
            .registry
            .slash_command_providers_for(self.provider.id());
        match collect_slash_commands(
            &self.provider,
            &self.session,
            secondaries,
            CancellationToken::new(),
        )
        .await
        {
            Ok(commands) => resolve_slash_command(&commands.unwrap_or_default(), text).await,
            Err(e) => {
                tracing::error!(
                    target: "parlance.chat.pipeline",
                    session_id = self.model.session_id(),
                    error = %e,
                    "failed to list slash commands"
                );
                text.to_string()
            }
        }
    }

    fn progress_reporter(
        &self,
        token: CancellationToken,
        got_progress: Arc<AtomicBool>,
    ) -> ProgressReporter {
        let model = Arc::clone(&self.model);
        let request_id = self.request_id.clone();
        ProgressReporter::new(move |progress| {
            if token.is_cancelled() {
                return;
            }
            got_progress.store(true, Ordering::SeqCst);
            match &progress {
                ChatProgress::Content(content) => tracing::trace!(
                    target: "parlance.chat.pipeline",
                    session_id = model.session_id(),
                    chars = content.chars().count(),
                    "provider returned progress"
                ),
                ChatProgress::RequestId(id) => tracing::trace!(
                    target: "parlance.chat.pipeline",
                    session_id = model.session_id(),
                    provider_request_id = %id,
                    "provider returned request id"
                ),
            }
            model.accept_response_progress(&request_id, progress);
        })
    }

    fn spawn_followups(&self) {
        let model = Arc::clone(&self.model);
        let provider = Arc::clone(&self.provider);
        let session = self.session.clone();
        let request_id = self.request_id.clone();
        tokio::spawn(async move {
            match provider
                .provide_followups(&session, CancellationToken::new())
                .await
            {
                Ok(followups) => {
                    model.set_followups(&request_id, followups);
                }
                Err(e) => tracing::error!(
                    target: "parlance.chat.pipeline",
                    session_id = model.session_id(),
                    error = %e,
                    "failed to fetch followups"
                ),
            }
        });
    }
}
