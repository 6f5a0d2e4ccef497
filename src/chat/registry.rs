// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Provider registry
//!
//! Chat providers are keyed by id; registering an id twice is an error.
//! Every registration hands back a `Registration` whose `dispose` revokes it.

use std::sync::{Arc, Mutex, MutexGuard, Weak};

use tokio::sync::watch;

use crate::chat::provider::{ChatProvider, SlashCommandProvider};
use crate::chat::types::ProviderInfo;
use crate::error::{ParlanceError, Result};
use crate::utils::lock_or_recover;

/// Handle returned by a registration; `dispose` undoes it.
#[must_use = "dropping a Registration keeps the registration alive forever"]
pub struct Registration {
    revoke: Option<Box<dyn FnOnce() + Send>>,
}

impl Registration {
    pub(crate) fn new(revoke: impl FnOnce() + Send + 'static) -> Self {
        Self {
            revoke: Some(Box::new(revoke)),
        }
    }

    pub fn dispose(mut self) {
        if let Some(revoke) = self.revoke.take() {
            revoke();
        }
    }
}

impl std::fmt::Debug for Registration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registration")
            .field("active", &self.revoke.is_some())
            .finish()
    }
}

struct ProviderEntry {
    token: u64,
    provider: Arc<dyn ChatProvider>,
}

struct SlashEntry {
    token: u64,
    provider: Arc<dyn SlashCommandProvider>,
}

#[derive(Default)]
struct RegistryState {
    // Insertion order is the listing order.
    providers: Vec<ProviderEntry>,
    slash_providers: Vec<SlashEntry>,
    next_token: u64,
}

impl RegistryState {
    fn next_token(&mut self) -> u64 {
        self.next_token += 1;
        self.next_token
    }
}

struct Shared {
    state: Mutex<RegistryState>,
    has_provider: watch::Sender<bool>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        lock_or_recover(&self.state, "provider registry")
    }
}

/// Registered chat providers and slash-command providers
#[derive(Clone)]
pub struct ProviderRegistry {
    shared: Arc<Shared>,
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ProviderRegistry {
    pub fn new() -> Self {
        let (has_provider, _) = watch::channel(false);
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(RegistryState::default()),
                has_provider,
            }),
        }
    }

    /// Register a chat provider. Fails if its id is taken.
    pub fn register(&self, provider: Arc<dyn ChatProvider>) -> Result<Registration> {
        let id = provider.id().to_string();
        let token = {
            let mut state = self.shared.lock();
            if state.providers.iter().any(|e| e.provider.id() == id) {
                return Err(ParlanceError::DuplicateProvider(id));
            }
            let token = state.next_token();
            state.providers.push(ProviderEntry { token, provider });
            // Published under the lock so the flag follows the last change.
            self.shared.has_provider.send_replace(true);
            token
        };
        tracing::trace!(
            target: "parlance.chat.registry",
            provider_id = %id,
            "registered chat provider"
        );

        let weak: Weak<Shared> = Arc::downgrade(&self.shared);
        Ok(Registration::new(move || {
            let Some(shared) = weak.upgrade() else {
                return;
            };
            {
                let mut state = shared.lock();
                state.providers.retain(|e| e.token != token);
                shared.has_provider.send_replace(!state.providers.is_empty());
            }
            tracing::trace!(
                target: "parlance.chat.registry",
                provider_id = %id,
                "disposed chat provider"
            );
        }))
    }

    pub fn register_slash_command_provider(
        &self,
        provider: Arc<dyn SlashCommandProvider>,
    ) -> Registration {
        let chat_provider_id = provider.chat_provider_id().to_string();
        let token = {
            let mut state = self.shared.lock();
            let token = state.next_token();
            state.slash_providers.push(SlashEntry { token, provider });
            token
        };
        tracing::trace!(
            target: "parlance.chat.registry",
            chat_provider_id = %chat_provider_id,
            "registered slash command provider"
        );

        let weak: Weak<Shared> = Arc::downgrade(&self.shared);
        Registration::new(move || {
            if let Some(shared) = weak.upgrade() {
                shared.lock().slash_providers.retain(|e| e.token != token);
                tracing::trace!(
                    target: "parlance.chat.registry",
                    chat_provider_id = %chat_provider_id,
                    "disposed slash command provider"
                );
            }
        })
    }

    pub fn get(&self, provider_id: &str) -> Option<Arc<dyn ChatProvider>> {
        self.shared
            .lock()
            .providers
            .iter()
            .find(|e| e.provider.id() == provider_id)
            .map(|e| Arc::clone(&e.provider))
    }

    /// Registered ids, in registration order
    pub fn provider_ids(&self) -> Vec<String> {
        self.shared
            .lock()
            .providers
            .iter()
            .map(|e| e.provider.id().to_string())
            .collect()
    }

    pub fn provider_infos(&self) -> Vec<ProviderInfo> {
        self.shared
            .lock()
            .providers
            .iter()
            .map(|e| ProviderInfo {
                id: e.provider.id().to_string(),
                display_name: e.provider.display_name().to_string(),
            })
            .collect()
    }

    /// Slash-command providers scoped to one chat provider
    pub fn slash_command_providers_for(
        &self,
        chat_provider_id: &str,
    ) -> Vec<Arc<dyn SlashCommandProvider>> {
        self.shared
            .lock()
            .slash_providers
            .iter()
            .filter(|e| e.provider.chat_provider_id() == chat_provider_id)
            .map(|e| Arc::clone(&e.provider))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.shared.lock().providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether any provider is registered, updated on every change
    pub fn has_provider(&self) -> watch::Receiver<bool> {
        self.shared.has_provider.subscribe()
    }
}
