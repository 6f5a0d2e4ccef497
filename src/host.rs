// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Host collaborators
//!
//! Narrow interfaces to the application embedding the chat service.

use std::collections::HashSet;

use async_trait::async_trait;

/// Activates whatever backs a provider before it is looked up
#[async_trait]
pub trait ExtensionActivator: Send + Sync {
    async fn activate_by_event(&self, event: &str);
}

/// Activator for hosts where providers are registered up front
#[derive(Debug, Default)]
pub struct NoopActivator;

#[async_trait]
impl ExtensionActivator for NoopActivator {
    async fn activate_by_event(&self, event: &str) {
        tracing::trace!(target: "parlance.host", event, "activation requested");
    }
}

/// Knows which command ids exist
pub trait CommandLookup: Send + Sync {
    fn has_command(&self, command_id: &str) -> bool;
}

/// A host without commands
#[derive(Debug, Default)]
pub struct NoCommands;

impl CommandLookup for NoCommands {
    fn has_command(&self, _command_id: &str) -> bool {
        false
    }
}

impl CommandLookup for HashSet<String> {
    fn has_command(&self, command_id: &str) -> bool {
        self.contains(command_id)
    }
}

/// Event name used to activate the backing of a chat provider
pub fn activation_event(provider_id: &str) -> String {
    format!("onInteractiveSession:{}", provider_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_activation_event() {
        assert_eq!(activation_event("p1"), "onInteractiveSession:p1");
    }

    #[test]
    fn test_command_lookup() {
        let commands: HashSet<String> = ["editor.save".to_string()].into_iter().collect();
        assert!(commands.has_command("editor.save"));
        assert!(!commands.has_command("nope"));
        assert!(!NoCommands.has_command("editor.save"));
    }

    #[tokio::test]
    async fn test_noop_activator() {
        NoopActivator.activate_by_event("onInteractiveSession:p1").await;
    }
}
