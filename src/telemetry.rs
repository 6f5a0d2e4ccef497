// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Telemetry events
//!
//! The service reports provider invocations and user actions through a
//! `TelemetrySink`. Each event has a fixed name and field schema.

use std::sync::Mutex;

use serde::Serialize;

use crate::chat::types::{CopyKind, RequestType, VoteDirection};
use crate::utils::lock_or_recover;

pub const PROVIDER_INVOKED: &str = "interactiveSessionProviderInvoked";
pub const VOTE: &str = "interactiveSessionVote";
pub const COPY: &str = "interactiveSessionCopy";
pub const INSERT: &str = "interactiveSessionInsert";
pub const COMMAND: &str = "interactiveSessionCommand";
pub const RUN_IN_TERMINAL: &str = "interactiveSessionRunInTerminal";

/// Outcome of one provider invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ProviderResult {
    Success,
    Error,
    ErrorWithOutput,
    Cancelled,
    Filtered,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderInvokedEvent {
    pub provider_id: String,
    /// Milliseconds to first progress; -1 when cancelled
    pub time_to_first_progress: i64,
    /// Milliseconds
    pub total_time: u64,
    pub result: ProviderResult,
    pub request_type: RequestType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteEvent {
    pub provider_id: String,
    pub direction: VoteDirection,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CopyEvent {
    pub provider_id: String,
    pub copy_kind: CopyKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InsertEvent {
    pub provider_id: String,
    pub new_file: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandEvent {
    pub provider_id: String,
    pub command_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunInTerminalEvent {
    pub provider_id: String,
    pub language_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum TelemetryEvent {
    ProviderInvoked(ProviderInvokedEvent),
    Vote(VoteEvent),
    Copy(CopyEvent),
    Insert(InsertEvent),
    Command(CommandEvent),
    RunInTerminal(RunInTerminalEvent),
}

impl TelemetryEvent {
    pub fn name(&self) -> &'static str {
        match self {
            TelemetryEvent::ProviderInvoked(_) => PROVIDER_INVOKED,
            TelemetryEvent::Vote(_) => VOTE,
            TelemetryEvent::Copy(_) => COPY,
            TelemetryEvent::Insert(_) => INSERT,
            TelemetryEvent::Command(_) => COMMAND,
            TelemetryEvent::RunInTerminal(_) => RUN_IN_TERMINAL,
        }
    }

    /// Event fields as JSON
    pub fn data(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

/// Destination for telemetry events
pub trait TelemetrySink: Send + Sync {
    fn public_log(&self, event: TelemetryEvent);
}

/// Writes events to the tracing log
#[derive(Debug, Default)]
pub struct TracingTelemetry;

impl TelemetrySink for TracingTelemetry {
    fn public_log(&self, event: TelemetryEvent) {
        tracing::debug!(
            target: "parlance.telemetry",
            event = event.name(),
            data = %event.data(),
            "telemetry"
        );
    }
}

/// Keeps events in memory; useful for hosts that batch uploads and for tests
#[derive(Debug, Default)]
pub struct MemoryTelemetry {
    events: Mutex<Vec<TelemetryEvent>>,
}

impl MemoryTelemetry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<TelemetryEvent> {
        lock_or_recover(&self.events, "telemetry").clone()
    }

    pub fn events_named(&self, name: &str) -> Vec<TelemetryEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.name() == name)
            .collect()
    }

    /// Provider invocation events, in order
    pub fn provider_invocations(&self) -> Vec<ProviderInvokedEvent> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                TelemetryEvent::ProviderInvoked(inner) => Some(inner),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        lock_or_recover(&self.events, "telemetry").clear();
    }
}

impl TelemetrySink for MemoryTelemetry {
    fn public_log(&self, event: TelemetryEvent) {
        lock_or_recover(&self.events, "telemetry").push(event);
    }
}
