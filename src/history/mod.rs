// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! History management for chat sessions
//!
//! Persists session snapshots to a workspace-scoped key-value store and
//! lists past sessions for retrieval.

pub mod record;
pub mod storage;
pub mod store;

pub use record::{RequestRecord, SessionRecord};
pub use storage::{FileStorage, MemoryStorage, StorageBackend};
pub use store::{HistoryStore, MAX_PERSISTED_SESSIONS};
