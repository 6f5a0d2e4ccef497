// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! History store implementation
//!
//! Persisted sessions are read once from a single JSON blob and written
//! back, merged with the live sessions, whenever the host asks to save.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, MutexGuard};

use crate::chat::types::ChatDetail;
use crate::error::{ParlanceError, Result};
use crate::history::record::SessionRecord;
use crate::history::storage::StorageBackend;
use crate::utils::{lock_or_recover, preview};

/// Default number of sessions kept on save
pub const MAX_PERSISTED_SESSIONS: usize = 25;

/// Archive of sessions that are not (or no longer) live
pub struct HistoryStore {
    storage: Arc<dyn StorageBackend>,
    key: String,
    max_sessions: usize,
    sessions: std::sync::Mutex<HashMap<String, SessionRecord>>,
}

impl HistoryStore {
    /// Read persisted sessions from `storage`.
    ///
    /// Unreadable or malformed data is logged and treated as empty history.
    pub async fn load(
        storage: Arc<dyn StorageBackend>,
        key: impl Into<String>,
        max_sessions: usize,
    ) -> Self {
        let key = key.into();
        let sessions = match storage.get(&key).await {
            Ok(Some(blob)) if !blob.is_empty() => match Self::parse_sessions(&blob) {
                Ok(records) => {
                    let sessions: HashMap<String, SessionRecord> = records
                        .into_iter()
                        .map(|r| (r.session_id.clone(), r))
                        .collect();
                    tracing::trace!(
                        target: "parlance.history",
                        count = sessions.len(),
                        "restored persisted sessions"
                    );
                    sessions
                }
                Err(e) => {
                    tracing::error!(
                        target: "parlance.history",
                        error = %e,
                        blob = %preview(&blob),
                        "malformed session data"
                    );
                    HashMap::new()
                }
            },
            Ok(_) => {
                tracing::trace!(target: "parlance.history", "no persisted sessions");
                HashMap::new()
            }
            Err(e) => {
                tracing::error!(
                    target: "parlance.history",
                    error = %e,
                    "failed to read persisted sessions"
                );
                HashMap::new()
            }
        };

        Self {
            storage,
            key,
            max_sessions: max_sessions.max(1),
            sessions: std::sync::Mutex::new(sessions),
        }
    }

    /// Parse a blob that must be a JSON array of session records
    pub fn parse_sessions(blob: &str) -> Result<Vec<SessionRecord>> {
        let value: serde_json::Value = serde_json::from_str(blob)?;
        if !value.is_array() {
            return Err(ParlanceError::Storage("Expected array".to_string()));
        }
        Ok(serde_json::from_value(value)?)
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, SessionRecord>> {
        lock_or_recover(&self.sessions, "history store")
    }

    pub fn max_sessions(&self) -> usize {
        self.max_sessions
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn contains(&self, session_id: &str) -> bool {
        self.lock().contains_key(session_id)
    }

    pub fn get(&self, session_id: &str) -> Option<SessionRecord> {
        self.lock().get(session_id).cloned()
    }

    /// Add or replace a record
    pub fn insert(&self, record: SessionRecord) {
        self.lock().insert(record.session_id.clone(), record);
    }

    pub fn remove(&self, session_id: &str) -> bool {
        self.lock().remove(session_id).is_some()
    }

    /// Past sessions for display, newest first.
    ///
    /// Sessions in `live_ids` are skipped since their live state is fresher,
    /// as are imported sessions and sessions without requests.
    pub fn history(&self, live_ids: &HashSet<String>) -> Vec<ChatDetail> {
        let mut sessions: Vec<SessionRecord> = self
            .lock()
            .values()
            .filter(|s| s.has_requests())
            .cloned()
            .collect();
        sort_newest_first(&mut sessions);

        sessions
            .into_iter()
            .filter(|s| !live_ids.contains(&s.session_id))
            .filter(|s| !s.is_imported)
            .map(|s| ChatDetail {
                title: s.title(),
                session_id: s.session_id,
            })
            .collect()
    }

    /// Merge live sessions with archived ones for writing.
    ///
    /// Live sessions win over archived records with the same id, and each id
    /// is written once. Only sessions with at least one request are kept,
    /// newest first, capped at the maximum count.
    pub fn sessions_to_persist(&self, live: Vec<SessionRecord>) -> Vec<SessionRecord> {
        let live_ids: HashSet<&str> = live.iter().map(|s| s.session_id.as_str()).collect();
        let archived: Vec<SessionRecord> = self
            .lock()
            .values()
            .filter(|s| !live_ids.contains(s.session_id.as_str()))
            .filter(|s| s.has_requests())
            .cloned()
            .collect();

        let mut seen = HashSet::new();
        let mut all: Vec<SessionRecord> = live
            .into_iter()
            .filter(|s| s.has_requests())
            .filter(|s| seen.insert(s.session_id.clone()))
            .collect();
        all.extend(archived);
        sort_newest_first(&mut all);
        all.truncate(self.max_sessions);
        all
    }

    /// Write the merged session list back to storage.
    ///
    /// Returns the number of sessions written.
    pub async fn save(&self, live: Vec<SessionRecord>) -> Result<usize> {
        let sessions = self.sessions_to_persist(live);
        let count = sessions.len();
        let blob = serde_json::to_string(&sessions)?;
        tracing::trace!(target: "parlance.history", count, "persisting sessions");
        self.storage.store(&self.key, blob).await?;
        Ok(count)
    }
}

fn sort_newest_first(sessions: &mut [SessionRecord]) {
    sessions.sort_by(|a, b| b.creation_date.cmp(&a.creation_date));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::record::RequestRecord;
    use crate::history::storage::MemoryStorage;

    const KEY: &str = "interactive.sessions";

    fn record(id: &str, created: i64, requests: usize) -> SessionRecord {
        let mut record = SessionRecord::new(id, "p1");
        record.creation_date = created;
        for i in 0..requests {
            record
                .requests
                .push(RequestRecord::new(format!("{} q{}", id, i), Some("a".into())));
        }
        record
    }

    async fn store_with(records: &[SessionRecord], max: usize) -> HistoryStore {
        let blob = serde_json::to_string(records).unwrap();
        let storage = Arc::new(MemoryStorage::new().with_entry(KEY, blob));
        HistoryStore::load(storage, KEY, max).await
    }

    #[tokio::test]
    async fn test_load_empty_storage() {
        let store = HistoryStore::load(Arc::new(MemoryStorage::new()), KEY, 25).await;
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_load_not_json() {
        let storage = Arc::new(MemoryStorage::new().with_entry(KEY, "{{{ nope"));
        let store = HistoryStore::load(storage, KEY, 25).await;
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_load_not_array() {
        let storage = Arc::new(MemoryStorage::new().with_entry(KEY, r#"{"sessionId": "x"}"#));
        let store = HistoryStore::load(storage, KEY, 25).await;
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_history_filters_and_sorts() {
        let mut imported = record("imported", 50, 1);
        imported.is_imported = true;
        let store = store_with(
            &[
                record("old", 10, 1),
                record("new", 30, 2),
                record("empty", 40, 0),
                record("live", 20, 1),
                imported,
            ],
            25,
        )
        .await;

        let live: HashSet<String> = ["live".to_string()].into_iter().collect();
        let history = store.history(&live);
        let ids: Vec<&str> = history.iter().map(|d| d.session_id.as_str()).collect();
        assert_eq!(ids, vec!["new", "old"]);
        assert_eq!(history[0].title, "new q0");
    }

    #[tokio::test]
    async fn test_save_merges_live_over_archived() {
        let store = store_with(&[record("a", 10, 1), record("b", 20, 1)], 25).await;

        let mut live_a = record("a", 10, 3);
        live_a.responder_username = "fresh".into();
        let merged = store.sessions_to_persist(vec![live_a, record("c", 5, 0)]);

        let ids: Vec<&str> = merged.iter().map(|s| s.session_id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
        assert_eq!(merged[1].requests.len(), 3);
        assert_eq!(merged[1].responder_username, "fresh");
    }

    #[tokio::test]
    async fn test_live_duplicates_written_once() {
        let store = store_with(&[], 25).await;
        let merged = store.sessions_to_persist(vec![record("a", 10, 2), record("a", 10, 1)]);

        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].requests.len(), 2);
    }

    #[tokio::test]
    async fn test_zero_limit_keeps_one_session() {
        let store = HistoryStore::load(Arc::new(MemoryStorage::new()), KEY, 0).await;
        assert_eq!(store.max_sessions(), 1);
    }

    #[tokio::test]
    async fn test_save_truncates_to_max() {
        let records: Vec<SessionRecord> =
            (0..5).map(|i| record(&format!("s{}", i), i, 1)).collect();
        let storage = Arc::new(
            MemoryStorage::new().with_entry(KEY, serde_json::to_string(&records).unwrap()),
        );
        let store = HistoryStore::load(storage.clone(), KEY, 3).await;
        assert_eq!(store.max_sessions(), 3);

        let written = store.save(Vec::new()).await.unwrap();
        assert_eq!(written, 3);

        let saved = HistoryStore::parse_sessions(&storage.snapshot(KEY).unwrap()).unwrap();
        let ids: Vec<&str> = saved.iter().map(|s| s.session_id.as_str()).collect();
        assert_eq!(ids, vec!["s4", "s3", "s2"]);
    }

    #[tokio::test]
    async fn test_insert_and_remove() {
        let store = HistoryStore::load(Arc::new(MemoryStorage::new()), KEY, 25).await;
        store.insert(record("x", 1, 1));
        assert!(store.contains("x"));
        assert_eq!(store.get("x").unwrap().session_id, "x");
        assert!(store.remove("x"));
        assert!(!store.remove("x"));
        assert_eq!(store.len(), 0);
    }

    #[test]
    fn test_parse_sessions_rejects_object() {
        assert!(HistoryStore::parse_sessions("{}").is_err());
        assert!(HistoryStore::parse_sessions("[]").unwrap().is_empty());
    }
}
