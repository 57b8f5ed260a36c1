//! Renderer state store
//!
//! Tracks which subscription identifiers are live and the last transport
//! state each one reported. A record exists exactly when its identifier is
//! live, so the liveness set is the key set of a single map guarded by one
//! mutex; every check-and-set happens under that lock.
//!
//! The store is shared by `Arc` between a [`CastSession`](crate::CastSession)
//! and its [`CallbackEndpoint`](crate::CallbackEndpoint).

use std::collections::HashMap;

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::error::{CastError, Result};

/// Last known state of one subscribed renderer
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RendererState {
    pub previous_state: String,
    pub new_state: String,
    /// Number of accepted events since the subscription was created
    pub sequence: u64,
}

/// Thread-safe map from live subscription identifier to renderer state
#[derive(Debug, Default)]
pub struct RendererStateStore {
    records: Mutex<HashMap<String, RendererState>>,
}

impl RendererStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `uuid` live with a fresh record, replacing any existing one
    pub fn create(&self, uuid: &str) {
        debug!(uuid, "renderer subscription created");
        self.records
            .lock()
            .insert(uuid.to_string(), RendererState::default());
    }

    /// Remove `uuid` from the live set. Returns whether it was live.
    pub fn delete(&self, uuid: &str) -> bool {
        let removed = self.records.lock().remove(uuid).is_some();
        if removed {
            debug!(uuid, "renderer subscription deleted");
        }
        removed
    }

    /// Record a state change for a live `uuid`.
    ///
    /// Returns `false` without touching anything when `uuid` is not live.
    pub fn update(&self, uuid: &str, previous_state: &str, new_state: &str) -> bool {
        self.apply(uuid, previous_state, new_state).is_some()
    }

    /// Like [`update`](Self::update) but returns the new sequence number,
    /// read under the same lock as the write.
    pub fn apply(&self, uuid: &str, previous_state: &str, new_state: &str) -> Option<u64> {
        let mut records = self.records.lock();
        let record = records.get_mut(uuid)?;

        record.previous_state = previous_state.to_string();
        record.new_state = new_state.to_string();
        record.sequence += 1;

        trace!(uuid, previous_state, new_state, sequence = record.sequence, "renderer state updated");
        Some(record.sequence)
    }

    /// Current sequence number of a live `uuid`
    pub fn sequence(&self, uuid: &str) -> Result<u64> {
        self.records
            .lock()
            .get(uuid)
            .map(|record| record.sequence)
            .ok_or_else(|| CastError::UnknownRenderer(uuid.to_string()))
    }

    /// Snapshot of the record for `uuid`
    pub fn record(&self, uuid: &str) -> Option<RendererState> {
        self.records.lock().get(uuid).cloned()
    }

    pub fn is_live(&self, uuid: &str) -> bool {
        self.records.lock().contains_key(uuid)
    }

    /// All live identifiers, in no particular order
    pub fn live_ids(&self) -> Vec<String> {
        self.records.lock().keys().cloned().collect()
    }

    /// Drop every live identifier and record
    pub fn clear(&self) {
        self.records.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_create_initializes_record() {
        let store = RendererStateStore::new();
        store.create("abc");

        assert!(store.is_live("abc"));
        assert_eq!(store.record("abc"), Some(RendererState::default()));
        assert_eq!(store.sequence("abc").unwrap(), 0);
    }

    #[test]
    fn test_update_unknown_is_rejected() {
        let store = RendererStateStore::new();
        assert!(!store.update("zzz", "Play", "PLAYING"));
        assert!(store.record("zzz").is_none());
        assert!(matches!(
            store.sequence("zzz"),
            Err(CastError::UnknownRenderer(id)) if id == "zzz"
        ));
    }

    #[test]
    fn test_update_increments_sequence() {
        let store = RendererStateStore::new();
        store.create("abc");

        assert!(store.update("abc", "STOPPED", "PLAYING"));
        assert!(store.update("abc", "PLAYING", "PAUSED_PLAYBACK"));

        let record = store.record("abc").unwrap();
        assert_eq!(record.previous_state, "PLAYING");
        assert_eq!(record.new_state, "PAUSED_PLAYBACK");
        assert_eq!(record.sequence, 2);
    }

    #[test]
    fn test_create_overwrites() {
        let store = RendererStateStore::new();
        store.create("abc");
        store.update("abc", "STOPPED", "PLAYING");
        store.create("abc");
        assert_eq!(store.sequence("abc").unwrap(), 0);
    }

    #[test]
    fn test_delete() {
        let store = RendererStateStore::new();
        store.create("abc");

        assert!(store.delete("abc"));
        assert!(!store.delete("abc"));
        assert!(!store.update("abc", "STOPPED", "PLAYING"));
        assert!(store.is_empty());
    }

    #[test]
    fn test_live_ids_and_clear() {
        let store = RendererStateStore::new();
        store.create("abc");
        store.create("def");

        let mut ids = store.live_ids();
        ids.sort();
        assert_eq!(ids, vec!["abc".to_string(), "def".to_string()]);

        store.clear();
        assert!(store.live_ids().is_empty());
        assert_eq!(store.len(), 0);
    }

    #[test]
    fn test_concurrent_updates_are_counted() {
        let store = Arc::new(RendererStateStore::new());
        store.create("abc");

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        assert!(store.update("abc", "PAUSED_PLAYBACK", "PLAYING"));
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.sequence("abc").unwrap(), 800);
    }
}
