//! In-memory checkpoint store

use super::{CheckpointStore, Checkpoints, SourceState, merge_monotonic};
use crate::error::{ExtractError, Result};
use crate::work_unit::Marker;
use std::sync::Mutex;

/// Single-writer, process-local checkpoint store.
///
/// Commits swap in a fully merged copy under the lock, so readers never see
/// a partially applied set.
#[derive(Debug, Default)]
pub struct MemoryCheckpointStore {
    state: Mutex<Checkpoints>,
    source_state: Mutex<SourceState>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_checkpoints(checkpoints: Checkpoints) -> Self {
        Self {
            state: Mutex::new(checkpoints),
            ..Self::default()
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Checkpoints>> {
        self.state
            .lock()
            .map_err(|_| ExtractError::Commit("checkpoint store lock poisoned".to_string()))
    }

    fn lock_source_state(&self) -> Result<std::sync::MutexGuard<'_, SourceState>> {
        self.source_state
            .lock()
            .map_err(|_| ExtractError::Commit("source state lock poisoned".to_string()))
    }
}

impl CheckpointStore for MemoryCheckpointStore {
    fn get(&self, partition: &str) -> Result<Option<Marker>> {
        Ok(self.lock()?.get(partition).copied())
    }

    fn snapshot(&self) -> Result<Checkpoints> {
        Ok(self.lock()?.clone())
    }

    fn commit_all(&self, updates: &Checkpoints) -> Result<Checkpoints> {
        let mut state = self.lock()?;
        let mut next = state.clone();
        let applied = merge_monotonic(&mut next, updates);
        *state = next;
        Ok(applied)
    }

    fn source_state(&self) -> Result<SourceState> {
        Ok(self.lock_source_state()?.clone())
    }

    fn commit_source_state(&self, updates: &SourceState) -> Result<()> {
        let mut state = self.lock_source_state()?;
        state.extend(updates.iter().map(|(k, v)| (k.clone(), v.clone())));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_commit_then_get() {
        let store = MemoryCheckpointStore::new();
        assert_eq!(store.get("A").unwrap(), None);

        let updates = Checkpoints::from([
            ("A".to_string(), Marker::new(100)),
            ("B".to_string(), Marker::new(50)),
        ]);
        store.commit_all(&updates).unwrap();

        assert_eq!(store.get("A").unwrap(), Some(Marker::new(100)));
        assert_eq!(store.snapshot().unwrap(), updates);
    }

    #[test]
    fn test_source_state_overwrites_keys() {
        let store = MemoryCheckpointStore::new();
        assert!(store.source_state().unwrap().is_empty());

        store
            .commit_source_state(&SourceState::from([
                ("runs".to_string(), "1".to_string()),
                ("cursor".to_string(), "abc".to_string()),
            ]))
            .unwrap();
        store
            .commit_source_state(&SourceState::from([("runs".to_string(), "2".to_string())]))
            .unwrap();

        let state = store.source_state().unwrap();
        assert_eq!(state["runs"], "2");
        assert_eq!(state["cursor"], "abc");
        assert!(store.snapshot().unwrap().is_empty());
    }

    #[test]
    fn test_concurrent_commits_lose_nothing() {
        let store = Arc::new(MemoryCheckpointStore::new());
        let handles: Vec<_> = (0..16)
            .map(|i| {
                let store = store.clone();
                std::thread::spawn(move || {
                    let updates = Checkpoints::from([(format!("p{i}"), Marker::new(i as u64 + 1))]);
                    store.commit_all(&updates).unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let snapshot = store.snapshot().unwrap();
        assert_eq!(snapshot.len(), 16);
        assert_eq!(snapshot["p15"], Marker::new(16));
    }
}
