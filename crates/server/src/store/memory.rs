// In-memory watch state storage for tests and ephemeral deployments.

use std::collections::HashMap;

use watchtrack_common::types::{WatchKey, WatchState};

use super::sqlite::WriteOutcome;

#[derive(Debug, Default)]
pub struct MemoryWatchStore {
    states: HashMap<WatchKey, WatchState>,
}

impl MemoryWatchStore {
    pub fn load(&self, key: &WatchKey) -> Option<WatchState> {
        self.states.get(key).cloned()
    }

    /// Same compare-and-set contract as the SQLite store.
    pub fn save(&mut self, state: &WatchState, expected_revision: Option<i64>) -> WriteOutcome {
        let key = state.key();
        let stored_revision = self.states.get(&key).map(|stored| stored.revision);
        if stored_revision != expected_revision {
            return WriteOutcome::RevisionMismatch;
        }

        self.states.insert(key, state.clone());
        WriteOutcome::Written
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }
}
