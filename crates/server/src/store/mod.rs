// Persistence for watch states: SQLite for deployments, in-memory for tests.

pub mod memory;
pub mod sqlite;

use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Context};
use thiserror::Error;
use tokio::sync::RwLock;
use watchtrack_common::types::{WatchKey, WatchState};

use self::memory::MemoryWatchStore;
use self::sqlite::{WatchDb, WriteOutcome};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("watch state for `{key}` changed concurrently (expected revision {expected:?})")]
    Conflict { key: WatchKey, expected: Option<i64> },

    #[error("watch store unavailable: {0:#}")]
    Unavailable(anyhow::Error),
}

#[derive(Clone)]
pub enum WatchStore {
    Sqlite(Arc<Mutex<WatchDb>>),
    Memory(Arc<RwLock<MemoryWatchStore>>),
}

impl WatchStore {
    pub fn open_sqlite(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let db = WatchDb::open(path).context("failed to open sqlite watch store")?;
        Ok(Self::Sqlite(Arc::new(Mutex::new(db))))
    }

    pub fn memory() -> Self {
        Self::Memory(Arc::default())
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Sqlite(_) => "sqlite",
            Self::Memory(_) => "memory",
        }
    }

    pub async fn load(&self, key: &WatchKey) -> Result<Option<WatchState>, StoreError> {
        match self {
            Self::Sqlite(db) => {
                let db = lock_db(db)?;
                db.load(key).map_err(StoreError::Unavailable)
            }
            Self::Memory(store) => Ok(store.read().await.load(key)),
        }
    }

    /// Persist `state` only if the stored revision still equals
    /// `expected_revision` (`None` means the key must not exist yet).
    pub async fn save(
        &self,
        state: &WatchState,
        expected_revision: Option<i64>,
    ) -> Result<(), StoreError> {
        let outcome = match self {
            Self::Sqlite(db) => {
                let db = lock_db(db)?;
                db.save(state, expected_revision).map_err(StoreError::Unavailable)?
            }
            Self::Memory(store) => store.write().await.save(state, expected_revision),
        };

        match outcome {
            WriteOutcome::Written => Ok(()),
            WriteOutcome::RevisionMismatch => {
                Err(StoreError::Conflict { key: state.key(), expected: expected_revision })
            }
        }
    }

    pub async fn health_check(&self) -> Result<(), StoreError> {
        match self {
            Self::Sqlite(db) => {
                let db = lock_db(db)?;
                db.ping().map_err(StoreError::Unavailable)
            }
            Self::Memory(_) => Ok(()),
        }
    }
}

fn lock_db(db: &Mutex<WatchDb>) -> Result<std::sync::MutexGuard<'_, WatchDb>, StoreError> {
    db.lock().map_err(|_| StoreError::Unavailable(anyhow!("progress db mutex poisoned")))
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use tempfile::TempDir;
    use watchtrack_common::types::{Interval, WatchKey, WatchState};

    use super::{StoreError, WatchStore};

    fn state(revision: i64) -> WatchState {
        let now = Utc::now();
        WatchState {
            user_id: "user123".to_owned(),
            video_id: "lecture1".to_owned(),
            intervals: vec![Interval::new(0.0, 10.0)],
            last_position: 10.0,
            total_duration: 600.0,
            revision,
            created_at: now,
            updated_at: now,
        }
    }

    async fn assert_compare_and_set(store: WatchStore) {
        let key = WatchKey::new("user123", "lecture1").expect("key should be valid");
        assert!(store.load(&key).await.expect("load should succeed").is_none());

        store.save(&state(1), None).await.expect("insert should succeed");
        let conflict = store.save(&state(2), Some(5)).await.expect_err("stale save should fail");
        assert!(matches!(conflict, StoreError::Conflict { expected: Some(5), .. }));

        store.save(&state(2), Some(1)).await.expect("fresh save should succeed");
        let loaded = store.load(&key).await.expect("load should succeed").expect("state exists");
        assert_eq!(loaded.revision, 2);
    }

    #[tokio::test]
    async fn sqlite_store_enforces_revision() {
        let dir = TempDir::new().expect("temp dir should be created");
        let store = WatchStore::open_sqlite(dir.path().join("progress.db"))
            .expect("sqlite store should open");
        assert_eq!(store.kind(), "sqlite");
        store.health_check().await.expect("sqlite store should be healthy");
        assert_compare_and_set(store).await;
    }

    #[tokio::test]
    async fn memory_store_enforces_revision() {
        let store = WatchStore::memory();
        assert_eq!(store.kind(), "memory");
        assert_compare_and_set(store).await;
    }

    #[test]
    fn conflict_message_names_key() {
        let key = WatchKey::new("user123", "lecture1").expect("key should be valid");
        let error = StoreError::Conflict { key, expected: Some(3) };
        assert_eq!(
            error.to_string(),
            "watch state for `user123/lecture1` changed concurrently (expected revision Some(3))"
        );
    }
}
