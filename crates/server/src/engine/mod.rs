// Report ingestion: load, merge, persist, report.
//
// Each key's read-merge-write runs inside its per-key lock. The store's
// revision check catches writers outside this process; on a mismatch the
// whole sequence is re-run against fresh state, which is safe because
// merging an already-applied interval is a no-op.

pub mod locks;

use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tracing::{debug, info, info_span, warn, Instrument};
use watchtrack_common::interval::MergePolicy;
use watchtrack_common::protocol::progress::SaveProgressRequest;
use watchtrack_common::tracking::{advance, Observation};
use watchtrack_common::types::{ProgressSnapshot, WatchKey, WatchState};
use watchtrack_common::validation::ValidationError;

use crate::store::{StoreError, WatchStore};

use self::locks::KeyLocks;

pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_MAX_CONFLICT_RETRIES: u32 = 3;

/// Idle per-key locks are swept once the map grows past this.
const LOCK_PRUNE_THRESHOLD: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackerConfig {
    pub policy: MergePolicy,
    pub lock_timeout: Duration,
    pub max_conflict_retries: u32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            policy: MergePolicy::default(),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            max_conflict_retries: DEFAULT_MAX_CONFLICT_RETRIES,
        }
    }
}

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("watch state for `{key}` kept changing concurrently ({attempts} attempts)")]
    Conflict { key: WatchKey, attempts: u32 },

    #[error("timed out after {timeout:?} waiting to update `{key}`")]
    LockTimeout { key: WatchKey, timeout: Duration },

    #[error(transparent)]
    Persistence(StoreError),
}

impl TrackerError {
    /// Whether the caller may resubmit the same report unchanged.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Validation(_))
    }
}

/// Result of one accepted report.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IngestOutcome {
    pub percent_watched: f64,
    pub last_position: f64,
    pub watched_seconds: f64,
    pub revision: i64,
}

impl IngestOutcome {
    fn from_state(state: &WatchState) -> Self {
        Self {
            percent_watched: state.percent_watched(),
            last_position: state.last_position,
            watched_seconds: state.watched_seconds(),
            revision: state.revision,
        }
    }
}

pub struct ProgressTracker {
    store: WatchStore,
    locks: KeyLocks,
    config: TrackerConfig,
}

impl ProgressTracker {
    pub fn new(store: WatchStore, config: TrackerConfig) -> Self {
        Self { store, locks: KeyLocks::new(), config }
    }

    pub fn store(&self) -> &WatchStore {
        &self.store
    }

    /// Validate a raw save request, then ingest it.
    pub async fn ingest_request(
        &self,
        key: &WatchKey,
        request: &SaveProgressRequest,
    ) -> Result<IngestOutcome, TrackerError> {
        let observation = request.validate()?;
        self.ingest(key, &observation).await
    }

    pub async fn ingest(
        &self,
        key: &WatchKey,
        observation: &Observation,
    ) -> Result<IngestOutcome, TrackerError> {
        let outcome = self
            .ingest_locked(key, observation)
            .instrument(info_span!(
                "watchtrack.tracker.ingest",
                user_id = %key.user_id,
                video_id = %key.video_id,
                start = observation.segment.start,
                end = observation.segment.end
            ))
            .await;

        if self.locks.len().await > LOCK_PRUNE_THRESHOLD {
            let pruned = self.locks.prune_idle().await;
            debug!(pruned, "pruned idle per-key locks");
        }

        outcome
    }

    /// Current progress, or the all-zero snapshot when the key has no history.
    ///
    /// Does not take the key's lock, so it may observe either side of an
    /// in-flight update.
    pub async fn query(&self, key: &WatchKey) -> Result<ProgressSnapshot, TrackerError> {
        let state = self.load_state(key).await?;
        Ok(state.map_or_else(ProgressSnapshot::empty, |state| state.snapshot()))
    }

    pub async fn load_state(&self, key: &WatchKey) -> Result<Option<WatchState>, TrackerError> {
        self.store.load(key).await.map_err(TrackerError::Persistence)
    }

    async fn ingest_locked(
        &self,
        key: &WatchKey,
        observation: &Observation,
    ) -> Result<IngestOutcome, TrackerError> {
        let timeout = self.config.lock_timeout;
        let _guard = self.locks.acquire(key, timeout).await.map_err(|_| {
            warn!(timeout_ms = timeout.as_millis() as u64, "per-key lock acquisition timed out");
            TrackerError::LockTimeout { key: key.clone(), timeout }
        })?;

        let mut attempts = 0;
        loop {
            attempts += 1;

            let current = self.load_state(key).await?;
            let expected_revision = current.as_ref().map(|state| state.revision);
            let next = advance(current.as_ref(), key, observation, &self.config.policy, Utc::now());

            match self.store.save(&next, expected_revision).await {
                Ok(()) => {
                    let outcome = IngestOutcome::from_state(&next);
                    info!(
                        revision = next.revision,
                        intervals = next.intervals.len(),
                        percent_watched = outcome.percent_watched,
                        last_position = outcome.last_position,
                        "watch progress saved"
                    );
                    return Ok(outcome);
                }
                Err(StoreError::Conflict { .. }) if attempts <= self.config.max_conflict_retries => {
                    warn!(attempt = attempts, ?expected_revision, "revision conflict; reapplying report");
                }
                Err(StoreError::Conflict { .. }) => {
                    return Err(TrackerError::Conflict { key: key.clone(), attempts });
                }
                Err(error) => return Err(TrackerError::Persistence(error)),
            }
        }
    }
}
