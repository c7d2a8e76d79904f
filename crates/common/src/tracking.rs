// Watch state transitions: Absent -> Tracked on the first accepted report,
// Tracked -> Tracked on every report after that.

use chrono::{DateTime, Utc};

use crate::interval::{merge_with, MergePolicy};
use crate::types::{Interval, WatchKey, WatchState};
use crate::validation::{finite, non_negative, ValidationError};

/// A validated playback report.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observation {
    pub segment: Interval,
    pub current_position: f64,
    pub total_duration: f64,
}

impl Observation {
    pub fn new(
        start: f64,
        end: f64,
        current_position: f64,
        total_duration: f64,
    ) -> Result<Self, ValidationError> {
        let start = non_negative("start", start)?;
        let end = finite("end", end)?;
        if start >= end {
            return Err(ValidationError::EmptySegment { start, end });
        }

        let current_position = non_negative("currentTime", current_position)?;

        let total_duration = finite("videoDuration", total_duration)?;
        if total_duration <= 0.0 {
            return Err(ValidationError::NonPositiveDuration { value: total_duration });
        }

        Ok(Self { segment: Interval::new(start, end), current_position, total_duration })
    }
}

impl WatchState {
    /// Create the state for a key's first report.
    ///
    /// The minimum-duration filter applies here too: a sub-threshold first
    /// segment yields an empty interval set but still records the resume
    /// position and duration.
    pub fn start(
        key: &WatchKey,
        observation: &Observation,
        policy: &MergePolicy,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id: key.user_id.clone(),
            video_id: key.video_id.clone(),
            intervals: merge_with(policy, &[], observation.segment),
            last_position: observation.current_position,
            total_duration: observation.total_duration,
            revision: 1,
            created_at: now,
            updated_at: now,
        }
    }

    /// Fold a report into the state, returning the next revision.
    ///
    /// `last_position` is overwritten even when it moves backwards, and
    /// `total_duration` follows the latest report.
    pub fn observe(
        &self,
        observation: &Observation,
        policy: &MergePolicy,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id: self.user_id.clone(),
            video_id: self.video_id.clone(),
            intervals: merge_with(policy, &self.intervals, observation.segment),
            last_position: observation.current_position,
            total_duration: observation.total_duration,
            revision: self.revision + 1,
            created_at: self.created_at,
            updated_at: now,
        }
    }
}

/// Next state for `key` given whatever is currently stored.
pub fn advance(
    current: Option<&WatchState>,
    key: &WatchKey,
    observation: &Observation,
    policy: &MergePolicy,
    now: DateTime<Utc>,
) -> WatchState {
    match current {
        Some(state) => state.observe(observation, policy, now),
        None => WatchState::start(key, observation, policy, now),
    }
}
