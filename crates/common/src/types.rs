// Core domain types shared across all watchtrack crates.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::validation::ValidationError;

/// A half-open range `[start, end)` of video time, in seconds from the origin.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Interval {
    pub start: f64,
    pub end: f64,
}

impl Interval {
    pub const fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// Identity of a tracked (user, video) pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WatchKey {
    pub user_id: String,
    pub video_id: String,
}

impl WatchKey {
    /// Build a key, rejecting blank identifiers.
    pub fn new(
        user_id: impl Into<String>,
        video_id: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        let user_id = user_id.into();
        let video_id = video_id.into();

        if user_id.trim().is_empty() {
            return Err(ValidationError::EmptyUserId);
        }
        if video_id.trim().is_empty() {
            return Err(ValidationError::EmptyVideoId);
        }

        Ok(Self { user_id, video_id })
    }
}

impl fmt::Display for WatchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.user_id, self.video_id)
    }
}

/// Persistent watch record for one (user, video) pair.
///
/// `intervals` is always in normal form: sorted by start, non-overlapping,
/// and no two members within the merge tolerance of each other.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WatchState {
    pub user_id: String,
    pub video_id: String,
    pub intervals: Vec<Interval>,
    /// Last reported playhead, used only for resume.
    pub last_position: f64,
    /// Video length as last reported by a client (last write wins).
    pub total_duration: f64,
    /// Incremented on every persisted update; starts at 1.
    pub revision: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WatchState {
    pub fn key(&self) -> WatchKey {
        WatchKey { user_id: self.user_id.clone(), video_id: self.video_id.clone() }
    }
}

/// Read-only progress view derived from a [`WatchState`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ProgressSnapshot {
    pub percent_watched: f64,
    pub last_position: f64,
    pub total_duration: f64,
}

impl ProgressSnapshot {
    /// The "no history" result for a key that was never reported.
    pub const fn empty() -> Self {
        Self { percent_watched: 0.0, last_position: 0.0, total_duration: 0.0 }
    }
}
