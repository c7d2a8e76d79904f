// Progress accessor: watched time and completion percentage.

use crate::types::{Interval, ProgressSnapshot, WatchState};

/// Sum of interval lengths. Assumes normal form, so nothing is double counted.
pub fn watched_seconds(intervals: &[Interval]) -> f64 {
    intervals.iter().map(Interval::duration).sum()
}

/// Completion percentage clamped to `[0, 100]`.
///
/// Returns 0 when the duration is unknown (zero, negative, or not finite).
/// A client that under-reports duration can push the raw ratio past 100;
/// that is clamped rather than rejected.
pub fn percent_watched(watched: f64, total_duration: f64) -> f64 {
    if !(total_duration.is_finite() && total_duration > 0.0) {
        return 0.0;
    }

    let percent = watched * 100.0 / total_duration;
    if percent.is_nan() {
        return 0.0;
    }
    percent.clamp(0.0, 100.0)
}

impl WatchState {
    pub fn watched_seconds(&self) -> f64 {
        watched_seconds(&self.intervals)
    }

    pub fn percent_watched(&self) -> f64 {
        percent_watched(self.watched_seconds(), self.total_duration)
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            percent_watched: self.percent_watched(),
            last_position: self.last_position,
            total_duration: self.total_duration,
        }
    }
}
