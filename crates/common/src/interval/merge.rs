// Segment merger: folds one observed interval into a normal-form interval set.
//
// Coalesce-and-sort rather than incremental insertion. Interval counts per
// (user, video) are bounded by playback interactions, so a sort per report
// is cheap.

use crate::types::Interval;

/// Observations shorter than this are treated as seek jitter and dropped.
pub const DEFAULT_MIN_DURATION_SECS: f64 = 1.0;

/// Gaps up to this size (buffering stalls, timer granularity) count as continuous viewing.
pub const DEFAULT_TOLERANCE_SECS: f64 = 1.0;

/// Slack for decimal playback times: `1.4 - 0.4` is `0.9999999999999999`.
const DURATION_EPSILON_SECS: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MergePolicy {
    pub min_duration: f64,
    pub tolerance: f64,
}

impl Default for MergePolicy {
    fn default() -> Self {
        Self { min_duration: DEFAULT_MIN_DURATION_SECS, tolerance: DEFAULT_TOLERANCE_SECS }
    }
}

impl MergePolicy {
    /// Whether an observation is long enough to count as watched coverage.
    ///
    /// A segment whose nominal length equals `min_duration` is kept even when
    /// subtracting its decimal endpoints rounds just below it.
    pub fn accepts(&self, observed: &Interval) -> bool {
        observed.duration() + DURATION_EPSILON_SECS >= self.min_duration
    }

    fn touches(&self, current: &Interval, next: &Interval) -> bool {
        next.start <= current.end + self.tolerance
    }
}

/// Merge with the default one-second threshold and tolerance.
pub fn merge(existing: &[Interval], observed: Interval) -> Vec<Interval> {
    merge_with(&MergePolicy::default(), existing, observed)
}

/// Return the normal-form union of `existing` and `observed`.
///
/// Total: never fails. A sub-threshold observation returns `existing`
/// unchanged. The sweep compares each interval against the already-extended
/// accumulator, so chains of small gaps coalesce transitively even when
/// their outer ends are further apart than the tolerance.
pub fn merge_with(policy: &MergePolicy, existing: &[Interval], observed: Interval) -> Vec<Interval> {
    if !policy.accepts(&observed) {
        return existing.to_vec();
    }

    let mut working = Vec::with_capacity(existing.len() + 1);
    working.extend_from_slice(existing);
    working.push(observed);
    working.sort_by(|a, b| a.start.total_cmp(&b.start));

    let mut merged = Vec::with_capacity(working.len());
    let mut segments = working.into_iter();
    let Some(mut current) = segments.next() else {
        return merged;
    };

    for segment in segments {
        if policy.touches(&current, &segment) {
            current.end = current.end.max(segment.end);
        } else {
            merged.push(current);
            current = segment;
        }
    }
    merged.push(current);

    debug_assert!(is_normal_form(&merged, policy.tolerance));
    merged
}

/// Check the stored-set invariants: every interval non-empty, sorted by
/// start, and each gap strictly wider than `tolerance`.
pub fn is_normal_form(intervals: &[Interval], tolerance: f64) -> bool {
    intervals.iter().all(|interval| interval.start < interval.end)
        && intervals.windows(2).all(|pair| pair[1].start > pair[0].end + tolerance)
}
