//! Position estimation from server reports.
//!
//! The server pushes its current song position a few times per second, but
//! delivery over a mobile network jitters. We keep a short history of reports
//! and pick the one whose dead-reckoned estimate agrees best with the others,
//! which suppresses single late-delivered outliers without a full statistical
//! model.

use crate::song::SongTiming;
use std::collections::VecDeque;

/// How many position reports are retained; the oldest is evicted first.
pub const POSITION_HISTORY_CAPACITY: usize = 3;

/// No report for this long means the game probably left the sing scene;
/// callers reset tracking once per tick when this elapses.
pub const STALE_POSITION_TIMEOUT_MILLIS: i64 = 30_000;

/// One received song-position report. Immutable once created.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionReport {
    pub reported_position_millis: f64,
    pub received_at_unix_millis: i64,
}

impl PositionReport {
    /// Dead-reckoned position at `now`: the reported value extrapolated
    /// forward by wall-clock elapsed time.
    pub fn estimate_at(&self, now_unix_millis: i64) -> f64 {
        self.reported_position_millis + (now_unix_millis - self.received_at_unix_millis) as f64
    }
}

/// Ring of recent position reports plus the current best pick.
#[derive(Debug, Default)]
pub struct PositionEstimator {
    reports: VecDeque<PositionReport>,
    best: Option<PositionReport>,
}

impl PositionEstimator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new report and recompute which retained report to trust.
    pub fn record_report(&mut self, reported_position_millis: f64, received_at_unix_millis: i64) {
        self.reports.push_back(PositionReport {
            reported_position_millis,
            received_at_unix_millis,
        });
        if self.reports.len() > POSITION_HISTORY_CAPACITY {
            self.reports.pop_front();
        }
        self.best = self.find_best_report();
    }

    /// The report with the least total discrepancy against what the other
    /// retained reports would have predicted at the same instant. Pairwise
    /// differences of dead-reckoned estimates are time-invariant, so each
    /// candidate is evaluated at its own receive instant. First minimum wins.
    fn find_best_report(&self) -> Option<PositionReport> {
        let mut best: Option<(f64, PositionReport)> = None;
        for candidate in &self.reports {
            let error: f64 = self
                .reports
                .iter()
                .filter(|other| {
                    other.received_at_unix_millis != candidate.received_at_unix_millis
                })
                .map(|other| {
                    (candidate.estimate_at(candidate.received_at_unix_millis)
                        - other.estimate_at(candidate.received_at_unix_millis))
                    .abs()
                })
                .sum();
            match best {
                Some((best_error, _)) if best_error <= error => {}
                _ => best = Some((error, *candidate)),
            }
        }
        best.map(|(_, report)| report)
    }

    /// Current dead-reckoned position, or `None` before the first report or
    /// after a reset.
    pub fn estimate_now_millis(&self, now_unix_millis: i64) -> Option<f64> {
        self.best.map(|report| report.estimate_at(now_unix_millis))
    }

    /// Receive time of the best report; staleness policy lives in the caller.
    pub fn best_received_at(&self) -> Option<i64> {
        self.best.map(|report| report.received_at_unix_millis)
    }

    pub fn report_count(&self) -> usize {
        self.reports.len()
    }

    pub fn reset(&mut self) {
        self.reports.clear();
        self.best = None;
    }
}

/// Estimator plus the song timing and analysis cursor that must change
/// together: a new report replaces the timing wholesale and may rewind the
/// cursor, so all three sit behind one lock at the call site.
#[derive(Debug, Default)]
pub struct PositionTracker {
    estimator: PositionEstimator,
    timing: Option<SongTiming>,
    last_analyzed_beat: i32,
}

impl PositionTracker {
    pub fn new() -> Self {
        Self {
            estimator: PositionEstimator::new(),
            timing: None,
            last_analyzed_beat: -1,
        }
    }

    /// Apply a `PositionInSong` message: record the report, replace the
    /// timing, and rewind the cursor if the new timing implies that beats
    /// were analyzed prematurely.
    pub fn handle_position_report(
        &mut self,
        position_millis: f64,
        bpm: f64,
        gap_millis: f64,
        now_unix_millis: i64,
    ) {
        self.estimator.record_report(position_millis, now_unix_millis);
        self.timing = Some(SongTiming::new(bpm, gap_millis));

        if let Some(current_beat) = self.current_beat(now_unix_millis) {
            if self.last_analyzed_beat > current_beat {
                crate::log_debug(&format!(
                    "Rewinding analysis cursor from beat {} to {}",
                    self.last_analyzed_beat, current_beat
                ));
                self.last_analyzed_beat = current_beat;
            }
        }
    }

    pub fn has_position(&self) -> bool {
        self.timing.is_some() && self.estimator.best_received_at().is_some()
    }

    pub fn estimate_now_millis(&self, now_unix_millis: i64) -> Option<f64> {
        self.estimator.estimate_now_millis(now_unix_millis)
    }

    pub fn current_beat(&self, now_unix_millis: i64) -> Option<i32> {
        let timing = self.timing?;
        let estimate = self.estimator.estimate_now_millis(now_unix_millis)?;
        Some(timing.current_beat(estimate))
    }

    pub fn timing(&self) -> Option<SongTiming> {
        self.timing
    }

    pub fn last_analyzed_beat(&self) -> i32 {
        self.last_analyzed_beat
    }

    pub fn mark_analyzed_up_to(&mut self, beat: i32) {
        self.last_analyzed_beat = beat;
    }

    /// On recording start, analyze only future beats.
    pub fn skip_to_current_beat(&mut self, now_unix_millis: i64) {
        if let Some(current_beat) = self.current_beat(now_unix_millis) {
            self.last_analyzed_beat = current_beat;
        }
    }

    /// True once no report has arrived for [`STALE_POSITION_TIMEOUT_MILLIS`].
    pub fn is_stale(&self, now_unix_millis: i64) -> bool {
        match self.estimator.best_received_at() {
            Some(received_at) => received_at + STALE_POSITION_TIMEOUT_MILLIS < now_unix_millis,
            None => false,
        }
    }

    pub fn reset(&mut self) {
        self.estimator.reset();
        self.timing = None;
        self.last_analyzed_beat = -1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_estimator_has_no_estimate() {
        let estimator = PositionEstimator::new();
        assert_eq!(estimator.estimate_now_millis(1_000), None);
    }

    #[test]
    fn single_report_dead_reckons_forward() {
        let mut estimator = PositionEstimator::new();
        estimator.record_report(10_000.0, 1_000);
        assert_eq!(estimator.estimate_now_millis(1_000), Some(10_000.0));
        assert_eq!(estimator.estimate_now_millis(3_500), Some(12_500.0));
    }

    #[test]
    fn history_is_capped_at_three_reports() {
        let mut estimator = PositionEstimator::new();
        for i in 0..5 {
            estimator.record_report(1_000.0 * f64::from(i), i64::from(i) * 100);
        }
        assert_eq!(estimator.report_count(), POSITION_HISTORY_CAPACITY);
    }

    #[test]
    fn outlier_report_is_suppressed() {
        let mut estimator = PositionEstimator::new();
        // Two consistent reports (song runs ~9s ahead of the wall clock) and
        // one that arrived with multi-second delivery delay.
        estimator.record_report(10_000.0, 1_000);
        estimator.record_report(10_500.0, 1_500);
        estimator.record_report(20_000.0, 2_000);
        // The consistent pair wins: estimate extends 9000ms skew, not 18000ms.
        assert_eq!(estimator.estimate_now_millis(3_000), Some(12_000.0));
    }

    #[test]
    fn outlier_in_the_middle_is_also_suppressed() {
        let mut estimator = PositionEstimator::new();
        estimator.record_report(10_000.0, 1_000);
        estimator.record_report(4_000.0, 1_400);
        estimator.record_report(10_600.0, 1_600);
        let estimate = estimator.estimate_now_millis(1_600).unwrap();
        assert!((estimate - 10_600.0).abs() < 1.0);
    }

    #[test]
    fn reset_clears_history_and_estimate() {
        let mut estimator = PositionEstimator::new();
        estimator.record_report(10_000.0, 1_000);
        estimator.reset();
        assert_eq!(estimator.estimate_now_millis(2_000), None);
        assert_eq!(estimator.report_count(), 0);
    }

    #[test]
    fn tracker_replaces_timing_wholesale() {
        let mut tracker = PositionTracker::new();
        tracker.handle_position_report(5_000.0, 60.0, 0.0, 1_000);
        tracker.handle_position_report(5_200.0, 120.0, 500.0, 1_200);
        let timing = tracker.timing().unwrap();
        assert_eq!(timing.bpm, 120.0);
        assert_eq!(timing.gap_millis, 500.0);
    }

    #[test]
    fn tracker_rewinds_cursor_when_new_timing_implies_earlier_beat() {
        let mut tracker = PositionTracker::new();
        // 120 bpm: position 10s => beat 20.
        tracker.handle_position_report(10_000.0, 120.0, 0.0, 1_000);
        tracker.mark_analyzed_up_to(40);
        // Same position, but the song is actually 60 bpm => beat 10.
        tracker.handle_position_report(10_000.0, 60.0, 0.0, 1_000);
        assert_eq!(tracker.last_analyzed_beat(), 10);
    }

    #[test]
    fn tracker_keeps_cursor_when_not_premature() {
        let mut tracker = PositionTracker::new();
        tracker.handle_position_report(10_000.0, 120.0, 0.0, 1_000);
        tracker.mark_analyzed_up_to(5);
        tracker.handle_position_report(10_100.0, 120.0, 0.0, 1_100);
        assert_eq!(tracker.last_analyzed_beat(), 5);
    }

    #[test]
    fn tracker_staleness_follows_best_report() {
        let mut tracker = PositionTracker::new();
        tracker.handle_position_report(10_000.0, 120.0, 0.0, 1_000);
        assert!(!tracker.is_stale(1_000 + STALE_POSITION_TIMEOUT_MILLIS));
        assert!(tracker.is_stale(1_001 + STALE_POSITION_TIMEOUT_MILLIS));
        tracker.reset();
        assert!(!tracker.is_stale(i64::MAX));
        assert_eq!(tracker.last_analyzed_beat(), -1);
    }
}
