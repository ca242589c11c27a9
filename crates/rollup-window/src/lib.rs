//! Pure functions computing the time window a rollup run should cover and
//! how the processing window should adapt afterwards. No I/O: the
//! orchestrator supplies `now`, the peer-activity sample, and persisted
//! config fields as plain values.

use chrono::{DateTime, Duration, Utc};

/// A concrete `[start, end)` window to aggregate over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Minimum safety margin kept between `now` and the window's upper bound,
/// scaled to the rollup cadence so short-interval rollups don't chase
/// still-arriving data.
pub fn safety_buffer(rollup_interval: Duration) -> Duration {
    if rollup_interval <= Duration::seconds(1) {
        Duration::seconds(30)
    } else if rollup_interval == Duration::minutes(1) {
        Duration::seconds(60)
    } else {
        rollup_interval
    }
}

/// Scale the optimal window by observed concurrent load on the store.
/// More than 5 active peers halves it; fewer than 2 grows it by 50%,
/// capped at `max_look_back_window`.
pub fn adjust_for_load(
    optimal_window: Duration,
    peer_count: i64,
    max_look_back_window: Duration,
) -> Duration {
    if peer_count > 5 {
        optimal_window / 2
    } else if peer_count < 2 {
        let grown = (optimal_window * 3) / 2;
        grown.min(max_look_back_window)
    } else {
        optimal_window
    }
}

/// Compute the window a freshly claimed config should process this run.
///
/// `peer_count` is `None` on a config's first-ever run (no load adjustment
/// applied) and `Some(n)` otherwise. Returns `None` when `start >= end`:
/// the caller should release the lease and skip the run without treating
/// it as an error.
pub fn compute_window(
    now: DateTime<Utc>,
    last_processed_time: Option<DateTime<Utc>>,
    look_back_window: Duration,
    processing_window: Duration,
    max_look_back_window: Duration,
    rollup_interval: Duration,
    peer_count: Option<i64>,
) -> Option<Window> {
    let is_first_run = last_processed_time.is_none();
    let start = last_processed_time.unwrap_or(now - look_back_window);

    let optimal_seed = if is_first_run {
        processing_window.min(Duration::hours(1))
    } else {
        processing_window
    };

    let optimal_window = match peer_count {
        Some(n) if !is_first_run => adjust_for_load(optimal_seed, n, max_look_back_window),
        _ => optimal_seed,
    };

    let buffer = safety_buffer(rollup_interval);
    let end = (now - buffer).min(start + optimal_window);

    if start >= end {
        None
    } else {
        Some(Window { start, end })
    }
}

/// New `processing_window` to persist after a successful run, based on how
/// many rows the run produced.
pub fn next_processing_window(
    rows_processed: i64,
    optimal_window: Duration,
    max_look_back_window: Duration,
) -> Duration {
    if rows_processed > 1_000_000 {
        (optimal_window * 4) / 5
    } else if rows_processed < 100_000 {
        let grown = (optimal_window * 6) / 5;
        grown.min(max_look_back_window)
    } else {
        optimal_window
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(secs_from_epoch: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs_from_epoch, 0).unwrap()
    }

    #[test]
    fn safety_buffer_matches_boundary_cases() {
        assert_eq!(safety_buffer(Duration::seconds(1)), Duration::seconds(30));
        assert_eq!(safety_buffer(Duration::milliseconds(500)), Duration::seconds(30));
        assert_eq!(safety_buffer(Duration::minutes(1)), Duration::seconds(60));
        assert_eq!(safety_buffer(Duration::hours(1)), Duration::hours(1));
    }

    #[test]
    fn first_run_uses_look_back_window_and_caps_at_one_hour() {
        let now = t(10_000);
        let window = compute_window(
            now,
            None,
            Duration::hours(2),
            Duration::hours(3),
            Duration::hours(24),
            Duration::hours(1),
            None,
        )
        .expect("non-empty window");

        assert_eq!(window.start, now - Duration::hours(2));
        // optimal seed capped at 1h even though processing_window is 3h.
        assert_eq!(window.end, window.start + Duration::hours(1));
    }

    #[test]
    fn subsequent_run_uses_last_processed_time_as_start() {
        let now = t(100_000);
        let last_processed = t(90_000);
        let window = compute_window(
            now,
            Some(last_processed),
            Duration::hours(2),
            Duration::hours(1),
            Duration::hours(24),
            Duration::hours(1),
            Some(3),
        )
        .expect("non-empty window");

        assert_eq!(window.start, last_processed);
    }

    #[test]
    fn high_load_halves_the_window() {
        let optimal = Duration::hours(4);
        let adjusted = adjust_for_load(optimal, 6, Duration::hours(24));
        assert_eq!(adjusted, Duration::hours(2));
    }

    #[test]
    fn low_load_grows_the_window_but_caps_at_max_look_back() {
        let optimal = Duration::hours(20);
        let adjusted = adjust_for_load(optimal, 1, Duration::hours(24));
        assert_eq!(adjusted, Duration::hours(24));
    }

    #[test]
    fn moderate_load_leaves_window_unchanged() {
        let optimal = Duration::hours(4);
        assert_eq!(adjust_for_load(optimal, 3, Duration::hours(24)), optimal);
    }

    #[test]
    fn no_work_when_start_reaches_or_passes_end() {
        let now = t(1_000);
        let window = compute_window(
            now,
            Some(now - Duration::seconds(10)),
            Duration::hours(2),
            Duration::hours(1),
            Duration::hours(24),
            Duration::hours(1),
            Some(3),
        );
        assert!(window.is_none());
    }

    #[test]
    fn high_volume_run_shrinks_processing_window() {
        let next = next_processing_window(1_500_000, Duration::hours(2), Duration::hours(24));
        assert_eq!(next, Duration::minutes(96));
    }

    #[test]
    fn low_volume_run_grows_processing_window_but_caps() {
        let next = next_processing_window(50_000, Duration::hours(22), Duration::hours(24));
        assert_eq!(next, Duration::hours(24));
    }

    #[test]
    fn moderate_volume_run_leaves_processing_window_unchanged() {
        let optimal = Duration::hours(2);
        let next = next_processing_window(500_000, optimal, Duration::hours(24));
        assert_eq!(next, optimal);
    }
}
