//! Fleet synchronization math.
//!
//! All kiosks derive their playlist position from the same daily anchor,
//! 00:05 UTC, so screens stay phase-locked without talking to each other.
//! Everything in this module is pure integer math over Unix timestamps;
//! the scheduler owns the clock.

use crate::models::{CyclePosition, DriftAction, effective_duration_ms};

const SECONDS_PER_DAY: i64 = 86_400;
/// 00:05 UTC, in seconds from midnight.
const ANCHOR_OFFSET_SEC: i64 = 5 * 60;
/// 23:58 UTC, in seconds from midnight.
const PREP_START_SEC: i64 = 23 * 3600 + 58 * 60;

/// Anchor for `now`: 00:05 UTC today, or yesterday when `now` is earlier
/// than today's 00:05.
pub fn daily_anchor_ts(now_ts: i64) -> i64 {
    let day_start = now_ts.div_euclid(SECONDS_PER_DAY) * SECONDS_PER_DAY;
    let anchor = day_start + ANCHOR_OFFSET_SEC;
    if now_ts < anchor {
        anchor - SECONDS_PER_DAY
    } else {
        anchor
    }
}

/// First anchor strictly after `now`.
pub fn next_daily_anchor_ts(now_ts: i64) -> i64 {
    daily_anchor_ts(now_ts) + SECONDS_PER_DAY
}

/// The daily range `[23:58, 00:05)` UTC during which kiosks prepare to
/// re-align.
pub fn is_prep_window(now_ts: i64) -> bool {
    let second_of_day = now_ts.rem_euclid(SECONDS_PER_DAY);
    second_of_day >= PREP_START_SEC || second_of_day < ANCHOR_OFFSET_SEC
}

/// Next checkpoint aligned to `interval_sec` boundaries, strictly after
/// `now` (hourly checkpoints land on the UTC hour).
pub fn next_hour_checkpoint_ts(now_ts: i64, interval_sec: u64) -> i64 {
    let interval = interval_sec.max(1) as i64;
    (now_ts.div_euclid(interval) + 1) * interval
}

/// Cumulative start offsets and total length of one cycle.
pub fn cycle_timeline(durations_ms: &[i64]) -> (Vec<i64>, i64) {
    let mut starts = Vec::with_capacity(durations_ms.len());
    let mut total = 0i64;
    for duration in durations_ms {
        starts.push(total);
        total += duration;
    }
    (starts, total)
}

/// Where in the cycle a kiosk should be at `now_ms` (Unix milliseconds).
///
/// Durations are clamped through [`effective_duration_ms`] before the
/// timeline is built. Returns `None` for an empty or zero-length cycle.
pub fn compute_cycle_position(now_ms: i64, durations_ms: &[i64]) -> Option<CyclePosition> {
    let effective: Vec<i64> = durations_ms
        .iter()
        .map(|d| effective_duration_ms(*d))
        .collect();
    let (starts, total) = cycle_timeline(&effective);
    if total <= 0 {
        return None;
    }

    let anchor_ts = daily_anchor_ts(now_ms.div_euclid(1000));
    let elapsed_ms = (now_ms - anchor_ts * 1000).rem_euclid(total);

    let mut index = 0;
    for (i, start) in starts.iter().enumerate() {
        if *start <= elapsed_ms {
            index = i;
        } else {
            break;
        }
    }

    Some(CyclePosition {
        index,
        offset_ms: elapsed_ms - starts[index],
        cycle_pos_ms: elapsed_ms,
        cycle_total_ms: total,
        anchor_ts,
    })
}

/// Signed shortest-arc difference `target − current` on the cycle, in
/// `(−cycle/2, cycle/2]`.
pub fn signed_cycle_delta_ms(target_ms: i64, current_ms: i64, cycle_total_ms: i64) -> i64 {
    let half = cycle_total_ms / 2;
    half - (half - (target_ms - current_ms)).rem_euclid(cycle_total_ms)
}

/// Partition a drift delta into the action the scheduler takes.
///
/// A hard threshold below the soft threshold is a misconfiguration and is
/// raised to the soft threshold.
pub fn classify_drift_action(
    delta_ms: i64,
    drift_threshold_ms: i64,
    hard_resync_ms: i64,
) -> DriftAction {
    let hard = hard_resync_ms.max(drift_threshold_ms);
    let magnitude = delta_ms.abs();
    if magnitude < drift_threshold_ms {
        DriftAction::None
    } else if magnitude < hard {
        DriftAction::SoftResync
    } else {
        DriftAction::HardResync
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn ts(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> i64 {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap().timestamp()
    }

    #[test]
    fn anchor_before_0005_uses_previous_day() {
        assert_eq!(
            daily_anchor_ts(ts(2026, 2, 8, 0, 2, 0)),
            ts(2026, 2, 7, 0, 5, 0)
        );
    }

    #[test]
    fn anchor_after_0005_uses_current_day() {
        assert_eq!(
            daily_anchor_ts(ts(2026, 2, 8, 14, 10, 0)),
            ts(2026, 2, 8, 0, 5, 0)
        );
    }

    #[test]
    fn prep_window_crosses_midnight() {
        assert!(is_prep_window(ts(2026, 2, 7, 23, 58, 0)));
        assert!(is_prep_window(ts(2026, 2, 8, 0, 4, 59)));
        assert!(!is_prep_window(ts(2026, 2, 8, 0, 5, 0)));
        assert!(!is_prep_window(ts(2026, 2, 7, 23, 57, 59)));
    }

    #[test]
    fn next_anchor_is_strictly_ahead() {
        let before = ts(2026, 2, 8, 0, 2, 0);
        assert_eq!(next_daily_anchor_ts(before), ts(2026, 2, 8, 0, 5, 0));
        let after = ts(2026, 2, 8, 14, 10, 0);
        assert_eq!(next_daily_anchor_ts(after), ts(2026, 2, 9, 0, 5, 0));
    }

    #[test]
    fn cycle_position_resolves_index_and_offset() {
        let anchor = ts(2026, 2, 8, 0, 5, 0);
        let now_ms = (anchor + 25) * 1000;
        let pos = compute_cycle_position(now_ms, &[10_000, 20_000, 30_000]).unwrap();
        assert_eq!(pos.index, 1);
        assert_eq!(pos.offset_ms, 15_000);
        assert_eq!(pos.cycle_pos_ms, 25_000);
        assert_eq!(pos.cycle_total_ms, 60_000);
        assert_eq!(pos.anchor_ts, anchor);
    }

    #[test]
    fn cycle_position_invariants_hold_across_a_day() {
        let durations = [3_000, 12_500, 700, 45_000];
        let effective: Vec<i64> = durations.iter().map(|d| effective_duration_ms(*d)).collect();
        let (starts, total) = cycle_timeline(&effective);
        let anchor = ts(2026, 2, 8, 0, 5, 0);
        for step in 0..500 {
            let now_ms = (anchor - 7200 + step * 173) * 1000 + step * 37;
            let pos = compute_cycle_position(now_ms, &durations).unwrap();
            assert!(pos.index < durations.len());
            assert!(pos.offset_ms >= 0);
            assert!(pos.offset_ms < effective[pos.index]);
            assert_eq!(pos.offset_ms + starts[pos.index], pos.cycle_pos_ms);
            assert!(pos.cycle_pos_ms < total);
        }
    }

    #[test]
    fn zero_cycle_yields_none() {
        assert!(compute_cycle_position(1_000_000, &[]).is_none());
    }

    #[test]
    fn signed_delta_wraps_shortest_arc() {
        assert_eq!(signed_cycle_delta_ms(100, 59_900, 60_000), 200);
        assert_eq!(signed_cycle_delta_ms(59_900, 100, 60_000), -200);
        assert_eq!(signed_cycle_delta_ms(100, 100, 60_000), 0);
    }

    #[test]
    fn signed_delta_range_and_congruence() {
        let cycle = 60_000;
        for target in [0, 13, 29_999, 30_000, 30_001, 59_999] {
            for current in [0, 7, 29_999, 30_000, 45_123, 59_999] {
                let delta = signed_cycle_delta_ms(target, current, cycle);
                assert!(delta > -cycle / 2 && delta <= cycle / 2, "delta {delta}");
                assert_eq!((current + delta).rem_euclid(cycle), target % cycle);
            }
        }
    }

    #[test]
    fn drift_classification_partitions() {
        assert_eq!(classify_drift_action(100, 300, 1200), DriftAction::None);
        assert_eq!(classify_drift_action(350, 300, 1200), DriftAction::SoftResync);
        assert_eq!(
            classify_drift_action(-1200, 300, 1200),
            DriftAction::HardResync
        );
        assert_eq!(classify_drift_action(-299, 300, 1200), DriftAction::None);
        assert_eq!(classify_drift_action(1199, 300, 1200), DriftAction::SoftResync);
    }

    #[test]
    fn misconfigured_hard_threshold_is_raised() {
        // hard < soft: everything at or past soft goes hard.
        assert_eq!(classify_drift_action(350, 300, 100), DriftAction::HardResync);
        assert_eq!(classify_drift_action(200, 300, 100), DriftAction::None);
    }

    #[test]
    fn next_hour_checkpoint_rounds_up() {
        assert_eq!(
            next_hour_checkpoint_ts(ts(2026, 2, 8, 10, 15, 1), 3600),
            ts(2026, 2, 8, 11, 0, 0)
        );
        assert_eq!(
            next_hour_checkpoint_ts(ts(2026, 2, 8, 11, 0, 0), 3600),
            ts(2026, 2, 8, 12, 0, 0)
        );
    }
}
