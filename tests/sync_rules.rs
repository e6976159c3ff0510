//! Fleet-synchronization rules, pinned to concrete wall-clock examples so
//! every kiosk in a fleet agrees on them.

use chrono::{TimeZone, Utc};

use signage_agent::models::DriftAction;
use signage_agent::sync::{
    classify_drift_action, compute_cycle_position, daily_anchor_ts, is_prep_window,
    next_hour_checkpoint_ts, signed_cycle_delta_ms,
};

fn ts(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> i64 {
    Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap().timestamp()
}

#[test]
fn daily_anchor_before_0005_uses_previous_day() {
    assert_eq!(
        daily_anchor_ts(ts(2026, 2, 8, 0, 2, 0)),
        ts(2026, 2, 7, 0, 5, 0)
    );
}

#[test]
fn daily_anchor_after_0005_uses_current_day() {
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
}

#[test]
fn cycle_position_resolves_index_and_offset() {
    let anchor = ts(2026, 2, 8, 0, 5, 0);
    let pos = compute_cycle_position((anchor + 25) * 1000, &[10_000, 20_000, 30_000]).unwrap();
    assert_eq!(pos.index, 1);
    assert_eq!(pos.offset_ms, 15_000);
    assert_eq!(pos.cycle_total_ms, 60_000);
}

#[test]
fn signed_cycle_delta_wraparound() {
    assert_eq!(signed_cycle_delta_ms(100, 59_900, 60_000), 200);
}

#[test]
fn classify_drift_action_partitions() {
    assert_eq!(classify_drift_action(100, 300, 1200), DriftAction::None);
    assert_eq!(classify_drift_action(350, 300, 1200), DriftAction::SoftResync);
    assert_eq!(
        classify_drift_action(-1200, 300, 1200),
        DriftAction::HardResync
    );
}

#[test]
fn next_hour_checkpoint_rounds_up() {
    assert_eq!(
        next_hour_checkpoint_ts(ts(2026, 2, 8, 10, 15, 1), 3600),
        ts(2026, 2, 8, 11, 0, 0)
    );
}

#[test]
fn cycle_position_bounds_hold_for_arbitrary_instants() {
    let durations = [10_000, 20_000, 30_000];
    let anchor = ts(2026, 2, 8, 0, 5, 0);
    for offset_sec in [-3600, -1, 0, 1, 59, 60, 61, 3599, 86_399, 86_401] {
        let pos = compute_cycle_position((anchor + offset_sec) * 1000, &durations).unwrap();
        assert!(pos.index < durations.len());
        assert!(pos.offset_ms >= 0 && pos.offset_ms < durations[pos.index]);
        assert!(pos.cycle_pos_ms >= 0 && pos.cycle_pos_ms < pos.cycle_total_ms);
    }
}
