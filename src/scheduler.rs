//! Playback scheduler: drives the player over the live playlist, keeping
//! every kiosk phase-locked to the fleet-wide UTC cycle.
//!
//! The outer loop picks an item (from UTC when sync is enabled, else
//! sequentially), loads it, optionally preloads the next one, then waits
//! out the item's remaining duration in short polls so stop requests and
//! drift triggers are observed promptly. Hard drift breaks the wait
//! mid-file; soft drift is applied on natural completion.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{Config, SharedConfig};
use crate::models::{
    CyclePosition, DriftAction, MediaItem, MediaKind, PlaybackState, effective_duration_ms,
};
use crate::player::PlayerHandle;
use crate::playlist::PlaylistStore;
use crate::status::{ItemStatus, StatusRegistry, SyncStatus};
use crate::sync::{
    classify_drift_action, compute_cycle_position, cycle_timeline, is_prep_window,
    next_daily_anchor_ts, next_hour_checkpoint_ts, signed_cycle_delta_ms,
};
use crate::utils::{iso_now, sleep_unless_cancelled};

/// Inner wait granularity; also bounds how late a stop is observed.
const POLL_STEP: Duration = Duration::from_millis(200);
/// Idle pause when there is nothing playable.
const IDLE_SLEEP: Duration = Duration::from_secs(1);
/// Minimum offset worth seeking into a video after a jump.
const SEEK_MIN_OFFSET_MS: i64 = 1000;
const NTP_NUDGE_TIMEOUT: Duration = Duration::from_secs(10);

/// Why the inner wait ended.
enum WaitOutcome {
    Completed,
    HardJump(CyclePosition),
    DailyZero,
    Cancelled,
}

pub struct Scheduler {
    config: SharedConfig,
    playlist: Arc<PlaylistStore>,
    status: Arc<StatusRegistry>,
    player: Arc<dyn PlayerHandle>,
    cancel: CancellationToken,
}

impl Scheduler {
    pub fn new(
        config: SharedConfig,
        playlist: Arc<PlaylistStore>,
        status: Arc<StatusRegistry>,
        player: Arc<dyn PlayerHandle>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            playlist,
            status,
            player,
            cancel,
        }
    }

    /// Infinite playback loop; returns only on cancellation.
    pub async fn run(self) {
        let cfg = self.config.snapshot();

        // PREP handling decides how we enter the steady-state loop.
        let mut forced: Option<(usize, i64)> = None;
        let mut daily_zero_ts: Option<i64> = None;
        let mut daily_zero_applied = false;

        if cfg.sync_enabled && is_prep_window(Utc::now().timestamp()) {
            run_ntp_nudge(&cfg).await;
            if is_wait_prep_mode(&cfg.sync_prep_mode) {
                if self.wait_for_anchor().await {
                    return;
                }
                forced = Some((0, 0));
                daily_zero_applied = true;
            } else {
                let anchor = next_daily_anchor_ts(Utc::now().timestamp());
                info!("Booted in PREP window, daily zero pending at ts {anchor}");
                daily_zero_ts = Some(anchor);
            }
        }

        let mut boot_check_at = cfg
            .sync_enabled
            .then(|| Instant::now() + Duration::from_secs(cfg.sync_boot_hard_check_sec.max(1)));
        let mut next_checkpoint_ts =
            next_hour_checkpoint_ts(Utc::now().timestamp(), cfg.sync_checkpoint_interval_sec);

        let mut last_version: Option<u64> = None;
        let mut last_generation = self.player.generation();
        let mut preloaded: Option<PathBuf> = None;
        let mut pending_soft = false;
        let mut manual_index: usize = 0;
        let mut blacklist: HashMap<PathBuf, Instant> = HashMap::new();

        loop {
            if self.cancel.is_cancelled() {
                return;
            }
            let cfg = self.config.snapshot();
            let (items, version) = self.playlist.get();

            if last_version != Some(version) {
                debug!("Playlist version {version} observed");
                last_version = Some(version);
                preloaded = None;
                pending_soft = false;
                manual_index = 0;
            }

            if items.is_empty() {
                self.status
                    .set_playback_state(PlaybackState::WaitingForMedia, Some("playlist_empty"));
                if sleep_unless_cancelled(&self.cancel, IDLE_SLEEP).await {
                    return;
                }
                continue;
            }

            let durations: Vec<i64> = items
                .iter()
                .map(|item| coerced_duration(item, &cfg))
                .collect();
            let (starts, total) = cycle_timeline(&durations);
            if total <= 0 {
                self.status
                    .set_playback_state(PlaybackState::WaitingForMedia, Some("invalid_timeline"));
                if sleep_unless_cancelled(&self.cancel, IDLE_SLEEP).await {
                    return;
                }
                continue;
            }

            // Pick the slot for this iteration.
            let (mut index, mut offset_ms) = if let Some((fidx, foffset)) = forced.take() {
                (fidx.min(items.len() - 1), foffset)
            } else if cfg.sync_enabled {
                match compute_cycle_position(Utc::now().timestamp_millis(), &durations) {
                    Some(pos) => (pos.index, pos.offset_ms),
                    None => (0, 0),
                }
            } else {
                (manual_index % items.len(), 0)
            };

            // Skip paths still cooling down after load failures.
            let now = Instant::now();
            blacklist.retain(|_, expiry| *expiry > now);
            match next_eligible_index(&items, &blacklist, index, now) {
                Some(eligible) => {
                    if eligible != index {
                        index = eligible;
                        offset_ms = 0;
                    }
                }
                None => {
                    self.status.set_playback_state(
                        PlaybackState::WaitingForMedia,
                        Some("all_media_temporarily_blocked"),
                    );
                    if sleep_unless_cancelled(&self.cancel, IDLE_SLEEP).await {
                        return;
                    }
                    continue;
                }
            }
            offset_ms = offset_ms.clamp(0, durations[index] - 1);

            let item = items[index].clone();
            let next_item = (cfg.preload_next && items.len() > 1)
                .then(|| items[(index + 1) % items.len()].clone());

            self.player.ensure_running().await;
            let generation = self.player.generation();
            if generation != last_generation {
                debug!("Player generation bump {last_generation} -> {generation}");
                last_generation = generation;
                preloaded = None;
            }

            if preloaded.as_deref() != Some(item.path.as_path()) {
                if !self.load_with_recovery(&item).await {
                    let expiry = Instant::now() + cfg.media_load_cooldown();
                    warn!(
                        "Blacklisting {} for {:?} after repeated load failures",
                        item.path.display(),
                        cfg.media_load_cooldown()
                    );
                    blacklist.insert(item.path.clone(), expiry);
                    manual_index = index + 1;
                    if sleep_unless_cancelled(&self.cancel, IDLE_SLEEP).await {
                        return;
                    }
                    continue;
                }
                if offset_ms >= SEEK_MIN_OFFSET_MS
                    && MediaKind::from_path(&item.path) == MediaKind::Video
                {
                    self.player
                        .seek_absolute(offset_ms as f64 / 1000.0)
                        .await;
                }
            }
            preloaded = None;
            blacklist.remove(&item.path);

            if let Some(next) = &next_item {
                self.player.append_file(&next.path).await;
            }

            self.status.update(|s| {
                s.playback_state = PlaybackState::Playing;
                s.playback_reason = None;
                s.current_index = Some(index);
                s.current_item = Some(ItemStatus::from_item(&item, Some(iso_now())));
                s.next_item = next_item
                    .as_ref()
                    .map(|next| ItemStatus::from_item(next, None));
            });
            info!("Playing {} ({} ms)", item.url, durations[index]);

            let outcome = self
                .wait_out_item(
                    &cfg,
                    &starts,
                    total,
                    index,
                    offset_ms,
                    &mut boot_check_at,
                    &mut next_checkpoint_ts,
                    &mut daily_zero_ts,
                    &mut daily_zero_applied,
                    &mut pending_soft,
                    durations[index] - offset_ms,
                )
                .await;

            match outcome {
                WaitOutcome::Cancelled => return,
                WaitOutcome::HardJump(pos) => {
                    forced = Some((pos.index, pos.offset_ms));
                    continue;
                }
                WaitOutcome::DailyZero => {
                    forced = Some((0, 0));
                    continue;
                }
                WaitOutcome::Completed => {}
            }

            if pending_soft {
                pending_soft = false;
                if let Some(pos) =
                    compute_cycle_position(Utc::now().timestamp_millis(), &durations)
                {
                    info!(
                        "Applying queued soft resync to index {} offset {} ms",
                        pos.index, pos.offset_ms
                    );
                    forced = Some((pos.index, pos.offset_ms));
                    continue;
                }
            }

            if let Some(next) = &next_item
                && self.player.playlist_next().await
            {
                self.player.playlist_remove(0).await;
                preloaded = Some(next.path.clone());
            }
            manual_index = index + 1;
        }
    }

    /// Load an item, restarting the player once on failure.
    async fn load_with_recovery(&self, item: &MediaItem) -> bool {
        if self.player.load_file(&item.path).await {
            return true;
        }
        warn!("Failed to load media, restarting player");
        self.status
            .set_playback_state(PlaybackState::Recovering, Some("media_load_failed"));
        self.player.restart().await;
        self.player.load_file(&item.path).await
    }

    /// Block until the next daily anchor; `true` means cancelled.
    async fn wait_for_anchor(&self) -> bool {
        let anchor = next_daily_anchor_ts(Utc::now().timestamp());
        self.status
            .set_playback_state(PlaybackState::WaitingSyncAnchor, Some("prep_window"));
        info!("Holding playback until daily anchor (ts {anchor})");
        while Utc::now().timestamp() < anchor {
            if sleep_unless_cancelled(&self.cancel, POLL_STEP).await {
                return true;
            }
        }
        false
    }

    /// Wait out the current item, evaluating drift triggers on the way.
    #[allow(clippy::too_many_arguments)]
    async fn wait_out_item(
        &self,
        cfg: &Config,
        starts: &[i64],
        cycle_total_ms: i64,
        index: usize,
        offset_ms: i64,
        boot_check_at: &mut Option<Instant>,
        next_checkpoint_ts: &mut i64,
        daily_zero_ts: &mut Option<i64>,
        daily_zero_applied: &mut bool,
        pending_soft: &mut bool,
        remaining_ms: i64,
    ) -> WaitOutcome {
        let item_started = Instant::now();
        let end = item_started + Duration::from_millis(remaining_ms.max(0) as u64);

        loop {
            if self.cancel.is_cancelled() {
                return WaitOutcome::Cancelled;
            }
            let now = Instant::now();
            if now >= end {
                return WaitOutcome::Completed;
            }

            if cfg.sync_enabled {
                let now_ts = Utc::now().timestamp();

                if let Some(zero_ts) = *daily_zero_ts
                    && !*daily_zero_applied
                    && now_ts >= zero_ts
                {
                    *daily_zero_ts = None;
                    *daily_zero_applied = true;
                    info!("Daily zero crossed, forcing cycle position (0, 0)");
                    self.record_sync(cfg, "daily_zero", starts, cycle_total_ms, index, offset_ms, item_started);
                    return WaitOutcome::DailyZero;
                }

                let mut trigger: Option<&'static str> = None;
                if let Some(at) = *boot_check_at
                    && now >= at
                {
                    *boot_check_at = None;
                    trigger = Some("boot");
                } else if now_ts >= *next_checkpoint_ts {
                    *next_checkpoint_ts =
                        next_hour_checkpoint_ts(now_ts, cfg.sync_checkpoint_interval_sec);
                    trigger = Some("checkpoint");
                }

                if let Some(trigger) = trigger {
                    let action = self.record_sync(
                        cfg,
                        trigger,
                        starts,
                        cycle_total_ms,
                        index,
                        offset_ms,
                        item_started,
                    );
                    match action {
                        DriftAction::HardResync => {
                            let durations = reconstruct_durations(starts, cycle_total_ms);
                            if let Some(pos) = compute_cycle_position(
                                Utc::now().timestamp_millis(),
                                &durations,
                            ) {
                                warn!(
                                    "Hard resync ({trigger}): jumping to index {} offset {} ms",
                                    pos.index, pos.offset_ms
                                );
                                return WaitOutcome::HardJump(pos);
                            }
                        }
                        DriftAction::SoftResync => {
                            debug!("Soft resync queued ({trigger})");
                            *pending_soft = true;
                        }
                        DriftAction::None => {}
                    }
                }
            }

            let step = POLL_STEP.min(end - now);
            if sleep_unless_cancelled(&self.cancel, step).await {
                return WaitOutcome::Cancelled;
            }
        }
    }

    /// Compute, classify and record drift for one trigger.
    fn record_sync(
        &self,
        cfg: &Config,
        trigger: &str,
        starts: &[i64],
        cycle_total_ms: i64,
        index: usize,
        offset_ms: i64,
        item_started: Instant,
    ) -> DriftAction {
        let elapsed_ms = item_started.elapsed().as_millis() as i64;
        let actual =
            (starts[index] + offset_ms + elapsed_ms).rem_euclid(cycle_total_ms);
        let now_ms = Utc::now().timestamp_millis();
        let anchor_ts = crate::sync::daily_anchor_ts(now_ms.div_euclid(1000));
        let target = (now_ms - anchor_ts * 1000).rem_euclid(cycle_total_ms);
        let delta = signed_cycle_delta_ms(target, actual, cycle_total_ms);
        let action =
            classify_drift_action(delta, cfg.sync_drift_threshold_ms, cfg.sync_hard_resync_ms);
        debug!(
            "Drift check ({trigger}): target {target} actual {actual} delta {delta} -> {}",
            action.as_str()
        );
        self.status.update(|s| {
            s.sync = Some(SyncStatus {
                checked_at: iso_now(),
                trigger: trigger.to_string(),
                delta_ms: delta,
                action,
            });
        });
        action
    }
}

fn is_wait_prep_mode(mode: &str) -> bool {
    matches!(mode, "wait" | "wait_until_anchor" | "hold_until_anchor")
}

/// Per-item scheduled duration: non-positive inputs take the configured
/// default, and everything is floored at one second.
fn coerced_duration(item: &MediaItem, cfg: &Config) -> i64 {
    if item.duration_ms <= 0 {
        effective_duration_ms(cfg.default_duration_ms)
    } else {
        effective_duration_ms(item.duration_ms)
    }
}

/// Recover the per-item durations from cumulative starts.
fn reconstruct_durations(starts: &[i64], total: i64) -> Vec<i64> {
    let mut durations = Vec::with_capacity(starts.len());
    for (i, start) in starts.iter().enumerate() {
        let end = starts.get(i + 1).copied().unwrap_or(total);
        durations.push(end - start);
    }
    durations
}

/// First index at or after `start` whose path is not cooling down.
///
/// Returns `None` when every item is blocked.
fn next_eligible_index(
    items: &[MediaItem],
    blacklist: &HashMap<PathBuf, Instant>,
    start: usize,
    now: Instant,
) -> Option<usize> {
    let len = items.len();
    for step in 0..len {
        let candidate = (start + step) % len;
        let blocked = blacklist
            .get(&items[candidate].path)
            .is_some_and(|expiry| *expiry > now);
        if !blocked {
            return Some(candidate);
        }
    }
    None
}

/// Best-effort clock nudge while inside the PREP window.
async fn run_ntp_nudge(cfg: &Config) {
    if cfg.sync_ntp_command.is_empty() {
        return;
    }
    info!("Running NTP nudge command");
    let mut command = if cfg!(windows) {
        let mut c = tokio::process::Command::new("cmd");
        c.arg("/C").arg(&cfg.sync_ntp_command);
        c
    } else {
        let mut c = tokio::process::Command::new("sh");
        c.arg("-c").arg(&cfg.sync_ntp_command);
        c
    };
    command
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null());
    match command.spawn() {
        Ok(mut child) => match tokio::time::timeout(NTP_NUDGE_TIMEOUT, child.wait()).await {
            Ok(Ok(status)) if status.success() => {}
            Ok(Ok(status)) => warn!("NTP nudge exited with {status}"),
            Ok(Err(e)) => warn!("NTP nudge failed: {e}"),
            Err(_) => {
                warn!("NTP nudge timed out");
                let _ = child.start_kill();
            }
        },
        Err(e) => warn!("NTP nudge could not start: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::Value;
    use std::collections::HashSet;
    use std::sync::Mutex as StdMutex;
    use std::sync::atomic::{AtomicU64, Ordering};

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Op {
        Load(PathBuf),
        Append(PathBuf),
        Next,
        Remove(usize),
        Restart,
    }

    /// Scripted stand-in for the player controller.
    struct FakePlayer {
        ops: StdMutex<Vec<Op>>,
        failing: StdMutex<HashSet<PathBuf>>,
        generation: AtomicU64,
    }

    impl FakePlayer {
        fn new() -> Self {
            Self {
                ops: StdMutex::new(Vec::new()),
                failing: StdMutex::new(HashSet::new()),
                generation: AtomicU64::new(1),
            }
        }

        fn fail_path(&self, path: &PathBuf) {
            self.failing.lock().unwrap().insert(path.clone());
        }

        fn ops(&self) -> Vec<Op> {
            self.ops.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl PlayerHandle for FakePlayer {
        async fn ensure_running(&self) -> bool {
            true
        }
        async fn is_running(&self) -> bool {
            true
        }
        async fn restart(&self) -> bool {
            self.ops.lock().unwrap().push(Op::Restart);
            self.generation.fetch_add(1, Ordering::SeqCst);
            true
        }
        fn generation(&self) -> u64 {
            self.generation.load(Ordering::SeqCst)
        }
        async fn load_file(&self, path: &std::path::Path) -> bool {
            self.ops.lock().unwrap().push(Op::Load(path.to_path_buf()));
            !self.failing.lock().unwrap().contains(path)
        }
        async fn append_file(&self, path: &std::path::Path) -> bool {
            self.ops
                .lock()
                .unwrap()
                .push(Op::Append(path.to_path_buf()));
            true
        }
        async fn playlist_next(&self) -> bool {
            self.ops.lock().unwrap().push(Op::Next);
            true
        }
        async fn playlist_remove(&self, index: usize) -> bool {
            self.ops.lock().unwrap().push(Op::Remove(index));
            true
        }
        async fn set_property(&self, _name: &str, _value: Value) -> bool {
            true
        }
        async fn seek_absolute(&self, _seconds: f64) -> bool {
            true
        }
        async fn ping(&self) -> bool {
            true
        }
        async fn get_property(&self, _name: &str, _timeout: Duration) -> Option<Value> {
            Some(Value::Null)
        }
    }

    fn item(path: &str, duration_ms: i64) -> MediaItem {
        MediaItem {
            url: format!("cache://{path}"),
            duration_ms,
            path: PathBuf::from(path),
            campaign_id: String::new(),
            campaign_name: String::new(),
        }
    }

    fn test_setup(
        items: Vec<MediaItem>,
        preload: bool,
    ) -> (SharedConfig, Arc<PlaylistStore>, Arc<StatusRegistry>) {
        let mut cfg = Config::default();
        cfg.sync_enabled = false;
        cfg.preload_next = preload;
        let playlist = Arc::new(PlaylistStore::new());
        if !items.is_empty() {
            playlist.update(items, "fp");
        }
        (
            SharedConfig::new(cfg),
            playlist,
            Arc::new(StatusRegistry::new()),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn failing_item_is_cooled_down_and_skipped() {
        let bad = item("/cache/bad.mp4", 1000);
        let good = item("/cache/good.mp4", 1000);
        let (config, playlist, status) = test_setup(vec![bad.clone(), good.clone()], false);

        let player = Arc::new(FakePlayer::new());
        player.fail_path(&bad.path);

        let cancel = CancellationToken::new();
        let scheduler = Scheduler::new(
            config,
            playlist,
            status.clone(),
            player.clone(),
            cancel.clone(),
        );
        let handle = tokio::spawn(scheduler.run());

        // Enough paused time for: bad fails twice, 1 s idle, good plays a
        // few rounds while bad stays on cooldown.
        tokio::time::sleep(Duration::from_secs(4)).await;
        cancel.cancel();
        let _ = handle.await;

        let ops = player.ops();
        // Two load attempts for the bad path (initial + post-restart),
        // with a restart between them.
        assert_eq!(ops[0], Op::Load(bad.path.clone()));
        assert_eq!(ops[1], Op::Restart);
        assert_eq!(ops[2], Op::Load(bad.path.clone()));
        // Then the scheduler advances past it.
        assert_eq!(ops[3], Op::Load(good.path.clone()));
        // While the cooldown runs (>= 5 s floor), bad is never retried.
        assert!(
            ops[3..]
                .iter()
                .all(|op| *op != Op::Load(bad.path.clone())),
            "bad path retried during cooldown: {ops:?}"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn cooled_down_item_becomes_eligible_again() {
        let bad = item("/cache/bad.mp4", 1000);
        let good = item("/cache/good.mp4", 1000);
        let mut cfg = Config::default();
        cfg.sync_enabled = false;
        cfg.preload_next = false;
        // Below the floor: the effective cooldown is the 5 s clamp.
        cfg.media_load_retry_cooldown_sec = 1;
        let playlist = Arc::new(PlaylistStore::new());
        playlist.update(vec![bad.clone(), good.clone()], "fp");
        let config = SharedConfig::new(cfg);
        let status = Arc::new(StatusRegistry::new());

        let player = Arc::new(FakePlayer::new());
        player.fail_path(&bad.path);

        let cancel = CancellationToken::new();
        let scheduler = Scheduler::new(config, playlist, status, player.clone(), cancel.clone());
        let handle = tokio::spawn(scheduler.run());

        // Past the 5 s cooldown floor: the bad path must be attempted again.
        tokio::time::sleep(Duration::from_secs(12)).await;
        cancel.cancel();
        let _ = handle.await;

        let ops = player.ops();
        let bad_loads = ops
            .iter()
            .filter(|op| **op == Op::Load(bad.path.clone()))
            .count();
        assert!(bad_loads >= 3, "expected re-attempt after cooldown: {ops:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn preload_advance_skips_redundant_load() {
        let a = item("/cache/a.mp4", 1000);
        let b = item("/cache/b.mp4", 1000);
        let (config, playlist, status) = test_setup(vec![a.clone(), b.clone()], true);

        let player = Arc::new(FakePlayer::new());
        let cancel = CancellationToken::new();
        let scheduler = Scheduler::new(config, playlist, status, player.clone(), cancel.clone());
        let handle = tokio::spawn(scheduler.run());

        tokio::time::sleep(Duration::from_millis(3500)).await;
        cancel.cancel();
        let _ = handle.await;

        let ops = player.ops();
        // First iteration: load a, append b, advance via playlist-next.
        assert_eq!(ops[0], Op::Load(a.path.clone()));
        assert_eq!(ops[1], Op::Append(b.path.clone()));
        assert_eq!(ops[2], Op::Next);
        assert_eq!(ops[3], Op::Remove(0));
        // Second iteration: b was preloaded, so no load; straight to the
        // append of the following item.
        assert_eq!(ops[4], Op::Append(a.path.clone()));
    }

    #[tokio::test(start_paused = true)]
    async fn empty_playlist_reports_waiting_for_media() {
        let (config, playlist, status) = test_setup(Vec::new(), false);
        let player = Arc::new(FakePlayer::new());
        let cancel = CancellationToken::new();
        let scheduler = Scheduler::new(
            config,
            playlist,
            status.clone(),
            player,
            cancel.clone(),
        );
        let handle = tokio::spawn(scheduler.run());

        tokio::time::sleep(Duration::from_millis(500)).await;
        let snapshot = status.snapshot();
        assert_eq!(snapshot.playback_state, PlaybackState::WaitingForMedia);
        assert_eq!(snapshot.playback_reason.as_deref(), Some("playlist_empty"));

        cancel.cancel();
        let _ = handle.await;
    }

    #[tokio::test(start_paused = true)]
    async fn all_blocked_reports_reason() {
        let a = item("/cache/a.mp4", 1000);
        let (config, playlist, status) = test_setup(vec![a.clone()], false);
        let player = Arc::new(FakePlayer::new());
        player.fail_path(&a.path);

        let cancel = CancellationToken::new();
        let scheduler = Scheduler::new(
            config,
            playlist,
            status.clone(),
            player,
            cancel.clone(),
        );
        let handle = tokio::spawn(scheduler.run());

        tokio::time::sleep(Duration::from_secs(3)).await;
        let snapshot = status.snapshot();
        assert_eq!(snapshot.playback_state, PlaybackState::WaitingForMedia);
        assert_eq!(
            snapshot.playback_reason.as_deref(),
            Some("all_media_temporarily_blocked")
        );

        cancel.cancel();
        let _ = handle.await;
    }

    #[test]
    fn duration_coercion_uses_default_for_non_positive() {
        let cfg = Config::default();
        assert_eq!(coerced_duration(&item("/a.mp4", -1), &cfg), 10_000);
        assert_eq!(coerced_duration(&item("/a.mp4", 0), &cfg), 10_000);
        assert_eq!(coerced_duration(&item("/a.mp4", 300), &cfg), 1000);
        assert_eq!(coerced_duration(&item("/a.mp4", 7000), &cfg), 7000);
    }

    #[test]
    fn prep_mode_classification() {
        assert!(is_wait_prep_mode("wait"));
        assert!(is_wait_prep_mode("wait_until_anchor"));
        assert!(is_wait_prep_mode("hold_until_anchor"));
        assert!(!is_wait_prep_mode("play_then_resync"));
        assert!(!is_wait_prep_mode(""));
    }

    #[test]
    fn durations_reconstruct_from_starts() {
        let durations = vec![1000, 2500, 600];
        let (starts, total) = cycle_timeline(&durations);
        assert_eq!(reconstruct_durations(&starts, total), durations);
    }
}
