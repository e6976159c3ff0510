//! Player liveness watchdog.
//!
//! Three probes per tick: process/IPC liveness (`ensure_running` + ping),
//! a path-mismatch check (the player must be showing one of the two
//! scheduled slots), and a stall check (`time-pos` must advance on video
//! items). Any sustained failure restarts the player; the scheduler
//! notices the generation bump and reloads.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::SharedConfig;
use crate::models::MediaKind;
use crate::player::PlayerHandle;
use crate::status::StatusRegistry;
use crate::utils::fs::normalize_for_compare;
use crate::utils::{iso_now, sleep_unless_cancelled};

const PROPERTY_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Default)]
struct ProbeState {
    mismatch_since: Option<Instant>,
    stall: Option<(f64, Instant)>,
}

impl ProbeState {
    fn reset(&mut self) {
        self.mismatch_since = None;
        self.stall = None;
    }
}

pub async fn run_watchdog(
    config: SharedConfig,
    player: Arc<dyn PlayerHandle>,
    status: Arc<StatusRegistry>,
    cancel: CancellationToken,
) {
    let mut probes = ProbeState::default();
    loop {
        if cancel.is_cancelled() {
            return;
        }
        let cfg = config.snapshot();

        player.ensure_running().await;
        if !player.ping().await {
            warn!("Player IPC unresponsive, restarting");
            player.restart().await;
            probes.reset();
        } else if let Some(reason) = check_probes(&cfg, player.as_ref(), &status, &mut probes).await
        {
            warn!("Watchdog restarting player: {reason}");
            player.restart().await;
            probes.reset();
        }

        let running = player.is_running().await;
        status.update(|s| {
            s.player_running = Some(running);
            s.player_last_ok = Some(iso_now());
        });

        if sleep_unless_cancelled(
            &cancel,
            Duration::from_secs(cfg.watchdog_interval_sec.max(1)),
        )
        .await
        {
            return;
        }
    }
}

/// Mismatch and stall probes; returns a restart reason when one trips.
async fn check_probes(
    cfg: &crate::config::Config,
    player: &dyn PlayerHandle,
    status: &StatusRegistry,
    probes: &mut ProbeState,
) -> Option<&'static str> {
    let snapshot = status.snapshot();
    let Some(current) = snapshot.current_item.as_ref() else {
        // Nothing scheduled; the idle player is fine.
        probes.reset();
        return None;
    };

    // Path mismatch: whatever the player reports must be one of the slots.
    if let Some(Value::String(playing)) = player.get_property("path", PROPERTY_TIMEOUT).await {
        let playing = normalize_for_compare(&PathBuf::from(&playing));
        let expected_match = snapshot
            .current_item
            .iter()
            .chain(snapshot.next_item.iter())
            .any(|slot| normalize_for_compare(&slot.path) == playing);
        if expected_match {
            probes.mismatch_since = None;
        } else {
            let since = *probes.mismatch_since.get_or_insert_with(Instant::now);
            debug!(
                "Player path {} does not match scheduled slots",
                playing.display()
            );
            if since.elapsed() >= Duration::from_secs(cfg.playback_mismatch_sec.max(1)) {
                return Some("sustained path mismatch");
            }
        }
    }

    // Stall: time position must advance, except for images.
    if MediaKind::from_path(&current.path).is_image() {
        probes.stall = None;
        return None;
    }
    match player
        .get_property("time-pos", PROPERTY_TIMEOUT)
        .await
        .as_ref()
        .and_then(Value::as_f64)
    {
        Some(position) => match probes.stall {
            Some((last, since)) if (position - last).abs() < f64::EPSILON => {
                if since.elapsed() >= Duration::from_secs(cfg.playback_stall_sec.max(1)) {
                    return Some("playback stalled");
                }
            }
            _ => probes.stall = Some((position, Instant::now())),
        },
        None => probes.stall = None,
    }
    None
}
