//! Live status registry and the status-file writer worker.
//!
//! Every worker reports observations here; observers (the status file, the
//! telemetry collaborator, the config UI) read whole snapshots. The
//! registry never blocks on I/O: the writer worker serializes a snapshot
//! outside the lock.

use std::path::PathBuf;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::SharedConfig;
use crate::models::{DriftAction, MediaItem, PlaybackState};
use crate::utils::{atomic_write_json, iso_now, sleep_unless_cancelled};

/// Status projection of a playlist slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemStatus {
    pub url: String,
    pub path: PathBuf,
    pub duration_ms: i64,
    pub campaign_id: String,
    pub campaign_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
}

impl ItemStatus {
    pub fn from_item(item: &MediaItem, started_at: Option<String>) -> Self {
        Self {
            url: item.url.clone(),
            path: item.path.clone(),
            duration_ms: item.duration_ms,
            campaign_id: item.campaign_id.clone(),
            campaign_name: item.campaign_name.clone(),
            started_at,
        }
    }
}

/// Result of the most recent drift checkpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStatus {
    pub checked_at: String,
    pub trigger: String,
    pub delta_ms: i64,
    pub action: DriftAction,
}

/// One full observation of the agent, as serialized to the status file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub started_at: String,
    pub playback_state: PlaybackState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub playback_reason: Option<String>,
    pub last_poll_success: Option<String>,
    pub last_poll_error: Option<String>,
    pub playlist_size: Option<usize>,
    pub current_index: Option<usize>,
    pub current_item: Option<ItemStatus>,
    pub next_item: Option<ItemStatus>,
    pub player_running: Option<bool>,
    pub player_last_ok: Option<String>,
    pub last_cleanup: Option<String>,
    pub last_cleanup_removed: Option<usize>,
    pub consecutive_failures: u32,
    pub sync: Option<SyncStatus>,
}

impl StatusSnapshot {
    fn new() -> Self {
        Self {
            started_at: iso_now(),
            playback_state: PlaybackState::Starting,
            playback_reason: None,
            last_poll_success: None,
            last_poll_error: None,
            playlist_size: None,
            current_index: None,
            current_item: None,
            next_item: None,
            player_running: None,
            player_last_ok: None,
            last_cleanup: None,
            last_cleanup_removed: None,
            consecutive_failures: 0,
            sync: None,
        }
    }
}

/// Document shape of the status file: the snapshot plus process uptime.
#[derive(Debug, Serialize)]
struct StatusDocument<'a> {
    #[serde(flatten)]
    snapshot: &'a StatusSnapshot,
    uptime_sec: u64,
}

/// Thread-safe registry of the agent's live status.
#[derive(Debug)]
pub struct StatusRegistry {
    data: Mutex<StatusSnapshot>,
    start: Instant,
}

impl Default for StatusRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusRegistry {
    pub fn new() -> Self {
        Self {
            data: Mutex::new(StatusSnapshot::new()),
            start: Instant::now(),
        }
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        self.lock().clone()
    }

    pub fn update<F: FnOnce(&mut StatusSnapshot)>(&self, mutate: F) {
        mutate(&mut self.lock());
    }

    pub fn set_playback_state(&self, state: PlaybackState, reason: Option<&str>) {
        self.update(|s| {
            s.playback_state = state;
            s.playback_reason = reason.map(str::to_string);
        });
    }

    pub fn uptime_sec(&self) -> u64 {
        self.start.elapsed().as_secs()
    }

    /// Paths currently occupying the playback slots, for keep-set math.
    pub fn slot_paths(&self) -> Vec<PathBuf> {
        let data = self.lock();
        data.current_item
            .iter()
            .chain(data.next_item.iter())
            .map(|item| item.path.clone())
            .collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, StatusSnapshot> {
        self.data
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Periodically dump the registry to `status_file`, when configured.
pub async fn run_status_writer(
    config: SharedConfig,
    status: std::sync::Arc<StatusRegistry>,
    cancel: CancellationToken,
) {
    let Some(path) = config.snapshot().status_file else {
        debug!("status writer disabled (no status_file configured)");
        return;
    };

    loop {
        if cancel.is_cancelled() {
            return;
        }
        let snapshot = status.snapshot();
        let document = StatusDocument {
            snapshot: &snapshot,
            uptime_sec: status.uptime_sec(),
        };
        if let Err(e) = atomic_write_json(&path, &document).await {
            warn!("Status write failed: {e}");
        }

        let interval = config.snapshot().status_interval_sec.max(1);
        if sleep_unless_cancelled(&cancel, Duration::from_secs(interval)).await {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn slot_paths_cover_current_and_next() {
        let registry = StatusRegistry::new();
        let item = MediaItem {
            url: "u".into(),
            duration_ms: 5000,
            path: PathBuf::from("/cache/a.mp4"),
            campaign_id: String::new(),
            campaign_name: String::new(),
        };
        registry.update(|s| {
            s.current_item = Some(ItemStatus::from_item(&item, Some(iso_now())));
            s.next_item = Some(ItemStatus::from_item(
                &MediaItem {
                    path: PathBuf::from("/cache/b.mp4"),
                    ..item.clone()
                },
                None,
            ));
        });
        let paths = registry.slot_paths();
        assert!(paths.contains(&Path::new("/cache/a.mp4").to_path_buf()));
        assert!(paths.contains(&Path::new("/cache/b.mp4").to_path_buf()));
    }

    #[test]
    fn playback_state_serializes_snake_case() {
        let registry = StatusRegistry::new();
        registry.set_playback_state(
            PlaybackState::WaitingForMedia,
            Some("all_media_temporarily_blocked"),
        );
        let body = serde_json::to_string(&registry.snapshot()).unwrap();
        assert!(body.contains("\"waiting_for_media\""));
        assert!(body.contains("all_media_temporarily_blocked"));
    }
}
