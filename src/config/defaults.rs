/// Configuration default values
///
/// This module contains all the default values for configuration options,
/// making them easily changeable in one central location.
// Remote API defaults
pub const DEFAULT_API_URL: &str =
    "https://us-central1-habitat-19883.cloudfunctions.net/api/search";
pub const DEFAULT_SEARCH_IN: &str = "campaign";
pub const DEFAULT_CAMPAIGN_LIMIT: u32 = 20;
pub const DEFAULT_POLL_INTERVAL_SEC: u64 = 1800;
pub const DEFAULT_REQUEST_TIMEOUT_SEC: u64 = 15;
pub const DEFAULT_DURATION_MS: i64 = 10_000;

// Storage defaults
pub const DEFAULT_CACHE_DIR: &str = "./media_cache";
pub const DEFAULT_STATE_DIR: &str = "./state";
pub const DEFAULT_TMP_MAX_AGE_SEC: u64 = 3600;
pub const DEFAULT_CLEANUP_INTERVAL_SEC: u64 = 1800;

// Player defaults
pub const DEFAULT_PLAYER_PATH: &str = "mpv";
pub const DEFAULT_HWDEC: &str = "auto";
pub const DEFAULT_MEDIA_LOAD_RETRY_COOLDOWN_SEC: u64 = 60;
/// Floor for the per-path load-failure cooldown.
pub const MIN_MEDIA_LOAD_RETRY_COOLDOWN_SEC: u64 = 5;

// Watchdog defaults
pub const DEFAULT_WATCHDOG_INTERVAL_SEC: u64 = 10;
pub const DEFAULT_PLAYBACK_STALL_SEC: u64 = 30;
pub const DEFAULT_PLAYBACK_MISMATCH_SEC: u64 = 20;

// Synchronization defaults
pub const DEFAULT_SYNC_DRIFT_THRESHOLD_MS: i64 = 300;
pub const DEFAULT_SYNC_HARD_RESYNC_MS: i64 = 1200;
pub const DEFAULT_SYNC_CHECKPOINT_INTERVAL_SEC: u64 = 3600;
pub const DEFAULT_SYNC_BOOT_HARD_CHECK_SEC: u64 = 300;
pub const DEFAULT_SYNC_PREP_MODE: &str = "play_then_resync";

// Status defaults
pub const DEFAULT_STATUS_INTERVAL_SEC: u64 = 5;

/// Platform default for the player IPC endpoint.
pub fn default_ipc_path() -> std::path::PathBuf {
    if cfg!(windows) {
        std::path::PathBuf::from(r"\\.\pipe\mpv-kiosk")
    } else {
        std::env::temp_dir().join("mpv-kiosk.sock")
    }
}
