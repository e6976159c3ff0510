//! Agent configuration.
//!
//! Loaded with figment from a TOML file plus `SIGNAGE_AGENT_`-prefixed
//! environment overrides. Relative paths in the file are resolved against
//! the config file's directory so a deployment can be moved wholesale.

use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use anyhow::Result;
use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use serde::{Deserialize, Serialize};

pub mod defaults;

use defaults::*;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // Remote API
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub environment_id: String,
    #[serde(default = "default_true")]
    pub only_standby: bool,
    #[serde(default = "default_search_in")]
    pub search_in: String,
    #[serde(default = "default_true")]
    pub include_descendants: bool,
    #[serde(default = "default_campaign_limit")]
    pub limit: u32,

    // Polling
    #[serde(default = "default_poll_interval_sec")]
    pub poll_interval_sec: u64,
    #[serde(default = "default_request_timeout_sec")]
    pub request_timeout_sec: u64,
    #[serde(default = "default_duration_ms")]
    pub default_duration_ms: i64,
    #[serde(default)]
    pub allow_empty_playlist_from_api: bool,
    #[serde(default)]
    pub require_full_download_before_switch: bool,

    // Storage
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,
    #[serde(default)]
    pub cache_max_files: Option<usize>,
    #[serde(default)]
    pub cache_max_bytes: Option<u64>,
    #[serde(default = "default_tmp_max_age_sec")]
    pub tmp_max_age_sec: u64,
    #[serde(default = "default_cleanup_interval_sec")]
    pub cleanup_interval_sec: u64,
    #[serde(default)]
    pub disable_cleanup_when_offline: bool,

    // Offline fallback
    #[serde(default = "default_true")]
    pub offline_fallback: bool,
    /// Zero disables the age limit.
    #[serde(default)]
    pub offline_max_age_hours: u64,
    #[serde(default = "default_true")]
    pub offline_ignore_max_age_when_no_network: bool,

    // Player
    #[serde(default = "default_player_path")]
    pub player_path: String,
    #[serde(default = "defaults::default_ipc_path")]
    pub ipc_path: PathBuf,
    #[serde(default)]
    pub rotation_deg: u32,
    #[serde(default)]
    pub mute: bool,
    #[serde(default = "default_hwdec")]
    pub hwdec: String,
    #[serde(default)]
    pub low_resource_mode: bool,
    #[serde(default = "default_true")]
    pub lock_input: bool,

    // Playback
    #[serde(default = "default_true")]
    pub preload_next: bool,
    #[serde(default = "default_media_load_retry_cooldown_sec")]
    pub media_load_retry_cooldown_sec: u64,

    // Synchronization
    #[serde(default = "default_true")]
    pub sync_enabled: bool,
    #[serde(default = "default_sync_drift_threshold_ms")]
    pub sync_drift_threshold_ms: i64,
    #[serde(default = "default_sync_hard_resync_ms")]
    pub sync_hard_resync_ms: i64,
    #[serde(default = "default_sync_checkpoint_interval_sec")]
    pub sync_checkpoint_interval_sec: u64,
    #[serde(default = "default_sync_boot_hard_check_sec")]
    pub sync_boot_hard_check_sec: u64,
    #[serde(default = "default_sync_prep_mode")]
    pub sync_prep_mode: String,
    #[serde(default)]
    pub sync_ntp_command: String,

    // Watchdog
    #[serde(default = "default_watchdog_interval_sec")]
    pub watchdog_interval_sec: u64,
    #[serde(default = "default_playback_stall_sec")]
    pub playback_stall_sec: u64,
    #[serde(default = "default_playback_mismatch_sec")]
    pub playback_mismatch_sec: u64,

    // Status reporting
    #[serde(default)]
    pub status_file: Option<PathBuf>,
    #[serde(default = "default_status_interval_sec")]
    pub status_interval_sec: u64,

    // Consumed by the logging collaborator, resolved here so relative
    // paths behave like every other path key.
    #[serde(default)]
    pub log_file: Option<PathBuf>,
}

fn default_true() -> bool {
    true
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

fn default_search_in() -> String {
    DEFAULT_SEARCH_IN.to_string()
}

fn default_campaign_limit() -> u32 {
    DEFAULT_CAMPAIGN_LIMIT
}

fn default_poll_interval_sec() -> u64 {
    DEFAULT_POLL_INTERVAL_SEC
}

fn default_request_timeout_sec() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SEC
}

fn default_duration_ms() -> i64 {
    DEFAULT_DURATION_MS
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from(DEFAULT_CACHE_DIR)
}

fn default_state_dir() -> PathBuf {
    PathBuf::from(DEFAULT_STATE_DIR)
}

fn default_tmp_max_age_sec() -> u64 {
    DEFAULT_TMP_MAX_AGE_SEC
}

fn default_cleanup_interval_sec() -> u64 {
    DEFAULT_CLEANUP_INTERVAL_SEC
}

fn default_player_path() -> String {
    DEFAULT_PLAYER_PATH.to_string()
}

fn default_hwdec() -> String {
    DEFAULT_HWDEC.to_string()
}

fn default_media_load_retry_cooldown_sec() -> u64 {
    DEFAULT_MEDIA_LOAD_RETRY_COOLDOWN_SEC
}

fn default_sync_drift_threshold_ms() -> i64 {
    DEFAULT_SYNC_DRIFT_THRESHOLD_MS
}

fn default_sync_hard_resync_ms() -> i64 {
    DEFAULT_SYNC_HARD_RESYNC_MS
}

fn default_sync_checkpoint_interval_sec() -> u64 {
    DEFAULT_SYNC_CHECKPOINT_INTERVAL_SEC
}

fn default_sync_boot_hard_check_sec() -> u64 {
    DEFAULT_SYNC_BOOT_HARD_CHECK_SEC
}

fn default_sync_prep_mode() -> String {
    DEFAULT_SYNC_PREP_MODE.to_string()
}

fn default_watchdog_interval_sec() -> u64 {
    DEFAULT_WATCHDOG_INTERVAL_SEC
}

fn default_playback_stall_sec() -> u64 {
    DEFAULT_PLAYBACK_STALL_SEC
}

fn default_playback_mismatch_sec() -> u64 {
    DEFAULT_PLAYBACK_MISMATCH_SEC
}

fn default_status_interval_sec() -> u64 {
    DEFAULT_STATUS_INTERVAL_SEC
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            api_key: String::new(),
            environment_id: String::new(),
            only_standby: true,
            search_in: default_search_in(),
            include_descendants: true,
            limit: default_campaign_limit(),
            poll_interval_sec: default_poll_interval_sec(),
            request_timeout_sec: default_request_timeout_sec(),
            default_duration_ms: default_duration_ms(),
            allow_empty_playlist_from_api: false,
            require_full_download_before_switch: false,
            cache_dir: default_cache_dir(),
            state_dir: default_state_dir(),
            cache_max_files: None,
            cache_max_bytes: None,
            tmp_max_age_sec: default_tmp_max_age_sec(),
            cleanup_interval_sec: default_cleanup_interval_sec(),
            disable_cleanup_when_offline: false,
            offline_fallback: true,
            offline_max_age_hours: 0,
            offline_ignore_max_age_when_no_network: true,
            player_path: default_player_path(),
            ipc_path: defaults::default_ipc_path(),
            rotation_deg: 0,
            mute: false,
            hwdec: default_hwdec(),
            low_resource_mode: false,
            lock_input: true,
            preload_next: true,
            media_load_retry_cooldown_sec: default_media_load_retry_cooldown_sec(),
            sync_enabled: true,
            sync_drift_threshold_ms: default_sync_drift_threshold_ms(),
            sync_hard_resync_ms: default_sync_hard_resync_ms(),
            sync_checkpoint_interval_sec: default_sync_checkpoint_interval_sec(),
            sync_boot_hard_check_sec: default_sync_boot_hard_check_sec(),
            sync_prep_mode: default_sync_prep_mode(),
            sync_ntp_command: String::new(),
            watchdog_interval_sec: default_watchdog_interval_sec(),
            playback_stall_sec: default_playback_stall_sec(),
            playback_mismatch_sec: default_playback_mismatch_sec(),
            status_file: None,
            status_interval_sec: default_status_interval_sec(),
            log_file: None,
        }
    }
}

impl Config {
    pub fn load_from_file(config_file: &Path) -> Result<Self> {
        let mut config: Config = if config_file.exists() {
            Figment::new()
                .merge(Toml::file(config_file))
                .merge(Env::prefixed("SIGNAGE_AGENT_"))
                .extract()?
        } else {
            tracing::warn!(
                "Config file '{}' not found, using default configuration values",
                config_file.display()
            );
            Figment::new()
                .merge(figment::providers::Serialized::defaults(Config::default()))
                .merge(Env::prefixed("SIGNAGE_AGENT_"))
                .extract()?
        };

        let base = config_file
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        config.resolve_relative_paths(&base);
        Ok(config)
    }

    /// Anchor relative path keys to the config file's directory.
    fn resolve_relative_paths(&mut self, base: &Path) {
        for path in [&mut self.cache_dir, &mut self.state_dir, &mut self.ipc_path] {
            resolve_one(path, base);
        }
        if let Some(path) = self.status_file.as_mut() {
            resolve_one(path, base);
        }
        if let Some(path) = self.log_file.as_mut() {
            resolve_one(path, base);
        }
    }

    /// Both credentials are required to talk to the campaign API.
    pub fn has_api_credentials(&self) -> bool {
        !self.api_key.is_empty() && !self.environment_id.is_empty()
    }

    /// Cooldown applied to a media path after repeated load failures.
    pub fn media_load_cooldown(&self) -> std::time::Duration {
        std::time::Duration::from_secs(
            self.media_load_retry_cooldown_sec
                .max(MIN_MEDIA_LOAD_RETRY_COOLDOWN_SEC),
        )
    }

    /// Host:port pair of the API endpoint, for the offline network probe.
    pub fn api_host_port(&self) -> Option<(String, u16)> {
        let parsed = url::Url::parse(&self.api_url).ok()?;
        let host = parsed.host_str()?.to_string();
        let port = parsed.port_or_known_default()?;
        Some((host, port))
    }
}

fn resolve_one(path: &mut PathBuf, base: &Path) {
    if path.is_relative() && !path.starts_with(r"\\.\pipe") {
        *path = base.join(&*path);
    }
}

/// Live configuration shared between workers.
///
/// Readers take a snapshot copy and never hold the lock across I/O.
#[derive(Debug, Clone)]
pub struct SharedConfig {
    inner: Arc<RwLock<Config>>,
}

impl SharedConfig {
    pub fn new(config: Config) -> Self {
        Self {
            inner: Arc::new(RwLock::new(config)),
        }
    }

    pub fn snapshot(&self) -> Config {
        self.inner
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn update<F: FnOnce(&mut Config)>(&self, mutate: F) {
        let mut guard = self
            .inner
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        mutate(&mut guard);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = Config::default();
        assert_eq!(cfg.poll_interval_sec, 1800);
        assert_eq!(cfg.default_duration_ms, 10_000);
        assert!(cfg.preload_next);
        assert!(cfg.sync_enabled);
        assert_eq!(cfg.sync_prep_mode, "play_then_resync");
        assert!(!cfg.has_api_credentials());
    }

    #[test]
    fn relative_paths_resolve_against_config_dir() {
        let dir = tempfile::tempdir().unwrap();
        let cfg_path = dir.path().join("config.toml");
        std::fs::write(
            &cfg_path,
            r#"
api_key = "k"
environment_id = "e"
cache_dir = "./cache"
state_dir = "./state"
status_file = "./logs/status.json"
ipc_path = "./runtime/mpv.sock"
"#,
        )
        .unwrap();

        let cfg = Config::load_from_file(&cfg_path).unwrap();
        assert_eq!(cfg.cache_dir, dir.path().join("./cache"));
        assert_eq!(cfg.state_dir, dir.path().join("./state"));
        assert_eq!(
            cfg.status_file.as_deref(),
            Some(dir.path().join("./logs/status.json").as_path())
        );
        assert_eq!(cfg.ipc_path, dir.path().join("./runtime/mpv.sock"));
        assert!(cfg.has_api_credentials());
    }

    #[test]
    fn cooldown_is_clamped() {
        let mut cfg = Config::default();
        cfg.media_load_retry_cooldown_sec = 1;
        assert_eq!(cfg.media_load_cooldown().as_secs(), 5);
    }

    #[test]
    fn api_host_port_uses_known_default() {
        let cfg = Config::default();
        let (host, port) = cfg.api_host_port().unwrap();
        assert_eq!(host, "us-central1-habitat-19883.cloudfunctions.net");
        assert_eq!(port, 443);
    }
}
