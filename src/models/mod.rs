//! Core data model shared across the agent's workers.
//!
//! Everything here is a plain value: items are never mutated in place, the
//! playlist is replaced wholesale, and derived values like
//! [`CyclePosition`] are recomputed rather than updated.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::utils::fs::extension_lower;

/// Floor applied to item durations when building the playback timeline.
pub const MIN_EFFECTIVE_DURATION_MS: i64 = 1000;

/// Image extensions the player can display.
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp", "bmp"];

/// Video extensions the player can display.
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "m4v", "mov", "mkv", "webm", "avi", "mpeg", "mpg"];

/// A single playable asset resolved to a local file.
///
/// `url` is the remote source identifier, or a synthetic `cache://<name>`
/// for items reconstructed from the cache without a known origin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaItem {
    pub url: String,
    pub duration_ms: i64,
    pub path: PathBuf,
    pub campaign_id: String,
    pub campaign_name: String,
}

/// A campaign media record as flattened from the API, before download.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RawMediaItem {
    pub url: String,
    pub duration_ms: i64,
    pub campaign_id: String,
    pub campaign_name: String,
}

/// Coarse media classification derived from the file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Video,
    Other,
}

impl MediaKind {
    pub fn from_path(path: &Path) -> Self {
        match extension_lower(path).as_deref() {
            Some(ext) if IMAGE_EXTENSIONS.contains(&ext) => MediaKind::Image,
            Some(ext) if VIDEO_EXTENSIONS.contains(&ext) => MediaKind::Video,
            _ => MediaKind::Other,
        }
    }

    pub fn is_image(self) -> bool {
        matches!(self, MediaKind::Image)
    }
}

/// Whether a cache file name is playable.
///
/// `.bin` files are only playable when a real (non-synthetic) source URL is
/// known for them, since the extension alone says nothing about content.
pub fn is_supported_media(path: &Path, url: Option<&str>) -> bool {
    match extension_lower(path).as_deref() {
        Some(ext) if IMAGE_EXTENSIONS.contains(&ext) || VIDEO_EXTENSIONS.contains(&ext) => true,
        Some("bin") => url.is_some_and(|u| !u.is_empty() && !u.starts_with("cache://")),
        _ => false,
    }
}

/// Duration actually scheduled for an item.
pub fn effective_duration_ms(duration_ms: i64) -> i64 {
    duration_ms.max(MIN_EFFECTIVE_DURATION_MS)
}

/// Position within the playlist cycle derived from a wall-clock instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CyclePosition {
    /// Index of the active item.
    pub index: usize,
    /// Milliseconds into the active item.
    pub offset_ms: i64,
    /// Milliseconds into the whole cycle.
    pub cycle_pos_ms: i64,
    /// Total cycle length in milliseconds.
    pub cycle_total_ms: i64,
    /// Unix timestamp (seconds) of the anchor the position is derived from.
    pub anchor_ts: i64,
}

/// Outcome of a drift checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriftAction {
    None,
    SoftResync,
    HardResync,
}

impl DriftAction {
    pub fn as_str(self) -> &'static str {
        match self {
            DriftAction::None => "none",
            DriftAction::SoftResync => "soft_resync",
            DriftAction::HardResync => "hard_resync",
        }
    }
}

/// Scheduler state as reported through the status registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackState {
    Starting,
    Playing,
    Recovering,
    WaitingForMedia,
    WaitingSyncAnchor,
}

impl PlaybackState {
    pub fn as_str(self) -> &'static str {
        match self {
            PlaybackState::Starting => "starting",
            PlaybackState::Playing => "playing",
            PlaybackState::Recovering => "recovering",
            PlaybackState::WaitingForMedia => "waiting_for_media",
            PlaybackState::WaitingSyncAnchor => "waiting_sync_anchor",
        }
    }
}

/// One record of the persisted playlist snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedMediaRecord {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub duration_ms: Option<i64>,
    pub path: String,
    #[serde(default)]
    pub campaign_id: String,
    #[serde(default)]
    pub campaign_name: String,
}

impl From<&MediaItem> for SavedMediaRecord {
    fn from(item: &MediaItem) -> Self {
        Self {
            url: item.url.clone(),
            duration_ms: Some(item.duration_ms),
            path: item.path.display().to_string(),
            campaign_id: item.campaign_id.clone(),
            campaign_name: item.campaign_name.clone(),
        }
    }
}
