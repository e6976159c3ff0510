//! Persisted state documents under `state_dir`.
//!
//! Three documents survive restarts: the last adopted playlist
//! (`playlist_last.json`), the last successful poll time
//! (`last_success.json`) and the cache index (owned by
//! [`crate::cache::CacheIndex`]). All writes go through the atomic
//! temp+rename helper so a crashed writer leaves either the previous
//! complete document or none.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::warn;

use crate::errors::StateResult;
use crate::models::{MediaItem, SavedMediaRecord};
use crate::utils::{atomic_write_json, iso_now, parse_iso};

pub const PLAYLIST_FILE: &str = "playlist_last.json";
pub const LAST_SUCCESS_FILE: &str = "last_success.json";

const DOCUMENT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct PlaylistDocument {
    version: u32,
    saved_at: String,
    fingerprint: String,
    playlist: Vec<SavedMediaRecord>,
}

#[derive(Debug, Serialize, Deserialize)]
struct LastSuccessDocument {
    last_success: String,
}

/// A deserialized `playlist_last.json`.
#[derive(Debug, Clone)]
pub struct SavedPlaylist {
    pub records: Vec<SavedMediaRecord>,
    pub fingerprint: String,
    pub saved_at: Option<DateTime<Utc>>,
}

/// Persist the adopted playlist for offline reconstruction.
pub async fn save_playlist(
    state_dir: &Path,
    items: &[MediaItem],
    fingerprint: &str,
) -> StateResult<()> {
    let document = PlaylistDocument {
        version: DOCUMENT_VERSION,
        saved_at: iso_now(),
        fingerprint: fingerprint.to_string(),
        playlist: items.iter().map(SavedMediaRecord::from).collect(),
    };
    atomic_write_json(&state_dir.join(PLAYLIST_FILE), &document).await
}

/// Read the persisted playlist snapshot, if present and parseable.
pub async fn load_playlist(state_dir: &Path) -> Option<SavedPlaylist> {
    let path = state_dir.join(PLAYLIST_FILE);
    let body = fs::read(&path).await.ok()?;
    match serde_json::from_slice::<PlaylistDocument>(&body) {
        Ok(document) => Some(SavedPlaylist {
            records: document.playlist,
            fingerprint: document.fingerprint,
            saved_at: parse_iso(&document.saved_at),
        }),
        Err(e) => {
            warn!("Ignoring unreadable {}: {e}", path.display());
            None
        }
    }
}

/// Record the moment the campaign API last answered successfully.
pub async fn save_last_success(state_dir: &Path, at: DateTime<Utc>) -> StateResult<()> {
    let document = LastSuccessDocument {
        last_success: crate::utils::iso_from(at),
    };
    atomic_write_json(&state_dir.join(LAST_SUCCESS_FILE), &document).await
}

pub async fn load_last_success(state_dir: &Path) -> Option<DateTime<Utc>> {
    let path = state_dir.join(LAST_SUCCESS_FILE);
    let body = fs::read(&path).await.ok()?;
    serde_json::from_slice::<LastSuccessDocument>(&body)
        .ok()
        .and_then(|document| parse_iso(&document.last_success))
}

/// Paths referenced by the persisted snapshot, for cleanup keep-set math.
pub async fn snapshot_paths(state_dir: &Path) -> Vec<PathBuf> {
    match load_playlist(state_dir).await {
        Some(saved) => saved
            .records
            .iter()
            .map(|record| PathBuf::from(&record.path))
            .collect(),
        None => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(path: &Path) -> MediaItem {
        MediaItem {
            url: "cache://saved.mp4".to_string(),
            duration_ms: 1234,
            path: path.to_path_buf(),
            campaign_id: String::new(),
            campaign_name: String::new(),
        }
    }

    #[tokio::test]
    async fn playlist_round_trip_includes_path() {
        let dir = tempfile::tempdir().unwrap();
        let media = dir.path().join("saved.mp4");
        std::fs::write(&media, b"ok").unwrap();

        save_playlist(dir.path(), &[item(&media)], "abc")
            .await
            .unwrap();
        let saved = load_playlist(dir.path()).await.unwrap();

        assert_eq!(saved.fingerprint, "abc");
        assert_eq!(saved.records.len(), 1);
        assert_eq!(saved.records[0].path, media.display().to_string());
        assert_eq!(saved.records[0].duration_ms, Some(1234));
        assert!(saved.saved_at.is_some());
    }

    #[tokio::test]
    async fn corrupt_document_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(PLAYLIST_FILE), b"{half a doc").unwrap();
        assert!(load_playlist(dir.path()).await.is_none());
    }

    #[tokio::test]
    async fn last_success_round_trip() {
        use chrono::TimeZone;
        let dir = tempfile::tempdir().unwrap();
        let at = Utc.with_ymd_and_hms(2026, 2, 8, 14, 10, 0).unwrap();
        save_last_success(dir.path(), at).await.unwrap();
        assert_eq!(load_last_success(dir.path()).await, Some(at));
    }
}
