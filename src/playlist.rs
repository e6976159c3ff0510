//! Playlist store: the single source of truth for what should be on screen.
//!
//! The sequence is replaced wholesale; items are never mutated in place.
//! Identity is tracked two ways: the *fingerprint* (ordered `{url,
//! duration_ms}` projection, computed from the raw API records) and the
//! *signature* (ordered `{path, duration_ms}` projection of the resolved
//! items). An update is accepted iff either differs, so a re-download that
//! lands the same URLs on different cache paths still propagates.

use std::sync::Mutex;

use serde_json::json;

use crate::models::MediaItem;
use crate::utils::sha1_hex;

/// SHA-1 over the ordered `{path, duration_ms}` projection.
pub fn compute_signature(items: &[MediaItem]) -> String {
    let projection: Vec<_> = items
        .iter()
        .map(|item| {
            json!({
                "duration_ms": item.duration_ms,
                "path": item.path.display().to_string(),
            })
        })
        .collect();
    sha1_hex(&serde_json::Value::Array(projection).to_string())
}

#[derive(Debug, Default)]
struct PlaylistInner {
    items: Vec<MediaItem>,
    version: u64,
    fingerprint: String,
    signature: String,
}

/// Mutex-guarded live playlist with a monotonic version counter.
#[derive(Debug, Default)]
pub struct PlaylistStore {
    inner: Mutex<PlaylistInner>,
}

impl PlaylistStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defensive copy of the sequence plus the current version.
    pub fn get(&self) -> (Vec<MediaItem>, u64) {
        let inner = self.lock();
        (inner.items.clone(), inner.version)
    }

    pub fn version(&self) -> u64 {
        self.lock().version
    }

    pub fn fingerprint(&self) -> String {
        self.lock().fingerprint.clone()
    }

    /// Replace the sequence if it differs from what is stored.
    ///
    /// Returns `true` when the replacement happened (and the version was
    /// bumped); `false` means the update was a no-op.
    pub fn update(&self, items: Vec<MediaItem>, fingerprint: &str) -> bool {
        let signature = compute_signature(&items);
        let mut inner = self.lock();
        if inner.fingerprint == fingerprint && inner.signature == signature {
            return false;
        }
        inner.items = items;
        inner.version += 1;
        inner.fingerprint = fingerprint.to_string();
        inner.signature = signature;
        true
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, PlaylistInner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
