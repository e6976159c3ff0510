//! Durable cache index: local file path → last-used metadata.
//!
//! The index is advisory. Losing it never loses media; it only degrades
//! eviction ordering and offline reconstruction ordering. Persistence is
//! throttled so frequent `touch` calls during a poll do not rewrite the
//! file per item.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::warn;

use crate::errors::StateResult;
use crate::models::RawMediaItem;
use crate::utils::{atomic_write_json, iso_now, parse_iso};

pub const CACHE_INDEX_FILE: &str = "cache_index.json";

const DOCUMENT_VERSION: u32 = 1;
const PERSIST_THROTTLE: Duration = Duration::from_secs(5);

/// Metadata remembered per cached file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub duration_ms: Option<i64>,
    #[serde(default)]
    pub campaign_id: String,
    #[serde(default)]
    pub campaign_name: String,
    pub last_used: String,
    #[serde(default)]
    pub size: u64,
}

#[derive(Debug, Serialize, Deserialize)]
struct IndexDocument {
    version: u32,
    updated_at: String,
    items: HashMap<String, CacheEntry>,
}

#[derive(Debug, Default)]
struct IndexInner {
    entries: HashMap<String, CacheEntry>,
    dirty: bool,
    last_persist: Option<Instant>,
}

/// Thread-safe cache index bound to `<state_dir>/cache_index.json`.
#[derive(Debug)]
pub struct CacheIndex {
    file: PathBuf,
    inner: Mutex<IndexInner>,
}

impl CacheIndex {
    /// Load the index, starting empty when the document is missing or bad.
    pub async fn load(state_dir: &Path) -> Self {
        let file = state_dir.join(CACHE_INDEX_FILE);
        let entries = match fs::read(&file).await {
            Ok(body) => match serde_json::from_slice::<IndexDocument>(&body) {
                Ok(document) => document.items,
                Err(e) => {
                    warn!("Ignoring unreadable {}: {e}", file.display());
                    HashMap::new()
                }
            },
            Err(_) => HashMap::new(),
        };
        Self {
            file,
            inner: Mutex::new(IndexInner {
                entries,
                dirty: false,
                last_persist: None,
            }),
        }
    }

    /// Record that `path` was just (re)used for `item`.
    pub fn touch(&self, path: &Path, item: &RawMediaItem, size: u64) {
        let mut inner = self.lock();
        inner.entries.insert(
            path.display().to_string(),
            CacheEntry {
                url: item.url.clone(),
                duration_ms: Some(item.duration_ms),
                campaign_id: item.campaign_id.clone(),
                campaign_name: item.campaign_name.clone(),
                last_used: iso_now(),
                size,
            },
        );
        inner.dirty = true;
    }

    pub fn remove(&self, path: &Path) {
        let mut inner = self.lock();
        if inner.entries.remove(&path.display().to_string()).is_some() {
            inner.dirty = true;
        }
    }

    pub fn entry(&self, path: &Path) -> Option<CacheEntry> {
        self.lock().entries.get(&path.display().to_string()).cloned()
    }

    pub fn last_used(&self, path: &Path) -> Option<DateTime<Utc>> {
        self.entry(path).and_then(|entry| parse_iso(&entry.last_used))
    }

    /// Snapshot of all entries, keyed by path string.
    pub fn entries(&self) -> HashMap<String, CacheEntry> {
        self.lock().entries.clone()
    }

    /// Write the document if dirty, at most once per throttle window
    /// unless `force` is set.
    pub async fn persist(&self, force: bool) -> StateResult<()> {
        let items = {
            let mut inner = self.lock();
            if !inner.dirty {
                return Ok(());
            }
            if !force
                && let Some(last) = inner.last_persist
                && last.elapsed() < PERSIST_THROTTLE
            {
                return Ok(());
            }
            inner.dirty = false;
            inner.last_persist = Some(Instant::now());
            inner.entries.clone()
        };
        let document = IndexDocument {
            version: DOCUMENT_VERSION,
            updated_at: iso_now(),
            items,
        };
        atomic_write_json(&self.file, &document).await
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, IndexInner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(url: &str) -> RawMediaItem {
        RawMediaItem {
            url: url.to_string(),
            duration_ms: 5000,
            campaign_id: "c".to_string(),
            campaign_name: "n".to_string(),
        }
    }

    #[tokio::test]
    async fn touch_persist_reload() {
        let dir = tempfile::tempdir().unwrap();
        let index = CacheIndex::load(dir.path()).await;
        let media = dir.path().join("aa.mp4");
        index.touch(&media, &raw("https://cdn/a.mp4"), 42);
        index.persist(true).await.unwrap();

        let reloaded = CacheIndex::load(dir.path()).await;
        let entry = reloaded.entry(&media).unwrap();
        assert_eq!(entry.url, "https://cdn/a.mp4");
        assert_eq!(entry.size, 42);
        assert!(reloaded.last_used(&media).is_some());
    }

    #[tokio::test]
    async fn clean_index_skips_write() {
        let dir = tempfile::tempdir().unwrap();
        let index = CacheIndex::load(dir.path()).await;
        index.persist(true).await.unwrap();
        assert!(!dir.path().join(CACHE_INDEX_FILE).exists());
    }

    #[tokio::test]
    async fn remove_marks_dirty() {
        let dir = tempfile::tempdir().unwrap();
        let index = CacheIndex::load(dir.path()).await;
        let media = dir.path().join("aa.mp4");
        index.touch(&media, &raw("u"), 1);
        index.persist(true).await.unwrap();
        index.remove(&media);
        index.persist(true).await.unwrap();

        let reloaded = CacheIndex::load(dir.path()).await;
        assert!(reloaded.entry(&media).is_none());
    }
}
