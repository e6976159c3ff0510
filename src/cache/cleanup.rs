//! Cache retention worker.
//!
//! Walks the cache directory and removes files no longer referenced by the
//! live playlist, the persisted snapshot, or the current/next playback
//! slots. Eviction order is oldest `last_used` first. Stale `.tmp`
//! leftovers from interrupted downloads are removed unconditionally once
//! old enough.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cache::CacheIndex;
use crate::config::{Config, SharedConfig};
use crate::playlist::PlaylistStore;
use crate::status::StatusRegistry;
use crate::utils::{iso_now, sleep_unless_cancelled};

struct Candidate {
    path: PathBuf,
    last_used: DateTime<Utc>,
    size: u64,
}

/// Periodic retention pass over the cache directory.
pub async fn run_cleanup(
    config: SharedConfig,
    playlist: Arc<PlaylistStore>,
    status: Arc<StatusRegistry>,
    index: Arc<CacheIndex>,
    cancel: CancellationToken,
) {
    loop {
        if cancel.is_cancelled() {
            return;
        }
        let cfg = config.snapshot();
        if cfg.cleanup_interval_sec == 0 {
            if sleep_unless_cancelled(&cancel, Duration::from_secs(1)).await {
                return;
            }
            continue;
        }

        if skip_while_offline(&cfg, &status) {
            debug!("cleanup skipped: last poll did not succeed and offline cleanup is disabled");
        } else {
            match cleanup_pass(&cfg, &playlist, &status, &index).await {
                Ok(removed) => {
                    status.update(|s| {
                        s.last_cleanup = Some(iso_now());
                        s.last_cleanup_removed = Some(removed);
                    });
                    if removed > 0 {
                        info!("Cache cleanup removed {removed} file(s)");
                    }
                }
                Err(e) => warn!("Cache cleanup failed: {e}"),
            }
        }

        if sleep_unless_cancelled(&cancel, Duration::from_secs(cfg.cleanup_interval_sec)).await {
            return;
        }
    }
}

fn skip_while_offline(cfg: &Config, status: &StatusRegistry) -> bool {
    if !cfg.disable_cleanup_when_offline {
        return false;
    }
    let snapshot = status.snapshot();
    snapshot.last_poll_success.is_none() || snapshot.consecutive_failures > 0
}

async fn cleanup_pass(
    cfg: &Config,
    playlist: &PlaylistStore,
    status: &StatusRegistry,
    index: &CacheIndex,
) -> anyhow::Result<usize> {
    let mut keep: HashSet<PathBuf> = HashSet::new();
    let (items, _) = playlist.get();
    keep.extend(items.into_iter().map(|item| item.path));
    keep.extend(crate::state::snapshot_paths(&cfg.state_dir).await);
    keep.extend(status.slot_paths());

    let mut read_dir = match tokio::fs::read_dir(&cfg.cache_dir).await {
        Ok(read_dir) => read_dir,
        Err(_) => return Ok(0),
    };

    let now = Utc::now();
    let mut removed = 0usize;
    let mut candidates: Vec<Candidate> = Vec::new();
    let mut kept_bytes = 0u64;
    let mut kept_files = 0usize;

    while let Some(entry) = read_dir.next_entry().await? {
        let path = entry.path();
        let Ok(meta) = entry.metadata().await else {
            continue;
        };
        if !meta.is_file() {
            continue;
        }

        if path.extension().is_some_and(|ext| ext == "tmp") {
            if tmp_is_stale(&meta, now, cfg.tmp_max_age_sec) {
                if tokio::fs::remove_file(&path).await.is_ok() {
                    removed += 1;
                }
            }
            continue;
        }

        if keep.contains(&path) {
            kept_files += 1;
            kept_bytes += meta.len();
            continue;
        }

        let last_used = index
            .last_used(&path)
            .or_else(|| meta.modified().ok().map(DateTime::<Utc>::from))
            .unwrap_or(now);
        candidates.push(Candidate {
            path,
            last_used,
            size: meta.len(),
        });
    }

    candidates.sort_by(|a, b| (a.last_used, &a.path).cmp(&(b.last_used, &b.path)));

    let unlimited = cfg.cache_max_files.is_none() && cfg.cache_max_bytes.is_none();
    let mut total_files = kept_files + candidates.len();
    let mut total_bytes = kept_bytes + candidates.iter().map(|c| c.size).sum::<u64>();

    for candidate in candidates {
        let over_files = cfg.cache_max_files.is_some_and(|max| total_files > max);
        let over_bytes = cfg.cache_max_bytes.is_some_and(|max| total_bytes > max);
        if !unlimited && !over_files && !over_bytes {
            break;
        }
        match tokio::fs::remove_file(&candidate.path).await {
            Ok(()) => {
                index.remove(&candidate.path);
                removed += 1;
                total_files -= 1;
                total_bytes = total_bytes.saturating_sub(candidate.size);
            }
            Err(e) => warn!("Failed to delete {}: {e}", candidate.path.display()),
        }
    }

    index.persist(false).await?;
    Ok(removed)
}

fn tmp_is_stale(meta: &std::fs::Metadata, now: DateTime<Utc>, max_age_sec: u64) -> bool {
    match meta.modified() {
        Ok(modified) => {
            let age = now - DateTime::<Utc>::from(modified);
            age.num_seconds() >= max_age_sec as i64
        }
        Err(_) => false,
    }
}
