//! Offline playlist reconstruction.
//!
//! At boot the agent tries to put *something* usable on screen before the
//! network is proven: first the persisted playlist snapshot, then the raw
//! cache directory. An age policy bounds how stale that content may be,
//! except when the API is provably unreachable and the operator opted into
//! playing stale content over a black screen.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::api::fingerprint_items;
use crate::cache::CacheIndex;
use crate::config::Config;
use crate::models::{MediaItem, RawMediaItem, SavedMediaRecord, is_supported_media};
use crate::state;
use crate::utils::fs::extension_lower;

const NETWORK_PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// A reconstructed playlist plus the fingerprint to store with it.
#[derive(Debug)]
pub struct OfflinePlaylist {
    pub items: Vec<MediaItem>,
    pub fingerprint: String,
    /// "snapshot" or "cache_scan", for logging and status.
    pub source: &'static str,
}

/// Resolve a snapshot record's path: absolute, else relative to the cache
/// dir, else by basename within the cache dir.
fn resolve_record_path(cache_dir: &Path, recorded: &str) -> Option<PathBuf> {
    let raw = PathBuf::from(recorded);
    if raw.is_absolute() {
        return Some(raw);
    }
    let relative = cache_dir.join(&raw);
    if relative.is_file() {
        return Some(relative);
    }
    let basename = raw.file_name()?;
    let by_name = cache_dir.join(basename);
    by_name.is_file().then_some(by_name)
}

fn usable_file(path: &Path) -> bool {
    std::fs::metadata(path).is_ok_and(|meta| meta.is_file() && meta.len() > 0)
}

fn synthetic_url(path: &Path) -> String {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("unknown");
    format!("cache://{name}")
}

/// Rebuild media items from the persisted playlist snapshot.
pub fn media_items_from_saved(cfg: &Config, records: &[SavedMediaRecord]) -> Vec<MediaItem> {
    let mut items = Vec::new();
    for record in records {
        let Some(path) = resolve_record_path(&cfg.cache_dir, &record.path) else {
            debug!("Snapshot entry not found on disk: {}", record.path);
            continue;
        };
        if !usable_file(&path) {
            debug!("Snapshot entry unusable: {}", path.display());
            continue;
        }
        let url_hint = (!record.url.is_empty()).then_some(record.url.as_str());
        if !is_supported_media(&path, url_hint) {
            debug!("Snapshot entry has unsupported type: {}", path.display());
            continue;
        }
        let url = if record.url.is_empty() {
            synthetic_url(&path)
        } else {
            record.url.clone()
        };
        items.push(MediaItem {
            url,
            duration_ms: record.duration_ms.unwrap_or(cfg.default_duration_ms),
            path,
            campaign_id: record.campaign_id.clone(),
            campaign_name: record.campaign_name.clone(),
        });
    }
    items
}

/// Rebuild media items by scanning the cache directory itself.
///
/// Ordering prefers the cache index (`last_used` then path, ascending) so
/// every kiosk that shares a snapshot enumerates the same sequence.
pub fn media_items_from_cache(cfg: &Config, index: Option<&CacheIndex>) -> Vec<MediaItem> {
    let Ok(read_dir) = std::fs::read_dir(&cfg.cache_dir) else {
        return Vec::new();
    };

    let mut entries: Vec<(Option<DateTime<Utc>>, PathBuf)> = Vec::new();
    for entry in read_dir.flatten() {
        let path = entry.path();
        if extension_lower(&path).as_deref() == Some("tmp") {
            continue;
        }
        if !usable_file(&path) {
            continue;
        }
        let indexed = index.and_then(|idx| idx.entry(&path));
        let url_hint = indexed
            .as_ref()
            .map(|e| e.url.clone())
            .filter(|u| !u.is_empty());
        if !is_supported_media(&path, url_hint.as_deref()) {
            continue;
        }
        let last_used = index.and_then(|idx| idx.last_used(&path)).or_else(|| {
            entry
                .metadata()
                .ok()
                .and_then(|meta| meta.modified().ok())
                .map(DateTime::<Utc>::from)
        });
        entries.push((last_used, path));
    }
    entries.sort_by(|a, b| a.cmp(b));

    entries
        .into_iter()
        .map(|(_, path)| {
            let indexed = index.and_then(|idx| idx.entry(&path));
            let url = indexed
                .as_ref()
                .map(|e| e.url.clone())
                .filter(|u| !u.is_empty())
                .unwrap_or_else(|| synthetic_url(&path));
            MediaItem {
                url,
                duration_ms: indexed
                    .as_ref()
                    .and_then(|e| e.duration_ms)
                    .unwrap_or(cfg.default_duration_ms),
                path,
                campaign_id: indexed
                    .as_ref()
                    .map(|e| e.campaign_id.clone())
                    .unwrap_or_default(),
                campaign_name: indexed
                    .map(|e| e.campaign_name)
                    .unwrap_or_default(),
            }
        })
        .collect()
}

/// Age policy for offline content.
///
/// Stale content is allowed when no limit is set, when it is within the
/// limit, or when the network is down and the operator chose staleness
/// over a dark screen.
pub fn offline_playlist_allowed(
    cfg: &Config,
    reference: Option<DateTime<Utc>>,
    network_available: bool,
) -> bool {
    if cfg.offline_max_age_hours == 0 {
        return true;
    }
    let within_limit = reference.is_some_and(|at| {
        let age = Utc::now() - at;
        age.num_hours() < cfg.offline_max_age_hours as i64
    });
    if within_limit {
        return true;
    }
    cfg.offline_ignore_max_age_when_no_network && !network_available
}

/// TCP probe of the API endpoint; `true` means the host:port accepted a
/// connection.
pub async fn network_available(cfg: &Config) -> bool {
    let Some((host, port)) = cfg.api_host_port() else {
        return false;
    };
    matches!(
        tokio::time::timeout(
            NETWORK_PROBE_TIMEOUT,
            tokio::net::TcpStream::connect((host.as_str(), port)),
        )
        .await,
        Ok(Ok(_))
    )
}

/// Boot-time reconstruction: snapshot first, cache scan second.
pub async fn load_offline_playlist(
    cfg: &Config,
    index: &CacheIndex,
) -> Option<OfflinePlaylist> {
    if !cfg.offline_fallback {
        return None;
    }

    let saved = state::load_playlist(&cfg.state_dir).await;

    if cfg.offline_max_age_hours > 0 {
        let reference = match state::load_last_success(&cfg.state_dir).await {
            Some(at) => Some(at),
            None => saved.as_ref().and_then(|s| s.saved_at),
        };
        let reachable = network_available(cfg).await;
        if !offline_playlist_allowed(cfg, reference, reachable) {
            warn!(
                "Offline playlist declined: older than {}h and network reachable",
                cfg.offline_max_age_hours
            );
            return None;
        }
    }

    if let Some(saved) = saved {
        let items = media_items_from_saved(cfg, &saved.records);
        if !items.is_empty() {
            info!("Offline playlist restored from snapshot: {} items", items.len());
            let fingerprint = if saved.fingerprint.is_empty() {
                fingerprint_of_items(&items)
            } else {
                saved.fingerprint
            };
            return Some(OfflinePlaylist {
                items,
                fingerprint,
                source: "snapshot",
            });
        }
    }

    let items = media_items_from_cache(cfg, Some(index));
    if items.is_empty() {
        return None;
    }
    info!("Offline playlist rebuilt from cache scan: {} items", items.len());
    let fingerprint = fingerprint_of_items(&items);
    Some(OfflinePlaylist {
        items,
        fingerprint,
        source: "cache_scan",
    })
}

fn fingerprint_of_items(items: &[MediaItem]) -> String {
    let raw: Vec<RawMediaItem> = items
        .iter()
        .map(|item| RawMediaItem {
            url: item.url.clone(),
            duration_ms: item.duration_ms,
            campaign_id: item.campaign_id.clone(),
            campaign_name: item.campaign_name.clone(),
        })
        .collect();
    fingerprint_items(&raw)
}
