//! Remote refresh worker.
//!
//! Pulls the campaign list on an interval, materializes media into the
//! cache and replaces the live playlist when its identity changed. On
//! failure the previous playlist stays on screen and retries back off
//! exponentially. A `poll_now` notification short-circuits the wait so
//! the config-UI collaborator can force a refresh.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::api;
use crate::cache::CacheIndex;
use crate::config::{Config, SharedConfig};
use crate::errors::{AgentError, AgentResult, ApiError};
use crate::offline;
use crate::playlist::PlaylistStore;
use crate::state;
use crate::status::StatusRegistry;
use crate::utils::{iso_now, sleep_unless_cancelled};

const BACKOFF_INITIAL: Duration = Duration::from_secs(2);
const BACKOFF_CAP: Duration = Duration::from_secs(300);

pub async fn run_poller(
    config: SharedConfig,
    playlist: Arc<PlaylistStore>,
    status: Arc<StatusRegistry>,
    index: Arc<CacheIndex>,
    poll_now: Arc<Notify>,
    cancel: CancellationToken,
) {
    let mut backoff = BACKOFF_INITIAL;
    loop {
        if cancel.is_cancelled() {
            return;
        }
        let cfg = config.snapshot();
        match poll_once(&cfg, &playlist, &index).await {
            Ok(size) => {
                status.update(|s| {
                    s.last_poll_success = Some(iso_now());
                    s.last_poll_error = None;
                    s.playlist_size = Some(size);
                    s.consecutive_failures = 0;
                });
                backoff = BACKOFF_INITIAL;

                let interval = Duration::from_secs(cfg.poll_interval_sec.max(1));
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = poll_now.notified() => info!("Immediate poll requested"),
                    _ = tokio::time::sleep(interval) => {}
                }
            }
            Err(e) => {
                warn!("API polling failed: {e}");
                status.update(|s| {
                    s.last_poll_error = Some(format!("{} {e}", iso_now()));
                    s.consecutive_failures += 1;
                });
                if sleep_unless_cancelled(&cancel, backoff).await {
                    return;
                }
                backoff = (backoff * 2).min(BACKOFF_CAP);
            }
        }
    }
}

/// One fetch → download → adopt pass. Returns the live playlist size.
async fn poll_once(
    cfg: &Config,
    playlist: &PlaylistStore,
    index: &CacheIndex,
) -> AgentResult<usize> {
    let client = api::build_client(cfg).map_err(AgentError::Api)?;
    let raw_items = api::fetch_media_list(&client, cfg).await?;

    if raw_items.is_empty() && !cfg.allow_empty_playlist_from_api {
        return handle_empty_response(cfg, playlist, index).await;
    }

    let fingerprint = api::fingerprint_items(&raw_items);
    let outcome = api::download_media(&client, cfg, &raw_items, index).await;

    if cfg.require_full_download_before_switch && outcome.failed > 0 {
        warn!(
            "Playlist switch suppressed: {} of {} items unresolved",
            outcome.failed,
            raw_items.len()
        );
        index.persist(true).await?;
        let (items, _) = playlist.get();
        return Ok(items.len());
    }

    if outcome.items.is_empty() && !raw_items.is_empty() {
        // Nothing became playable; keep whatever is on screen.
        index.persist(true).await?;
        return Err(ApiError::EmptyPlaylist.into());
    }

    adopt(cfg, playlist, &outcome.items, &fingerprint).await;
    index.persist(true).await?;
    if let Err(e) = state::save_last_success(&cfg.state_dir, Utc::now()).await {
        warn!("Failed to persist last_success: {e}");
    }
    Ok(outcome.items.len())
}

/// Empty API response policy: keep the current playlist, else adopt a
/// cache reconstruction, else surface a transient error.
async fn handle_empty_response(
    cfg: &Config,
    playlist: &PlaylistStore,
    index: &CacheIndex,
) -> AgentResult<usize> {
    let (current, _) = playlist.get();
    if !current.is_empty() {
        info!("API returned no campaigns; retaining current playlist");
        if let Err(e) = state::save_last_success(&cfg.state_dir, Utc::now()).await {
            warn!("Failed to persist last_success: {e}");
        }
        return Ok(current.len());
    }

    let rebuilt = offline::media_items_from_cache(cfg, Some(index));
    if rebuilt.is_empty() {
        return Err(ApiError::EmptyPlaylist.into());
    }
    info!(
        "API returned no campaigns; adopting {} cache-derived items",
        rebuilt.len()
    );
    let fingerprint = api::fingerprint_items(
        &rebuilt
            .iter()
            .map(|item| crate::models::RawMediaItem {
                url: item.url.clone(),
                duration_ms: item.duration_ms,
                campaign_id: item.campaign_id.clone(),
                campaign_name: item.campaign_name.clone(),
            })
            .collect::<Vec<_>>(),
    );
    let size = rebuilt.len();
    adopt(cfg, playlist, &rebuilt, &fingerprint).await;
    Ok(size)
}

/// Replace the live playlist and persist the snapshot when accepted.
async fn adopt(
    cfg: &Config,
    playlist: &PlaylistStore,
    items: &[crate::models::MediaItem],
    fingerprint: &str,
) {
    if playlist.update(items.to_vec(), fingerprint) {
        info!("Playlist updated: {} items", items.len());
        if let Err(e) = state::save_playlist(&cfg.state_dir, items, fingerprint).await {
            warn!("Failed to persist playlist snapshot: {e}");
        }
    }
}
