//! Campaign API client and media downloader.
//!
//! One POST per poll fetches the campaign list; each media URL is then
//! materialized in the cache directory under its SHA-1 name. Downloads are
//! staged through a `.tmp` sibling and renamed into place, so no other
//! component ever observes a partially-written file under the final name.

use std::path::{Path, PathBuf};

use futures_util::StreamExt;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

use crate::cache::CacheIndex;
use crate::config::Config;
use crate::errors::{ApiError, ApiResult};
use crate::models::{MediaItem, RawMediaItem};
use crate::utils::sha1_hex;

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    units: Vec<Unit>,
}

#[derive(Debug, Deserialize)]
struct Unit {
    #[serde(default)]
    campaigns: Vec<Campaign>,
}

#[derive(Debug, Deserialize)]
struct Campaign {
    #[serde(default)]
    id: Option<serde_json::Value>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    exposure_time_ms: Option<i64>,
    #[serde(default)]
    media_urls: Option<Vec<String>>,
    #[serde(default)]
    primary_media_url: Option<String>,
}

/// HTTP client configured for the campaign endpoint.
pub fn build_client(cfg: &Config) -> ApiResult<Client> {
    Ok(Client::builder()
        .timeout(std::time::Duration::from_secs(cfg.request_timeout_sec))
        .build()?)
}

/// Fetch and flatten the campaign list into raw media records.
///
/// Campaigns contribute when their status is empty, `ativa` or `active`
/// (case-insensitive). `media_urls` wins over `primary_media_url`; missing
/// exposure times fall back to `default_duration_ms`.
pub async fn fetch_media_list(client: &Client, cfg: &Config) -> ApiResult<Vec<RawMediaItem>> {
    let body = json!({
        "environmentId": cfg.environment_id,
        "onlyStandby": cfg.only_standby,
        "searchIn": cfg.search_in,
        "includeDescendants": cfg.include_descendants,
        "limit": cfg.limit,
    });

    let response = client
        .post(&cfg.api_url)
        .header("x-api-key", &cfg.api_key)
        .json(&body)
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        return Err(ApiError::Status {
            status: status.as_u16(),
            url: cfg.api_url.clone(),
        });
    }

    let envelope: Envelope = response.json().await?;
    Ok(flatten_envelope(envelope, cfg.default_duration_ms))
}

fn flatten_envelope(envelope: Envelope, default_duration_ms: i64) -> Vec<RawMediaItem> {
    let mut items = Vec::new();
    for unit in envelope.units {
        for campaign in unit.campaigns {
            let status = campaign
                .status
                .as_deref()
                .unwrap_or("")
                .to_ascii_lowercase();
            if !status.is_empty() && status != "ativa" && status != "active" {
                continue;
            }
            let duration_ms = campaign
                .exposure_time_ms
                .filter(|ms| *ms > 0)
                .unwrap_or(default_duration_ms);
            let urls = match campaign.media_urls {
                Some(urls) if !urls.is_empty() => urls,
                _ => campaign.primary_media_url.into_iter().collect(),
            };
            for url in urls {
                if url.is_empty() {
                    continue;
                }
                items.push(RawMediaItem {
                    url,
                    duration_ms,
                    campaign_id: stringify_id(campaign.id.as_ref()),
                    campaign_name: campaign.name.clone().unwrap_or_default(),
                });
            }
        }
    }
    items
}

fn stringify_id(id: Option<&serde_json::Value>) -> String {
    match id {
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(value) => value.to_string(),
        None => String::new(),
    }
}

/// SHA-1 over the canonical `{url, duration_ms}` projection.
///
/// Key order inside each record is fixed, so the digest is stable under
/// JSON object-key reordering but sensitive to item order.
pub fn fingerprint_items(raw_items: &[RawMediaItem]) -> String {
    let projection: Vec<_> = raw_items
        .iter()
        .map(|item| {
            json!({
                "duration_ms": item.duration_ms,
                "url": item.url,
            })
        })
        .collect();
    sha1_hex(&serde_json::Value::Array(projection).to_string())
}

/// Cache destination for a URL: `<cache_dir>/sha1(url)<ext|.bin>`.
pub fn cache_path(cache_dir: &Path, url: &str) -> PathBuf {
    let ext = url::Url::parse(url)
        .ok()
        .and_then(|parsed| {
            Path::new(parsed.path())
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| format!(".{e}"))
        })
        .unwrap_or_else(|| ".bin".to_string());
    cache_dir.join(format!("{}{}", sha1_hex(url), ext))
}

/// Result of materializing one poll's worth of media.
#[derive(Debug)]
pub struct DownloadOutcome {
    pub items: Vec<MediaItem>,
    /// URLs that could not be resolved to a usable local file.
    pub failed: usize,
}

/// Materialize raw records as local files, reusing cached copies.
///
/// Failures are per-item: a URL that cannot be downloaded and has no prior
/// cached copy is skipped, never surfaced as a hard error.
pub async fn download_media(
    client: &Client,
    cfg: &Config,
    raw_items: &[RawMediaItem],
    index: &CacheIndex,
) -> DownloadOutcome {
    if let Err(e) = tokio::fs::create_dir_all(&cfg.cache_dir).await {
        warn!("Cannot create cache dir {}: {e}", cfg.cache_dir.display());
        return DownloadOutcome {
            items: Vec::new(),
            failed: raw_items.len(),
        };
    }

    let mut items = Vec::new();
    let mut failed = 0usize;
    for raw in raw_items {
        let dest = cache_path(&cfg.cache_dir, &raw.url);
        if !tokio::fs::try_exists(&dest).await.unwrap_or(false) {
            match download_one(client, &raw.url, &dest).await {
                Ok(()) => {}
                Err(e) => {
                    warn!("Failed to download {}: {e}", raw.url);
                    if tokio::fs::try_exists(&dest).await.unwrap_or(false) {
                        info!("Using cached file for {}", raw.url);
                    } else {
                        failed += 1;
                        continue;
                    }
                }
            }
        }

        let size = match tokio::fs::metadata(&dest).await {
            Ok(meta) if meta.len() > 0 => meta.len(),
            _ => {
                warn!("Skipping empty cache file {}", dest.display());
                failed += 1;
                continue;
            }
        };

        index.touch(&dest, raw, size);
        items.push(MediaItem {
            url: raw.url.clone(),
            duration_ms: raw.duration_ms,
            path: dest,
            campaign_id: raw.campaign_id.clone(),
            campaign_name: raw.campaign_name.clone(),
        });
    }

    DownloadOutcome { items, failed }
}

/// Stream one URL into `<dest>.tmp`, verify length, rename into place.
async fn download_one(client: &Client, url: &str, dest: &Path) -> ApiResult<()> {
    info!("Downloading {url}");
    let response = client.get(url).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(ApiError::Status {
            status: status.as_u16(),
            url: url.to_string(),
        });
    }
    let expected = response.content_length();

    let tmp = crate::utils::fs::tmp_sibling(dest);
    let result = stream_to_file(response, &tmp, expected, url).await;
    match result {
        Ok(()) => {
            tokio::fs::rename(&tmp, dest).await?;
            Ok(())
        }
        Err(e) => {
            let _ = tokio::fs::remove_file(&tmp).await;
            Err(e)
        }
    }
}

async fn stream_to_file(
    response: reqwest::Response,
    tmp: &Path,
    expected: Option<u64>,
    url: &str,
) -> ApiResult<()> {
    let mut file = tokio::fs::File::create(tmp).await?;
    let mut stream = response.bytes_stream();
    let mut written = 0u64;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        written += chunk.len() as u64;
        file.write_all(&chunk).await?;
    }
    file.flush().await?;

    if let Some(expected) = expected
        && written != expected
    {
        return Err(ApiError::ShortRead {
            url: url.to_string(),
            written,
            expected,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(url: &str, duration_ms: i64) -> RawMediaItem {
        RawMediaItem {
            url: url.to_string(),
            duration_ms,
            campaign_id: String::new(),
            campaign_name: String::new(),
        }
    }

    #[test]
    fn cache_path_uses_url_extension() {
        let dir = Path::new("/cache");
        let path = cache_path(dir, "https://cdn.example/ads/spot.mp4?sig=abc");
        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(name.ends_with(".mp4"));
        assert_eq!(name.len(), 40 + 4);
    }

    #[test]
    fn cache_path_falls_back_to_bin() {
        let path = cache_path(Path::new("/cache"), "https://cdn.example/ads/stream");
        assert!(path.to_str().unwrap().ends_with(".bin"));
    }

    #[test]
    fn fingerprint_is_order_sensitive() {
        let a = raw("https://cdn/a.mp4", 5000);
        let b = raw("https://cdn/b.mp4", 7000);
        assert_ne!(
            fingerprint_items(&[a.clone(), b.clone()]),
            fingerprint_items(&[b, a])
        );
    }

    #[test]
    fn fingerprint_ignores_paths_and_campaigns() {
        let mut a = raw("https://cdn/a.mp4", 5000);
        let fp1 = fingerprint_items(std::slice::from_ref(&a));
        a.campaign_name = "renamed".to_string();
        assert_eq!(fingerprint_items(&[a]), fp1);
    }

    #[test]
    fn envelope_flattening_filters_status_and_fills_defaults() {
        let body = serde_json::json!({
            "units": [{
                "campaigns": [
                    {"id": 7, "name": "A", "status": "Ativa",
                     "exposure_time_ms": 8000, "media_urls": ["https://cdn/a.mp4"]},
                    {"id": "x", "name": "B", "status": "paused",
                     "media_urls": ["https://cdn/b.mp4"]},
                    {"id": 9, "name": "C",
                     "primary_media_url": "https://cdn/c.jpg"},
                ]
            }]
        });
        let envelope: Envelope = serde_json::from_value(body).unwrap();
        let items = flatten_envelope(envelope, 10_000);

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].url, "https://cdn/a.mp4");
        assert_eq!(items[0].duration_ms, 8000);
        assert_eq!(items[0].campaign_id, "7");
        assert_eq!(items[1].url, "https://cdn/c.jpg");
        assert_eq!(items[1].duration_ms, 10_000);
        assert_eq!(items[1].campaign_name, "C");
    }
}
