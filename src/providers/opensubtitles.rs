/*!
 * Subtitle provider backed by the OpenSubtitles REST API.
 *
 * Lists candidate subtitle files for a catalog id + language and downloads
 * payloads through a rotating pool of API keys. Downloaded payloads are
 * cached on disk keyed by their stable file id; the daily-quota bookkeeping
 * lives in [`ApiKeyPool`].
 */

use anyhow::Result;
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::file_utils::FileManager;
use crate::http_cache::CachedHttpClient;

/// Status the service answers with when the active key's quota is exhausted
const STATUS_QUOTA_EXHAUSTED: u16 = 406;

/// Transient server error; retried once after a delay
const STATUS_SERVER_ERROR: u16 = 502;

/// Delay before retrying a transient server error
const SERVER_ERROR_RETRY: Duration = Duration::from_secs(5);

/// Fallback extension when the service reports no file name
const DEFAULT_EXTENSION: &str = ".stl";

/// Immutable descriptor of one physical subtitle file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubtitleFileRef {
    pub file_id: u64,
    pub file_name: Option<String>,
    /// Release label of the containing entry, e.g. "Movie.2013.EXTENDED.BluRay"
    pub release: Option<String>,
}

/// A downloaded subtitle payload; same file id always yields the same bytes
#[derive(Debug, Clone)]
pub struct SubtitleBlob {
    pub file_id: u64,
    pub contents: String,
    /// Extension with leading dot, e.g. ".srt"
    pub extension: String,
}

/// Rotating pool of API credentials with per-key exhaustion reset times.
/// Rotation moves the active index; it never shrinks the pool.
#[derive(Debug)]
pub struct ApiKeyPool {
    keys: Vec<String>,
    resets: Vec<Option<DateTime<Utc>>>,
    active: usize,
}

impl ApiKeyPool {
    pub fn new(keys: Vec<String>) -> Self {
        let resets = vec![None; keys.len()];
        Self {
            keys,
            resets,
            active: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn active_key(&self) -> Option<&str> {
        self.keys.get(self.active).map(|k| k.as_str())
    }

    /// Record the reset time of the active key and advance to the next one.
    pub fn rotate(&mut self, reset_time: Option<DateTime<Utc>>) {
        if self.keys.is_empty() {
            return;
        }
        info!("Rotating subtitle API key");
        self.resets[self.active] = reset_time;
        self.active = (self.active + 1) % self.keys.len();
    }

    /// True while the active key's recorded reset time is in the future.
    /// After a full rotation every key carries one, so this reports the
    /// whole pool as exhausted.
    pub fn blocked(&self) -> bool {
        self.resets
            .get(self.active)
            .and_then(|r| *r)
            .map(|reset| reset > Utc::now())
            .unwrap_or(false)
    }
}

#[derive(Debug, Deserialize)]
struct ListingFile {
    file_id: Option<u64>,
    file_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ListingAttributes {
    release: Option<String>,
    #[serde(default)]
    files: Vec<ListingFile>,
}

#[derive(Debug, Deserialize)]
struct ListingEntry {
    attributes: ListingAttributes,
}

#[derive(Debug, Deserialize)]
struct ListingResponse {
    #[serde(default)]
    data: Vec<ListingEntry>,
}

#[derive(Debug, Deserialize)]
struct DownloadResponse {
    link: Option<String>,
    file_name: Option<String>,
    remaining: Option<i64>,
    reset_time_utc: Option<DateTime<Utc>>,
}

/// Client for the subtitle listing/download service
pub struct OpenSubtitlesApi {
    http: Arc<CachedHttpClient>,
    pool: Mutex<ApiKeyPool>,
    blob_dir: PathBuf,
    endpoint: String,
    user_agent: String,
}

impl OpenSubtitlesApi {
    pub fn new(http: Arc<CachedHttpClient>, api_keys: Vec<String>, blob_dir: PathBuf) -> Self {
        Self::with_endpoint(http, api_keys, blob_dir, "https://api.opensubtitles.com/api/v1")
    }

    pub fn with_endpoint(
        http: Arc<CachedHttpClient>,
        api_keys: Vec<String>,
        blob_dir: PathBuf,
        endpoint: impl Into<String>,
    ) -> Self {
        Self {
            http,
            pool: Mutex::new(ApiKeyPool::new(api_keys)),
            blob_dir,
            endpoint: endpoint.into(),
            user_agent: "SubAgent/1.0".to_string(),
        }
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// True while every usable credential is exhausted; callers must stop
    /// issuing downloads until the earliest reset time passes.
    pub fn blocked(&self) -> bool {
        self.pool.lock().blocked()
    }

    fn headers(&self) -> Vec<(String, String)> {
        let api_key = self
            .pool
            .lock()
            .active_key()
            .unwrap_or_default()
            .to_string();
        vec![
            ("Api-Key".to_string(), api_key),
            ("Content-Type".to_string(), "application/json".to_string()),
            ("User-Agent".to_string(), self.user_agent.clone()),
        ]
    }

    /// List candidate subtitle files for a catalog id and language.
    /// Multi-file bundles ("multi-CD" releases) are rejected outright.
    pub async fn list(&self, catalog_id: &str, language: &str) -> Result<Vec<SubtitleFileRef>> {
        if catalog_id.is_empty() {
            return Ok(Vec::new());
        }
        let numeric_id: String = {
            let digits = catalog_id.trim_start_matches("tt").trim_start_matches('0');
            if digits.is_empty() { "0" } else { digits }.to_string()
        };
        let url = format!(
            "{}/subtitles?imdb_id={}&languages={}",
            self.endpoint, numeric_id, language
        );

        let mut response = self.http.get_cached(&url, &self.headers()).await?;
        if response.status == STATUS_SERVER_ERROR {
            warn!("Subtitle listing hit a server error, retrying in 5 seconds");
            tokio::time::sleep(SERVER_ERROR_RETRY).await;
            response = self.http.get_cached(&url, &self.headers()).await?;
        }
        if !response.is_success() {
            warn!("Subtitle listing for {} failed: {}", catalog_id, response.status);
            return Ok(Vec::new());
        }

        let parsed: ListingResponse =
            serde_json::from_str(&response.body).unwrap_or(ListingResponse { data: Vec::new() });
        Ok(parsed
            .data
            .into_iter()
            .filter(|entry| entry.attributes.files.len() == 1)
            .filter_map(|entry| {
                let release = entry.attributes.release;
                let file = entry.attributes.files.into_iter().next()?;
                Some(SubtitleFileRef {
                    file_id: file.file_id?,
                    file_name: file.file_name,
                    release,
                })
            })
            .collect())
    }

    /// Download a subtitle payload, serving from the local blob cache when
    /// possible. Returns `None` when the service has nothing usable to give
    /// (quota exhausted across the pool, no link, failed fetch).
    pub async fn download(&self, file: &SubtitleFileRef) -> Result<Option<SubtitleBlob>> {
        if let Some(blob) = self.load_blob(file.file_id)? {
            debug!("Subtitle {} served from blob cache", file.file_id);
            return Ok(Some(blob));
        }

        // One attempt per credential at most; once every key has a recorded
        // reset in the future the pool reports blocked and we stop.
        let max_rotations = self.pool.lock().len();
        for _ in 0..=max_rotations {
            if self.blocked() {
                info!("Subtitle API keys are exhausted; skipping downloads until reset");
                return Ok(None);
            }

            let response = self.request_download(file.file_id).await?;
            let parsed = match response {
                Some(parsed) => parsed,
                None => return Ok(None),
            };

            let quota_spent = parsed.remaining.map(|r| r < 0).unwrap_or(false);
            if quota_spent && parsed.link.is_none() {
                self.pool.lock().rotate(parsed.reset_time_utc);
                continue;
            }
            let link = match parsed.link {
                Some(link) => link,
                None => return Ok(None),
            };

            let payload = self.http.get_uncached(&link, &[]).await?;
            if !payload.is_success() {
                warn!("Subtitle download link failed: {}", payload.status);
                return Ok(None);
            }
            let file_name = parsed
                .file_name
                .or_else(|| file.file_name.clone())
                .unwrap_or_default();
            let extension = Path::new(&file_name)
                .extension()
                .map(|e| format!(".{}", e.to_string_lossy()))
                .unwrap_or_else(|| DEFAULT_EXTENSION.to_string());
            let blob = SubtitleBlob {
                file_id: file.file_id,
                contents: payload.body,
                extension,
            };
            self.save_blob(&blob)?;
            return Ok(Some(blob));
        }
        Ok(None)
    }

    async fn request_download(&self, file_id: u64) -> Result<Option<DownloadResponse>> {
        let url = format!("{}/download", self.endpoint);
        let body = serde_json::json!({ "file_id": file_id }).to_string();

        let mut response = self.http.post(&url, &self.headers(), body.clone()).await?;
        if response.status == STATUS_SERVER_ERROR {
            warn!("Subtitle download request hit a server error, retrying in 5 seconds");
            tokio::time::sleep(SERVER_ERROR_RETRY).await;
            response = self.http.post(&url, &self.headers(), body).await?;
        }
        // 406 still carries a parseable body describing the exhausted quota.
        if response.status != 200 && response.status != STATUS_QUOTA_EXHAUSTED {
            warn!("Subtitle download request failed: {}", response.status);
            return Ok(None);
        }
        Ok(serde_json::from_str(&response.body).ok())
    }

    fn blob_path(&self, file_id: u64, extension: &str) -> PathBuf {
        self.blob_dir.join(format!("{}{}", file_id, extension))
    }

    fn save_blob(&self, blob: &SubtitleBlob) -> Result<()> {
        FileManager::ensure_dir(&self.blob_dir)?;
        let path = self.blob_path(blob.file_id, &blob.extension);
        FileManager::write_to_file(path, &blob.contents)
    }

    fn load_blob(&self, file_id: u64) -> Result<Option<SubtitleBlob>> {
        let entries = match std::fs::read_dir(&self.blob_dir) {
            Ok(entries) => entries,
            Err(_) => return Ok(None),
        };
        let prefix = format!("{}.", file_id);
        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().to_string();
            if let Some(ext) = name.strip_prefix(&prefix) {
                let contents = FileManager::read_to_string(entry.path())?;
                if contents.is_empty() {
                    continue;
                }
                return Ok(Some(SubtitleBlob {
                    file_id,
                    contents,
                    extension: format!(".{}", ext),
                }));
            }
        }
        Ok(None)
    }
}
