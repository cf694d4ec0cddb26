/*!
 * Rate-limited HTTP response caching.
 *
 * Wraps outbound HTTP calls with a time-bounded, disk-persisted response
 * cache. The transport itself hides behind a trait so tests can substitute
 * canned responses instead of a network.
 */

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use log::debug;
use parking_lot::Mutex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration as StdDuration;
use url::Url;

use crate::errors::ProviderError;

/// Cached responses older than this are refetched
const MAX_CACHE_AGE_DAYS: i64 = 7;

/// Number of fresh entries buffered before the cache is flushed to disk
const FLUSH_THRESHOLD: usize = 10;

/// A plain HTTP response, decoded to text
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpResponse {
    /// HTTP status code
    pub status: u16,
    /// Response body decoded as UTF-8 (lossy)
    pub body: String,
    /// When the response was received; used for staleness checks
    pub date: Option<DateTime<Utc>>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        self.status == 200
    }
}

/// Transport primitive behind the cache
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Issue a GET request
    async fn get(&self, url: &str, headers: &[(String, String)])
        -> Result<HttpResponse, ProviderError>;

    /// Issue a POST request with a JSON body
    async fn post(
        &self,
        url: &str,
        headers: &[(String, String)],
        body: String,
    ) -> Result<HttpResponse, ProviderError>;
}

/// Production transport built on reqwest
#[derive(Debug)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        Self {
            client: Client::builder()
                .timeout(StdDuration::from_secs(30))
                .build()
                .unwrap_or_default(),
        }
    }
}

impl Default for ReqwestTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn get(
        &self,
        url: &str,
        headers: &[(String, String)],
    ) -> Result<HttpResponse, ProviderError> {
        let url = Url::parse(url).map_err(|e| ProviderError::RequestFailed(e.to_string()))?;
        let mut request = self.client.get(url);
        for (name, value) in headers {
            request = request.header(name, value);
        }
        let response = request
            .send()
            .await
            .map_err(|e| ProviderError::RequestFailed(e.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::ParseError(e.to_string()))?;
        Ok(HttpResponse {
            status,
            body,
            date: Some(Utc::now()),
        })
    }

    async fn post(
        &self,
        url: &str,
        headers: &[(String, String)],
        body: String,
    ) -> Result<HttpResponse, ProviderError> {
        let url = Url::parse(url).map_err(|e| ProviderError::RequestFailed(e.to_string()))?;
        let mut request = self.client.post(url).body(body);
        for (name, value) in headers {
            request = request.header(name, value);
        }
        let response = request
            .send()
            .await
            .map_err(|e| ProviderError::RequestFailed(e.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::ParseError(e.to_string()))?;
        Ok(HttpResponse {
            status,
            body,
            date: Some(Utc::now()),
        })
    }
}

/// Mutable cache state guarded by one lock
#[derive(Default)]
struct CacheState {
    entries: HashMap<String, HttpResponse>,
    pending_writes: usize,
}

/// Disk-persisted GET response cache over an [`HttpTransport`].
///
/// Only successful (200) responses are cached, so negative results are
/// always retried on the next run. An explicit object owned by the caller,
/// never an ambient singleton.
pub struct CachedHttpClient {
    path: PathBuf,
    transport: std::sync::Arc<dyn HttpTransport>,
    state: Mutex<CacheState>,
}

impl CachedHttpClient {
    /// Open a cache file, loading any previously persisted entries.
    /// A missing or unparseable file just starts an empty cache.
    pub fn open<P: AsRef<Path>>(
        path: P,
        transport: std::sync::Arc<dyn HttpTransport>,
    ) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let entries = match std::fs::read_to_string(&path) {
            Ok(contents) => serde_json::from_str(&contents).unwrap_or_default(),
            Err(_) => HashMap::new(),
        };
        debug!("Opened HTTP cache {:?} with {} entries", path, entries.len());
        Ok(Self {
            path,
            transport,
            state: Mutex::new(CacheState {
                entries,
                pending_writes: 0,
            }),
        })
    }

    fn is_fresh(response: &HttpResponse) -> bool {
        match response.date {
            Some(date) => Utc::now() - date < Duration::days(MAX_CACHE_AGE_DAYS),
            // Entries without a timestamp predate the staleness rule; keep them.
            None => true,
        }
    }

    /// GET through the cache. Cached 200 responses younger than a week are
    /// served directly; anything else goes to the transport.
    pub async fn get_cached(
        &self,
        url: &str,
        headers: &[(String, String)],
    ) -> Result<HttpResponse, ProviderError> {
        {
            let state = self.state.lock();
            if let Some(cached) = state.entries.get(url) {
                if Self::is_fresh(cached) {
                    return Ok(cached.clone());
                }
            }
        }

        let response = self.transport.get(url, headers).await?;
        if response.is_success() {
            let flush_needed = {
                let mut state = self.state.lock();
                state.entries.insert(url.to_string(), response.clone());
                state.pending_writes += 1;
                state.pending_writes >= FLUSH_THRESHOLD
            };
            if flush_needed {
                if let Err(e) = self.flush() {
                    debug!("Failed to flush HTTP cache: {}", e);
                }
            }
        }
        Ok(response)
    }

    /// GET that bypasses the cache entirely (e.g. temporary download links).
    pub async fn get_uncached(
        &self,
        url: &str,
        headers: &[(String, String)],
    ) -> Result<HttpResponse, ProviderError> {
        self.transport.get(url, headers).await
    }

    /// POST; never cached.
    pub async fn post(
        &self,
        url: &str,
        headers: &[(String, String)],
        body: String,
    ) -> Result<HttpResponse, ProviderError> {
        self.transport.post(url, headers, body).await
    }

    /// Persist the in-memory cache to disk.
    pub fn flush(&self) -> Result<()> {
        let serialized = {
            let mut state = self.state.lock();
            state.pending_writes = 0;
            serde_json::to_string(&state.entries).context("Failed to serialize HTTP cache")?
        };
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create cache directory for {:?}", self.path))?;
        }
        std::fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write HTTP cache {:?}", self.path))?;
        Ok(())
    }

    /// Number of cached responses
    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    /// True when nothing is cached
    pub fn is_empty(&self) -> bool {
        self.state.lock().entries.is_empty()
    }
}
