/*!
 * Fake backends for testing
 *
 * This module provides in-memory implementations of the HTTP transport
 * and the aligner so tests exercise the full pipeline without network
 * access or external processes.
 */

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use subagent::errors::{AlignmentError, ProviderError};
use subagent::http_cache::{HttpResponse, HttpTransport};
use subagent::subsync::{Aligner, AlignmentResult};

/// One request seen by the fake transport
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: &'static str,
    pub url: String,
    pub body: Option<String>,
}

/// Transport serving canned responses keyed by URL.
///
/// Responses for a URL are consumed in order; the last one keeps being
/// served so repeated identical requests work. Unknown URLs answer 404.
#[derive(Default)]
pub struct FakeTransport {
    responses: Mutex<HashMap<String, VecDeque<HttpResponse>>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response for a URL
    pub fn respond(&self, url: &str, status: u16, body: &str) {
        self.responses
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default()
            .push_back(HttpResponse {
                status,
                body: body.to_string(),
                date: Some(Utc::now()),
            });
    }

    /// All requests seen so far
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn take(&self, url: &str) -> HttpResponse {
        let mut responses = self.responses.lock().unwrap();
        match responses.get_mut(url) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap(),
            Some(queue) if queue.len() == 1 => queue.front().unwrap().clone(),
            _ => HttpResponse {
                status: 404,
                body: String::new(),
                date: Some(Utc::now()),
            },
        }
    }

    fn record(&self, method: &'static str, url: &str, body: Option<String>) {
        self.requests.lock().unwrap().push(RecordedRequest {
            method,
            url: url.to_string(),
            body,
        });
    }
}

#[async_trait]
impl HttpTransport for FakeTransport {
    async fn get(
        &self,
        url: &str,
        _headers: &[(String, String)],
    ) -> Result<HttpResponse, ProviderError> {
        self.record("GET", url, None);
        Ok(self.take(url))
    }

    async fn post(
        &self,
        url: &str,
        _headers: &[(String, String)],
        body: String,
    ) -> Result<HttpResponse, ProviderError> {
        self.record("POST", url, Some(body));
        Ok(self.take(url))
    }
}

/// One invocation seen by the fake aligner
#[derive(Debug, Clone)]
pub struct AlignCall {
    pub reference: PathBuf,
    pub subtitle_in: PathBuf,
    pub extra_args: Vec<String>,
}

/// Aligner answering from a queue of prepared results.
///
/// An empty queue answers "no fit at all". Correlated results also write
/// a marker document to the output path, like the real tool would.
#[derive(Default)]
pub struct FakeAligner {
    results: Mutex<VecDeque<Option<AlignmentResult>>>,
    calls: Mutex<Vec<AlignCall>>,
}

impl FakeAligner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&self, result: Option<AlignmentResult>) {
        self.results.lock().unwrap().push_back(result);
    }

    pub fn calls(&self) -> Vec<AlignCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Build a result with the score derived the same way production
    /// scoring derives it
    pub fn result(points: u64, max_change: f64, correlated: bool) -> AlignmentResult {
        AlignmentResult {
            correlated,
            points,
            max_change,
            score: points as f64 / max_change.max(1e-3).sqrt(),
        }
    }
}

#[async_trait]
impl Aligner for FakeAligner {
    async fn align(
        &self,
        reference: &Path,
        subtitle_in: &Path,
        subtitle_out: &Path,
        extra_args: &[String],
    ) -> Result<Option<AlignmentResult>, AlignmentError> {
        self.calls.lock().unwrap().push(AlignCall {
            reference: reference.to_path_buf(),
            subtitle_in: subtitle_in.to_path_buf(),
            extra_args: extra_args.to_vec(),
        });
        let result = self.results.lock().unwrap().pop_front().flatten();
        if let Some(result) = &result {
            if result.correlated {
                std::fs::write(
                    subtitle_out,
                    format!("aligned points={}\n", result.points),
                )?;
            }
        }
        Ok(result)
    }
}
