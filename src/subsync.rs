/*!
 * Subtitle alignment through the external `subsync` tool.
 *
 * Spawns one synchronization process per candidate subtitle, streams its
 * log output to extract fit statistics, and condenses them into a single
 * comparable score. A persistent failure cache remembers (video, subtitle)
 * pairs that can never align so they are not retried on later scans.
 */

use anyhow::Result;
use async_trait::async_trait;
use log::{debug, error, info, warn};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

use crate::database::Database;
use crate::errors::AlignmentError;

/// Scores below this mark a synchronization as not trustworthy even when
/// the tool itself claims correlation.
pub const CONFIDENCE_FLOOR: f64 = 2.5;

/// Guards the score against division by a vanishing max change
const SCORE_EPSILON: f64 = 1e-3;

/// Pessimistic max change used when the tool never reported one
const DEFAULT_MAX_CHANGE: f64 = 10_000.0;

/// Database key holding the set of known-unalignable pairs
const FAILURE_CACHE_KEY: &str = "alignment_failures";

static POINTS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"points=(\d+)").unwrap());
static MAX_CHANGE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"maxChange=(\d+\.\d+)").unwrap());
static CORRELATED_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"correlated=(True|False)").unwrap());
static PROGRESS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d\d:\d\d:\d\d\.\d\d\d:").unwrap());

/// Log markers after which the process can only spin without producing
/// anything useful; seeing one aborts the run.
const FATAL_MARKERS: &[&str] = &[
    "speech recognition model is missing",
    "premature end of data",
];

/// Outcome of one synchronization run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlignmentResult {
    /// Whether the fit is trusted; combines the tool's own verdict with
    /// the confidence floor
    pub correlated: bool,
    /// Number of synchronization points the tool locked onto
    pub points: u64,
    /// Largest timing shift applied, in seconds
    pub max_change: f64,
    /// Comparable quality score, higher is better
    pub score: f64,
}

/// Accumulates statistics from the tool's log stream. Values are reported
/// repeatedly as the run refines them; the last occurrence wins.
#[derive(Debug, Default)]
pub struct AlignmentStats {
    points: Option<u64>,
    max_change: Option<f64>,
    correlated: Option<bool>,
    fatal: bool,
}

impl AlignmentStats {
    /// Digest one log line, updating statistics and deciding whether the
    /// line deserves to be forwarded to our own log.
    pub fn observe_line(&mut self, line: &str) {
        if let Some(caps) = POINTS_RE.captures(line) {
            self.points = caps[1].parse().ok();
        }
        if let Some(caps) = MAX_CHANGE_RE.captures(line) {
            self.max_change = caps[1].parse().ok();
        }
        if let Some(caps) = CORRELATED_RE.captures(line) {
            self.correlated = Some(&caps[1] == "True");
        }
        for marker in FATAL_MARKERS {
            if line.contains(marker) {
                error!("Synchronizer reported a fatal condition: {}", line.trim());
                self.fatal = true;
                return;
            }
        }
        if line.contains("ERROR") {
            warn!("subsync: {}", line.trim());
        } else if !PROGRESS_RE.is_match(line) && !line.trim().is_empty() {
            debug!("subsync: {}", line.trim());
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.fatal
    }

    /// Condense the collected statistics into a result. Returns `None`
    /// when the run produced no fit at all.
    pub fn into_result(self, exit_ok: bool) -> Option<AlignmentResult> {
        let points = self.points?;
        let max_change = self.max_change.unwrap_or(DEFAULT_MAX_CHANGE);
        let score = points as f64 / max_change.max(SCORE_EPSILON).sqrt();
        let correlated =
            exit_ok && self.correlated.unwrap_or(false) && score >= CONFIDENCE_FLOOR;
        Some(AlignmentResult {
            correlated,
            points,
            max_change,
            score,
        })
    }
}

/// Synchronization backend; a trait so tests can run without the tool
#[async_trait]
pub trait Aligner: Send + Sync {
    /// Align `subtitle_in` against the reference video, writing the
    /// synchronized output to `subtitle_out`.
    async fn align(
        &self,
        reference: &Path,
        subtitle_in: &Path,
        subtitle_out: &Path,
        extra_args: &[String],
    ) -> Result<Option<AlignmentResult>, AlignmentError>;
}

/// Production backend spawning the `subsync` command line tool
pub struct SubsyncAligner {
    binary: String,
    effort: f64,
}

impl SubsyncAligner {
    pub fn new(binary: impl Into<String>, effort: f64) -> Self {
        Self {
            binary: binary.into(),
            effort,
        }
    }
}

#[async_trait]
impl Aligner for SubsyncAligner {
    async fn align(
        &self,
        reference: &Path,
        subtitle_in: &Path,
        subtitle_out: &Path,
        extra_args: &[String],
    ) -> Result<Option<AlignmentResult>, AlignmentError> {
        info!(
            "Synchronizing {:?} against {:?}",
            subtitle_in.file_name().unwrap_or_default(),
            reference.file_name().unwrap_or_default()
        );

        let mut command = Command::new(&self.binary);
        command
            .arg("-c")
            .arg("--overwrite")
            .arg("--loglevel=INFO")
            .arg(format!("--effort={}", self.effort))
            .arg("sync")
            .arg("--ref")
            .arg(reference)
            .arg("--sub")
            .arg(subtitle_in)
            .arg("--out")
            .arg(subtitle_out)
            .args(extra_args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command.spawn().map_err(|e| AlignmentError::Spawn {
            tool: self.binary.clone(),
            message: e.to_string(),
        })?;

        let stats = Arc::new(Mutex::new(AlignmentStats::default()));
        let fatal = Arc::new(AtomicBool::new(false));

        let mut readers = Vec::new();
        if let Some(stdout) = child.stdout.take() {
            readers.push(spawn_line_reader(stdout, stats.clone(), fatal.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(spawn_line_reader(stderr, stats.clone(), fatal.clone()));
        }

        // Poll the child so a fatal log marker can abort it mid-run.
        let status = loop {
            if fatal.load(Ordering::Relaxed) {
                let _ = child.start_kill();
            }
            match child.try_wait()? {
                Some(status) => break status,
                None => tokio::time::sleep(Duration::from_millis(200)).await,
            }
        };
        for reader in readers {
            let _ = reader.await;
        }

        let stats = Arc::try_unwrap(stats)
            .map(|m| m.into_inner())
            .unwrap_or_default();
        if stats.is_fatal() {
            return Err(AlignmentError::Unalignable {
                reference: reference.to_path_buf(),
            });
        }
        // A run that never reported a single sync point could not read the
        // reference at all; no other candidate will fare better against it.
        match stats.into_result(status.success()) {
            Some(result) => Ok(Some(result)),
            None => Err(AlignmentError::Unalignable {
                reference: reference.to_path_buf(),
            }),
        }
    }
}

fn spawn_line_reader<R>(
    stream: R,
    stats: Arc<Mutex<AlignmentStats>>,
    fatal: Arc<AtomicBool>,
) -> tokio::task::JoinHandle<()>
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(stream).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let mut stats = stats.lock();
            stats.observe_line(&line);
            if stats.is_fatal() {
                fatal.store(true, Ordering::Relaxed);
            }
        }
    })
}

/// Persistent set of (reference, subtitle file) pairs that failed to
/// align. Keyed by reference path, size and subtitle file id so replacing
/// the reference file invalidates the record.
pub struct SyncFailureCache {
    db: Arc<Database>,
}

impl SyncFailureCache {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    fn composite_key(reference: &Path, size: u64, file_id: u64) -> String {
        format!("{}|{}|{}", reference.display(), size, file_id)
    }

    fn load_set(&self) -> HashSet<String> {
        self.db
            .load_as::<HashSet<String>>(FAILURE_CACHE_KEY)
            .unwrap_or_default()
    }

    pub fn contains(&self, reference: &Path, size: u64, file_id: u64) -> bool {
        self.load_set()
            .contains(&Self::composite_key(reference, size, file_id))
    }

    pub fn record(&self, reference: &Path, size: u64, file_id: u64) -> Result<()> {
        let mut set = self.load_set();
        set.insert(Self::composite_key(reference, size, file_id));
        self.db.store(FAILURE_CACHE_KEY, &set)
    }

    /// Drop every recorded failure.
    pub fn clear(&self) -> Result<()> {
        self.db.remove(FAILURE_CACHE_KEY).map(|_| ())
    }
}
