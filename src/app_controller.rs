/*!
 * Pipeline orchestrator.
 *
 * Ties the whole chain together: derive search queries from video paths,
 * resolve them against the title catalog, fetch candidate subtitles,
 * align each against the video and keep the best-scoring result per
 * language. Scans are serialized and debounced so overlapping triggers
 * collapse into one pass.
 */

use anyhow::{Context, Result};
use futures::stream::{self, StreamExt};
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use crate::app_config::Config;
use crate::database::Database;
use crate::errors::AlignmentError;
use crate::file_utils::FileManager;
use crate::http_cache::{CachedHttpClient, HttpTransport, ReqwestTransport};
use crate::language_utils::SubtitleLanguage;
use crate::providers::imdb::{CatalogEntity, ImdbApi};
use crate::providers::opensubtitles::{OpenSubtitlesApi, SubtitleBlob, SubtitleFileRef};
use crate::query_extractor;
use crate::subsync::{Aligner, AlignmentResult, SubsyncAligner, SyncFailureCache};
use crate::subtitle_processor;

/// At most this many candidates are aligned per video and language
const MAX_CANDIDATES: usize = 5;

/// A fit shifting subtitles by less than this is as good as it gets;
/// stop trying further candidates
const PERFECT_MAX_CHANGE: f64 = 1.0;

/// Metadata persisted next to each accepted subtitle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubtitleRecord {
    pub file_id: u64,
    pub release: Option<String>,
    pub result: AlignmentResult,
}

/// An accepted subtitle from an earlier language round, usable as a
/// timing reference for languages that found nothing against the video
struct ReferenceSubtitle {
    path: PathBuf,
    points: u64,
}

/// A fully aligned candidate awaiting selection
struct RankedCandidate {
    file: SubtitleFileRef,
    contents: String,
    extension: String,
    result: AlignmentResult,
    /// Score after cross-reference damping, used for selection
    effective_score: f64,
}

pub struct Controller {
    config: Config,
    db: Arc<Database>,
    imdb: ImdbApi,
    opensubtitles: OpenSubtitlesApi,
    aligner: Arc<dyn Aligner>,
    failures: SyncFailureCache,
    work_dir: PathBuf,
    scan_lock: tokio::sync::Mutex<()>,
    last_scan: Mutex<Option<Instant>>,
}

impl Controller {
    /// Build a controller with the production transport and synchronizer.
    pub fn with_config(config: Config) -> Result<Self> {
        let transport: Arc<dyn HttpTransport> = Arc::new(ReqwestTransport::new());
        let aligner: Arc<dyn Aligner> = Arc::new(SubsyncAligner::new(
            config.subsync.binary.clone(),
            config.subsync.effort,
        ));
        Self::with_parts(config, transport, aligner)
    }

    /// Build a controller around injected transport and aligner; the seam
    /// tests use to run the full pipeline without network or subprocesses.
    pub fn with_parts(
        config: Config,
        transport: Arc<dyn HttpTransport>,
        aligner: Arc<dyn Aligner>,
    ) -> Result<Self> {
        FileManager::ensure_dir(&config.cache_dir)?;
        let db = Arc::new(Database::open(config.cache_dir.join("database.json"))?);
        let imdb_http = Arc::new(CachedHttpClient::open(
            config.cache_dir.join("imdb_http_cache.json"),
            transport.clone(),
        )?);
        let os_http = Arc::new(CachedHttpClient::open(
            config.cache_dir.join("opensubtitle_http_cache.json"),
            transport,
        )?);
        let imdb = ImdbApi::new(imdb_http);
        let opensubtitles = OpenSubtitlesApi::with_endpoint(
            os_http,
            config.opensubtitles.api_keys.clone(),
            config.cache_dir.join("subtitles"),
            config.opensubtitles.endpoint.clone(),
        )
        .with_user_agent(config.opensubtitles.user_agent.clone());
        let failures = SyncFailureCache::new(db.clone());
        let work_dir = config.cache_dir.join("work");
        Ok(Self {
            config,
            db,
            imdb,
            opensubtitles,
            aligner,
            failures,
            work_dir,
            scan_lock: tokio::sync::Mutex::new(()),
            last_scan: Mutex::new(None),
        })
    }

    /// Request a scan. Returns false without scanning when another scan is
    /// already running or one started within the debounce window.
    pub async fn try_scan(&self, root: &Path) -> Result<bool> {
        let guard = match self.scan_lock.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                debug!("Scan already in progress, skipping trigger");
                return Ok(false);
            }
        };
        let debounce = std::time::Duration::from_secs(self.config.scan.debounce_secs);
        {
            let last = self.last_scan.lock();
            if let Some(finished) = *last {
                if finished.elapsed() < debounce {
                    debug!("Scan trigger debounced");
                    return Ok(false);
                }
            }
        }
        let outcome = self.scan(root).await;
        // Debounce counts from scan completion, not from its start.
        *self.last_scan.lock() = Some(Instant::now());
        drop(guard);
        outcome?;
        Ok(true)
    }

    /// Walk the library and process every qualifying video.
    pub async fn scan(&self, root: &Path) -> Result<()> {
        info!("Scanning {:?}", root);
        let videos: Vec<PathBuf> = FileManager::find_video_files(root)?
            .into_iter()
            .filter(|path| {
                FileManager::file_size(path)
                    .map(|size| size >= self.config.scan.min_movie_size)
                    .unwrap_or(false)
            })
            .collect();
        info!("Found {} video files to process", videos.len());

        stream::iter(videos)
            .map(|video| async move {
                if let Err(e) = self.process_video(&video).await {
                    error!("Failed to process {:?}: {}", video, e);
                }
            })
            .buffer_unordered(self.config.scan.concurrency)
            .collect::<Vec<_>>()
            .await;

        info!("Scan of {:?} finished", root);
        Ok(())
    }

    /// Process one video across all configured languages.
    pub async fn process_video(&self, video: &Path) -> Result<()> {
        let entity = match self.resolve_entity(video).await? {
            Some(entity) => entity,
            None => {
                warn!("No catalog match for {:?}, skipping", video);
                return Ok(());
            }
        };
        debug!(
            "{:?} resolved to {} ({})",
            video.file_name().unwrap_or_default(),
            entity.title,
            entity.id
        );

        let languages: Vec<SubtitleLanguage> = self
            .config
            .languages
            .iter()
            .filter_map(|code| SubtitleLanguage::parse(code).ok())
            .collect();

        let mut accepted: Vec<ReferenceSubtitle> = Vec::new();
        let mut unresolved: Vec<SubtitleLanguage> = Vec::new();

        for language in languages {
            match self.process_language(video, &entity, &language, None).await {
                Ok(Some(reference)) => accepted.push(reference),
                Ok(None) => unresolved.push(language),
                Err(e) => {
                    if is_unalignable(&e) {
                        warn!("{:?} cannot be aligned at all, abandoning", video);
                        return Ok(());
                    }
                    error!("Failed {} subtitles for {:?}: {}", language.name, video, e);
                }
            }
        }

        // Languages that found nothing get one more round, this time
        // aligning against a subtitle that already fit this video.
        if let Some(reference) = accepted.first() {
            for language in unresolved {
                if let Err(e) = self
                    .process_language(video, &entity, &language, Some(reference))
                    .await
                {
                    if is_unalignable(&e) {
                        return Ok(());
                    }
                    error!("Failed {} subtitles for {:?}: {}", language.name, video, e);
                }
            }
        }
        Ok(())
    }

    /// Resolve the catalog entity for a video, consulting the database
    /// first. Only positive matches are cached so an unmatched video is
    /// retried on the next scan.
    async fn resolve_entity(&self, video: &Path) -> Result<Option<CatalogEntity>> {
        let key = format!("imdb:{}", video.display());
        if let Some(entity) = self.db.load_as::<CatalogEntity>(&key) {
            if entity.is_match() {
                return Ok(Some(entity));
            }
        }
        let queries = query_extractor::from_path(&video.to_string_lossy());
        if queries.is_empty() {
            return Ok(None);
        }
        let entity = self.imdb.resolve(&queries).await?;
        if !entity.is_match() {
            return Ok(None);
        }
        self.db.store(&key, &entity)?;
        Ok(Some(entity))
    }

    /// Fetch, align and select a subtitle for one language. Returns the
    /// accepted subtitle for use as a cross-language reference, or `None`
    /// when no candidate passed.
    async fn process_language(
        &self,
        video: &Path,
        entity: &CatalogEntity,
        language: &SubtitleLanguage,
        reference: Option<&ReferenceSubtitle>,
    ) -> Result<Option<ReferenceSubtitle>> {
        if FileManager::has_generated_subtitle(video, &language.file_code) {
            debug!(
                "{} subtitle already present for {:?}",
                language.name,
                video.file_name().unwrap_or_default()
            );
            return Ok(None);
        }

        let mut candidates = self
            .opensubtitles
            .list(&entity.id, &language.query_code)
            .await?;
        if candidates.is_empty() {
            info!(
                "No {} subtitles available for {}",
                language.name, entity.title
            );
            return Ok(None);
        }
        order_candidates(&mut candidates, video);
        candidates.truncate(MAX_CANDIDATES);

        // Failures are keyed by the alignment reference, so the cross-
        // reference round is not blocked by first-round records.
        let (failure_ref, failure_ref_size) = match reference {
            Some(r) => (r.path.clone(), FileManager::file_size(&r.path)?),
            None => (video.to_path_buf(), FileManager::file_size(video)?),
        };
        let damping = reference
            .map(|r| ((r.points as f64 / 20.0).log10()).clamp(0.0, 1.0))
            .unwrap_or(1.0);

        let mut ranked: Vec<RankedCandidate> = Vec::new();
        for candidate in candidates {
            if self
                .failures
                .contains(&failure_ref, failure_ref_size, candidate.file_id)
            {
                debug!("Candidate {} known not to align, skipping", candidate.file_id);
                continue;
            }
            let blob = match self.opensubtitles.download(&candidate).await? {
                Some(blob) => blob,
                None => continue,
            };

            let outcome = self
                .align_candidate(video, &blob, language, reference)
                .await?;
            let (result, contents) = match outcome {
                Some(outcome) => outcome,
                None => {
                    self.failures
                        .record(&failure_ref, failure_ref_size, candidate.file_id)?;
                    continue;
                }
            };
            if !result.correlated {
                self.failures
                    .record(&failure_ref, failure_ref_size, candidate.file_id)?;
                continue;
            }

            let essentially_perfect = result.max_change < PERFECT_MAX_CHANGE;
            ranked.push(RankedCandidate {
                file: candidate,
                contents,
                extension: blob.extension,
                effective_score: result.score * damping,
                result,
            });
            if essentially_perfect {
                break;
            }
        }

        let best = ranked.into_iter().max_by(|a, b| {
            a.effective_score
                .partial_cmp(&b.effective_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        let best = match best {
            Some(best) => best,
            None => return Ok(None),
        };

        let output = FileManager::generated_subtitle_path(
            video,
            &language.file_code,
            &best.extension,
        );
        FileManager::write_to_file(&output, &best.contents)?;
        info!(
            "Accepted {} subtitle for {:?} (points={}, maxChange={:.3}, score={:.1})",
            language.name,
            video.file_name().unwrap_or_default(),
            best.result.points,
            best.result.max_change,
            best.result.score
        );
        let record = SubtitleRecord {
            file_id: best.file.file_id,
            release: best.file.release,
            result: best.result.clone(),
        };
        self.db
            .store(&format!("subtitle:{}", output.display()), &record)?;

        Ok(Some(ReferenceSubtitle {
            path: output,
            points: best.result.points,
        }))
    }

    /// Run the synchronizer for one downloaded candidate. Against a video
    /// the embedded subtitle stream is tried before the audio track; the
    /// better fit wins. Returns the result and the aligned subtitle text.
    async fn align_candidate(
        &self,
        video: &Path,
        blob: &SubtitleBlob,
        language: &SubtitleLanguage,
        reference: Option<&ReferenceSubtitle>,
    ) -> Result<Option<(AlignmentResult, String)>, AlignmentError> {
        std::fs::create_dir_all(&self.work_dir)?;
        // Scratch files live in a per-call directory; concurrent videos may
        // align the same candidate file_id at the same time.
        let scratch = tempfile::Builder::new()
            .prefix("align-")
            .tempdir_in(&self.work_dir)?;
        let input = scratch
            .path()
            .join(format!("{}{}", blob.file_id, blob.extension));
        let contents = if blob.extension == ".srt" {
            subtitle_processor::fix_srt(&blob.contents)
        } else {
            blob.contents.clone()
        };
        std::fs::write(&input, &contents)?;
        let output = scratch
            .path()
            .join(format!("{}.{}.aligned.srt", blob.file_id, language.file_code));

        let attempts: Vec<(&Path, Vec<String>)> = match reference {
            Some(reference) => vec![(reference.path.as_path(), Vec::new())],
            None => vec![
                (video, vec!["--ref-stream-by-type=sub".to_string()]),
                (video, vec!["--ref-stream-by-type=audio".to_string()]),
            ],
        };

        let attempt_count = attempts.len();
        let mut best: Option<AlignmentResult> = None;
        let mut best_contents = String::new();
        let mut unalignable: Option<AlignmentError> = None;
        let mut unalignable_count = 0usize;
        for (reference_path, args) in attempts {
            // One reference stream coming up empty is fine as long as
            // another attempt still observes sync points.
            let result = match self.aligner.align(reference_path, &input, &output, &args).await {
                Ok(result) => result,
                Err(e @ AlignmentError::Unalignable { .. }) => {
                    unalignable_count += 1;
                    unalignable = Some(e);
                    continue;
                }
                Err(e) => return Err(e),
            };
            let result = match result {
                Some(result) => result,
                None => continue,
            };
            let better = best
                .as_ref()
                .map(|b| result.score > b.score)
                .unwrap_or(true);
            if better {
                if result.correlated {
                    best_contents = std::fs::read_to_string(&output)?;
                }
                let done = result.correlated && result.max_change < PERFECT_MAX_CHANGE;
                best = Some(result);
                if done {
                    break;
                }
            }
        }

        scratch.close()?;
        if let Some(e) = unalignable {
            if unalignable_count == attempt_count {
                return Err(e);
            }
        }
        Ok(best.map(|result| (result, best_contents)))
    }

    /// Wipe everything SubAgent wrote under a library root: generated
    /// subtitle files plus their database records.
    pub fn clean(&self, root: &Path) -> Result<()> {
        let mut removed = 0usize;
        for entry in walkdir::WalkDir::new(root)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
        {
            let name = entry.file_name().to_string_lossy();
            if name.contains(crate::file_utils::GENERATED_MARKER) {
                FileManager::remove_if_exists(entry.path())
                    .with_context(|| format!("Failed to remove {:?}", entry.path()))?;
                self.db
                    .remove(&format!("subtitle:{}", entry.path().display()))?;
                removed += 1;
            }
        }
        self.failures.clear()?;
        info!("Removed {} generated subtitle files", removed);
        Ok(())
    }
}

fn is_unalignable(error: &anyhow::Error) -> bool {
    matches!(
        error.downcast_ref::<AlignmentError>(),
        Some(AlignmentError::Unalignable { .. })
    )
}

/// Order candidates so releases matching the video's special edition come
/// first. The sort is stable, so the service's own relevance order is
/// preserved within each band.
fn order_candidates(candidates: &mut [SubtitleFileRef], video: &Path) {
    let video_edition = query_extractor::special_release_type(&video.to_string_lossy());
    candidates.sort_by_key(|candidate| {
        let release = candidate
            .release
            .clone()
            .or_else(|| candidate.file_name.clone())
            .unwrap_or_default();
        let edition = query_extractor::special_release_type(&release);
        if edition == video_edition {
            0
        } else if edition.is_some() {
            1
        } else {
            2
        }
    });
}
