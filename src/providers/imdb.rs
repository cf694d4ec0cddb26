/*!
 * Catalog resolver backed by the IMDb title-suggestion service.
 *
 * Takes the query candidates produced by the extractor, issues suggestion
 * lookups, scores every returned entry against its source query and picks
 * the winner. Responses flow through the shared HTTP cache.
 */

use anyhow::Result;
use log::debug;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::http_cache::CachedHttpClient;
use crate::query_extractor;

/// Suggestion-service query ceiling (the web UI truncates at 20 characters)
const QUERY_CHAR_CEILING: usize = 20;

/// Rank assigned to entries the service returns without one
const DEFAULT_RANK: u64 = 10_000_000;

/// Closed set of title kinds; the service's open-ended strings fold into
/// `Unknown` so unseen values stay visible in logs instead of vanishing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TitleKind {
    Feature,
    Video,
    VideoGame,
    Unknown(String),
}

impl TitleKind {
    fn from_service(kind: &str) -> Self {
        match kind {
            "feature" => Self::Feature,
            "video" => Self::Video,
            "video game" => Self::VideoGame,
            other => Self::Unknown(other.to_string()),
        }
    }

    fn bonus(&self) -> f64 {
        match self {
            // Most matches should be movies.
            Self::Feature => 20.0,
            // A few movies are classified as videos.
            Self::Video => 10.0,
            // Some games share titles with movies; never pick those.
            Self::VideoGame => -100.0,
            Self::Unknown(_) => 0.0,
        }
    }
}

/// The query a catalog entity was resolved from
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceQuery {
    pub query: String,
    /// 0 when the source query carried no year
    pub year: u32,
}

/// A title record returned by the suggestion service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogEntity {
    pub id: String,
    pub title: String,
    pub kind: TitleKind,
    /// Popularity rank; lower is more popular
    pub rank: u64,
    /// 0 when unknown
    pub year: u32,
    /// Title normalized the same way file-derived queries are
    pub normalized_title: String,
    pub source: SourceQuery,
}

impl CatalogEntity {
    /// Sentinel for "no match found"; must never be cached as a positive result.
    pub fn no_match(source_query: &str) -> Self {
        Self {
            id: String::new(),
            title: String::new(),
            kind: TitleKind::Unknown(String::new()),
            rank: DEFAULT_RANK,
            year: 0,
            normalized_title: String::new(),
            source: SourceQuery {
                query: source_query.to_string(),
                year: query_extractor::year(source_query).unwrap_or(0),
            },
        }
    }

    pub fn is_match(&self) -> bool {
        !self.id.is_empty()
    }
}

#[derive(Debug, Deserialize)]
struct SuggestionEntry {
    id: Option<String>,
    /// Title
    l: Option<String>,
    /// Kind ("feature", "video", ...)
    q: Option<String>,
    /// Year
    y: Option<u32>,
    rank: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct SuggestionResponse {
    #[serde(default)]
    d: Vec<SuggestionEntry>,
}

/// Client for the title-suggestion service
pub struct ImdbApi {
    http: Arc<CachedHttpClient>,
    endpoint: String,
}

impl ImdbApi {
    pub fn new(http: Arc<CachedHttpClient>) -> Self {
        Self::with_endpoint(http, "https://v2.sg.media-imdb.com")
    }

    pub fn with_endpoint(http: Arc<CachedHttpClient>, endpoint: impl Into<String>) -> Self {
        Self {
            http,
            endpoint: endpoint.into(),
        }
    }

    /// Score a catalog entity against its source query. Pure function of the
    /// entity's fields; recomputing always yields the same value.
    pub fn score(entity: &CatalogEntity) -> f64 {
        let year_term = if entity.source.year > 0 && entity.year > 0 {
            let diff = entity.source.year.abs_diff(entity.year) as f64;
            let exact = if entity.source.year == entity.year { 5.0 } else { 0.0 };
            exact - diff * diff
        } else {
            0.0
        };
        let similarity = query_extractor::compare(&entity.source.query, &entity.normalized_title);
        // Rank is a tie-breaker, not dominant: the log keeps the divisor flat.
        (similarity + year_term + entity.kind.bonus()) / ((entity.rank + 10) as f64).ln().sqrt()
    }

    /// Resolve comma-joined query candidates (see
    /// [`query_extractor::from_path`]) into the best catalog entity.
    /// Returns a sentinel with an empty id when nothing survives.
    pub async fn resolve(&self, candidates: &str) -> Result<CatalogEntity> {
        let mut entities: Vec<CatalogEntity> = Vec::new();

        for candidate in candidates.split(',').filter(|c| !c.is_empty()) {
            let year = query_extractor::year(candidate);

            entities.extend(self.request(candidate, year, candidate).await?);
            let stripped = query_extractor::trim_year(candidate);
            entities.extend(self.request(&stripped, year, candidate).await?);

            // The service truncates long queries; retry inside the ceiling
            // if no feature has shown up yet.
            if !entities.iter().any(|e| e.kind == TitleKind::Feature) {
                let capped: String = candidate.chars().take(QUERY_CHAR_CEILING).collect();
                entities.extend(self.request(&capped, year, candidate).await?);
            }

            // Long names are sometimes prepended with junk; if the year never
            // matched and there are more than 3 tokens, drop the first two.
            if let Some(y) = year {
                let token_count = candidate.split('_').count();
                if !entities.iter().any(|e| e.year == y) && token_count > 3 {
                    let tail = candidate.splitn(3, '_').nth(2).unwrap_or("").to_string();
                    if !tail.is_empty() {
                        entities.extend(self.request(&tail, year, candidate).await?);
                    }
                }
            }
        }

        // Non-title results (names, keywords) don't carry the title prefix.
        entities.retain(|e| e.id.starts_with("tt"));

        let best = entities
            .into_iter()
            .max_by(|a, b| {
                Self::score(a)
                    .partial_cmp(&Self::score(b))
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
        match best {
            Some(entity) => {
                debug!(
                    "Resolved \"{}\" -> [{}] \"{}\" ({})",
                    candidates, entity.id, entity.title, entity.year
                );
                Ok(entity)
            }
            None => Ok(CatalogEntity::no_match(
                candidates.split(',').next().unwrap_or(candidates),
            )),
        }
    }

    async fn request(
        &self,
        query: &str,
        source_year: Option<u32>,
        source_query: &str,
    ) -> Result<Vec<CatalogEntity>> {
        if query.is_empty() {
            return Ok(Vec::new());
        }
        let first_char = query.chars().next().unwrap_or('_');
        let url = format!("{}/suggestion/{}/{}.json", self.endpoint, first_char, query);
        let response = self.http.get_cached(&url, &[]).await?;
        if !response.is_success() {
            debug!("Suggestion lookup for \"{}\" failed: {}", query, response.status);
            return Ok(Vec::new());
        }
        let parsed: SuggestionResponse = serde_json::from_str(&response.body)
            .unwrap_or(SuggestionResponse { d: Vec::new() });

        let source_year = source_year.unwrap_or(0);
        Ok(parsed
            .d
            .into_iter()
            .map(|entry| {
                let title = entry.l.unwrap_or_default();
                let year = entry.y.unwrap_or(0);
                let mut normalized_title = query_extractor::from_text(&title);
                // Carry the entity's own year when the source query has one,
                // so year-qualified queries compare like against like.
                if source_year > 0 && year > 0 {
                    normalized_title = query_extractor::ensure_year(&normalized_title, year);
                }
                CatalogEntity {
                    id: entry.id.unwrap_or_default(),
                    title,
                    kind: TitleKind::from_service(entry.q.as_deref().unwrap_or("")),
                    rank: entry.rank.unwrap_or(DEFAULT_RANK),
                    year,
                    normalized_title,
                    source: SourceQuery {
                        query: source_query.to_string(),
                        year: source_year,
                    },
                }
            })
            .collect())
    }
}
