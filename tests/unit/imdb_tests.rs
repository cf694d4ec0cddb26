/*!
 * Tests for catalog resolution against the suggestion service
 */

use anyhow::Result;
use std::sync::Arc;

use subagent::http_cache::CachedHttpClient;
use subagent::providers::imdb::{CatalogEntity, ImdbApi, SourceQuery, TitleKind};

use crate::common::{self, fakes::FakeTransport};

fn api(transport: Arc<FakeTransport>) -> Result<(ImdbApi, tempfile::TempDir)> {
    let dir = common::create_temp_dir()?;
    let http = Arc::new(CachedHttpClient::open(
        dir.path().join("imdb_http_cache.json"),
        transport,
    )?);
    Ok((ImdbApi::with_endpoint(http, "http://imdb.test"), dir))
}

fn entity(query: &str, title: &str, kind: TitleKind, year: u32, rank: u64) -> CatalogEntity {
    let source_year = subagent::query_extractor::year(query).unwrap_or(0);
    let mut normalized_title = subagent::query_extractor::from_text(title);
    if source_year > 0 && year > 0 {
        normalized_title = subagent::query_extractor::ensure_year(&normalized_title, year);
    }
    CatalogEntity {
        id: "tt0000001".to_string(),
        title: title.to_string(),
        kind,
        rank,
        year,
        normalized_title,
        source: SourceQuery {
            query: query.to_string(),
            year: source_year,
        },
    }
}

/// Test that scoring is a pure function of the entity
#[test]
fn test_score_withSameEntity_shouldBeStable() {
    let e = entity("heat_1995", "Heat", TitleKind::Feature, 1995, 1000);
    assert_eq!(ImdbApi::score(&e), ImdbApi::score(&e));
}

/// Test that a feature film outscores a video game with the same title
#[test]
fn test_score_withFeatureAndVideoGame_shouldPreferFeature() {
    let feature = entity("heat_1995", "Heat", TitleKind::Feature, 1995, 1000);
    let game = entity("heat_1995", "Heat", TitleKind::VideoGame, 1995, 1000);
    assert!(ImdbApi::score(&feature) > ImdbApi::score(&game));
}

/// Test that an exact year beats a near miss even at a worse rank
#[test]
fn test_score_withExactYear_shouldBeatNearMiss() {
    let exact = entity("heat_1995", "Heat", TitleKind::Feature, 1995, 5000);
    let near = entity("heat_1995", "Heat", TitleKind::Feature, 1993, 100);
    assert!(ImdbApi::score(&exact) > ImdbApi::score(&near));
}

/// Test that a popular title outscores an obscure one, all else equal
#[test]
fn test_score_withLowerRank_shouldScoreHigher() {
    let popular = entity("heat_1995", "Heat", TitleKind::Feature, 1995, 100);
    let obscure = entity("heat_1995", "Heat", TitleKind::Feature, 1995, 1_000_000);
    assert!(ImdbApi::score(&popular) > ImdbApi::score(&obscure));
}

/// Test that resolution picks the feature over a same-titled video game
#[tokio::test]
async fn test_resolve_withMixedKinds_shouldPickFeature() -> Result<()> {
    let transport = Arc::new(FakeTransport::new());
    transport.respond(
        "http://imdb.test/suggestion/h/heat_1995.json",
        200,
        &common::suggestion_json(&[
            ("tt0113277", "Heat", "feature", 1995, 1000),
            ("tt9900001", "Heat", "video game", 1995, 500),
        ]),
    );
    let (api, _dir) = api(transport)?;
    let resolved = api.resolve("heat_1995").await?;
    assert_eq!(resolved.id, "tt0113277");
    assert_eq!(resolved.kind, TitleKind::Feature);
    Ok(())
}

/// Test that non-title identifiers are filtered out
#[tokio::test]
async fn test_resolve_withNonTitleResults_shouldReturnSentinel() -> Result<()> {
    let transport = Arc::new(FakeTransport::new());
    transport.respond(
        "http://imdb.test/suggestion/h/heat_1995.json",
        200,
        &common::suggestion_json(&[("nm0000199", "Heat Actor", "feature", 1995, 10)]),
    );
    let (api, _dir) = api(transport)?;
    let resolved = api.resolve("heat_1995").await?;
    assert!(!resolved.is_match());
    Ok(())
}

/// Test that an empty service answer yields the no-match sentinel with the
/// source query preserved
#[tokio::test]
async fn test_resolve_withNoResults_shouldReturnSentinel() -> Result<()> {
    let transport = Arc::new(FakeTransport::new());
    let (api, _dir) = api(transport)?;
    let resolved = api.resolve("nonexistent_film_2099").await?;
    assert!(!resolved.is_match());
    assert_eq!(resolved.source.query, "nonexistent_film_2099");
    Ok(())
}

/// Test that the year-stripped lookup rescues titles listed without a year
#[tokio::test]
async fn test_resolve_withYearStrippedLookup_shouldFindTitle() -> Result<()> {
    let transport = Arc::new(FakeTransport::new());
    transport.respond(
        "http://imdb.test/suggestion/h/heat.json",
        200,
        &common::suggestion_json(&[("tt0113277", "Heat", "feature", 1995, 1000)]),
    );
    let (api, _dir) = api(transport)?;
    let resolved = api.resolve("heat_1995").await?;
    assert_eq!(resolved.id, "tt0113277");
    Ok(())
}

/// Test that several comma-joined candidates are all considered
#[tokio::test]
async fn test_resolve_withMultipleCandidates_shouldConsiderAll() -> Result<()> {
    let transport = Arc::new(FakeTransport::new());
    transport.respond(
        "http://imdb.test/suggestion/w/wrong_name_1995.json",
        200,
        &common::suggestion_json(&[("tt0000002", "Unrelated", "feature", 1960, 900_000)]),
    );
    transport.respond(
        "http://imdb.test/suggestion/h/heat_1995.json",
        200,
        &common::suggestion_json(&[("tt0113277", "Heat", "feature", 1995, 1000)]),
    );
    let (api, _dir) = api(transport)?;
    let resolved = api.resolve("wrong_name_1995,heat_1995").await?;
    assert_eq!(resolved.id, "tt0113277");
    Ok(())
}
