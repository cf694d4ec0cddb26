/*!
 * Tests for the subtitle provider and its API key pool
 */

use anyhow::Result;
use std::sync::Arc;
use tempfile::TempDir;

use subagent::http_cache::CachedHttpClient;
use subagent::providers::opensubtitles::{ApiKeyPool, OpenSubtitlesApi, SubtitleFileRef};

use crate::common::{self, fakes::FakeTransport};

fn api(
    transport: Arc<FakeTransport>,
    keys: Vec<String>,
) -> Result<(OpenSubtitlesApi, TempDir)> {
    let dir = common::create_temp_dir()?;
    let http = Arc::new(CachedHttpClient::open(
        dir.path().join("os_http_cache.json"),
        transport,
    )?);
    let api = OpenSubtitlesApi::with_endpoint(
        http,
        keys,
        dir.path().join("subtitles"),
        "http://os.test",
    );
    Ok((api, dir))
}

fn file_ref(file_id: u64) -> SubtitleFileRef {
    SubtitleFileRef {
        file_id,
        file_name: Some(format!("{}.srt", file_id)),
        release: None,
    }
}

/// Test that listing strips the tt prefix and leading zeros from the id
#[tokio::test]
async fn test_list_withCatalogId_shouldQueryNumericId() -> Result<()> {
    let transport = Arc::new(FakeTransport::new());
    transport.respond(
        "http://os.test/subtitles?imdb_id=113277&languages=en",
        200,
        &common::listing_json(&[(11, "heat.srt", "Heat.1995.BluRay")]),
    );
    let (api, _dir) = api(transport.clone(), vec!["key-a".to_string()])?;
    let files = api.list("tt0113277", "en").await?;
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].file_id, 11);
    assert_eq!(files[0].release.as_deref(), Some("Heat.1995.BluRay"));
    Ok(())
}

/// Test that multi-file bundles and entries without a file id are rejected
#[tokio::test]
async fn test_list_withBundlesAndBrokenEntries_shouldRejectThem() -> Result<()> {
    let body = serde_json::json!({
        "data": [
            { "attributes": { "release": "Good.Release", "files": [{ "file_id": 1, "file_name": "a.srt" }] } },
            { "attributes": { "release": "Two.CD.Release", "files": [
                { "file_id": 2, "file_name": "cd1.srt" },
                { "file_id": 3, "file_name": "cd2.srt" }
            ] } },
            { "attributes": { "release": "Broken.Release", "files": [{ "file_name": "no_id.srt" }] } }
        ]
    })
    .to_string();
    let transport = Arc::new(FakeTransport::new());
    transport.respond("http://os.test/subtitles?imdb_id=11&languages=en", 200, &body);
    let (api, _dir) = api(transport, vec!["key-a".to_string()])?;
    let files = api.list("tt0000011", "en").await?;
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].file_id, 1);
    Ok(())
}

/// Test that an empty catalog id lists nothing without touching the network
#[tokio::test]
async fn test_list_withEmptyId_shouldReturnNothing() -> Result<()> {
    let transport = Arc::new(FakeTransport::new());
    let (api, _dir) = api(transport.clone(), vec!["key-a".to_string()])?;
    assert!(api.list("", "en").await?.is_empty());
    assert!(transport.requests().is_empty());
    Ok(())
}

/// Test the happy download path: request a link, fetch it, cache the blob
#[tokio::test]
async fn test_download_withValidFile_shouldFetchAndCache() -> Result<()> {
    let transport = Arc::new(FakeTransport::new());
    transport.respond(
        "http://os.test/download",
        200,
        &common::download_json(Some("http://dl.test/42.srt"), "heat.srt", 5),
    );
    transport.respond("http://dl.test/42.srt", 200, common::sample_srt());
    let (api, _dir) = api(transport.clone(), vec!["key-a".to_string()])?;

    let blob = api.download(&file_ref(42)).await?.expect("blob");
    assert_eq!(blob.file_id, 42);
    assert_eq!(blob.extension, ".srt");
    assert_eq!(blob.contents, common::sample_srt());

    // Second download must come from the blob cache
    let requests_before = transport.requests().len();
    let cached = api.download(&file_ref(42)).await?.expect("cached blob");
    assert_eq!(cached.contents, blob.contents);
    assert_eq!(transport.requests().len(), requests_before);
    Ok(())
}

/// Test that an exhausted key rotates to the next one and retries
#[tokio::test]
async fn test_download_withExhaustedKey_shouldRotateAndRetry() -> Result<()> {
    let transport = Arc::new(FakeTransport::new());
    // First key is out of quota; the retry on the second key succeeds.
    transport.respond(
        "http://os.test/download",
        406,
        &common::download_json(None, "heat.srt", -1),
    );
    transport.respond(
        "http://os.test/download",
        200,
        &common::download_json(Some("http://dl.test/7.srt"), "heat.srt", 90),
    );
    transport.respond("http://dl.test/7.srt", 200, common::sample_srt());
    let (api, _dir) = api(
        transport.clone(),
        vec!["key-a".to_string(), "key-b".to_string()],
    )?;

    let blob = api.download(&file_ref(7)).await?.expect("blob");
    assert_eq!(blob.file_id, 7);
    let posts = transport
        .requests()
        .iter()
        .filter(|r| r.method == "POST")
        .count();
    assert_eq!(posts, 2);
    assert!(!api.blocked());
    Ok(())
}

/// Test that a fully exhausted pool blocks instead of hammering the service
#[tokio::test]
async fn test_download_withAllKeysExhausted_shouldBlock() -> Result<()> {
    let transport = Arc::new(FakeTransport::new());
    transport.respond(
        "http://os.test/download",
        406,
        &common::download_json(None, "heat.srt", -1),
    );
    let (api, _dir) = api(transport.clone(), vec!["key-a".to_string()])?;

    assert!(api.download(&file_ref(9)).await?.is_none());
    assert!(api.blocked());

    // Further downloads must not touch the network at all
    let requests_before = transport.requests().len();
    assert!(api.download(&file_ref(10)).await?.is_none());
    assert_eq!(transport.requests().len(), requests_before);
    Ok(())
}

/// Test that a response with quota left but no link yields nothing
#[tokio::test]
async fn test_download_withNoLink_shouldReturnNothing() -> Result<()> {
    let transport = Arc::new(FakeTransport::new());
    transport.respond(
        "http://os.test/download",
        200,
        &common::download_json(None, "heat.srt", 12),
    );
    let (api, _dir) = api(transport, vec!["key-a".to_string()])?;
    assert!(api.download(&file_ref(5)).await?.is_none());
    assert!(!api.blocked());
    Ok(())
}

/// Test pool rotation bookkeeping directly
#[test]
fn test_api_key_pool_withRotation_shouldKeepAllKeys() {
    let mut pool = ApiKeyPool::new(vec!["a".to_string(), "b".to_string()]);
    assert_eq!(pool.len(), 2);
    assert_eq!(pool.active_key(), Some("a"));
    assert!(!pool.blocked());

    let future = chrono::Utc::now() + chrono::Duration::hours(6);
    pool.rotate(Some(future));
    assert_eq!(pool.len(), 2);
    assert_eq!(pool.active_key(), Some("b"));
    assert!(!pool.blocked());

    pool.rotate(Some(future));
    // Wrapped back to the first key, whose reset is still in the future
    assert_eq!(pool.active_key(), Some("a"));
    assert!(pool.blocked());
}

/// Test that an expired reset time unblocks the pool
#[test]
fn test_api_key_pool_withExpiredReset_shouldUnblock() {
    let mut pool = ApiKeyPool::new(vec!["a".to_string()]);
    let past = chrono::Utc::now() - chrono::Duration::hours(1);
    pool.rotate(Some(past));
    assert!(!pool.blocked());
}
