/*!
 * Common test utilities for the subagent test suite
 */

use anyhow::Result;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

// Re-export the fake backends module
pub mod fakes;

/// Creates a temporary directory for test files
pub fn create_temp_dir() -> Result<TempDir> {
    Ok(TempDir::new()?)
}

/// Creates a test file with the given content in the specified directory
pub fn create_test_file(dir: &PathBuf, filename: &str, content: &str) -> Result<PathBuf> {
    let file_path = dir.join(filename);
    fs::write(&file_path, content)?;
    Ok(file_path)
}

/// Creates a sample subtitle file for testing
pub fn create_test_subtitle(dir: &PathBuf, filename: &str) -> Result<PathBuf> {
    create_test_file(dir, filename, sample_srt())
}

/// A small well-formed SRT document
pub fn sample_srt() -> &'static str {
    "1\n00:00:01,000 --> 00:00:04,000\nThis is a test subtitle.\n\n2\n00:00:05,000 --> 00:00:09,000\nIt contains multiple entries.\n\n3\n00:00:10,000 --> 00:00:14,000\nFor testing purposes.\n"
}

/// Builds a suggestion-service JSON body from (id, title, kind, year, rank)
/// tuples
pub fn suggestion_json(entries: &[(&str, &str, &str, u32, u64)]) -> String {
    let entries: Vec<serde_json::Value> = entries
        .iter()
        .map(|(id, title, kind, year, rank)| {
            serde_json::json!({
                "id": id,
                "l": title,
                "q": kind,
                "y": year,
                "rank": rank,
            })
        })
        .collect();
    serde_json::json!({ "d": entries }).to_string()
}

/// Builds a subtitle-listing JSON body from (file_id, file_name, release)
/// tuples, one single-file entry per tuple
pub fn listing_json(entries: &[(u64, &str, &str)]) -> String {
    let entries: Vec<serde_json::Value> = entries
        .iter()
        .map(|(file_id, file_name, release)| {
            serde_json::json!({
                "attributes": {
                    "release": release,
                    "files": [{ "file_id": file_id, "file_name": file_name }],
                }
            })
        })
        .collect();
    serde_json::json!({ "data": entries }).to_string()
}

/// Builds a download-response JSON body
pub fn download_json(link: Option<&str>, file_name: &str, remaining: i64) -> String {
    serde_json::json!({
        "link": link,
        "file_name": file_name,
        "remaining": remaining,
        "requests": 1,
        "reset_time_utc": "2099-01-01T00:00:00Z",
    })
    .to_string()
}
