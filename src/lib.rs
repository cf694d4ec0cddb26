/*!
 * # SubAgent - automatic subtitle fetching and synchronization
 *
 * A Rust library that keeps a movie library supplied with synchronized
 * subtitles.
 *
 * ## Features
 *
 * - Derive catalog search queries from messy release file names
 * - Resolve titles against the IMDb suggestion service
 * - Download candidate subtitles from OpenSubtitles with a rotating
 *   API key pool
 * - Align every candidate against the video with the external `subsync`
 *   tool and keep the best-scoring one
 * - Persist results, caches and known failures across runs
 * - ISO 639-1 and ISO 639-2 language code support
 *
 * ## Architecture
 *
 * The library is organized in these main modules:
 * - `app_config`: Configuration management
 * - `query_extractor`: File path to search query normalization
 * - `http_cache`: Disk-persisted HTTP response caching
 * - `providers`: Clients for the external services:
 *   - `providers::imdb`: Title catalog resolution
 *   - `providers::opensubtitles`: Subtitle listing and download
 * - `subsync`: Alignment through the external synchronizer
 * - `subtitle_processor`: SRT cleanup before alignment
 * - `database`: Simple persistent key-value store
 * - `app_controller`: Pipeline orchestrator
 * - `watcher`: Library change detection
 * - `file_utils`: File system operations
 * - `language_utils`: ISO language code utilities
 * - `errors`: Custom error types for the application
 */

// Global lints configuration
// These lints will be allowed but not auto-fixed
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::redundant_closure_for_method_calls)]

// Public modules
pub mod app_config;
pub mod app_controller;
pub mod database;
pub mod errors;
pub mod file_utils;
pub mod http_cache;
pub mod language_utils;
pub mod providers;
pub mod query_extractor;
pub mod subsync;
pub mod subtitle_processor;
pub mod watcher;

// Re-export main types for easier usage
pub use app_config::Config;
pub use app_controller::Controller;
pub use errors::{AlignmentError, AppError, ProviderError};
pub use language_utils::{language_codes_match, SubtitleLanguage};
pub use subsync::{Aligner, AlignmentResult};
