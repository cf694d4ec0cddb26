/*!
 * Client implementations for the remote services the pipeline depends on:
 * - imdb: title-suggestion service used to resolve catalog entities
 * - opensubtitles: subtitle listing/download service with a rotating
 *   credential pool
 *
 * Both clients go through [`crate::http_cache::CachedHttpClient`] so
 * repeated runs reuse responses instead of hammering the services.
 */

pub mod imdb;
pub mod opensubtitles;
