/*!
 * Error types for the subagent application.
 *
 * This module contains custom error types for different parts of the application,
 * using the thiserror crate for ergonomic error definitions.
 */

// Allow dead code - error types are for library consumers
#![allow(dead_code)]

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur when talking to remote services
#[derive(Error, Debug)]
pub enum ProviderError {
    /// Error when making an HTTP request fails
    #[error("API request failed: {0}")]
    RequestFailed(String),

    /// Error when parsing an API response fails
    #[error("Failed to parse API response: {0}")]
    ParseError(String),

    /// Error returned by the API itself
    #[error("API responded with error: {status_code} - {message}")]
    ApiError {
        /// HTTP status code
        status_code: u16,
        /// Error message from the API
        message: String,
    },

    /// Error related to quota exhaustion across the whole credential pool
    #[error("Credential pool exhausted: {0}")]
    CredentialsExhausted(String),
}

/// Errors that can occur while supervising the external alignment tool
#[derive(Error, Debug)]
pub enum AlignmentError {
    /// The alignment tool could not be started
    #[error("Failed to launch alignment tool '{tool}': {message}")]
    Spawn {
        /// Binary name that was invoked
        tool: String,
        /// Underlying error message
        message: String,
    },

    /// The tool never produced a single sync point, meaning the reference
    /// media itself cannot be aligned (not a per-subtitle failure)
    #[error("Reference media cannot be aligned: {reference:?}")]
    Unalignable {
        /// The reference media path that failed
        reference: PathBuf,
    },

    /// I/O failure while reading the tool's output streams
    #[error("I/O error while supervising alignment: {0}")]
    Io(#[from] std::io::Error),
}

/// Main application error type that wraps all other errors
#[derive(Error, Debug)]
pub enum AppError {
    /// Error from a file operation
    #[error("File error: {0}")]
    File(String),

    /// Error from a remote provider
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Error from the alignment supervisor
    #[error("Alignment error: {0}")]
    Alignment(#[from] AlignmentError),

    /// Any other error
    #[error("Unknown error: {0}")]
    Unknown(String),
}

// Utility functions for error conversion
impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        Self::Unknown(error.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(error: std::io::Error) -> Self {
        Self::File(error.to_string())
    }
}
