//! Error handling for the trace viewer engine
//!
//! This module defines the crate error type and a Result alias for use
//! throughout the engine. Viewport and annotation mutators clamp their
//! inputs instead of failing, so errors surface almost exclusively from
//! the data path (Sample Source reads) and from configuration loading.

use crate::source::SourceError;
use std::ops::Range;
use thiserror::Error;

/// Main error type for engine operations
#[derive(Error, Debug)]
pub enum ViewerError {
    /// The Sample Source could not deliver the requested region.
    /// The composer paints a gap for it instead of stale or fabricated data.
    #[error("Data unavailable for channels {channels:?}, samples {samples:?}: {reason}")]
    DataUnavailable {
        channels: Range<usize>,
        samples: Range<usize>,
        reason: String,
    },

    /// A request that lies entirely outside the dataset
    #[error("Invalid range: {0}")]
    InvalidRange(String),

    /// The memory budget cannot hold a single envelope block
    #[error("Cache budget of {budget_bytes} bytes cannot hold a {block_bytes} byte block")]
    CacheExhausted { budget_bytes: usize, block_bytes: usize },

    /// Errors reported by the Sample Source collaborator
    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    /// Errors related to configuration loading/saving
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<ViewerError>,
    },
}

impl ViewerError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        ViewerError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Whether this error means "paint a gap here"
    pub fn is_data_unavailable(&self) -> bool {
        match self {
            ViewerError::DataUnavailable { .. } | ViewerError::Source(_) => true,
            ViewerError::WithContext { source, .. } => source.is_data_unavailable(),
            _ => false,
        }
    }
}

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, ViewerError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.with_context(f()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ViewerError::InvalidRange("channels 70..80 of 64".to_string());
        assert_eq!(err.to_string(), "Invalid range: channels 70..80 of 64");
    }

    #[test]
    fn test_error_with_context() {
        let err = ViewerError::Config("bad budget".to_string());
        let with_ctx = err.with_context("Failed to load viewer.toml");
        assert!(with_ctx.to_string().contains("Failed to load viewer.toml"));
        assert!(with_ctx.to_string().contains("bad budget"));
    }

    #[test]
    fn test_data_unavailable_display() {
        let err = ViewerError::DataUnavailable {
            channels: 0..8,
            samples: 100..200,
            reason: "disk read failed".to_string(),
        };
        assert!(err.to_string().contains("100..200"));
        assert!(err.to_string().contains("disk read failed"));
        assert!(err.is_data_unavailable());
        assert!(err.with_context("fetch").is_data_unavailable());
    }

    #[test]
    fn test_result_context() {
        let result: Result<()> = Err(ViewerError::Serialization("eof".to_string()));
        let err = result.context("Failed to import annotations").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Failed to import annotations: Serialization error: eof"
        );
    }

    #[test]
    fn test_source_error_is_gap() {
        let err: ViewerError = SourceError::Decode("truncated block".to_string()).into();
        assert!(err.is_data_unavailable());
        assert!(!ViewerError::Config("x".into()).is_data_unavailable());
    }
}
