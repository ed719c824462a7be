//! Error types for Scribe.

use thiserror::Error;

/// Primary error type for all Scribe operations.
#[derive(Error, Debug)]
pub enum ScribeError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Config file error: {0}")]
    ConfigFormat(#[from] toml::de::Error),

    #[error("Model client error: {message}")]
    ModelClient {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Stream error: {0}")]
    Stream(String),

    #[error("Analyzer error: {0}")]
    Analyzer(String),

    #[error("Overlay error at {path}: {message}")]
    Overlay { path: String, message: String },

    #[error("Episode cancelled")]
    Cancelled,
}

/// Broad error category used to decide how far a failure propagates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    ModelClient,
    Analyzer,
    Overlay,
    Configuration,
    Io,
    Cancellation,
    Unknown,
}

impl ScribeError {
    /// Create a model client error without an underlying source.
    pub fn model_client(message: impl Into<String>) -> Self {
        Self::ModelClient {
            message: message.into(),
            source: None,
        }
    }

    /// Create a model client error wrapping a transport-level source.
    pub fn model_client_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::ModelClient {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create an overlay error for the given path.
    pub fn overlay(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Overlay {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Classify this error into a category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::ModelClient { .. } | Self::Stream(_) => ErrorCategory::ModelClient,
            Self::Analyzer(_) => ErrorCategory::Analyzer,
            Self::Overlay { .. } => ErrorCategory::Overlay,
            Self::Configuration(_) | Self::ConfigFormat(_) => ErrorCategory::Configuration,
            Self::Io(_) => ErrorCategory::Io,
            Self::Cancelled => ErrorCategory::Cancellation,
            Self::Serialization(_) => ErrorCategory::Unknown,
        }
    }

    /// Whether this error invalidates the episode it happened in.
    ///
    /// Only failures of the model stream before structural completion do;
    /// analyzer and overlay failures are absorbed by the auto-fix loop.
    /// Protocol malformations never become errors; the tag is skipped.
    pub fn is_fatal_to_episode(&self) -> bool {
        matches!(self.category(), ErrorCategory::ModelClient)
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, ScribeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_model_failures_are_fatal() {
        assert!(ScribeError::model_client("boom").is_fatal_to_episode());
        assert!(ScribeError::Stream("reset".into()).is_fatal_to_episode());
        assert!(!ScribeError::Analyzer("tsc crashed".into()).is_fatal_to_episode());
        assert!(!ScribeError::overlay("a.ts", "unreadable").is_fatal_to_episode());
        assert!(!ScribeError::Cancelled.is_fatal_to_episode());
    }

    #[test]
    fn overlay_error_mentions_path() {
        let err = ScribeError::overlay("src/a.ts", "not utf-8");
        assert_eq!(err.to_string(), "Overlay error at src/a.ts: not utf-8");
        assert_eq!(err.category(), ErrorCategory::Overlay);
    }
}
