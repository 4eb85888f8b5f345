//! Pipeline error types.

use std::path::PathBuf;

use thiserror::Error;

/// Crate-specific result type.
pub type Result<T> = std::result::Result<T, PipelineError>;

#[derive(Error, Debug)]
pub enum PipelineError {
    /// Settings file could not be read, parsed or written.
    #[error("settings error at {}: {reason}", path.display())]
    Settings { path: PathBuf, reason: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A synthesizer is missing or failed to speak.
    #[error("synthesizer {id} failed: {reason}")]
    Synthesizer { id: String, reason: String },

    /// The pipeline task has stopped.
    #[error("pipeline closed")]
    Closed,
}

impl PipelineError {
    /// Create a settings error.
    pub fn settings(path: impl Into<PathBuf>, reason: impl std::fmt::Display) -> Self {
        Self::Settings {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Create a synthesizer error.
    pub fn synthesizer(id: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::Synthesizer {
            id: id.into(),
            reason: reason.to_string(),
        }
    }
}
