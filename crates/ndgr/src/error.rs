//! NDGR client error types.

use std::fmt;

use thiserror::Error;

/// Crate-specific result type.
pub type Result<T> = std::result::Result<T, NdgrError>;

/// Which step of the protocol state machine issued a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FetchPhase {
    /// The directive ("view") resource polled with `?at=`.
    Head,
    /// Catch-up pagination over packed segments.
    Backward,
    /// Backfill segment announced during the initial pass.
    Previous,
    /// Live segment.
    Segment,
}

impl FetchPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Head => "head",
            Self::Backward => "backward",
            Self::Previous => "previous",
            Self::Segment => "segment",
        }
    }
}

impl fmt::Display for FetchPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Low-level reason a fetch did not produce a usable body.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchFailure {
    /// The origin answered with a non-2xx status.
    #[error("HTTP {0}")]
    Status(u16),

    /// Connection-level fault (reset, refused, timeout).
    #[error("network error: {0}")]
    Network(String),

    /// The body stream broke after the response started.
    #[error("body read error: {0}")]
    Body(String),

    /// The request could not be built or was rejected before sending.
    #[error("invalid request: {0}")]
    Request(String),
}

impl FetchFailure {
    /// Whether this failure is worth another attempt.
    ///
    /// Only connection-level faults are transient. Status codes are never
    /// retried.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Network(_))
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status(code) => Some(*code),
            _ => None,
        }
    }
}

/// A failed fetch, with enough context to describe it to the user.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("failed to fetch {label} ({phase}) from {uri}: {failure}")]
pub struct FetchError {
    pub failure: FetchFailure,
    pub uri: String,
    pub label: String,
    pub phase: FetchPhase,
}

impl FetchError {
    pub fn new(
        failure: FetchFailure,
        uri: impl Into<String>,
        label: impl Into<String>,
        phase: FetchPhase,
    ) -> Self {
        Self {
            failure,
            uri: uri.into(),
            label: label.into(),
            phase,
        }
    }
}

/// Errors surfaced by the protocol client.
#[derive(Error, Debug, Clone)]
pub enum NdgrError {
    /// Fetch failed after retries, or with a non-retryable failure.
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// A frame was complete but did not decode.
    #[error("malformed {label} frame: {reason}")]
    Decode { label: String, reason: String },

    /// The client was disposed.
    #[error("client disposed")]
    Disposed,
}

impl NdgrError {
    /// Create a decode error.
    pub fn decode(label: impl Into<String>, reason: impl fmt::Display) -> Self {
        Self::Decode {
            label: label.into(),
            reason: reason.to_string(),
        }
    }

    /// Phase of the failed fetch, if this is a fetch error.
    pub fn phase(&self) -> Option<FetchPhase> {
        match self {
            Self::Fetch(e) => Some(e.phase),
            _ => None,
        }
    }
}
