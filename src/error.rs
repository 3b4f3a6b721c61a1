//! Error types for the capture-to-record pipeline.

/// Errors reported by the speech recognition engine.
///
/// Recoverable variants trigger a silent engine restart inside the
/// capture session; terminal variants surface immediately and disable
/// auto-restart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CaptureError {
    /// The engine heard audio but matched no speech.
    #[error("no speech matched")]
    NoMatch,

    /// The engine gave up waiting for speech to start.
    #[error("timed out waiting for speech")]
    Timeout,

    /// The engine is still tearing down a previous session.
    #[error("recognition engine busy")]
    Busy,

    /// Microphone or speech permission denied. Requires external remediation.
    #[error("speech permission denied")]
    PermissionDenied,

    /// The recognition engine is not available on this device.
    #[error("recognition engine unavailable")]
    Unavailable,
}

impl CaptureError {
    /// Whether the capture session may silently restart after this error.
    #[must_use]
    pub fn is_recoverable(self) -> bool {
        matches!(self, Self::NoMatch | Self::Timeout | Self::Busy)
    }
}

/// Errors from the generative extraction model call.
#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    /// Transport-level failure or non-success HTTP status.
    #[error("network error: {0}")]
    Network(String),

    /// The model provider rejected the request with HTTP 429.
    #[error("rate limited by model provider")]
    RateLimited,

    /// The response body could not be parsed into field updates.
    #[error("malformed model response: {0}")]
    MalformedResponse(String),

    /// The provider's content filter blocked the completion.
    #[error("response blocked by content filter")]
    ContentFiltered,
}

impl ExtractionError {
    /// Whether the request may be retried with backoff.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_) | Self::RateLimited)
    }
}

/// Top-level error type for the voice capture system.
#[derive(Debug, thiserror::Error)]
pub enum InvoxError {
    /// Speech capture error.
    #[error("capture error: {0}")]
    Capture(#[from] CaptureError),

    /// Extraction model error.
    #[error("extraction error: {0}")]
    Extraction(#[from] ExtractionError),

    /// Persistence collaborator error, delegated verbatim.
    #[error("persistence error: {0}")]
    Persistence(#[source] anyhow::Error),

    /// Task state error (no active task, illegal transition).
    #[error("task error: {0}")]
    Task(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// Channel send/receive error.
    #[error("channel error: {0}")]
    Channel(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, InvoxError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recoverable_capture_errors() {
        assert!(CaptureError::NoMatch.is_recoverable());
        assert!(CaptureError::Timeout.is_recoverable());
        assert!(CaptureError::Busy.is_recoverable());
        assert!(!CaptureError::PermissionDenied.is_recoverable());
        assert!(!CaptureError::Unavailable.is_recoverable());
    }

    #[test]
    fn retryable_extraction_errors() {
        assert!(ExtractionError::Network("reset".into()).is_retryable());
        assert!(ExtractionError::RateLimited.is_retryable());
        assert!(!ExtractionError::MalformedResponse("bad json".into()).is_retryable());
        assert!(!ExtractionError::ContentFiltered.is_retryable());
    }

    #[test]
    fn persistence_error_message_passes_through() {
        let err = InvoxError::Persistence(anyhow::anyhow!("disk full"));
        assert!(err.to_string().contains("disk full"));
    }
}
