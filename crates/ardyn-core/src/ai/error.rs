use std::time::Duration;

/// Failure modes of a single completion request.
///
/// The `Display` text is what the chat surface shows to the user.
#[derive(Debug, thiserror::Error)]
pub enum CompletionError {
    /// The transport call itself could not complete.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The endpoint answered with a non-success status.
    #[error("HTTP error! status: {status}")]
    Api { status: u16 },

    /// Success status, but no usable completion in the body.
    #[error("No response generated")]
    EmptyResponse,

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Request cancelled")]
    Cancelled,

    /// The request task stopped without reporting an outcome.
    #[error("Request ended unexpectedly")]
    Interrupted,
}

impl CompletionError {
    /// HTTP status carried by an `Api` error.
    pub fn status(&self) -> Option<u16> {
        match self {
            CompletionError::Api { status } => Some(*status),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_message_carries_status() {
        let err = CompletionError::Api { status: 500 };
        assert_eq!(err.to_string(), "HTTP error! status: 500");
        assert_eq!(err.status(), Some(500));
    }

    #[test]
    fn test_empty_response_message() {
        assert_eq!(CompletionError::EmptyResponse.to_string(), "No response generated");
        assert_eq!(CompletionError::EmptyResponse.status(), None);
    }

    #[test]
    fn test_timeout_message_includes_deadline() {
        let err = CompletionError::Timeout(Duration::from_secs(60));
        assert_eq!(err.to_string(), "Request timed out after 60s");
    }

    #[test]
    fn test_interrupted_is_distinct_from_cancelled() {
        let interrupted = CompletionError::Interrupted.to_string();
        assert_eq!(interrupted, "Request ended unexpectedly");
        assert_ne!(interrupted, CompletionError::Cancelled.to_string());
    }
}
