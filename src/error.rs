//! Error types for the Nimbus Provider SDK.

use thiserror::Error;

/// Errors that can occur when driving a remote resource.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The remote resource does not exist (true 404 or an equivalent
    /// business error code).
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// A waiter exhausted its deadline while the operation was still
    /// pending. The operation may still complete server-side; callers must
    /// not assume rollback.
    #[error("Timeout waiting for operation: {0}")]
    Timeout(String),

    /// The remote operation reached a terminal failure state.
    #[error("Operation failed: {0}")]
    OperationFailed(String),

    /// A validation error occurred before any remote call was issued.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A configuration error occurred.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The control plane rejected the request as invalid.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Authentication or authorization failure.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// The resource is in a conflicting state (already exists, in use).
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The control plane is temporarily unavailable; safe to retry on the
    /// next poll tick.
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    /// An unclassified remote error. Retains the HTTP status and the raw
    /// body so operators can correlate with control-plane logs and so the
    /// classifier can inspect the embedded business error code.
    #[error("API error (status {status}): {body}")]
    Api {
        /// The HTTP status code of the failed call.
        status: u16,
        /// The raw response body, verbatim.
        body: String,
    },

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An HTTP transport error occurred.
    #[error("Transport error: {0}")]
    Http(#[from] reqwest::Error),
}

/// How an error should be treated by the orchestration layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClassification {
    /// The resource is absent. Read and delete absorb this as "gone".
    NotFound,
    /// A retryable condition; the waiter retries on its next tick.
    Transient,
    /// Aborts the current verb immediately.
    Fatal,
}

impl ProviderError {
    /// Classify this error for the waiter and orchestrator.
    ///
    /// 5xx statuses and transport errors are transient (a status poll may
    /// hit a blip without the operation itself having failed); everything
    /// else that is not absence is fatal.
    pub fn classification(&self) -> ErrorClassification {
        match self {
            Self::NotFound(_) => ErrorClassification::NotFound,
            Self::Unavailable(_) => ErrorClassification::Transient,
            Self::Api { status: 404, .. } => ErrorClassification::NotFound,
            Self::Api { status, .. } if *status >= 500 => ErrorClassification::Transient,
            Self::Http(err) if err.is_timeout() || err.is_connect() => {
                ErrorClassification::Transient
            }
            _ => ErrorClassification::Fatal,
        }
    }

    /// Whether this error means the resource is absent.
    pub fn is_not_found(&self) -> bool {
        self.classification() == ErrorClassification::NotFound
    }

    /// Prefix the error with a short description of the step that failed,
    /// keeping the original remote detail.
    pub fn in_step(self, step: &str) -> Self {
        match self {
            Self::NotFound(msg) => Self::NotFound(format!("{step}: {msg}")),
            Self::Timeout(msg) => Self::Timeout(format!("{step}: {msg}")),
            Self::OperationFailed(msg) => Self::OperationFailed(format!("{step}: {msg}")),
            Self::Validation(msg) => Self::Validation(format!("{step}: {msg}")),
            Self::Configuration(msg) => Self::Configuration(format!("{step}: {msg}")),
            Self::InvalidRequest(msg) => Self::InvalidRequest(format!("{step}: {msg}")),
            Self::PermissionDenied(msg) => Self::PermissionDenied(format!("{step}: {msg}")),
            Self::Conflict(msg) => Self::Conflict(format!("{step}: {msg}")),
            Self::Unavailable(msg) => Self::Unavailable(format!("{step}: {msg}")),
            Self::Api { status, body } => Self::Api {
                status,
                body: format!("{step}: {body}"),
            },
            other => other,
        }
    }

    /// Get the error message as a string.
    pub fn message(&self) -> String {
        self.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ProviderError::NotFound("network-123".to_string());
        assert_eq!(format!("{}", err), "Resource not found: network-123");

        let err = ProviderError::Timeout("waiting for AVAILABLE".to_string());
        assert_eq!(
            format!("{}", err),
            "Timeout waiting for operation: waiting for AVAILABLE"
        );

        let err = ProviderError::Api {
            status: 400,
            body: r#"{"error_code":"VPC.0001"}"#.to_string(),
        };
        assert_eq!(
            format!("{}", err),
            r#"API error (status 400): {"error_code":"VPC.0001"}"#
        );
    }

    #[test]
    fn test_classification_not_found() {
        assert_eq!(
            ProviderError::NotFound("x".into()).classification(),
            ErrorClassification::NotFound
        );
        assert_eq!(
            ProviderError::Api {
                status: 404,
                body: String::new()
            }
            .classification(),
            ErrorClassification::NotFound
        );
    }

    #[test]
    fn test_classification_transient() {
        assert_eq!(
            ProviderError::Unavailable("blip".into()).classification(),
            ErrorClassification::Transient
        );
        assert_eq!(
            ProviderError::Api {
                status: 503,
                body: String::new()
            }
            .classification(),
            ErrorClassification::Transient
        );
    }

    #[test]
    fn test_classification_fatal() {
        assert_eq!(
            ProviderError::InvalidRequest("bad field".into()).classification(),
            ErrorClassification::Fatal
        );
        assert_eq!(
            ProviderError::Api {
                status: 409,
                body: String::new()
            }
            .classification(),
            ErrorClassification::Fatal
        );
        assert_eq!(
            ProviderError::Timeout("t".into()).classification(),
            ErrorClassification::Fatal
        );
    }

    #[test]
    fn test_in_step_keeps_detail() {
        let err = ProviderError::Api {
            status: 403,
            body: "denied".to_string(),
        }
        .in_step("error updating network");

        let display = format!("{}", err);
        assert!(display.contains("error updating network"));
        assert!(display.contains("denied"));
        assert!(display.contains("403"));
    }
}
