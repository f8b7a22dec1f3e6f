//! Errors from the HTTP client layer.

use waypoint_core::HierarchyError;

/// Errors from the HTTP client layer.
#[derive(Debug)]
pub enum ClientError {
    /// Connection failure, 5xx or 429. Retried with backoff.
    Transient(String),
    /// The server refused the request (4xx other than 401). Never retried.
    Rejected {
        status: u16,
        code: Option<String>,
        message: String,
    },
    /// 401 Unauthorized - invalid or missing token.
    Unauthorized,
    /// Failed to parse a response body.
    Parse(String),
    /// The local hierarchy pre-check failed; nothing was sent.
    Validation(HierarchyError),
}

impl ClientError {
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, ClientError::Transient(_))
    }

    /// HTTP status for rejected requests.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Rejected { status, .. } => Some(*status),
            ClientError::Unauthorized => Some(401),
            _ => None,
        }
    }
}

impl std::fmt::Display for ClientError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transient(msg) => write!(f, "Transient failure: {msg}"),
            Self::Rejected {
                status, message, ..
            } => write!(f, "Rejected ({status}): {message}"),
            Self::Unauthorized => write!(f, "Unauthorized: invalid or missing token"),
            Self::Parse(msg) => write!(f, "Parse error: {msg}"),
            Self::Validation(e) => write!(f, "Validation failed: {e}"),
        }
    }
}

impl std::error::Error for ClientError {}

impl From<HierarchyError> for ClientError {
    fn from(e: HierarchyError) -> Self {
        ClientError::Validation(e)
    }
}
