use thiserror::Error;

/// Structural error kinds shared by every media-server-facing
/// operation in the core (spec §7). AlreadyExists and NotFound carry
/// enough detail that callers never have to substring-match `detail`.
#[derive(Error, Debug, Clone)]
pub enum MediaServerError {
    #[error("validation failed for '{field}': {rule}")]
    Validation { field: String, rule: String },

    #[error("{method} {endpoint} -> {status}: {detail}")]
    Transport {
        status: u16,
        endpoint: String,
        method: String,
        detail: String,
    },

    #[error("not found: {endpoint}")]
    NotFound { endpoint: String, detail: String },

    #[error("already exists: {endpoint}")]
    AlreadyExists { endpoint: String, detail: String },

    #[error("operation cancelled")]
    Cancelled,

    #[error("{operation} timed out after {elapsed_ms}ms")]
    Timeout { operation: String, elapsed_ms: u64 },

    #[error("subprocess '{program}' failed: {detail}")]
    SubprocessFailed { program: String, detail: String },

    #[error("{operation} failed after {attempts} attempt(s): {}", .tried.join(", "))]
    Composite {
        operation: String,
        attempts: u32,
        tried: Vec<String>,
    },
}

impl MediaServerError {
    /// Retry classification used by the PATCH backoff (spec §4.3.4):
    /// retryable iff the transport error carries one of a known set of
    /// status codes or detail substrings.
    pub fn is_retryable(&self) -> bool {
        match self {
            MediaServerError::Transport { status, detail, .. } => {
                matches!(status, 404 | 409 | 400) || detail_indicates_retryable(detail)
            }
            MediaServerError::NotFound { .. } => true,
            _ => false,
        }
    }

    /// True when a transport failure's detail indicates the target
    /// already exists server-side (spec §4.3.6 / §7 AlreadyExists).
    pub fn indicates_already_exists(&self) -> bool {
        match self {
            MediaServerError::AlreadyExists { .. } => true,
            MediaServerError::Transport { status, detail, .. } => {
                *status == 409 || detail.to_lowercase().contains("already exists")
            }
            _ => false,
        }
    }
}

fn detail_indicates_retryable(detail: &str) -> bool {
    let lower = detail.to_lowercase();
    ["path not found", "already exists", "busy", "bad request", "invalid configuration"]
        .iter()
        .any(|needle| lower.contains(needle))
}

pub type Result<T> = std::result::Result<T, MediaServerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_404_is_retryable() {
        let err = MediaServerError::Transport {
            status: 404,
            endpoint: "/v3/paths/get/camera0".into(),
            method: "GET".into(),
            detail: "path not found".into(),
        };
        assert!(err.is_retryable());
    }

    #[test]
    fn already_exists_detected_from_detail() {
        let err = MediaServerError::Transport {
            status: 400,
            endpoint: "/v3/config/paths/add/camera0".into(),
            method: "POST".into(),
            detail: "path already exists".into(),
        };
        assert!(err.indicates_already_exists());
    }

    #[test]
    fn validation_is_not_retryable() {
        let err = MediaServerError::Validation {
            field: "name".into(),
            rule: "non-empty".into(),
        };
        assert!(!err.is_retryable());
    }
}
