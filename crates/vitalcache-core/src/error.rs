use thiserror::Error;

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("No cached entry for {0}")]
    CacheMiss(String),

    #[error("Unauthorized - session is no longer valid")]
    AuthInvalid,

    #[error("Install failed: {url}: {reason}")]
    InstallFailure { url: String, reason: String },

    #[error("Cache storage error: {0}")]
    Storage(String),

    #[error("Invalid lifecycle transition from {from} on {event}")]
    InvalidTransition { from: String, event: String },

    #[error("Worker is no longer running")]
    WorkerGone,

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Unexpected response: {0}")]
    InvalidResponse(String),

    #[error(transparent)]
    Geo(#[from] GeoError),
}

/// Classified geolocation failures surfaced to callers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GeoError {
    #[error("Location permission denied")]
    PermissionDenied,

    #[error("Location information is unavailable")]
    PositionUnavailable,

    #[error("Timed out waiting for a location fix")]
    Timeout,

    #[error("Unknown location error: {0}")]
    Unknown(String),
}

impl CacheError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            let mut end = MAX_ERROR_BODY_LENGTH;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
        }
    }

    /// Map a non-success status from a collaborator endpoint to an error.
    pub fn from_status(status: u16, body: &str) -> Self {
        let truncated = Self::truncate_body(body);
        match status {
            401 => CacheError::AuthInvalid,
            500..=599 => CacheError::Network(format!("Server error {}: {}", status, truncated)),
            _ => CacheError::InvalidResponse(format!("Status {}: {}", status, truncated)),
        }
    }

    pub fn is_auth_invalid(&self) -> bool {
        matches!(self, CacheError::AuthInvalid)
    }
}

impl From<reqwest::Error> for CacheError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            if status == reqwest::StatusCode::UNAUTHORIZED {
                return CacheError::AuthInvalid;
            }
        }
        CacheError::Network(err.to_string())
    }
}

impl From<std::io::Error> for CacheError {
    fn from(err: std::io::Error) -> Self {
        CacheError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        CacheError::Storage(err.to_string())
    }
}

pub type Result<T, E = CacheError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_status_maps_401_to_auth_invalid() {
        assert!(CacheError::from_status(401, "nope").is_auth_invalid());
    }

    #[test]
    fn test_from_status_server_error_is_network() {
        assert!(matches!(
            CacheError::from_status(503, "down"),
            CacheError::Network(_)
        ));
    }

    #[test]
    fn test_truncate_long_body() {
        let body = "x".repeat(MAX_ERROR_BODY_LENGTH + 10);
        let truncated = CacheError::truncate_body(&body);
        assert!(truncated.contains("truncated"));
        assert!(truncated.starts_with(&"x".repeat(MAX_ERROR_BODY_LENGTH)));
    }

    #[test]
    fn test_geo_error_converts() {
        let err: CacheError = GeoError::Timeout.into();
        assert_eq!(err.to_string(), "Timed out waiting for a location fix");
    }
}
