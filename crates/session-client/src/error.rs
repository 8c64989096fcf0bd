//! Error types for dispatched requests

/// Outcome of a failed refresh, delivered to the caller that started it and
/// to every caller queued behind it.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RefreshError {
    #[error("token refresh failed: {0}")]
    Failed(#[from] session_auth::Error),

    /// The task driving the refresh was dropped before it settled
    #[error("token refresh abandoned before it settled")]
    Abandoned,
}

/// Errors surfaced to callers of the request layer.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No response received. Never triggers a refresh.
    #[error("network error: {0}")]
    Network(String),

    /// 401 that survived the one refresh-and-retry cycle
    #[error("unauthorized ({status}): {detail}")]
    Unauthorized {
        status: u16,
        detail: serde_json::Value,
    },

    #[error(transparent)]
    Refresh(#[from] RefreshError),

    /// Login / registration failures, passed through verbatim
    #[error(transparent)]
    Auth(#[from] session_auth::Error),

    /// Non-success status from `Dispatcher::fetch_json`
    #[error("API error ({status}): {detail}")]
    Api {
        status: u16,
        detail: serde_json::Value,
    },

    #[error("invalid response: {0}")]
    Decode(String),

    #[error("invalid request: {0}")]
    Request(String),
}

/// Result alias for request-layer operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refresh_error_keeps_underlying_message() {
        let err: Error = RefreshError::from(session_auth::Error::InvalidCredentials(
            "refresh token rejected (401 Unauthorized)".into(),
        ))
        .into();
        let msg = err.to_string();
        assert!(msg.starts_with("token refresh failed:"), "got: {msg}");
        assert!(msg.contains("refresh token rejected"), "got: {msg}");
    }

    #[test]
    fn auth_errors_pass_through_transparently() {
        let err: Error = session_auth::Error::Validation {
            status: 400,
            detail: serde_json::json!({"email": ["This field is required."]}),
        }
        .into();
        assert!(err.to_string().contains("This field is required."));
        assert!(matches!(err, Error::Auth(_)));
    }
}
