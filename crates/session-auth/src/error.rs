//! Error types for credential operations

/// Errors from authentication calls and token storage.
///
/// `Clone` because a single refresh failure is delivered to every caller
/// queued behind it.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// No response was received (connect, TLS, timeout)
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// The server rejected caller-supplied credentials or registration data.
    /// `detail` is the envelope's `err` payload, unmodified.
    #[error("request rejected ({status}): {detail}")]
    Validation {
        status: u16,
        detail: serde_json::Value,
    },

    #[error("token exchange failed: {0}")]
    TokenExchange(String),

    /// The refresh token was rejected (revoked, expired, or blacklisted)
    #[error("invalid credentials: {0}")]
    InvalidCredentials(String),

    #[error("no refresh token stored")]
    MissingRefreshToken,

    #[error("credential parse error: {0}")]
    CredentialParse(String),

    #[error("I/O error: {0}")]
    Io(String),
}

impl Error {
    /// Whether the failure happened before any response arrived.
    pub fn is_network(&self) -> bool {
        matches!(self, Error::Http(_))
    }
}

/// Result alias for credential operations.
pub type Result<T> = std::result::Result<T, Error>;
