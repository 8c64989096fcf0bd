//! Redacting wrapper for credentials held in memory

use std::fmt;
use zeroize::Zeroize;

/// Sensitive value (access token, refresh token, password).
///
/// Debug and Display print `[REDACTED]`; the inner value is zeroed on drop.
pub struct Secret<T: Zeroize>(T);

impl<T: Zeroize> Secret<T> {
    pub fn new(value: T) -> Self {
        Self(value)
    }

    /// Expose the inner value (use sparingly)
    pub fn expose(&self) -> &T {
        &self.0
    }
}

impl Secret<String> {
    /// Borrow the secret as `&str`.
    pub fn expose_str(&self) -> &str {
        self.0.as_str()
    }
}

impl From<String> for Secret<String> {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl<T: Zeroize> fmt::Debug for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl<T: Zeroize> fmt::Display for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl<T: Zeroize> Drop for Secret<T> {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl<T: Zeroize + Clone> Clone for Secret<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_and_display_are_redacted() {
        let token = Secret::new(String::from("eyJhbGciOi.access"));
        assert_eq!(format!("{token:?}"), "[REDACTED]");
        assert_eq!(format!("{token}"), "[REDACTED]");
    }

    #[test]
    fn redacted_inside_derived_debug() {
        #[derive(Debug)]
        #[allow(dead_code)]
        struct Holder {
            access: Option<Secret<String>>,
        }
        let holder = Holder {
            access: Some(Secret::from("at_live".to_string())),
        };
        let debug = format!("{holder:?}");
        assert!(!debug.contains("at_live"), "token leaked: {debug}");
    }

    #[test]
    fn expose_returns_inner_value() {
        let token: Secret<String> = "rt_123".to_string().into();
        assert_eq!(token.expose(), "rt_123");
        assert_eq!(token.expose_str(), "rt_123");
        assert_eq!(token.clone().expose_str(), "rt_123");
    }
}
