//! Endpoint paths and storage keys
//!
//! Paths are relative to the configured API base URL. Storage keys are fixed:
//! a missing key on startup means the user is logged out.

/// Base URL used when neither config nor `SESSION_API_BASE_URL` provide one
pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000/api/v1/";

/// Exchange email + password for a token pair
pub const LOGIN_PATH: &str = "users/login/";

/// Create an account; responds with a token pair and the new user
pub const REGISTER_PATH: &str = "users/register/";

/// Exchange a refresh token for a new access token
pub const REFRESH_PATH: &str = "users/login/refresh/";

/// Authenticated identity of the current user
pub const PROFILE_PATH: &str = "users/profile/";

/// Storage key for the access token
pub const ACCESS_TOKEN_KEY: &str = "accessToken";

/// Storage key for the refresh token
pub const REFRESH_TOKEN_KEY: &str = "refreshToken";
