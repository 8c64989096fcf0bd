//! Credential handling for the session client
//!
//! Provides the durable token storage, the wire calls to the authentication
//! endpoints, and the credential store that owns the current access token,
//! refresh token and user identity. This crate performs no concurrency
//! control around refresh; `session-client` layers the single-flight
//! coordinator and the request dispatcher on top.
//!
//! Credential flow:
//! 1. Process start: `CredentialStore::initialize()` reads both tokens from storage
//! 2. User action: `login()` / `register()` call the API and persist both tokens
//! 3. Authorization failure: the coordinator calls `CredentialStore::refresh_token()`
//! 4. User action or failed refresh: `logout()` clears memory and storage

pub mod constants;
pub mod credentials;
pub mod error;
pub mod models;
pub mod storage;
pub mod token;

pub use constants::*;
pub use credentials::{Credential, CredentialStore};
pub use error::{Error, Result};
pub use models::{RegisterRequest, UserProfile};
pub use storage::{FileStorage, MemoryStorage, TokenStorage};
pub use token::{Envelope, RefreshResponse, TokenResponse, endpoint_url, login, refresh_token, register};
