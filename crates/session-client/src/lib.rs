//! Authenticated request layer
//!
//! Wraps every outbound API call with the current bearer token and recovers
//! from expired access tokens transparently. The pieces, leaf-first:
//!
//! - `RefreshCoordinator` runs at most one refresh at a time; callers that hit
//!   an authorization failure while one is in flight queue behind it and are
//!   settled in arrival order with its outcome.
//! - `Dispatcher` attaches the token, detects 401 responses, asks the
//!   coordinator for a fresh token and retries each call at most once.
//! - `Session` wires a `CredentialStore`, the coordinator and the dispatcher
//!   around one shared HTTP client.
//!
//! Request lifecycle:
//! 1. Caller → `Dispatcher::send()` attaches the access token (if any)
//! 2. Non-401 response → returned unchanged
//! 3. 401 on first attempt → `RefreshCoordinator::obtain_fresh_token()`
//! 4. Fresh token → request re-issued once; its result is final
//! 5. Refresh failure → every queued caller rejected, session logged out

pub mod coordinator;
pub mod dispatcher;
pub mod error;
pub mod metrics;
pub mod session;

pub use coordinator::{RefreshCoordinator, RefreshOutcome, TokenRefresher};
pub use dispatcher::{ApiRequest, CallContext, Dispatcher};
pub use error::{Error, RefreshError, Result};
pub use session::{ClientConfig, Session};
