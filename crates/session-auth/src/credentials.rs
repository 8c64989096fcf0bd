//! Credential store
//!
//! Owns the current access token, refresh token, user identity and the
//! authenticated / loading flags. The persisted token pair in `TokenStorage`
//! mirrors the in-memory tokens; nothing else mutates either copy.
//!
//! Refresh here is a single remote call plus bookkeeping. Serializing
//! concurrent refreshes is the coordinator's job in `session-client`.

use std::sync::Arc;

use common::Secret;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::constants::{ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY};
use crate::error::{Error, Result};
use crate::models::{RegisterRequest, UserProfile};
use crate::storage::TokenStorage;
use crate::token::{self, TokenResponse};

/// Snapshot of the session credentials.
///
/// `is_authenticated` is true exactly when both tokens are present.
/// Token values are redacted in Debug output.
#[derive(Debug, Clone)]
pub struct Credential {
    pub access_token: Option<Secret<String>>,
    pub refresh_token: Option<Secret<String>>,
    pub user: Option<UserProfile>,
    pub is_authenticated: bool,
    pub is_loading: bool,
}

impl Default for Credential {
    /// Empty and loading: the state before `initialize()` has run.
    fn default() -> Self {
        Self {
            access_token: None,
            refresh_token: None,
            user: None,
            is_authenticated: false,
            is_loading: true,
        }
    }
}

impl Credential {
    fn clear(&mut self) {
        self.access_token = None;
        self.refresh_token = None;
        self.user = None;
        self.is_authenticated = false;
    }
}

/// Credential manager backed by a `TokenStorage`.
///
/// Every mutation holds the state write lock until storage agrees with
/// memory, so a logout can never interleave with a half-persisted login or
/// refresh. The lock is never held across a remote call.
pub struct CredentialStore {
    client: reqwest::Client,
    base_url: String,
    storage: Arc<dyn TokenStorage>,
    state: RwLock<Credential>,
}

impl CredentialStore {
    pub fn new(client: reqwest::Client, base_url: String, storage: Arc<dyn TokenStorage>) -> Self {
        Self {
            client,
            base_url,
            storage,
            state: RwLock::new(Credential::default()),
        }
    }

    /// Load the persisted token pair.
    ///
    /// Both tokens present → authenticated. Anything else is the ordinary
    /// logged-out state, including an unreadable storage backend (logged as a
    /// warning). `is_loading` is always false afterwards.
    pub async fn initialize(&self) {
        let mut state = self.state.write().await;
        state.is_loading = true;

        let access = self.read_key(ACCESS_TOKEN_KEY).await;
        let refresh = self.read_key(REFRESH_TOKEN_KEY).await;

        if let (Some(access), Some(refresh)) = (access, refresh) {
            state.access_token = Some(Secret::new(access));
            state.refresh_token = Some(Secret::new(refresh));
            state.is_authenticated = true;
            info!("restored persisted session");
        } else {
            debug!("no persisted session");
        }
        state.is_loading = false;
    }

    /// Authenticate with email and password.
    ///
    /// On failure the previous state is left untouched and the error is
    /// returned as-is (`Error::Validation` for rejected credentials).
    pub async fn login(&self, email: &str, password: &str) -> Result<()> {
        let tokens = token::login(&self.client, &self.base_url, email, password)
            .await
            .inspect_err(|e| warn!(error = %e, "login failed"))?;
        self.establish(tokens).await?;
        info!("logged in");
        Ok(())
    }

    /// Create an account and adopt its session, including the returned user.
    pub async fn register(&self, request: &RegisterRequest) -> Result<()> {
        let tokens = token::register(&self.client, &self.base_url, request)
            .await
            .inspect_err(|e| warn!(error = %e, "registration failed"))?;
        self.establish(tokens).await?;
        info!("registered and logged in");
        Ok(())
    }

    /// Clear all credentials in memory and in storage.
    ///
    /// Best-effort: storage failures are logged, never returned.
    pub async fn logout(&self) {
        let mut state = self.state.write().await;
        state.clear();

        for key in [ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY] {
            if let Err(e) = self.storage.remove(key).await {
                warn!(key, error = %e, "failed to remove persisted token");
            }
        }
        drop(state);
        info!("logged out");
    }

    /// Obtain a new access token with the stored refresh token.
    ///
    /// Stores and persists the new access token and, when the server rotates
    /// it, the new refresh token. Otherwise the current refresh token is kept.
    /// Returns the new access token.
    ///
    /// If the session was replaced or cleared while the call was in flight,
    /// the response is discarded: a cleared session stays cleared, a replaced
    /// one keeps its own tokens.
    pub async fn refresh_token(&self) -> Result<String> {
        let expected = self
            .state
            .read()
            .await
            .refresh_token
            .as_ref()
            .map(|t| t.expose().clone())
            .ok_or(Error::MissingRefreshToken)?;

        let refreshed = token::refresh_token(&self.client, &self.base_url, &expected).await?;

        let mut state = self.state.write().await;
        let current = state.refresh_token.as_ref().map(|t| t.expose_str());
        if current != Some(expected.as_str()) {
            return match &state.access_token {
                Some(access) => {
                    debug!("session replaced during refresh, keeping newer tokens");
                    Ok(access.expose().clone())
                }
                None => Err(Error::InvalidCredentials(
                    "session cleared while refresh was in flight".into(),
                )),
            };
        }

        // Persist under the write lock so a concurrent logout runs after us
        if let Err(e) = self
            .storage
            .set(ACCESS_TOKEN_KEY, &refreshed.access_token)
            .await
        {
            warn!(error = %e, "failed to persist refreshed access token");
        }
        match &refreshed.refresh_token {
            Some(rotated) => {
                if let Err(e) = self.storage.set(REFRESH_TOKEN_KEY, rotated).await {
                    warn!(error = %e, "failed to persist rotated refresh token");
                }
                state.refresh_token = Some(Secret::new(rotated.clone()));
            }
            None => debug!("refresh response did not rotate the refresh token"),
        }
        state.access_token = Some(Secret::new(refreshed.access_token.clone()));
        state.is_authenticated = true;
        drop(state);

        info!("access token refreshed");
        Ok(refreshed.access_token)
    }

    /// Current access token, if any.
    pub async fn access_token(&self) -> Option<String> {
        self.state
            .read()
            .await
            .access_token
            .as_ref()
            .map(|t| t.expose().clone())
    }

    /// Clone of the full credential state.
    pub async fn snapshot(&self) -> Credential {
        self.state.read().await.clone()
    }

    pub async fn is_authenticated(&self) -> bool {
        self.state.read().await.is_authenticated
    }

    pub async fn is_loading(&self) -> bool {
        self.state.read().await.is_loading
    }

    pub async fn user(&self) -> Option<UserProfile> {
        self.state.read().await.user.clone()
    }

    /// Record the identity of the logged-in user (e.g. after a profile fetch).
    pub async fn set_user(&self, user: UserProfile) {
        let mut state = self.state.write().await;
        if state.is_authenticated {
            state.user = Some(user);
        } else {
            debug!("ignoring user record for logged-out session");
        }
    }

    /// Persist a freshly issued token pair, then adopt it in memory.
    ///
    /// Both steps run under the write lock. Persisting first means a storage
    /// failure leaves the in-memory state exactly as it was.
    async fn establish(&self, tokens: TokenResponse) -> Result<()> {
        let mut state = self.state.write().await;
        self.storage
            .set(ACCESS_TOKEN_KEY, &tokens.access_token)
            .await?;
        self.storage
            .set(REFRESH_TOKEN_KEY, &tokens.refresh_token)
            .await?;

        state.access_token = Some(Secret::new(tokens.access_token));
        state.refresh_token = Some(Secret::new(tokens.refresh_token));
        if tokens.user.is_some() {
            state.user = tokens.user;
        }
        state.is_authenticated = true;
        Ok(())
    }

    async fn read_key(&self, key: &str) -> Option<String> {
        match self.storage.get(key).await {
            Ok(value) => value.filter(|v| !v.is_empty()),
            Err(e) => {
                warn!(key, error = %e, "failed to read persisted token");
                None
            }
        }
    }
}
