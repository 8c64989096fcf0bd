//! Session facade
//!
//! Builds one HTTP client and shares it between the credential store (token
//! endpoints) and the dispatcher (everything else), with a single refresh
//! coordinator per session. UI-facing callers only need this type.

use std::sync::Arc;
use std::time::Duration;

use session_auth::{
    Credential, CredentialStore, DEFAULT_BASE_URL, PROFILE_PATH, RegisterRequest, TokenStorage,
    UserProfile,
};
use tracing::info;

use crate::coordinator::RefreshCoordinator;
use crate::dispatcher::{ApiRequest, Dispatcher};
use crate::error::{Error, Result};

/// Connection settings for a session.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    /// Applies to every call, token endpoints included. `None` waits indefinitely.
    pub timeout: Option<Duration>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: None,
        }
    }
}

/// An authenticated API session.
pub struct Session {
    credentials: Arc<CredentialStore>,
    coordinator: Arc<RefreshCoordinator>,
    dispatcher: Dispatcher,
}

impl Session {
    pub fn new(config: ClientConfig, storage: Arc<dyn TokenStorage>) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| Error::Request(format!("building HTTP client: {e}")))?;

        let credentials = Arc::new(CredentialStore::new(
            client.clone(),
            config.base_url.clone(),
            storage,
        ));
        let coordinator = Arc::new(RefreshCoordinator::new(credentials.clone()));
        let dispatcher = Dispatcher::new(
            client,
            config.base_url.clone(),
            credentials.clone(),
            coordinator.clone(),
        );

        info!(base_url = %config.base_url, "session created");
        Ok(Self {
            credentials,
            coordinator,
            dispatcher,
        })
    }

    /// Restore persisted credentials. Call once at startup.
    pub async fn initialize(&self) {
        self.credentials.initialize().await;
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<()> {
        Ok(self.credentials.login(email, password).await?)
    }

    pub async fn register(&self, request: &RegisterRequest) -> Result<()> {
        Ok(self.credentials.register(request).await?)
    }

    pub async fn logout(&self) {
        self.credentials.logout().await;
    }

    pub async fn is_authenticated(&self) -> bool {
        self.credentials.is_authenticated().await
    }

    pub async fn is_loading(&self) -> bool {
        self.credentials.is_loading().await
    }

    pub async fn user(&self) -> Option<UserProfile> {
        self.credentials.user().await
    }

    pub async fn snapshot(&self) -> Credential {
        self.credentials.snapshot().await
    }

    /// Fetch the current user's profile and remember it on the session.
    pub async fn fetch_profile(&self) -> Result<UserProfile> {
        let user: UserProfile = self
            .dispatcher
            .fetch_json(&ApiRequest::get(PROFILE_PATH))
            .await?;
        self.credentials.set_user(user.clone()).await;
        Ok(user)
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn credentials(&self) -> &Arc<CredentialStore> {
        &self.credentials
    }

    pub fn coordinator(&self) -> &Arc<RefreshCoordinator> {
        &self.coordinator
    }
}
