//! Authenticated request dispatch
//!
//! Every call goes out with the current access token as a bearer credential.
//! A 401 on the first attempt sends the call through the refresh coordinator
//! and re-issues it once with the token it returns; a 401 on the retry is
//! final. Network failures and every other status come back untouched.

use std::sync::Arc;

use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use session_auth::{CredentialStore, Envelope, endpoint_url};
use tracing::{Instrument, debug, info_span, warn};

use crate::coordinator::RefreshCoordinator;
use crate::error::{Error, Result};

/// A re-issuable API call, relative to the configured base URL.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<serde_json::Value>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>, body: serde_json::Value) -> Self {
        Self::new(Method::POST, path).with_body(body)
    }

    pub fn put(path: impl Into<String>, body: serde_json::Value) -> Self {
        Self::new(Method::PUT, path).with_body(body)
    }

    pub fn patch(path: impl Into<String>, body: serde_json::Value) -> Self {
        Self::new(Method::PATCH, path).with_body(body)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn with_body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }
}

/// Per-call bookkeeping: the id used in logs and whether the call has
/// already been retried after a refresh.
#[derive(Debug, Clone)]
pub struct CallContext {
    pub request_id: String,
    pub retried: bool,
}

impl CallContext {
    pub fn new() -> Self {
        Self {
            request_id: format!("req_{}", uuid::Uuid::new_v4().as_simple()),
            retried: false,
        }
    }
}

impl Default for CallContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Wraps outbound calls with token attachment and the retry-once contract.
pub struct Dispatcher {
    client: reqwest::Client,
    base_url: String,
    credentials: Arc<CredentialStore>,
    coordinator: Arc<RefreshCoordinator>,
}

impl Dispatcher {
    pub fn new(
        client: reqwest::Client,
        base_url: String,
        credentials: Arc<CredentialStore>,
        coordinator: Arc<RefreshCoordinator>,
    ) -> Self {
        Self {
            client,
            base_url,
            credentials,
            coordinator,
        }
    }

    /// Send a request, refreshing the access token at most once on 401.
    ///
    /// Returns the response for every status except a final 401, which
    /// becomes `Error::Unauthorized`.
    pub async fn send(&self, request: &ApiRequest) -> Result<reqwest::Response> {
        let mut ctx = CallContext::new();
        let span = info_span!(
            "dispatch",
            request_id = %ctx.request_id,
            method = %request.method,
            path = %request.path,
        );
        self.dispatch(request, &mut ctx).instrument(span).await
    }

    /// Send a request and decode the envelope's `data` as `T`.
    ///
    /// Non-success statuses become `Error::Api` carrying the envelope's `err`.
    pub async fn fetch_json<T: DeserializeOwned>(&self, request: &ApiRequest) -> Result<T> {
        let response = self.send(request).await?;
        let status = response.status();
        if !status.is_success() {
            let detail = session_auth::token::error_detail(response).await;
            return Err(Error::Api {
                status: status.as_u16(),
                detail,
            });
        }

        let envelope = response
            .json::<Envelope<T>>()
            .await
            .map_err(|e| Error::Decode(format!("{}: {e}", request.path)))?;
        envelope
            .data
            .ok_or_else(|| Error::Decode(format!("{}: response has no data", request.path)))
    }

    /// Run one call under its context.
    pub async fn dispatch(
        &self,
        request: &ApiRequest,
        ctx: &mut CallContext,
    ) -> Result<reqwest::Response> {
        let token = self.credentials.access_token().await;
        let mut response = self.issue(request, token.as_deref()).await?;

        loop {
            if response.status() != StatusCode::UNAUTHORIZED {
                return Ok(response);
            }

            if ctx.retried {
                warn!("still unauthorized after refresh, giving up");
                return Err(unauthorized(response).await);
            }

            ctx.retried = true;
            debug!("unauthorized, obtaining fresh token");
            let fresh = self.coordinator.obtain_fresh_token(&ctx.request_id).await?;

            crate::metrics::record_retry();
            response = self.issue(request, Some(&fresh)).await?;
        }
    }

    async fn issue(&self, request: &ApiRequest, token: Option<&str>) -> Result<reqwest::Response> {
        let mut builder = self
            .client
            .request(request.method.clone(), endpoint_url(&self.base_url, &request.path));
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }
        if let Some(token) = token {
            builder = builder.bearer_auth(token);
        }

        builder
            .send()
            .await
            .map_err(|e| Error::Network(format!("{} {}: {e}", request.method, request.path)))
    }
}

async fn unauthorized(response: reqwest::Response) -> Error {
    let status = response.status().as_u16();
    let detail = session_auth::token::error_detail(response).await;
    Error::Unauthorized { status, detail }
}
