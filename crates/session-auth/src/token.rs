//! Authentication endpoint calls
//!
//! Handles the three token-issuing interactions:
//! 1. Login (email + password)
//! 2. Registration (creates the account, returns tokens and the user)
//! 3. Refresh (refresh token → new access token, optionally a rotated refresh token)
//!
//! Every response body is wrapped in the API envelope
//! `{"version": "v1", "err": ..., "data": ...}`.

use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::constants::{LOGIN_PATH, REFRESH_PATH, REGISTER_PATH};
use crate::error::{Error, Result};
use crate::models::{RegisterRequest, UserProfile};

/// Response envelope shared by every API endpoint.
///
/// On error statuses `data` is null and `err` carries the server's detail.
#[derive(Debug, Deserialize, Serialize)]
pub struct Envelope<T> {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub err: Option<serde_json::Value>,
    pub data: Option<T>,
}

/// Token pair issued by login and registration.
#[derive(Debug, Deserialize, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<UserProfile>,
}

/// Response of the refresh endpoint.
///
/// `refresh_token` is only present when the server rotates refresh tokens.
/// The short `access` / `refresh` field names are accepted as well.
#[derive(Debug, Deserialize, Serialize)]
pub struct RefreshResponse {
    #[serde(alias = "access")]
    pub access_token: String,
    #[serde(default, alias = "refresh", skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

#[derive(Serialize)]
struct LoginBody<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct RefreshBody<'a> {
    refresh_token: &'a str,
}

/// Join the API base URL and a relative endpoint path.
pub fn endpoint_url(base_url: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Authenticate with email and password.
///
/// A 4xx response is the server rejecting the supplied credentials and is
/// returned as `Error::Validation` with the envelope's `err` payload intact.
pub async fn login(
    client: &reqwest::Client,
    base_url: &str,
    email: &str,
    password: &str,
) -> Result<TokenResponse> {
    let response = client
        .post(endpoint_url(base_url, LOGIN_PATH))
        .json(&LoginBody { email, password })
        .send()
        .await
        .map_err(|e| Error::Http(format!("login request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        return Err(rejection(status, response, "login").await);
    }

    read_data(response, "login").await
}

/// Create an account and receive its first token pair.
pub async fn register(
    client: &reqwest::Client,
    base_url: &str,
    request: &RegisterRequest,
) -> Result<TokenResponse> {
    let response = client
        .post(endpoint_url(base_url, REGISTER_PATH))
        .json(request)
        .send()
        .await
        .map_err(|e| Error::Http(format!("register request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        return Err(rejection(status, response, "register").await);
    }

    read_data(response, "register").await
}

/// Exchange a refresh token for a new access token.
pub async fn refresh_token(
    client: &reqwest::Client,
    base_url: &str,
    refresh: &str,
) -> Result<RefreshResponse> {
    let response = client
        .post(endpoint_url(base_url, REFRESH_PATH))
        .json(&RefreshBody {
            refresh_token: refresh,
        })
        .send()
        .await
        .map_err(|e| Error::Http(format!("token refresh request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        let body = error_detail(response).await;

        // 401/403 means the refresh token is revoked, expired or blacklisted
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(Error::InvalidCredentials(format!(
                "refresh token rejected ({status}): {body}"
            )));
        }

        return Err(Error::TokenExchange(format!(
            "token refresh returned {status}: {body}"
        )));
    }

    read_data(response, "refresh").await
}

/// Map a non-success login/register response.
async fn rejection(status: StatusCode, response: reqwest::Response, operation: &str) -> Error {
    let detail = error_detail(response).await;
    if status.is_client_error() {
        debug!(operation, status = status.as_u16(), "request rejected by server");
        Error::Validation {
            status: status.as_u16(),
            detail,
        }
    } else {
        Error::TokenExchange(format!("{operation} returned {status}: {detail}"))
    }
}

/// Extract the envelope's `err` payload, falling back to the raw body text.
pub async fn error_detail(response: reqwest::Response) -> serde_json::Value {
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| String::from("<no body>"));
    match serde_json::from_str::<Envelope<serde_json::Value>>(&body) {
        Ok(Envelope { err: Some(err), .. }) => err,
        _ => serde_json::Value::String(body),
    }
}

/// Decode a success response and unwrap the envelope's `data`.
async fn read_data<T: DeserializeOwned>(response: reqwest::Response, operation: &str) -> Result<T> {
    let envelope = response
        .json::<Envelope<T>>()
        .await
        .map_err(|e| Error::TokenExchange(format!("invalid {operation} response: {e}")))?;

    envelope
        .data
        .ok_or_else(|| Error::TokenExchange(format!("{operation} response has no data")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Json;
    use axum::Router;
    use axum::http::StatusCode as AxumStatus;
    use axum::routing::post;

    async fn spawn_api(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/api/v1/")
    }

    #[test]
    fn endpoint_url_joins_slashes() {
        assert_eq!(
            endpoint_url("http://api.test/api/v1/", "users/login/"),
            "http://api.test/api/v1/users/login/"
        );
        assert_eq!(
            endpoint_url("http://api.test/api/v1", "/users/login/"),
            "http://api.test/api/v1/users/login/"
        );
    }

    #[test]
    fn refresh_response_accepts_short_names_and_missing_rotation() {
        let json = r#"{"access":"at_new"}"#;
        let refreshed: RefreshResponse = serde_json::from_str(json).unwrap();
        assert_eq!(refreshed.access_token, "at_new");
        assert!(refreshed.refresh_token.is_none());

        let json = r#"{"access_token":"at_new","refresh_token":"rt_new"}"#;
        let refreshed: RefreshResponse = serde_json::from_str(json).unwrap();
        assert_eq!(refreshed.refresh_token.as_deref(), Some("rt_new"));
    }

    #[test]
    fn envelope_with_null_data_deserializes() {
        let json = r#"{"version":"v1","err":{"detail":"nope"},"data":null}"#;
        let envelope: Envelope<TokenResponse> = serde_json::from_str(json).unwrap();
        assert!(envelope.data.is_none());
        assert_eq!(envelope.err.unwrap()["detail"], "nope");
    }

    #[tokio::test]
    async fn login_unwraps_envelope() {
        let app = Router::new().route(
            "/api/v1/users/login/",
            post(|Json(body): Json<serde_json::Value>| async move {
                assert_eq!(body["email"], "ada@example.com");
                assert_eq!(body["password"], "pw");
                Json(serde_json::json!({
                    "version": "v1",
                    "err": null,
                    "data": {"access_token": "at_1", "refresh_token": "rt_1"}
                }))
            }),
        );
        let base = spawn_api(app).await;

        let tokens = login(&reqwest::Client::new(), &base, "ada@example.com", "pw")
            .await
            .unwrap();
        assert_eq!(tokens.access_token, "at_1");
        assert_eq!(tokens.refresh_token, "rt_1");
        assert!(tokens.user.is_none());
    }

    #[tokio::test]
    async fn login_rejection_is_validation_with_server_detail() {
        let app = Router::new().route(
            "/api/v1/users/login/",
            post(|| async {
                (
                    AxumStatus::BAD_REQUEST,
                    Json(serde_json::json!({
                        "version": "v1",
                        "err": {"non_field_errors": ["Invalid credentials"]},
                        "data": null
                    })),
                )
            }),
        );
        let base = spawn_api(app).await;

        let err = login(&reqwest::Client::new(), &base, "ada@example.com", "bad")
            .await
            .unwrap_err();
        match err {
            Error::Validation { status, detail } => {
                assert_eq!(status, 400);
                assert_eq!(detail["non_field_errors"][0], "Invalid credentials");
            }
            other => panic!("expected Validation, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn register_returns_user() {
        let app = Router::new().route(
            "/api/v1/users/register/",
            post(|Json(body): Json<serde_json::Value>| async move {
                assert_eq!(body["password_confirm"], "pw");
                (
                    AxumStatus::CREATED,
                    Json(serde_json::json!({
                        "version": "v1",
                        "err": null,
                        "data": {
                            "access_token": "at_1",
                            "refresh_token": "rt_1",
                            "user": {"id": "u1", "email": "ada@example.com"}
                        }
                    })),
                )
            }),
        );
        let base = spawn_api(app).await;

        let request = RegisterRequest {
            email: "ada@example.com".into(),
            password: "pw".into(),
            password_confirm: "pw".into(),
            first_name: String::new(),
            last_name: String::new(),
        };
        let tokens = register(&reqwest::Client::new(), &base, &request)
            .await
            .unwrap();
        assert_eq!(tokens.user.unwrap().id, "u1");
    }

    #[tokio::test]
    async fn refresh_401_is_invalid_credentials() {
        let app = Router::new().route(
            "/api/v1/users/login/refresh/",
            post(|| async {
                (
                    AxumStatus::UNAUTHORIZED,
                    Json(serde_json::json!({
                        "version": "v1",
                        "err": {"detail": "Token is blacklisted"},
                        "data": null
                    })),
                )
            }),
        );
        let base = spawn_api(app).await;

        let err = refresh_token(&reqwest::Client::new(), &base, "rt_old")
            .await
            .unwrap_err();
        assert!(
            matches!(&err, Error::InvalidCredentials(msg) if msg.contains("blacklisted")),
            "got: {err:?}"
        );
    }

    #[tokio::test]
    async fn refresh_5xx_is_token_exchange() {
        let app = Router::new().route(
            "/api/v1/users/login/refresh/",
            post(|| async { (AxumStatus::BAD_GATEWAY, "upstream down") }),
        );
        let base = spawn_api(app).await;

        let err = refresh_token(&reqwest::Client::new(), &base, "rt_old")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::TokenExchange(_)), "got: {err:?}");
    }

    #[tokio::test]
    async fn unreachable_server_is_network_failure() {
        // Bind then drop to get a port with nothing listening
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = refresh_token(&reqwest::Client::new(), &format!("http://{addr}/"), "rt")
            .await
            .unwrap_err();
        assert!(err.is_network(), "got: {err:?}");
    }
}
