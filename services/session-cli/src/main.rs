//! Session CLI
//!
//! Command-line front end for the authenticated request layer:
//! 1. Loads config and opens the token file
//! 2. Restores the persisted session
//! 3. Runs one command (login, profile, arbitrary request, ...)
//! 4. Prints the result as JSON on stdout; logs go to stderr

mod args;
mod config;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use metrics_exporter_prometheus::PrometheusBuilder;
use reqwest::Method;
use serde_json::json;
use session_auth::{FileStorage, RegisterRequest};
use session_client::{ApiRequest, Session};
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::args::{Cli, Command};
use crate::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // JSON logs on stderr so stdout stays machine-readable
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr),
        )
        .init();

    let cli = Cli::parse();

    let prometheus = if cli.print_metrics {
        Some(
            PrometheusBuilder::new()
                .install_recorder()
                .context("failed to install metrics recorder")?,
        )
    } else {
        None
    };

    let config_path = Config::resolve_path(cli.config.as_deref());
    info!(path = %config_path.display(), "loading configuration");
    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    let storage = FileStorage::open(config.storage.token_file.clone())
        .await
        .with_context(|| {
            format!(
                "failed to open token file {}",
                config.storage.token_file.display()
            )
        })?;
    let session = Session::new(config.client_config(), Arc::new(storage))
        .context("failed to build session")?;
    session.initialize().await;

    let result = run(&session, cli.command).await;

    if let Some(handle) = prometheus {
        eprint!("{}", handle.render());
    }

    let output = result?;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

async fn run(session: &Session, command: Command) -> Result<serde_json::Value> {
    match command {
        Command::Status => Ok(status(session).await),

        Command::Login { email, password } => {
            session
                .login(&email, password.expose_str())
                .await
                .context("login failed")?;
            Ok(status(session).await)
        }

        Command::Register {
            email,
            password,
            password_confirm,
            first_name,
            last_name,
        } => {
            let password_confirm = password_confirm.as_ref().unwrap_or(&password);
            let request = RegisterRequest {
                email,
                password: password.expose_str().to_string(),
                password_confirm: password_confirm.expose_str().to_string(),
                first_name,
                last_name,
            };
            session
                .register(&request)
                .await
                .context("registration failed")?;
            Ok(status(session).await)
        }

        Command::Logout => {
            session.logout().await;
            Ok(status(session).await)
        }

        Command::Profile => {
            let user = session
                .fetch_profile()
                .await
                .context("failed to fetch profile")?;
            Ok(serde_json::to_value(user)?)
        }

        Command::Request {
            method,
            path,
            body,
            query,
        } => {
            let request = build_request(&method, path, body.as_deref(), query)?;
            let response = session
                .dispatcher()
                .send(&request)
                .await
                .with_context(|| format!("{} {} failed", request.method, request.path))?;

            let status = response.status().as_u16();
            let text = response.text().await.context("failed to read response body")?;
            let body = serde_json::from_str(&text).unwrap_or(serde_json::Value::String(text));
            Ok(json!({"status": status, "body": body}))
        }
    }
}

async fn status(session: &Session) -> serde_json::Value {
    let snapshot = session.snapshot().await;
    json!({
        "authenticated": snapshot.is_authenticated,
        "has_refresh_token": snapshot.refresh_token.is_some(),
        "user": snapshot.user,
    })
}

fn build_request(
    method: &str,
    path: String,
    body: Option<&str>,
    query: Vec<(String, String)>,
) -> Result<ApiRequest> {
    let method = Method::from_bytes(method.to_ascii_uppercase().as_bytes())
        .with_context(|| format!("invalid HTTP method: {method}"))?;

    let mut request = ApiRequest::new(method, path);
    request.query = query;
    if let Some(raw) = body {
        let body: serde_json::Value =
            serde_json::from_str(raw).context("--body is not valid JSON")?;
        request = request.with_body(body);
    }
    Ok(request)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_request_normalizes_method_and_parses_body() {
        let request = build_request(
            "patch",
            "bubbles/1/".into(),
            Some(r#"{"name":"renamed"}"#),
            vec![("expand".into(), "members".into())],
        )
        .unwrap();

        assert_eq!(request.method, Method::PATCH);
        assert_eq!(request.path, "bubbles/1/");
        assert_eq!(request.body.unwrap()["name"], "renamed");
        assert_eq!(request.query.len(), 1);
    }

    #[test]
    fn build_request_rejects_bad_body() {
        let err = build_request("POST", "bubbles/".into(), Some("{not json"), Vec::new())
            .unwrap_err();
        assert!(err.to_string().contains("not valid JSON"));
    }

    #[tokio::test]
    async fn status_of_fresh_session_is_logged_out() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::open(dir.path().join("tokens.json")).await.unwrap();
        let session = Session::new(Default::default(), Arc::new(storage)).unwrap();
        session.initialize().await;

        let value = status(&session).await;
        assert_eq!(value["authenticated"], false);
        assert_eq!(value["has_refresh_token"], false);
        assert!(value["user"].is_null());
    }
}
