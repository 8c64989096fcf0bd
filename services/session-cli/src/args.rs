//! Command line arguments

use clap::{Parser, Subcommand};
use common::Secret;

#[derive(Parser, Debug)]
#[command(name = "session-cli")]
#[command(about = "Authenticated API session client")]
#[command(version)]
pub struct Cli {
    /// Path to the TOML config file (falls back to CONFIG_PATH, then session-cli.toml)
    #[arg(long, global = true)]
    pub config: Option<String>,

    /// Print refresh and retry counters to stderr before exiting
    #[arg(long, global = true)]
    pub print_metrics: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Show whether a session is stored and who it belongs to
    Status,

    /// Log in with email and password
    Login {
        #[arg(long)]
        email: String,
        #[arg(long, env = "SESSION_PASSWORD", hide_env_values = true, value_parser = parse_secret)]
        password: Secret<String>,
    },

    /// Create an account and log in
    Register {
        #[arg(long)]
        email: String,
        #[arg(long, env = "SESSION_PASSWORD", hide_env_values = true, value_parser = parse_secret)]
        password: Secret<String>,
        /// Defaults to the password
        #[arg(long, value_parser = parse_secret)]
        password_confirm: Option<Secret<String>>,
        #[arg(long, default_value = "")]
        first_name: String,
        #[arg(long, default_value = "")]
        last_name: String,
    },

    /// Forget the stored session
    Logout,

    /// Fetch the current user's profile
    Profile,

    /// Send an authenticated request, e.g. `request GET bubbles/`
    Request {
        method: String,
        /// Path relative to the API base URL
        path: String,
        /// JSON request body
        #[arg(long)]
        body: Option<String>,
        /// Query parameter as key=value (repeatable)
        #[arg(long = "query", value_parser = parse_key_value)]
        query: Vec<(String, String)>,
    },
}

fn parse_secret(raw: &str) -> Result<Secret<String>, String> {
    Ok(Secret::new(raw.to_string()))
}

fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected key=value, got: {raw}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_request_with_body_and_query() {
        let cli = Cli::try_parse_from([
            "session-cli",
            "request",
            "post",
            "bubbles/",
            "--body",
            r#"{"name":"b"}"#,
            "--query",
            "page=2",
        ])
        .unwrap();

        match cli.command {
            Command::Request {
                method,
                path,
                body,
                query,
            } => {
                assert_eq!(method, "post");
                assert_eq!(path, "bubbles/");
                assert_eq!(body.as_deref(), Some(r#"{"name":"b"}"#));
                assert_eq!(query, vec![("page".to_string(), "2".to_string())]);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn global_config_flag_after_subcommand() {
        let cli = Cli::try_parse_from(["session-cli", "status", "--config", "/etc/s.toml"]).unwrap();
        assert_eq!(cli.config.as_deref(), Some("/etc/s.toml"));
        assert!(matches!(cli.command, Command::Status));
    }

    #[test]
    fn login_with_explicit_password() {
        let cli = Cli::try_parse_from([
            "session-cli",
            "login",
            "--email",
            "ada@example.com",
            "--password",
            "pw",
        ])
        .unwrap();
        assert!(matches!(cli.command, Command::Login { ref email, .. } if email == "ada@example.com"));
    }

    #[test]
    fn passwords_are_redacted_in_debug() {
        let cli = Cli::try_parse_from([
            "session-cli",
            "register",
            "--email",
            "ada@example.com",
            "--password",
            "hunter22",
            "--password-confirm",
            "hunter22",
        ])
        .unwrap();
        let debug = format!("{:?}", cli.command);
        assert!(!debug.contains("hunter22"), "got: {debug}");

        match cli.command {
            Command::Register {
                password,
                password_confirm,
                ..
            } => {
                assert_eq!(password.expose_str(), "hunter22");
                assert_eq!(password_confirm.unwrap().expose_str(), "hunter22");
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn malformed_query_is_rejected() {
        let result = Cli::try_parse_from(["session-cli", "request", "GET", "x/", "--query", "page"]);
        assert!(result.is_err());
    }
}
