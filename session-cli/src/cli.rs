use std::path::PathBuf;

use clap::{Parser, Subcommand};
use session_client::UserClass;
use url::Url;

#[derive(Parser, Debug)]
#[command(
    name = "sessionctl",
    version,
    about = "Log in, call authenticated API endpoints and manage the stored session"
)]
pub struct Args {
    /// Configuration file (defaults to the user config directory)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Credential store file (defaults to the user data directory)
    #[arg(long, global = true)]
    pub store: Option<PathBuf>,

    /// Override the API base URL
    #[arg(long, global = true)]
    pub base_url: Option<Url>,

    /// Enable debug logging
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Only log errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Log in and store the issued credentials
    Login {
        /// Account class to log in as (staff or examinee)
        #[arg(long, default_value = "staff")]
        class: UserClass,

        /// Login identifier (email)
        #[arg(long)]
        identifier: String,

        /// Password; read from stdin when omitted
        #[arg(long, env = "SESSIONCTL_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },

    /// Send an authenticated request and print the response body
    Request {
        /// HTTP method
        method: reqwest::Method,

        /// API path, relative to the base URL
        path: String,

        /// JSON request body
        #[arg(short, long)]
        data: Option<String>,

        /// Query parameter as key=value (repeatable)
        #[arg(long = "query", value_parser = parse_key_val)]
        query: Vec<(String, String)>,
    },

    /// Show whether a session is stored and when it expires
    Status,

    /// Renew the access credential if it is close to expiry
    Refresh,

    /// Clear the stored session
    Logout,
}

fn parse_key_val(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got `{raw}`"))?;
    if key.is_empty() {
        return Err(format!("empty key in `{raw}`"));
    }
    Ok((key.to_string(), value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        Args::command().debug_assert();
    }

    #[test]
    fn parse_request_command() {
        let args = Args::try_parse_from([
            "sessionctl",
            "request",
            "POST",
            "/tests",
            "--data",
            r#"{"title":"Algebra"}"#,
            "--query",
            "page=2",
        ])
        .unwrap();
        match args.command {
            Commands::Request {
                method,
                path,
                data,
                query,
            } => {
                assert_eq!(method, reqwest::Method::POST);
                assert_eq!(path, "/tests");
                assert!(data.is_some());
                assert_eq!(query, vec![("page".to_string(), "2".to_string())]);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn parse_login_class() {
        let args = Args::try_parse_from([
            "sessionctl",
            "login",
            "--class",
            "Examinee",
            "--identifier",
            "e-3",
            "--password",
            "pw",
        ])
        .unwrap();
        assert!(matches!(
            args.command,
            Commands::Login {
                class: UserClass::Examinee,
                ..
            }
        ));
    }

    #[test]
    fn parse_key_val_rejects_malformed() {
        assert!(parse_key_val("page").is_err());
        assert!(parse_key_val("=2").is_err());
        assert_eq!(
            parse_key_val("q=a=b").unwrap(),
            ("q".to_string(), "a=b".to_string())
        );
    }
}
