//! Client configuration.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::SessionError;
use crate::metadata::UserClass;

pub const DEFAULT_USER_AGENT: &str = concat!("session-client/", env!("CARGO_PKG_VERSION"));

/// Per-class endpoint paths.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassPaths {
    pub staff: String,
    pub examinee: String,
}

impl ClassPaths {
    /// Look up the path for a user class.
    pub fn for_class(&self, class: UserClass) -> &str {
        match class {
            UserClass::Staff => &self.staff,
            UserClass::Examinee => &self.examinee,
        }
    }

    fn contains(&self, path: &str) -> bool {
        normalize_path(&self.staff) == path || normalize_path(&self.examinee) == path
    }
}

/// Login and renewal endpoints, keyed by user class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointTable {
    pub login: ClassPaths,
    pub renewal: ClassPaths,
}

impl Default for EndpointTable {
    fn default() -> Self {
        Self {
            login: ClassPaths {
                staff: "/auth/login".to_string(),
                examinee: "/examinee/auth/login".to_string(),
            },
            renewal: ClassPaths {
                staff: "/auth/refresh".to_string(),
                examinee: "/examinee/auth/refresh".to_string(),
            },
        }
    }
}

/// Configuration for the session client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// API origin. Request paths are appended to it.
    pub base_url: Url,

    /// Upper bound for every network call, renewal exchange included.
    pub request_timeout_secs: u64,

    /// Time allowed to establish a connection.
    pub connect_timeout_secs: u64,

    /// Tokens expiring within this many seconds count as expired.
    pub expiry_skew_secs: u64,

    /// Renew before sending when the stored access token is already
    /// inside the skew window, instead of waiting for a 401.
    pub proactive_renewal: bool,

    /// User agent string
    pub user_agent: String,

    /// Where the navigator is sent after logout or a terminal failure.
    pub login_redirect: String,

    pub endpoints: EndpointTable,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: Url::parse("http://127.0.0.1:8080").expect("static URL is valid"),
            request_timeout_secs: 30,
            connect_timeout_secs: 10,
            expiry_skew_secs: 30,
            proactive_renewal: false,
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            login_redirect: "/login".to_string(),
            endpoints: EndpointTable::default(),
        }
    }
}

impl ClientConfig {
    /// Config with defaults pointed at `base_url`.
    pub fn with_base_url(base_url: Url) -> Self {
        Self {
            base_url,
            ..Self::default()
        }
    }

    /// Parse a TOML document. Missing fields fall back to defaults.
    pub fn from_toml_str(raw: &str) -> Result<Self, SessionError> {
        toml::from_str(raw)
            .map_err(|e| SessionError::Configuration(format!("invalid config: {e}")))
    }

    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, SessionError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            SessionError::Configuration(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn expiry_skew(&self) -> Duration {
        Duration::from_secs(self.expiry_skew_secs)
    }

    /// Resolve an API path against `base_url`, keeping any path prefix the
    /// base carries (`http://host/api` + `/x` => `http://host/api/x`).
    pub fn url_for(&self, path: &str) -> Result<Url, SessionError> {
        let base = self.base_url.as_str().trim_end_matches('/');
        let joined = if path.starts_with('/') {
            format!("{base}{path}")
        } else {
            format!("{base}/{path}")
        };
        Url::parse(&joined)
            .map_err(|e| SessionError::Configuration(format!("invalid URL `{joined}`: {e}")))
    }

    /// Whether `path` is a login or renewal endpoint. A 401 from one of
    /// these never enters the renewal state machine.
    pub fn is_auth_endpoint(&self, path: &str) -> bool {
        let path = normalize_path(path);
        self.endpoints.login.contains(&path) || self.endpoints.renewal.contains(&path)
    }
}

fn normalize_path(path: &str) -> String {
    let path = path.split(['?', '#']).next().unwrap_or_default();
    let path = path.trim_end_matches('/');
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.expiry_skew(), Duration::from_secs(30));
        assert_eq!(config.login_redirect, "/login");
        assert_eq!(
            config.endpoints.renewal.for_class(UserClass::Examinee),
            "/examinee/auth/refresh"
        );
        assert_eq!(config.endpoints.renewal.for_class(UserClass::Staff), "/auth/refresh");
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = ClientConfig::from_toml_str(
            r#"
            base_url = "https://api.example.com/v1"
            expiry_skew_secs = 60

            [endpoints.renewal]
            staff = "/token/refresh"
            examinee = "/candidate/token/refresh"
            "#,
        )
        .expect("config should parse");

        assert_eq!(config.expiry_skew_secs, 60);
        assert_eq!(config.request_timeout_secs, 30);
        assert_eq!(config.endpoints.renewal.staff, "/token/refresh");
        assert_eq!(config.endpoints.login.staff, "/auth/login");
    }

    #[test]
    fn test_invalid_toml_is_configuration_error() {
        let err = ClientConfig::from_toml_str("base_url = 12").unwrap_err();
        assert!(matches!(err, SessionError::Configuration(_)));
    }

    #[test]
    fn test_url_for_keeps_base_prefix() {
        let config =
            ClientConfig::with_base_url(Url::parse("https://api.example.com/v1/").unwrap());
        assert_eq!(
            config.url_for("/tests/42").unwrap().as_str(),
            "https://api.example.com/v1/tests/42"
        );
        assert_eq!(
            config.url_for("tests").unwrap().as_str(),
            "https://api.example.com/v1/tests"
        );
    }

    #[test]
    fn test_is_auth_endpoint() {
        let config = ClientConfig::default();
        assert!(config.is_auth_endpoint("/auth/login"));
        assert!(config.is_auth_endpoint("/auth/refresh/"));
        assert!(config.is_auth_endpoint("examinee/auth/refresh?x=1"));
        assert!(!config.is_auth_endpoint("/auth/profile"));
        assert!(!config.is_auth_endpoint("/tests"));
    }
}
