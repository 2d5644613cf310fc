//! Error types for the session client.
//!
//! [`SessionError`] describes renewal and storage failures inside the
//! session layer. [`ApiError`] is the normalized shape every caller of the
//! request pipeline receives, so calling code never inspects transport
//! specific errors.

use reqwest::StatusCode;
use serde::Serialize;
use serde::ser::{SerializeStruct, Serializer};
use thiserror::Error;

/// Failures of the session layer itself.
///
/// `Clone` because a single renewal failure is delivered to every caller
/// queued behind the exchange.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionError {
    /// No refresh credential stored - re-login required.
    #[error("no refresh credential stored - re-login required")]
    NoRefreshCredential,

    /// The renewal endpoint answered with a non-success status.
    #[error("credential renewal rejected (HTTP {status}): {message}")]
    RenewalRejected { status: u16, message: String },

    /// The renewal exchange never produced a response.
    #[error("credential renewal failed: {0}")]
    RenewalTransport(String),

    /// The renewal endpoint answered 2xx with an unusable body.
    #[error("invalid renewal response: {0}")]
    RenewalDecode(String),

    /// The renewal succeeded but the new credentials could not be stored.
    #[error("failed to store renewed credentials: {0}")]
    RenewalPersist(String),

    /// The renewal task ended without settling this caller.
    #[error("credential renewal aborted")]
    RenewalAborted,

    /// Credential store failure.
    #[error("credential store error: {0}")]
    Storage(String),

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl SessionError {
    /// Whether this error ends the session (store cleared, redirect issued).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::NoRefreshCredential
                | Self::RenewalRejected { .. }
                | Self::RenewalTransport(_)
                | Self::RenewalDecode(_)
                | Self::RenewalPersist(_)
        )
    }
}

/// Classification of a failed API call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum ErrorKind {
    /// Authentication cannot be recovered; the session has ended or the
    /// request targeted a login/renewal endpoint.
    TerminalAuth,
    /// 401 on a request that was already retried once.
    Unauthorized,
    Forbidden,
    NotFound,
    ServerFault,
    /// Any other 4xx.
    ClientError,
    /// No response received, or a renewal abandoned before it settled.
    Network,
    /// No response within the configured bound.
    Timeout,
    /// Response received but its body could not be read.
    Decode,
    Configuration,
}

/// Normalized API failure.
///
/// Serializes as `{"success": false, "status": ..., "message": ...}`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct ApiError {
    pub kind: ErrorKind,
    pub status: Option<u16>,
    pub message: String,
}

impl ApiError {
    pub fn new(kind: ErrorKind, status: Option<u16>, message: impl Into<String>) -> Self {
        Self {
            kind,
            status,
            message: message.into(),
        }
    }

    /// Classify a non-success HTTP response.
    ///
    /// The message is taken from a JSON body's `message` or `error` field
    /// when present, otherwise from the status reason phrase.
    pub fn classify(status: StatusCode, body: &[u8]) -> Self {
        let kind = match status.as_u16() {
            401 => ErrorKind::Unauthorized,
            403 => ErrorKind::Forbidden,
            404 => ErrorKind::NotFound,
            500..=599 => ErrorKind::ServerFault,
            _ => ErrorKind::ClientError,
        };
        Self::new(kind, Some(status.as_u16()), message_from_body(status, body))
    }

    /// Map a transport failure (no response received).
    pub fn from_transport(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::new(ErrorKind::Timeout, None, format!("request timed out: {err}"))
        } else {
            Self::new(ErrorKind::Network, None, format!("network error: {err}"))
        }
    }

    /// Always `false`; present so callers can treat the error like the
    /// `success` flag of the wire shape.
    pub fn success(&self) -> bool {
        false
    }

    pub fn is_auth(&self) -> bool {
        matches!(self.kind, ErrorKind::TerminalAuth | ErrorKind::Unauthorized)
    }
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        match &err {
            SessionError::RenewalRejected { status, .. } => {
                Self::new(ErrorKind::TerminalAuth, Some(*status), err.to_string())
            }
            e if e.is_terminal() => Self::new(ErrorKind::TerminalAuth, None, err.to_string()),
            SessionError::Configuration(_) | SessionError::Storage(_) => {
                Self::new(ErrorKind::Configuration, None, err.to_string())
            }
            // The session is still intact; the caller may retry.
            _ => Self::new(ErrorKind::Network, None, err.to_string()),
        }
    }
}

impl Serialize for ApiError {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("ApiError", 4)?;
        state.serialize_field("success", &false)?;
        state.serialize_field("kind", &self.kind.to_string())?;
        state.serialize_field("status", &self.status)?;
        state.serialize_field("message", &self.message)?;
        state.end()
    }
}

fn message_from_body(status: StatusCode, body: &[u8]) -> String {
    let from_json = serde_json::from_slice::<serde_json::Value>(body)
        .ok()
        .and_then(|value| {
            ["message", "error"]
                .iter()
                .find_map(|field| value.get(*field).and_then(|m| m.as_str()).map(str::to_owned))
        })
        .filter(|message| !message.is_empty());

    from_json.unwrap_or_else(|| {
        status
            .canonical_reason()
            .map(str::to_owned)
            .unwrap_or_else(|| format!("HTTP {}", status.as_u16()))
    })
}
