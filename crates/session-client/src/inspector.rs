//! Access credential inspection.
//!
//! Decodes the payload segment of a signed token *without* verifying its
//! signature. The result is only used to decide when to renew; the server
//! remains the authority on whether a credential is valid.

use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::{STANDARD_NO_PAD, URL_SAFE_NO_PAD};
use chrono::Utc;
use serde::{Deserialize, Deserializer};

use crate::store::{CredentialStore, StoreKey};

/// Skew applied when none is configured.
pub const DEFAULT_EXPIRY_SKEW: Duration = Duration::from_secs(30);

/// Claims read from an access credential's payload.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TokenClaims {
    /// Expiry, seconds since the Unix epoch.
    #[serde(default, deserialize_with = "numeric_date")]
    pub exp: Option<i64>,
    #[serde(default, deserialize_with = "numeric_date")]
    pub iat: Option<i64>,
    #[serde(default)]
    pub sub: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Decode a token's payload. Returns `None` for anything malformed.
pub fn decode(token: &str) -> Option<TokenClaims> {
    let mut segments = token.split('.');
    let (_header, payload, _signature) = (segments.next()?, segments.next()?, segments.next()?);
    if segments.next().is_some() || payload.is_empty() {
        return None;
    }

    let payload = payload.trim_end_matches('=');
    let bytes = URL_SAFE_NO_PAD
        .decode(payload)
        .or_else(|_| STANDARD_NO_PAD.decode(payload))
        .ok()?;
    serde_json::from_slice(&bytes).ok()
}

/// Whether `token` is expired or expires within `skew` of now.
pub fn is_expired(token: &str, skew: Duration) -> bool {
    is_expired_at(token, skew, Utc::now().timestamp())
}

/// [`is_expired`] against an explicit clock (seconds since the epoch).
///
/// Undecodable tokens and tokens without an expiry count as expired.
pub fn is_expired_at(token: &str, skew: Duration, now: i64) -> bool {
    match decode(token).and_then(|claims| claims.exp) {
        Some(exp) => exp <= now.saturating_add(skew.as_secs() as i64),
        None => true,
    }
}

/// Time left until expiry, `None` if undecodable, without expiry or
/// already expired.
pub fn expires_in(token: &str, now: i64) -> Option<Duration> {
    let exp = decode(token)?.exp?;
    let remaining = exp.checked_sub(now)?;
    (remaining > 0).then(|| Duration::from_secs(remaining as u64))
}

/// Whether the store holds an access credential that is not expired.
pub fn is_authenticated(store: &dyn CredentialStore, skew: Duration) -> bool {
    match store.get(StoreKey::AccessToken) {
        Ok(Some(token)) => !is_expired(&token, skew),
        _ => false,
    }
}

fn numeric_date<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| match v {
        serde_json::Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        serde_json::Value::String(s) => s.parse().ok(),
        _ => None,
    }))
}
