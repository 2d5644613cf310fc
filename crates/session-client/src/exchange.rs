//! The renewal exchange: trade a refresh credential for a new credential
//! pair.
//!
//! The exchange talks to the network directly and never goes through the
//! request pipeline, so a rejected renewal can never start another one.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::config::ClientConfig;
use crate::error::{ApiError, SessionError};
use crate::metadata::UserClass;
use crate::store::CredentialPair;

/// Credentials issued by a successful renewal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenewedCredentials {
    pub access_token: String,
    /// Present when the server rotates the refresh credential.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

impl From<RenewedCredentials> for CredentialPair {
    fn from(renewed: RenewedCredentials) -> Self {
        Self {
            access_token: renewed.access_token,
            refresh_token: renewed.refresh_token,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RenewalBody<'a> {
    refresh_token: &'a str,
}

/// Performs the renewal call for a user class.
#[async_trait]
pub trait RenewalExchange: Send + Sync {
    async fn exchange(
        &self,
        class: UserClass,
        refresh_token: &str,
    ) -> Result<RenewedCredentials, SessionError>;
}

/// Renewal over HTTP: `POST {refreshToken}` to the class's renewal path.
#[derive(Debug, Clone)]
pub struct HttpRenewalExchange {
    client: reqwest::Client,
    config: ClientConfig,
}

impl HttpRenewalExchange {
    pub fn new(client: reqwest::Client, config: ClientConfig) -> Self {
        Self { client, config }
    }
}

#[async_trait]
impl RenewalExchange for HttpRenewalExchange {
    #[instrument(skip(self, refresh_token), fields(class = %class))]
    async fn exchange(
        &self,
        class: UserClass,
        refresh_token: &str,
    ) -> Result<RenewedCredentials, SessionError> {
        let url = self.config.url_for(self.config.endpoints.renewal.for_class(class))?;
        debug!(%url, "Starting renewal exchange");

        let response = self
            .client
            .post(url)
            .json(&RenewalBody { refresh_token })
            .send()
            .await
            .map_err(|e| SessionError::RenewalTransport(e.to_string()))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| SessionError::RenewalTransport(e.to_string()))?;

        if !status.is_success() {
            let classified = ApiError::classify(status, &body);
            return Err(SessionError::RenewalRejected {
                status: status.as_u16(),
                message: classified.message,
            });
        }

        let renewed: RenewedCredentials = serde_json::from_slice(&body)
            .map_err(|e| SessionError::RenewalDecode(e.to_string()))?;
        if renewed.access_token.is_empty() {
            return Err(SessionError::RenewalDecode("empty accessToken".to_string()));
        }

        debug!(rotated = renewed.refresh_token.is_some(), "Renewal exchange succeeded");
        Ok(renewed)
    }
}
