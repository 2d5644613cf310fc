//! Request pipeline.
//!
//! Wraps every outbound call: attaches the stored access credential,
//! brackets the round trip with the loading signal, and on a `401` routes
//! through the renewal coordinator before retrying the original request
//! exactly once.

use std::sync::Arc;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, instrument, warn};

use crate::config::ClientConfig;
use crate::error::{ApiError, ErrorKind};
use crate::inspector;
use crate::loading::LoadingSignal;
use crate::renewal::RenewalCoordinator;
use crate::store::{CredentialStore, StoreKey};

/// An outbound API call. Cheap to clone so it can be reissued after a
/// renewal.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<serde_json::Value>,
    pub headers: HeaderMap,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
            headers: HeaderMap::new(),
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Attach a JSON body.
    pub fn with_json<T: Serialize>(mut self, body: &T) -> Result<Self, ApiError> {
        let value = serde_json::to_value(body).map_err(|e| {
            ApiError::new(ErrorKind::Decode, None, format!("unserializable body: {e}"))
        })?;
        self.body = Some(value);
        Ok(self)
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }
}

/// A successful response. The body is passed through unchanged.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    /// `null` for an empty body, a JSON string for a non-JSON body.
    pub body: serde_json::Value,
}

impl ApiResponse {
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        serde_json::from_value(self.body.clone()).map_err(|e| {
            ApiError::new(
                ErrorKind::Decode,
                Some(self.status.as_u16()),
                format!("unexpected response body: {e}"),
            )
        })
    }
}

/// Attaches credentials and applies the renew-then-retry-once policy.
#[derive(Debug, Clone)]
pub struct RequestPipeline {
    client: reqwest::Client,
    config: Arc<ClientConfig>,
    store: Arc<dyn CredentialStore>,
    loading: LoadingSignal,
    coordinator: Arc<RenewalCoordinator>,
}

impl RequestPipeline {
    pub fn new(
        client: reqwest::Client,
        config: Arc<ClientConfig>,
        store: Arc<dyn CredentialStore>,
        loading: LoadingSignal,
        coordinator: Arc<RenewalCoordinator>,
    ) -> Self {
        Self {
            client,
            config,
            store,
            loading,
            coordinator,
        }
    }

    /// Send a request.
    ///
    /// A `401` from an ordinary endpoint triggers one renewal and one retry
    /// with the renewed credential. If renewal fails, the renewal failure
    /// is returned rather than the original `401`. A `401` from a login or
    /// renewal endpoint is terminal and never renewed.
    #[instrument(skip(self, request), fields(method = %request.method, path = %request.path))]
    pub async fn send(&self, request: ApiRequest) -> Result<ApiResponse, ApiError> {
        let auth_endpoint = self.config.is_auth_endpoint(&request.path);
        if self.config.proactive_renewal && !auth_endpoint {
            self.ensure_fresh().await?;
        }

        let mut token = self.current_access()?;
        let mut retried = false;
        loop {
            match self.attempt(&request, token.as_deref()).await {
                Err(err) if err.kind == ErrorKind::Unauthorized => {
                    if auth_endpoint {
                        debug!("401 from authentication endpoint; not renewing");
                        return Err(ApiError::new(ErrorKind::TerminalAuth, err.status, err.message));
                    }
                    if retried {
                        warn!("Request rejected again after renewal");
                        return Err(err);
                    }
                    retried = true;
                    let renewed = self.coordinator.renew(token.as_deref()).await?;
                    debug!("Retrying request with renewed credential");
                    token = Some(renewed);
                }
                result => return result,
            }
        }
    }

    /// Renew ahead of time if the stored access credential is inside the
    /// expiry window. Returns whether a renewal happened.
    ///
    /// Without a refresh credential nothing is done; the server decides.
    pub async fn ensure_fresh(&self) -> Result<bool, ApiError> {
        let Some(token) = self.current_access()? else {
            return Ok(false);
        };
        if !inspector::is_expired(&token, self.config.expiry_skew()) {
            return Ok(false);
        }
        if self.store.get(StoreKey::RefreshToken)?.is_none() {
            return Ok(false);
        }

        debug!("Access credential inside expiry window; renewing before send");
        self.coordinator.renew(Some(&token)).await?;
        Ok(true)
    }

    pub fn loading(&self) -> &LoadingSignal {
        &self.loading
    }

    fn current_access(&self) -> Result<Option<String>, ApiError> {
        Ok(self.store.get(StoreKey::AccessToken)?)
    }

    async fn attempt(
        &self,
        request: &ApiRequest,
        token: Option<&str>,
    ) -> Result<ApiResponse, ApiError> {
        let url = self.config.url_for(&request.path)?;
        let mut builder = self
            .client
            .request(request.method.clone(), url)
            .headers(request.headers.clone());
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }
        if let Some(token) = token {
            builder = builder.bearer_auth(token);
        }

        let _loading = self.loading.begin();
        let response = builder
            .send()
            .await
            .map_err(|e| ApiError::from_transport(&e))?;
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| ApiError::from_transport(&e))?;

        if !status.is_success() {
            let err = ApiError::classify(status, &bytes);
            debug!(status = status.as_u16(), kind = %err.kind, "Request failed");
            return Err(err);
        }

        Ok(ApiResponse {
            status,
            headers,
            body: parse_body(&bytes),
        })
    }
}

fn parse_body(bytes: &[u8]) -> serde_json::Value {
    if bytes.is_empty() {
        return serde_json::Value::Null;
    }
    serde_json::from_slice(bytes)
        .unwrap_or_else(|_| serde_json::Value::String(String::from_utf8_lossy(bytes).into_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_builders() {
        let request = ApiRequest::post("/tests")
            .with_json(&serde_json::json!({ "title": "Algebra" }))
            .unwrap()
            .with_query("page", "2");
        assert_eq!(request.method, Method::POST);
        assert_eq!(request.path, "/tests");
        assert_eq!(request.query, vec![("page".to_string(), "2".to_string())]);
        assert_eq!(request.body.unwrap()["title"], "Algebra");
    }

    #[test]
    fn test_parse_body() {
        assert_eq!(parse_body(b""), serde_json::Value::Null);
        assert_eq!(parse_body(br#"{"a":1}"#)["a"], 1);
        assert_eq!(parse_body(b"plain text"), serde_json::Value::from("plain text"));
    }

    #[test]
    fn test_response_json() {
        #[derive(serde::Deserialize)]
        struct Question {
            id: u32,
        }
        let response = ApiResponse {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: serde_json::json!({ "id": 3 }),
        };
        assert_eq!(response.json::<Question>().unwrap().id, 3);

        let err = response.json::<Vec<u32>>().unwrap_err();
        assert_eq!(err.kind, ErrorKind::Decode);
    }
}
