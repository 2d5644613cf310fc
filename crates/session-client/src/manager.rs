//! Session manager: the explicitly constructed owner of all session state.
//!
//! One manager is created per process (or per test) and shared; nothing in
//! this crate keeps module-level state.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::ClientConfig;
use crate::error::{ApiError, ErrorKind, SessionError};
use crate::exchange::{HttpRenewalExchange, RenewalExchange};
use crate::http;
use crate::inspector;
use crate::loading::LoadingSignal;
use crate::metadata::{SessionMetadata, UserClass};
use crate::pipeline::{ApiRequest, ApiResponse, RequestPipeline};
use crate::renewal::RenewalCoordinator;
use crate::store::{CredentialPair, CredentialStore, MemoryStore, StoreKey};
use crate::teardown::{Navigator, SessionTeardown, TracingNavigator};

/// Credentials submitted to a login endpoint.
#[derive(Debug, Clone)]
pub struct LoginRequest {
    pub class: UserClass,
    pub credentials: serde_json::Value,
}

impl LoginRequest {
    pub fn new(class: UserClass, credentials: serde_json::Value) -> Self {
        Self { class, credentials }
    }

    /// Identifier and password login. The identifier is sent as `email`.
    pub fn password(class: UserClass, identifier: &str, password: &str) -> Self {
        Self::new(
            class,
            serde_json::json!({ "email": identifier, "password": password }),
        )
    }
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
struct LoginPayload {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    user: Option<serde_json::Value>,
    #[serde(default)]
    organization: Option<serde_json::Value>,
}

/// Owns the credential store, loading signal, renewal coordinator,
/// teardown and request pipeline of one session.
#[derive(Debug, Clone)]
pub struct SessionManager {
    config: Arc<ClientConfig>,
    store: Arc<dyn CredentialStore>,
    loading: LoadingSignal,
    teardown: SessionTeardown,
    coordinator: Arc<RenewalCoordinator>,
    pipeline: RequestPipeline,
}

impl SessionManager {
    /// Manager with the HTTP renewal exchange.
    pub fn new(
        config: ClientConfig,
        store: Arc<dyn CredentialStore>,
        navigator: Arc<dyn Navigator>,
    ) -> Result<Self, SessionError> {
        Self::builder(config)
            .store(store)
            .navigator(navigator)
            .build()
    }

    pub fn builder(config: ClientConfig) -> SessionManagerBuilder {
        SessionManagerBuilder::new(config)
    }

    /// Log in and persist the issued credentials and metadata.
    ///
    /// The user class is resolved here, once, and carried in the stored
    /// metadata for routing later renewals.
    pub async fn login(&self, request: LoginRequest) -> Result<SessionMetadata, ApiError> {
        let path = self.config.endpoints.login.for_class(request.class);
        let response = self
            .pipeline
            .send(ApiRequest::post(path).with_json(&request.credentials)?)
            .await?;
        let payload = parse_login_payload(&response)?;

        self.store.clear_all()?;
        self.store.store_pair(&CredentialPair {
            access_token: payload.access_token,
            refresh_token: payload.refresh_token,
        })?;

        let metadata = SessionMetadata::from_login_user(request.class, payload.user.as_ref());
        metadata.save(self.store.as_ref())?;

        if let Some(organization) = payload.organization.filter(|o| !o.is_null()) {
            let raw = match organization {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            };
            self.store.set(StoreKey::OrganizationContext, &raw)?;
        }

        info!(class = %metadata.user_class, "Logged in");
        Ok(metadata)
    }

    /// End the session and redirect to the login entry point.
    pub fn logout(&self) {
        self.teardown.logout();
    }

    pub async fn send(&self, request: ApiRequest) -> Result<ApiResponse, ApiError> {
        self.pipeline.send(request).await
    }

    pub async fn get(&self, path: &str) -> Result<ApiResponse, ApiError> {
        self.pipeline.send(ApiRequest::get(path)).await
    }

    pub async fn post_json<T: Serialize>(
        &self,
        path: &str,
        body: &T,
    ) -> Result<ApiResponse, ApiError> {
        self.pipeline.send(ApiRequest::post(path).with_json(body)?).await
    }

    /// Whether a non-expired access credential is stored.
    pub fn is_authenticated(&self) -> bool {
        inspector::is_authenticated(self.store.as_ref(), self.config.expiry_skew())
    }

    /// Renew now if the access credential is inside the expiry window.
    pub async fn ensure_fresh(&self) -> Result<bool, ApiError> {
        self.pipeline.ensure_fresh().await
    }

    pub fn metadata(&self) -> Option<SessionMetadata> {
        SessionMetadata::load(self.store.as_ref())
    }

    /// Stored access credential, if any.
    pub fn access_token(&self) -> Result<Option<String>, SessionError> {
        self.store.get(StoreKey::AccessToken)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn loading(&self) -> &LoadingSignal {
        &self.loading
    }

    pub fn store(&self) -> &Arc<dyn CredentialStore> {
        &self.store
    }

    pub fn coordinator(&self) -> &Arc<RenewalCoordinator> {
        &self.coordinator
    }

    pub fn pipeline(&self) -> &RequestPipeline {
        &self.pipeline
    }
}

fn parse_login_payload(response: &ApiResponse) -> Result<LoginPayload, ApiError> {
    // Some deployments wrap the payload in `data`.
    let body = match response.body.get("data") {
        Some(data) if response.body.get("accessToken").is_none() => data.clone(),
        _ => response.body.clone(),
    };
    let payload: LoginPayload = serde_json::from_value(body).map_err(|e| {
        ApiError::new(
            ErrorKind::Decode,
            Some(response.status.as_u16()),
            format!("invalid login response: {e}"),
        )
    })?;
    if payload.access_token.is_empty() {
        return Err(ApiError::new(
            ErrorKind::Decode,
            Some(response.status.as_u16()),
            "login response carried an empty accessToken",
        ));
    }
    Ok(payload)
}

/// Builder for [`SessionManager`].
pub struct SessionManagerBuilder {
    config: ClientConfig,
    store: Option<Arc<dyn CredentialStore>>,
    navigator: Option<Arc<dyn Navigator>>,
    exchange: Option<Arc<dyn RenewalExchange>>,
    client: Option<reqwest::Client>,
}

impl SessionManagerBuilder {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            store: None,
            navigator: None,
            exchange: None,
            client: None,
        }
    }

    pub fn store(mut self, store: Arc<dyn CredentialStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn navigator(mut self, navigator: Arc<dyn Navigator>) -> Self {
        self.navigator = Some(navigator);
        self
    }

    /// Replace the HTTP renewal exchange.
    pub fn exchange(mut self, exchange: Arc<dyn RenewalExchange>) -> Self {
        self.exchange = Some(exchange);
        self
    }

    /// Use a preconfigured HTTP client instead of building one from the
    /// config.
    pub fn client(mut self, client: reqwest::Client) -> Self {
        self.client = Some(client);
        self
    }

    pub fn build(self) -> Result<SessionManager, SessionError> {
        let client = match self.client {
            Some(client) => client,
            None => http::build_client(&self.config)?,
        };
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryStore::new()) as Arc<dyn CredentialStore>);
        let navigator = self
            .navigator
            .unwrap_or_else(|| Arc::new(TracingNavigator) as Arc<dyn Navigator>);
        let exchange = self.exchange.unwrap_or_else(|| {
            Arc::new(HttpRenewalExchange::new(client.clone(), self.config.clone()))
                as Arc<dyn RenewalExchange>
        });

        let config = Arc::new(self.config);
        let loading = LoadingSignal::new();
        let teardown = SessionTeardown::new(
            Arc::clone(&store),
            navigator,
            config.login_redirect.clone(),
        );
        let coordinator = Arc::new(RenewalCoordinator::new(
            Arc::clone(&store),
            exchange,
            teardown.clone(),
        ));
        let pipeline = RequestPipeline::new(
            client,
            Arc::clone(&config),
            Arc::clone(&store),
            loading.clone(),
            Arc::clone(&coordinator),
        );

        Ok(SessionManager {
            config,
            store,
            loading,
            teardown,
            coordinator,
            pipeline,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;
    use reqwest::header::HeaderMap;

    fn response(body: serde_json::Value) -> ApiResponse {
        ApiResponse {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body,
        }
    }

    #[test]
    fn test_parse_login_payload_plain_and_wrapped() {
        let plain = parse_login_payload(&response(serde_json::json!({
            "accessToken": "a1",
            "refreshToken": "r1",
        })))
        .unwrap();
        assert_eq!(plain.access_token, "a1");
        assert_eq!(plain.refresh_token.as_deref(), Some("r1"));

        let wrapped = parse_login_payload(&response(serde_json::json!({
            "success": true,
            "data": { "accessToken": "a2", "user": { "id": 1 } },
        })))
        .unwrap();
        assert_eq!(wrapped.access_token, "a2");
        assert!(wrapped.user.is_some());
    }

    #[test]
    fn test_parse_login_payload_rejects_missing_token() {
        let err = parse_login_payload(&response(serde_json::json!({ "ok": true }))).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Decode);

        let err =
            parse_login_payload(&response(serde_json::json!({ "accessToken": "" }))).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Decode);
    }

    #[tokio::test]
    async fn test_builder_defaults() {
        let manager = SessionManager::builder(ClientConfig::default())
            .build()
            .unwrap();
        assert!(!manager.is_authenticated());
        assert!(manager.metadata().is_none());
        assert_eq!(manager.loading().in_flight(), 0);
        assert!(!manager.coordinator().is_renewing());
    }
}
