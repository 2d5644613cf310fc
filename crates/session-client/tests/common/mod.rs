#![allow(dead_code)]

use std::sync::Arc;

use chrono::Utc;
use jsonwebtoken::{EncodingKey, Header};
use session_client::{
    ClientConfig, CredentialPair, CredentialStore, MemoryStore, RecordingNavigator,
    SessionManager,
};
use wiremock::MockServer;

const SECRET: &[u8] = b"integration-secret";

/// HS256 token for `sub` expiring `ttl_secs` from now.
pub fn mint(sub: &str, ttl_secs: i64) -> String {
    let now = Utc::now().timestamp();
    let claims = serde_json::json!({
        "sub": sub,
        "iat": now,
        "exp": now + ttl_secs,
    });
    jsonwebtoken::encode(&Header::default(), &claims, &EncodingKey::from_secret(SECRET)).unwrap()
}

pub struct Harness {
    pub server: MockServer,
    pub manager: SessionManager,
    pub store: Arc<MemoryStore>,
    pub navigator: Arc<RecordingNavigator>,
}

impl Harness {
    pub async fn start() -> Self {
        Self::start_with(|_| {}).await
    }

    pub async fn start_with(configure: impl FnOnce(&mut ClientConfig)) -> Self {
        let server = MockServer::start().await;
        let mut config = ClientConfig::with_base_url(server.uri().parse().unwrap());
        config.request_timeout_secs = 5;
        configure(&mut config);

        let store = Arc::new(MemoryStore::new());
        let navigator = Arc::new(RecordingNavigator::new());
        let manager = SessionManager::new(config, store.clone(), navigator.clone()).unwrap();

        Self {
            server,
            manager,
            store,
            navigator,
        }
    }

    pub fn seed(&self, access_token: &str, refresh_token: Option<&str>) {
        self.store
            .store_pair(&CredentialPair {
                access_token: access_token.to_string(),
                refresh_token: refresh_token.map(str::to_string),
            })
            .unwrap();
    }

    pub fn stored_access(&self) -> Option<String> {
        self.manager.access_token().unwrap()
    }
}

pub fn bearer(token: &str) -> String {
    format!("Bearer {token}")
}
