use std::sync::Once;

use tracing::{debug, warn};

use crate::config::ClientConfig;
use crate::error::SessionError;

/// Install the aws-lc-rs rustls provider unless the process already has one.
fn ensure_crypto_provider() {
    static INSTALL: Once = Once::new();
    INSTALL.call_once(|| {
        if rustls::crypto::CryptoProvider::get_default().is_some() {
            return;
        }
        if rustls::crypto::aws_lc_rs::default_provider()
            .install_default()
            .is_err()
        {
            debug!("rustls crypto provider installed concurrently elsewhere");
        }
    });
}

/// Build the shared `reqwest::Client` with the configured bounds.
pub(crate) fn build_client(config: &ClientConfig) -> Result<reqwest::Client, SessionError> {
    ensure_crypto_provider();

    let mut builder = reqwest::Client::builder()
        .user_agent(config.user_agent.as_str())
        .connect_timeout(config.connect_timeout());

    if config.request_timeout_secs > 0 {
        builder = builder.timeout(config.request_timeout());
    } else {
        warn!("request_timeout_secs is 0; network calls are unbounded");
    }

    builder
        .build()
        .map_err(|e| SessionError::Configuration(format!("failed to build HTTP client: {e}")))
}
