//! Session teardown: clear every stored credential and send the user back
//! to the unauthenticated entry point.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{info, warn};

use crate::store::CredentialStore;

/// Navigation side of teardown (the browser redirect in the web client).
pub trait Navigator: Send + Sync {
    fn navigate(&self, path: &str);
}

/// Navigator that only logs the redirect. Suitable for headless use.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNavigator;

impl Navigator for TracingNavigator {
    fn navigate(&self, path: &str) {
        info!(target: "session_client::navigation", path, "Redirecting");
    }
}

/// Navigator that records every redirect it is asked to perform.
#[derive(Debug, Default)]
pub struct RecordingNavigator {
    visits: Mutex<Vec<String>>,
}

impl RecordingNavigator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn visits(&self) -> Vec<String> {
        self.visits.lock().clone()
    }

    pub fn last(&self) -> Option<String> {
        self.visits.lock().last().cloned()
    }
}

impl Navigator for RecordingNavigator {
    fn navigate(&self, path: &str) {
        self.visits.lock().push(path.to_owned());
    }
}

/// Clears the credential store and redirects.
#[derive(Clone)]
pub struct SessionTeardown {
    store: Arc<dyn CredentialStore>,
    navigator: Arc<dyn Navigator>,
    redirect: String,
}

impl SessionTeardown {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        navigator: Arc<dyn Navigator>,
        redirect: impl Into<String>,
    ) -> Self {
        Self {
            store,
            navigator,
            redirect: redirect.into(),
        }
    }

    /// End the session. Safe to call when already logged out; the redirect
    /// is issued every time.
    pub fn logout(&self) {
        if let Err(e) = self.store.clear_all() {
            warn!(error = %e, "Failed to clear credential store during teardown");
        }
        info!(redirect = %self.redirect, "Session ended");
        self.navigator.navigate(&self.redirect);
    }

    pub fn redirect(&self) -> &str {
        &self.redirect
    }
}

impl std::fmt::Debug for SessionTeardown {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionTeardown")
            .field("redirect", &self.redirect)
            .finish()
    }
}
