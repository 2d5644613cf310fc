//! Single-flight credential renewal.
//!
//! The coordinator is a two-state machine:
//!
//! - **Idle**: no exchange outstanding, queue empty
//! - **Renewing**: exactly one exchange outstanding; callers that arrive
//!   meanwhile wait in an ordered queue
//!
//! The exchange runs as its own task. Every caller, including the one that
//! started it, awaits a `oneshot` receiver that is settled exactly once
//! with a [`Settlement`] when the exchange completes. The state lives
//! behind a mutex, so the check-and-enter of the Renewing state is atomic
//! on a multi-threaded runtime.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use crate::error::SessionError;
use crate::exchange::RenewalExchange;
use crate::metadata::SessionMetadata;
use crate::store::{CredentialPair, CredentialStore, StoreKey};
use crate::teardown::SessionTeardown;

/// How a queued caller is released.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Settlement {
    /// Renewal succeeded; retry with this access credential.
    Resolved(String),
    /// Renewal failed; the session has been torn down.
    Rejected(SessionError),
}

impl From<Settlement> for Result<String, SessionError> {
    fn from(settlement: Settlement) -> Self {
        match settlement {
            Settlement::Resolved(token) => Ok(token),
            Settlement::Rejected(err) => Err(err),
        }
    }
}

enum State {
    Idle,
    Renewing {
        queue: VecDeque<oneshot::Sender<Settlement>>,
    },
}

/// Coordinates renewal so at most one exchange is in flight.
pub struct RenewalCoordinator {
    store: Arc<dyn CredentialStore>,
    exchange: Arc<dyn RenewalExchange>,
    teardown: SessionTeardown,
    state: Mutex<State>,
    exchanges_started: AtomicU64,
}

impl RenewalCoordinator {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        exchange: Arc<dyn RenewalExchange>,
        teardown: SessionTeardown,
    ) -> Self {
        Self {
            store,
            exchange,
            teardown,
            state: Mutex::new(State::Idle),
            exchanges_started: AtomicU64::new(0),
        }
    }

    /// Obtain a renewed access credential.
    ///
    /// `sent_with` is the access credential the failed request carried. If
    /// the store already holds a different one, a renewal finished after
    /// that request left, and the stored credential is returned without a
    /// new exchange.
    ///
    /// With no refresh credential stored, the session is torn down and
    /// [`SessionError::NoRefreshCredential`] is returned; no exchange is
    /// attempted.
    pub async fn renew(self: &Arc<Self>, sent_with: Option<&str>) -> Result<String, SessionError> {
        let (rx, start) = {
            let mut state = self.state.lock();
            match &mut *state {
                State::Renewing { queue } => {
                    let (tx, rx) = oneshot::channel();
                    queue.push_back(tx);
                    debug!(queued = queue.len(), "Renewal in progress; caller queued");
                    (rx, None)
                }
                State::Idle => {
                    let current = self.store.get(StoreKey::AccessToken)?;
                    if let Some(current) = current.filter(|c| Some(c.as_str()) != sent_with) {
                        debug!("Access credential already renewed; reusing it");
                        return Ok(current);
                    }

                    let Some(refresh_token) = self.store.get(StoreKey::RefreshToken)? else {
                        drop(state);
                        warn!("No refresh credential stored; ending session");
                        self.teardown.logout();
                        return Err(SessionError::NoRefreshCredential);
                    };

                    let (tx, rx) = oneshot::channel();
                    *state = State::Renewing {
                        queue: VecDeque::from([tx]),
                    };
                    self.exchanges_started.fetch_add(1, Ordering::SeqCst);
                    debug!("Entering renewal");
                    (rx, Some(refresh_token))
                }
            }
        };

        // Spawned outside the lock: a task dropped during spawn runs the
        // guard's drop, which takes the lock.
        if let Some(refresh_token) = start {
            let guard = RenewingGuard {
                coordinator: Arc::clone(self),
                released: false,
            };
            tokio::spawn(guard.run(refresh_token));
        }

        match rx.await {
            Ok(settlement) => settlement.into(),
            Err(_) => Err(SessionError::RenewalAborted),
        }
    }

    /// Whether an exchange is outstanding.
    pub fn is_renewing(&self) -> bool {
        matches!(*self.state.lock(), State::Renewing { .. })
    }

    /// Number of callers waiting on the outstanding exchange.
    pub fn queued(&self) -> usize {
        match &*self.state.lock() {
            State::Idle => 0,
            State::Renewing { queue } => queue.len(),
        }
    }

    /// Total number of exchanges started by this coordinator.
    pub fn exchanges_started(&self) -> u64 {
        self.exchanges_started.load(Ordering::SeqCst)
    }

    async fn run_exchange(&self, refresh_token: String) -> Settlement {
        let class = SessionMetadata::renewal_class(self.store.as_ref());
        let exchange = Arc::clone(&self.exchange);

        // Run the exchange in its own task so a panic settles the queue
        // instead of leaving the coordinator stuck in Renewing.
        let outcome = tokio::spawn(async move { exchange.exchange(class, &refresh_token).await })
            .await
            .unwrap_or_else(|e| {
                Err(SessionError::RenewalTransport(format!("renewal task failed: {e}")))
            });

        match outcome {
            Ok(renewed) => {
                let access_token = renewed.access_token.clone();
                match self.store.store_pair(&CredentialPair::from(renewed)) {
                    Ok(()) => {
                        info!(class = %class, "Access credential renewed");
                        Settlement::Resolved(access_token)
                    }
                    Err(e) => {
                        error!(error = %e, "Failed to persist renewed credentials; ending session");
                        self.teardown.logout();
                        Settlement::Rejected(SessionError::RenewalPersist(e.to_string()))
                    }
                }
            }
            Err(e) => {
                warn!(class = %class, error = %e, "Credential renewal failed; ending session");
                self.teardown.logout();
                Settlement::Rejected(e)
            }
        }
    }

    /// Leave Renewing and hand back the queue in arrival order.
    fn take_queue(&self) -> VecDeque<oneshot::Sender<Settlement>> {
        let mut state = self.state.lock();
        match std::mem::replace(&mut *state, State::Idle) {
            State::Renewing { queue } => queue,
            State::Idle => VecDeque::new(),
        }
    }
}

/// Owns the Renewing state for one exchange.
///
/// Dropping it before the queue is released (the task is cancelled or its
/// runtime shuts down) returns the coordinator to Idle; the dropped senders
/// surface as [`SessionError::RenewalAborted`] to every waiting caller.
struct RenewingGuard {
    coordinator: Arc<RenewalCoordinator>,
    released: bool,
}

impl RenewingGuard {
    async fn run(mut self, refresh_token: String) {
        let settlement = self.coordinator.run_exchange(refresh_token).await;
        let queue = self.coordinator.take_queue();
        // Idle from here on; a later renewal owns any new queue.
        self.released = true;

        debug!(callers = queue.len(), "Releasing queued callers");
        for tx in queue {
            // A closed receiver means the caller went away; nothing to do.
            let _ = tx.send(settlement.clone());
        }
    }
}

impl Drop for RenewingGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let abandoned = self.coordinator.take_queue();
        if !abandoned.is_empty() {
            warn!(callers = abandoned.len(), "Renewal abandoned before settling");
        }
    }
}

impl std::fmt::Debug for RenewalCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenewalCoordinator")
            .field("renewing", &self.is_renewing())
            .field("queued", &self.queued())
            .field("exchanges_started", &self.exchanges_started())
            .finish()
    }
}
