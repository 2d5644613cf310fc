//! Bearer-credential HTTP client with transparent credential renewal.
//!
//! Every outbound call goes through a [`RequestPipeline`] that attaches the
//! stored access credential and tracks in-flight requests. When the server
//! rejects a credential with `401`, the pipeline hands control to the
//! [`RenewalCoordinator`], which runs at most one renewal exchange at a time
//! and releases every queued caller with the same new credential.
//!
//! # Architecture
//!
//! - [`CredentialStore`]: durable key-value storage for tokens and metadata
//! - [`inspector`]: unverified token decoding and expiry checks
//! - [`LoadingSignal`]: in-flight request counter for UI consumers
//! - [`RenewalCoordinator`]: single-flight renewal state machine
//! - [`RequestPipeline`]: credential attachment and renew-then-retry-once
//! - [`SessionTeardown`]: clears the store and redirects to the login entry
//! - [`SessionManager`]: owns and wires all of the above

pub mod config;
pub mod error;
pub mod exchange;
pub mod inspector;
pub mod loading;
pub mod manager;
pub mod metadata;
pub mod pipeline;
pub mod renewal;
pub mod store;
pub mod teardown;

mod http;

pub use config::{ClientConfig, ClassPaths, EndpointTable};
pub use error::{ApiError, ErrorKind, SessionError};
pub use exchange::{HttpRenewalExchange, RenewalExchange, RenewedCredentials};
pub use inspector::TokenClaims;
pub use loading::{LoadingGuard, LoadingSignal};
pub use manager::{LoginRequest, SessionManager, SessionManagerBuilder};
pub use metadata::{SessionMetadata, UserClass};
pub use pipeline::{ApiRequest, ApiResponse, RequestPipeline};
pub use renewal::{RenewalCoordinator, Settlement};
pub use store::{CredentialPair, CredentialStore, FileStore, MemoryStore, StoreKey};
pub use teardown::{Navigator, RecordingNavigator, SessionTeardown, TracingNavigator};
