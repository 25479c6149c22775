//! Blocking round trips over an asynchronous transport.
//!
//! # Design
//! `RoundTripper::round_trip` resolves the client identity, translates the
//! request, hands a fresh `Coordinator` to the transport, and blocks the
//! calling thread on that coordinator's completion signal. The transport holds
//! the only strong reference to the coordinator; the executor keeps a weak
//! one so it can complete the round trip itself when a deadline expires.
//! Whichever completion lands first is the one the caller sees.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info_span, warn};
use uuid::Uuid;

use crate::config::RoundTripConfig;
use crate::coordinator::Coordinator;
use crate::engine::{EventSink, Transport};
use crate::error::ConfigError;
use crate::http::{ErrorKind, Request, Response, TransportError};
use crate::identity::{
    resolve_identity, IdentityProvider, IdentitySelector, MemoryIdentityStore, PemDirectoryStore,
};
use crate::translate::build_native_request;
use crate::transport::TokioTransport;

/// Synchronous façade over a `Transport` and an `IdentityProvider`.
///
/// Cheap to share between threads; concurrent round trips do not share any
/// per-request state.
#[derive(Clone)]
pub struct RoundTripper {
    transport: Arc<dyn Transport>,
    identities: Arc<dyn IdentityProvider>,
    timeout: Option<Duration>,
    identity: Option<IdentitySelector>,
}

impl RoundTripper {
    pub fn new(transport: Arc<dyn Transport>, identities: Arc<dyn IdentityProvider>) -> Self {
        Self {
            transport,
            identities,
            timeout: None,
            identity: None,
        }
    }

    /// Wire up the tokio engine and the configured identity directory.
    pub fn from_config(config: &RoundTripConfig) -> Result<Self, ConfigError> {
        let transport = Arc::new(TokioTransport::from_config(config)?);
        let identities: Arc<dyn IdentityProvider> = match &config.identity_dir {
            Some(dir) => Arc::new(PemDirectoryStore::new(dir)),
            None => Arc::new(MemoryIdentityStore::new()),
        };
        Ok(Self::new(transport, identities).with_timeout(config.timeout()))
    }

    /// Bound every round trip by `timeout`. `None` waits forever.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Identity used by `send`.
    pub fn with_identity(mut self, selector: IdentitySelector) -> Self {
        self.identity = Some(selector);
        self
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Round trip `request` presenting the identity set with `with_identity`,
    /// if any.
    pub fn send(&self, request: &Request) -> Response {
        self.round_trip_with(request, self.identity.as_ref())
    }

    /// Round trip `request`. An empty `subject_name` means no client identity.
    pub fn round_trip(&self, request: &Request, subject_name: &str) -> Response {
        if subject_name.is_empty() {
            self.round_trip_with(request, None)
        } else {
            self.round_trip_with(request, Some(&IdentitySelector::by_subject(subject_name)))
        }
    }

    /// Round trip `request`, presenting the identity `selector` names.
    ///
    /// Never fails: every problem is reported through `Response::error`.
    pub fn round_trip_with(
        &self,
        request: &Request,
        selector: Option<&IdentitySelector>,
    ) -> Response {
        let span = info_span!(
            "round_trip",
            id = %Uuid::new_v4(),
            method = %request.method,
            url = %request.url,
        );
        let _entered = span.enter();

        let credential = match selector {
            None => None,
            Some(selector) => match resolve_identity(self.identities.as_ref(), selector) {
                Ok(found) => {
                    if let Some(credential) = &found {
                        debug!(
                            subject = credential.subject(),
                            serial = credential.serial(),
                            "resolved client identity"
                        );
                    }
                    found
                }
                Err(err) => {
                    warn!(%err, "identity resolution failed");
                    return Response::from_error(TransportError::new(
                        ErrorKind::Identity,
                        err.to_string(),
                    ));
                }
            },
        };

        let native = build_native_request(request);
        let (coordinator, signal) = Coordinator::new(credential);
        let weak = Arc::downgrade(&coordinator);
        let handle = self.transport.start(native, coordinator);

        let Some(limit) = self.timeout else {
            return signal.wait();
        };
        if let Some(response) = signal.wait_timeout(limit) {
            return response;
        }

        warn!(?limit, "deadline expired, cancelling round trip");
        // Completes before the abort drops the engine's reference.
        if let Some(coordinator) = weak.upgrade() {
            coordinator.on_task_complete(Err(TransportError::new(
                ErrorKind::Timeout,
                format!("round trip exceeded {limit:?}"),
            )));
        }
        handle.cancel();
        signal.wait()
    }
}
