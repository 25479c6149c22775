//! Contract between the executor and a transport engine.
//!
//! # Design
//! An engine runs a `NativeRequest` on its own threads and reports back
//! through an `EventSink`: synchronously for each client-authentication
//! challenge, and exactly once when the task finishes. The executor never
//! sees engine internals; swapping `TokioTransport` for a scripted engine in
//! tests only requires implementing `Transport`.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;

use crate::http::TransportError;
use crate::identity::Credential;
use crate::translate::NativeRequest;

/// A server's request for a client certificate during the TLS handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthChallenge {
    /// Host the connection was opened to.
    pub host: String,
    /// DER distinguished names of the issuers the server accepts. Empty when
    /// the server gave no hint.
    pub acceptable_issuers: Vec<Vec<u8>>,
}

/// How the engine should answer an `AuthChallenge`.
#[derive(Debug, Clone)]
pub enum ChallengeDecision {
    /// Present this identity.
    UseCredential(Credential),
    /// Do whatever the engine does without a credential (send none).
    UseDefaultHandling,
}

/// What the engine received from the server.
#[derive(Debug, Clone, Default)]
pub struct NativeResponse {
    pub status: u16,
    /// Engine protocol identifier, e.g. `http/1.1` or `h2`.
    pub protocol: String,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
    /// Set when the head arrived but the body could not be read in full.
    pub body_error: Option<TransportError>,
}

/// Final outcome of one engine task.
pub type Completion = Result<NativeResponse, TransportError>;

/// Receiver of engine callbacks. Called from engine worker threads.
pub trait EventSink: Send + Sync {
    /// Decide how to answer a client-authentication challenge. The engine
    /// blocks on the answer before continuing the handshake.
    fn on_auth_challenge(&self, challenge: &AuthChallenge) -> ChallengeDecision;

    /// Deliver the task outcome.
    fn on_task_complete(&self, completion: Completion);
}

/// An asynchronous HTTP(S) engine.
pub trait Transport: Send + Sync {
    /// Start `request` in the background and report to `sink`.
    fn start(&self, request: NativeRequest, sink: Arc<dyn EventSink>) -> TaskHandle;
}

/// Handle to a started task. Dropping it leaves the task running.
pub struct TaskHandle {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl TaskHandle {
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// A handle for engines that cannot cancel.
    pub fn detached() -> Self {
        Self { cancel: None }
    }

    /// Abort the task. The engine may or may not have completed already.
    pub fn cancel(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle")
            .field("cancellable", &self.cancel.is_some())
            .finish()
    }
}
