//! Blocking HTTP(S) round trips with optional mutual TLS.
//!
//! # Overview
//! The caller hands a plain-data `Request` and an optional client identity
//! subject to `RoundTripper::round_trip` and gets a plain-data `Response`
//! back. Underneath, the request runs on an asynchronous engine's worker
//! threads while the calling thread blocks on a one-shot completion signal.
//!
//! # Design
//! - `identity`: finds the certificate + key to present, by subject name and
//!   optionally serial number. No match is not an error; several matches is.
//! - `translate`: copies a `Request` into the engine's `NativeRequest`.
//! - `coordinator`: the per-request `EventSink`. Answers client-certificate
//!   challenges with the resolved credential (or default handling) and turns
//!   the engine outcome into a `Response`, exactly once.
//! - `executor`: `RoundTripper`, the blocking façade with an optional deadline.
//! - `engine`: the `Transport` / `EventSink` contract; `transport` and `tls`
//!   implement it on tokio, rustls, and hyper.
//! - Transport failures are values on `Response::error`, never `Err`.

pub mod config;
pub mod coordinator;
pub mod engine;
pub mod error;
pub mod executor;
pub mod http;
pub mod identity;
pub mod tls;
pub mod translate;
pub mod transport;

pub use config::RoundTripConfig;
pub use coordinator::{CompletionSignal, Coordinator, Phase};
pub use engine::{
    AuthChallenge, ChallengeDecision, Completion, EventSink, NativeResponse, TaskHandle, Transport,
};
pub use error::{ConfigError, IdentityError};
pub use executor::RoundTripper;
pub use crate::http::{ErrorKind, HeaderField, Request, Response, TransportError};
pub use identity::{
    resolve_identity, Credential, IdentityProvider, IdentitySelector, MemoryIdentityStore,
    PemDirectoryStore,
};
pub use tls::TlsSettings;
pub use translate::{build_native_request, NativeRequest};
pub use transport::TokioTransport;
