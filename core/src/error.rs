//! Error types for identity lookup and setup.
//!
//! # Design
//! None of these cross the `RoundTripper::round_trip` boundary as `Err`.
//! Identity errors become a `TransportError` of kind `Identity` on the
//! returned `Response`; configuration errors only occur while wiring a
//! `RoundTripper` up, before any request is sent.

use std::io;
use std::path::PathBuf;

/// Errors raised while looking up or resolving a client identity.
///
/// "No identity matches" is not an error; `resolve_identity` returns
/// `Ok(None)` for it.
#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    /// More than one identity carries the requested subject. The caller must
    /// narrow the selector, e.g. by serial number.
    #[error("{count} identities match subject {subject:?}; select one by serial number")]
    Ambiguous { subject: String, count: usize },

    /// The identity store could not be read.
    #[error("failed to read identity store at {path}: {source}")]
    Store {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A certificate or key could not be decoded.
    #[error("invalid identity material: {0}")]
    InvalidMaterial(String),
}

/// Errors raised while building configuration or the transport engine.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid configuration JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid value {value:?} for {name}")]
    InvalidVar { name: &'static str, value: String },

    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid PEM in {path}: {message}")]
    Pem { path: PathBuf, message: String },

    #[error("TLS setup failed: {0}")]
    Tls(#[from] rustls::Error),

    #[error("failed to start transport runtime: {0}")]
    Runtime(#[source] io::Error),
}
