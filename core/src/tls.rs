//! rustls glue for the transport engine.
//!
//! # Design
//! Each https task gets its own `ClientConfig` whose client-certificate
//! resolver forwards the server's CertificateRequest to the task's
//! `EventSink`. rustls calls the resolver synchronously in the middle of the
//! handshake, so the sink's decision is in place before the handshake goes
//! on. Server certificates are always checked by the default webpki verifier
//! against the configured roots.

use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use rustls::client::ResolvesClientCert;
use rustls::crypto::CryptoProvider;
use rustls::pki_types::pem::PemObject;
use rustls::pki_types::CertificateDer;
use rustls::sign::CertifiedKey;
use rustls::{ClientConfig, RootCertStore, SignatureScheme};
use tracing::{debug, warn};

use crate::config::RoundTripConfig;
use crate::engine::{AuthChallenge, ChallengeDecision, EventSink};
use crate::error::ConfigError;
use crate::identity::Credential;

/// Trust roots and crypto provider shared by all tasks of one engine.
#[derive(Debug, Clone)]
pub struct TlsSettings {
    roots: Arc<RootCertStore>,
    provider: Arc<CryptoProvider>,
}

impl TlsSettings {
    pub fn from_config(config: &RoundTripConfig) -> Result<Self, ConfigError> {
        let mut roots = RootCertStore::empty();
        if config.use_webpki_roots {
            roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        }
        if let Some(path) = &config.root_ca_file {
            add_pem_roots(&mut roots, path)?;
        }
        debug!(roots = roots.len(), "loaded trust roots");
        Ok(Self::with_roots(roots))
    }

    pub fn with_roots(roots: RootCertStore) -> Self {
        Self {
            roots: Arc::new(roots),
            provider: Arc::new(rustls::crypto::ring::default_provider()),
        }
    }

    /// Build the client configuration for one connection to `host`.
    pub(crate) fn client_config(
        &self,
        sink: Arc<dyn EventSink>,
        host: &str,
    ) -> Result<ClientConfig, rustls::Error> {
        let resolver = ChallengeResolver {
            sink,
            host: host.to_string(),
            provider: self.provider.clone(),
        };
        let mut config = ClientConfig::builder_with_provider(self.provider.clone())
            .with_safe_default_protocol_versions()?
            .with_root_certificates(self.roots.clone())
            .with_client_cert_resolver(Arc::new(resolver));
        config.alpn_protocols = vec![b"http/1.1".to_vec()];
        Ok(config)
    }
}

fn add_pem_roots(roots: &mut RootCertStore, path: &Path) -> Result<(), ConfigError> {
    let pem = fs::read(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    for cert in CertificateDer::pem_slice_iter(&pem) {
        let cert = cert.map_err(|e| ConfigError::Pem {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        roots.add(cert)?;
    }
    Ok(())
}

/// Turn a credential into the key rustls signs with.
pub(crate) fn certified_key(
    provider: &CryptoProvider,
    credential: &Credential,
) -> Result<CertifiedKey, rustls::Error> {
    let key = provider
        .key_provider
        .load_private_key(credential.private_key().clone_key())?;
    Ok(CertifiedKey::new(credential.cert_chain().to_vec(), key))
}

struct ChallengeResolver {
    sink: Arc<dyn EventSink>,
    host: String,
    provider: Arc<CryptoProvider>,
}

impl fmt::Debug for ChallengeResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChallengeResolver")
            .field("host", &self.host)
            .finish_non_exhaustive()
    }
}

impl ResolvesClientCert for ChallengeResolver {
    fn resolve(
        &self,
        root_hint_subjects: &[&[u8]],
        _sigschemes: &[SignatureScheme],
    ) -> Option<Arc<CertifiedKey>> {
        let challenge = AuthChallenge {
            host: self.host.clone(),
            acceptable_issuers: root_hint_subjects.iter().map(|s| s.to_vec()).collect(),
        };
        match self.sink.on_auth_challenge(&challenge) {
            ChallengeDecision::UseCredential(credential) => {
                match certified_key(&self.provider, &credential) {
                    Ok(key) => Some(Arc::new(key)),
                    Err(err) => {
                        warn!(
                            host = %self.host,
                            subject = credential.subject(),
                            %err,
                            "client identity unusable, continuing without it"
                        );
                        None
                    }
                }
            }
            ChallengeDecision::UseDefaultHandling => None,
        }
    }

    fn has_certs(&self) -> bool {
        true
    }
}
