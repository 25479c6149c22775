//! Client identity lookup.
//!
//! # Design
//! An identity is a certificate chain plus the private key for its leaf.
//! Stores implement `IdentityProvider`, which only answers "which identities
//! carry this subject common name". `resolve_identity` then applies the
//! matching policy: exact subject, optional serial number, and an explicit
//! `Ambiguous` error instead of an arbitrary pick when several identities
//! remain.
//!
//! `PemDirectoryStore` plays the part of the platform keychain: a directory
//! of PEM bundles rescanned on every lookup, so nothing is cached between
//! round trips.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rustls::pki_types::pem::PemObject;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use tracing::{debug, warn};

use crate::error::IdentityError;

struct Material {
    subject: String,
    serial: String,
    chain: Vec<CertificateDer<'static>>,
    key: PrivateKeyDer<'static>,
}

/// Handle to a certificate chain and its private key.
///
/// Clones share the same material.
#[derive(Clone)]
pub struct Credential {
    inner: Arc<Material>,
}

impl Credential {
    /// Build a credential from a DER chain (leaf first) and the leaf's key.
    pub fn from_der(
        chain: Vec<CertificateDer<'static>>,
        key: PrivateKeyDer<'static>,
    ) -> Result<Self, IdentityError> {
        let leaf = chain
            .first()
            .ok_or_else(|| IdentityError::InvalidMaterial("certificate chain is empty".to_string()))?;
        let (subject, serial) = leaf_names(leaf)?;
        Ok(Self {
            inner: Arc::new(Material {
                subject,
                serial,
                chain,
                key,
            }),
        })
    }

    /// Build a credential from a PEM bundle holding the chain and one key.
    pub fn from_pem(pem: &[u8]) -> Result<Self, IdentityError> {
        let chain = CertificateDer::pem_slice_iter(pem)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| IdentityError::InvalidMaterial(format!("certificate: {e}")))?;
        let key = PrivateKeyDer::from_pem_slice(pem)
            .map_err(|e| IdentityError::InvalidMaterial(format!("private key: {e}")))?;
        Self::from_der(chain, key)
    }

    /// Common name of the leaf certificate's subject.
    pub fn subject(&self) -> &str {
        &self.inner.subject
    }

    /// Leaf serial number as lower-case hex without separators.
    pub fn serial(&self) -> &str {
        &self.inner.serial
    }

    pub fn cert_chain(&self) -> &[CertificateDer<'static>] {
        &self.inner.chain
    }

    pub fn private_key(&self) -> &PrivateKeyDer<'static> {
        &self.inner.key
    }

    /// True when both handles point at the same resolved material.
    pub fn ptr_eq(&self, other: &Credential) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("subject", &self.inner.subject)
            .field("serial", &self.inner.serial)
            .field("chain_len", &self.inner.chain.len())
            .finish_non_exhaustive()
    }
}

fn leaf_names(leaf: &CertificateDer<'_>) -> Result<(String, String), IdentityError> {
    let (_, cert) = x509_parser::parse_x509_certificate(leaf.as_ref())
        .map_err(|e| IdentityError::InvalidMaterial(format!("certificate: {e}")))?;
    let subject = cert
        .subject()
        .iter_common_name()
        .next()
        .and_then(|cn| cn.as_str().ok())
        .unwrap_or_default()
        .to_string();
    let serial = cert
        .tbs_certificate
        .raw_serial()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect::<String>();
    Ok((subject, normalize_serial(&serial)))
}

/// Canonical serial form: lower-case hex, no `0x`, separators, or leading
/// zeros. Accepts `10:01`, `0x1001`, and `1001` alike.
pub fn normalize_serial(serial: &str) -> String {
    let hex: String = serial
        .trim()
        .trim_start_matches("0x")
        .trim_start_matches("0X")
        .chars()
        .filter(|c| !matches!(c, ':' | ' ' | '-'))
        .map(|c| c.to_ascii_lowercase())
        .collect();
    let trimmed = hex.trim_start_matches('0');
    if trimmed.is_empty() {
        "0".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Which identity a round trip should present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentitySelector {
    pub subject: String,
    pub serial: Option<String>,
}

impl IdentitySelector {
    pub fn by_subject(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            serial: None,
        }
    }

    /// Narrow the selection to one serial number.
    pub fn with_serial(mut self, serial: &str) -> Self {
        self.serial = Some(normalize_serial(serial));
        self
    }

    fn matches(&self, credential: &Credential) -> bool {
        credential.subject() == self.subject
            && self.serial.as_deref().map_or(true, |s| credential.serial() == s)
    }
}

/// A source of client identities.
pub trait IdentityProvider: Send + Sync {
    /// Every identity whose leaf subject common name is `subject`.
    fn lookup(&self, subject: &str) -> Result<Vec<Credential>, IdentityError>;
}

/// Find the single identity `selector` names.
///
/// Returns `Ok(None)` when nothing matches, which callers treat as "proceed
/// without a client certificate".
pub fn resolve_identity(
    provider: &dyn IdentityProvider,
    selector: &IdentitySelector,
) -> Result<Option<Credential>, IdentityError> {
    let mut matches: Vec<Credential> = provider
        .lookup(&selector.subject)?
        .into_iter()
        .filter(|c| selector.matches(c))
        .collect();

    match matches.len() {
        0 => {
            debug!(subject = %selector.subject, "no identity matches subject");
            Ok(None)
        }
        1 => Ok(matches.pop()),
        count => {
            warn!(subject = %selector.subject, count, "ambiguous identity subject");
            Err(IdentityError::Ambiguous {
                subject: selector.subject.clone(),
                count,
            })
        }
    }
}

/// In-memory identity store. Lookups return matches in insertion order.
#[derive(Debug, Clone, Default)]
pub struct MemoryIdentityStore {
    identities: Vec<Credential>,
}

impl MemoryIdentityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, credential: Credential) {
        self.identities.push(credential);
    }

    pub fn with(mut self, credential: Credential) -> Self {
        self.insert(credential);
        self
    }
}

impl IdentityProvider for MemoryIdentityStore {
    fn lookup(&self, subject: &str) -> Result<Vec<Credential>, IdentityError> {
        Ok(self
            .identities
            .iter()
            .filter(|c| c.subject() == subject)
            .cloned()
            .collect())
    }
}

/// Identity store backed by a directory of `*.pem` bundles.
///
/// Each file holds one certificate chain (leaf first) and its private key.
/// Files that fail to parse are skipped with a warning.
#[derive(Debug, Clone)]
pub struct PemDirectoryStore {
    dir: PathBuf,
}

impl PemDirectoryStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn bundle_paths(&self) -> Result<Vec<PathBuf>, IdentityError> {
        let entries = fs::read_dir(&self.dir).map_err(|source| IdentityError::Store {
            path: self.dir.clone(),
            source,
        })?;
        let mut paths: Vec<PathBuf> = entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| path.extension().is_some_and(|ext| ext == "pem"))
            .collect();
        paths.sort();
        Ok(paths)
    }
}

impl IdentityProvider for PemDirectoryStore {
    fn lookup(&self, subject: &str) -> Result<Vec<Credential>, IdentityError> {
        let mut found = Vec::new();
        for path in self.bundle_paths()? {
            let pem = match fs::read(&path) {
                Ok(pem) => pem,
                Err(err) => {
                    warn!(path = %path.display(), %err, "skipping unreadable identity bundle");
                    continue;
                }
            };
            match Credential::from_pem(&pem) {
                Ok(credential) if credential.subject() == subject => found.push(credential),
                Ok(_) => {}
                Err(err) => {
                    warn!(path = %path.display(), %err, "skipping invalid identity bundle");
                }
            }
        }
        Ok(found)
    }
}
