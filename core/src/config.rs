//! Round tripper configuration.
//!
//! Read from JSON (the FFI `rt_configure` entry point) or from `ROUNDTRIP_*`
//! environment variables. Every field has a default, so an empty JSON object
//! or an empty environment yields a working configuration: unbounded wait,
//! two worker threads, Mozilla roots, no identity store.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const ENV_TIMEOUT_MS: &str = "ROUNDTRIP_TIMEOUT_MS";
pub const ENV_WORKER_THREADS: &str = "ROUNDTRIP_WORKER_THREADS";
pub const ENV_ROOT_CA: &str = "ROUNDTRIP_ROOT_CA";
pub const ENV_WEBPKI_ROOTS: &str = "ROUNDTRIP_WEBPKI_ROOTS";
pub const ENV_IDENTITY_DIR: &str = "ROUNDTRIP_IDENTITY_DIR";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoundTripConfig {
    /// Deadline for one round trip. `None` waits forever.
    pub timeout_ms: Option<u64>,
    /// Worker threads of the transport runtime.
    pub worker_threads: usize,
    /// Extra PEM file of trusted server CAs.
    pub root_ca_file: Option<PathBuf>,
    /// Trust the bundled Mozilla root set.
    pub use_webpki_roots: bool,
    /// Directory of PEM identity bundles.
    pub identity_dir: Option<PathBuf>,
}

impl Default for RoundTripConfig {
    fn default() -> Self {
        Self {
            timeout_ms: None,
            worker_threads: 2,
            root_ca_file: None,
            use_webpki_roots: true,
            identity_dir: None,
        }
    }
}

impl RoundTripConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(std::env::vars())
    }

    /// Build a configuration from `(name, value)` pairs. Unknown names are
    /// ignored.
    pub fn from_vars<I, K, V>(vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut config = Self::default();
        for (name, value) in vars {
            let value = value.into();
            match name.as_ref() {
                ENV_TIMEOUT_MS => config.timeout_ms = Some(parse_var(ENV_TIMEOUT_MS, &value)?),
                ENV_WORKER_THREADS => config.worker_threads = parse_var(ENV_WORKER_THREADS, &value)?,
                ENV_ROOT_CA => config.root_ca_file = Some(PathBuf::from(value)),
                ENV_WEBPKI_ROOTS => config.use_webpki_roots = parse_flag(ENV_WEBPKI_ROOTS, &value)?,
                ENV_IDENTITY_DIR => config.identity_dir = Some(PathBuf::from(value)),
                _ => {}
            }
        }
        config.validate()
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    fn validate(self) -> Result<Self, ConfigError> {
        if self.worker_threads == 0 {
            return Err(ConfigError::InvalidVar {
                name: "worker_threads",
                value: "0".to_string(),
            });
        }
        Ok(self)
    }
}

fn parse_var<T: std::str::FromStr>(name: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidVar {
        name,
        value: value.to_string(),
    })
}

fn parse_flag(name: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidVar {
            name,
            value: value.to_string(),
        }),
    }
}
