//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the engine.
//! All types derive Serde traits for deserialization from config files, and
//! [`Settings`] doubles as the per-call settings structure handed to
//! connect and listen.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct EtlsConfig {
    /// Runtime sizing and default limits.
    pub engine: EngineConfig,

    /// TLS settings used by the CLI and by hosts loading a file.
    pub tls: Settings,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Worker pool and default limits.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// Worker threads; 0 means one per core.
    pub worker_threads: usize,

    /// Name given to worker threads.
    pub thread_name: String,

    /// How long a caller waits for an outcome before giving up.
    pub operation_timeout_ms: u64,

    /// Pending-connection queue length for listeners.
    pub listen_backlog: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            worker_threads: 0,
            thread_name: "etls-worker".to_string(),
            operation_timeout_ms: 30_000,
            listen_backlog: 128,
        }
    }
}

/// TLS settings for one context.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    /// Certificate presented to peers (PEM). Required for listening.
    pub certfile: Option<PathBuf>,

    /// Private key (PEM). Defaults to `certfile`.
    pub keyfile: Option<PathBuf>,

    pub verify: VerifyMode,

    /// With `verify = peer`, reject peers that present no certificate.
    pub fail_if_no_peer_cert: bool,

    /// Only request the peer certificate on the initial handshake.
    pub verify_client_once: bool,

    /// Name the peer's leaf certificate must match.
    pub verify_hostname: Option<String>,

    /// Trusted CA certificates, one PEM document per entry.
    pub cacerts: Vec<String>,

    /// Revocation lists, one PEM document per entry.
    pub crls: Vec<String>,

    /// Intermediate certificates presented after `certfile`, PEM.
    pub chain: Vec<String>,

    pub ciphers: CipherSpec,

    /// Framing header size for the binding layer (0, 1, 2 or 4).
    pub packet: u8,

    pub active: ActiveMode,

    pub exit_on_close: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            certfile: None,
            keyfile: None,
            verify: VerifyMode::None,
            fail_if_no_peer_cert: false,
            verify_client_once: false,
            verify_hostname: None,
            cacerts: Vec::new(),
            crls: Vec::new(),
            chain: Vec::new(),
            ciphers: CipherSpec::default(),
            packet: 0,
            active: ActiveMode::Passive,
            exit_on_close: true,
        }
    }
}

impl Settings {
    /// Key file path, falling back to the certificate file.
    pub fn key_path(&self) -> Option<&Path> {
        self.keyfile.as_deref().or(self.certfile.as_deref())
    }
}

/// Peer certificate verification mode.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum VerifyMode {
    #[default]
    None,
    Peer,
}

/// Cipher specification: a filter string, or a list of entries joined with `:`.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum CipherSpec {
    List(Vec<String>),
    Filter(String),
}

impl Default for CipherSpec {
    fn default() -> Self {
        CipherSpec::Filter(String::new())
    }
}

impl CipherSpec {
    /// The filter string this specification reaches the cipher filter as.
    pub fn to_filter(&self) -> String {
        match self {
            CipherSpec::List(entries) => entries.join(":"),
            CipherSpec::Filter(filter) => filter.clone(),
        }
    }

    /// Empty means the library default suite set.
    pub fn is_default(&self) -> bool {
        self.to_filter().trim().is_empty()
    }
}

impl From<&str> for CipherSpec {
    fn from(filter: &str) -> Self {
        CipherSpec::Filter(filter.to_string())
    }
}

impl From<String> for CipherSpec {
    fn from(filter: String) -> Self {
        CipherSpec::Filter(filter)
    }
}

impl From<Vec<String>> for CipherSpec {
    fn from(entries: Vec<String>) -> Self {
        CipherSpec::List(entries)
    }
}

impl From<&[&str]> for CipherSpec {
    fn from(entries: &[&str]) -> Self {
        CipherSpec::List(entries.iter().map(|entry| entry.to_string()).collect())
    }
}

/// Delivery mode for the binding layer. Ignored by the core.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ActiveMode {
    #[default]
    Passive,
    Active,
    Once,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error) or a full filter directive.
    pub log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cipher_list_is_colon_joined() {
        let spec = CipherSpec::from(
            &["ECDHE-RSA-AES128-GCM-SHA256", "ECDHE-RSA-AES256-GCM-SHA384"][..],
        );
        assert_eq!(
            spec.to_filter(),
            "ECDHE-RSA-AES128-GCM-SHA256:ECDHE-RSA-AES256-GCM-SHA384"
        );
    }

    #[test]
    fn cipher_string_passes_through() {
        let spec = CipherSpec::from("HIGH:!CHACHA20");
        assert_eq!(spec.to_filter(), "HIGH:!CHACHA20");
        assert!(CipherSpec::default().is_default());
    }

    #[test]
    fn key_defaults_to_certificate() {
        let settings = Settings {
            certfile: Some(PathBuf::from("/etc/etls/server.pem")),
            ..Settings::default()
        };
        assert_eq!(settings.key_path(), Some(Path::new("/etc/etls/server.pem")));

        let split = Settings {
            keyfile: Some(PathBuf::from("/etc/etls/server.key")),
            ..settings
        };
        assert_eq!(split.key_path(), Some(Path::new("/etc/etls/server.key")));
    }

    #[test]
    fn minimal_toml_uses_defaults() {
        let config: EtlsConfig = toml::from_str("[tls]\nverify = \"peer\"\n").unwrap();
        assert_eq!(config.tls.verify, VerifyMode::Peer);
        assert_eq!(config.engine, EngineConfig::default());
        assert!(config.tls.exit_on_close);
    }

    #[test]
    fn ciphers_accept_string_or_list() {
        let listed: Settings = toml::from_str("ciphers = [\"TLSv1.3\", \"!CHACHA20\"]").unwrap();
        assert_eq!(listed.ciphers.to_filter(), "TLSv1.3:!CHACHA20");

        let filtered: Settings = toml::from_str("ciphers = \"HIGH\"").unwrap();
        assert_eq!(filtered.ciphers, CipherSpec::Filter("HIGH".into()));
    }
}
