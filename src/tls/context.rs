//! TLS context construction from settings.
//!
//! # Responsibilities
//! - Load identity (certificate chain + key), trust anchors and CRLs
//! - Restrict the crypto provider to the configured cipher suites
//! - Build the rustls client config, and the server config when an identity exists
//!
//! # Design Decisions
//! - A context is built once and never mutated; clones share one `Arc`
//! - Every problem is reported as a configuration error before any socket exists
//! - `verify_client_once` is accepted and always satisfied: rustls never
//!   renegotiates, so the peer certificate is only ever requested once

use std::fmt;
use std::sync::Arc;

use rustls::client::danger::ServerCertVerifier;
use rustls::client::WebPkiServerVerifier;
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, CertificateRevocationListDer, PrivateKeyDer, ServerName};
use rustls::server::danger::ClientCertVerifier;
use rustls::server::WebPkiClientVerifier;
use rustls::{ClientConfig, RootCertStore, ServerConfig, SupportedProtocolVersion};

use crate::config::schema::{Settings, VerifyMode};
use crate::config::validation::validate_settings;
use crate::error::{EtlsError, EtlsResult};
use crate::tls::verify::{AcceptAnyServerCert, ClientNameVerifier, PeerVerifier};
use crate::tls::{ciphers, pem};

/// Side of the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Client,
    Server,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Client => "client",
            Role::Server => "server",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable, shareable TLS configuration for sockets and acceptors.
#[derive(Debug, Clone)]
pub struct TlsContext {
    inner: Arc<ContextInner>,
}

#[derive(Debug)]
struct ContextInner {
    client: Arc<ClientConfig>,
    server: Option<Arc<ServerConfig>>,
    verify: VerifyMode,
    suites: Vec<String>,
}

struct Identity {
    chain: Vec<CertificateDer<'static>>,
    key: PrivateKeyDer<'static>,
}

struct TrustMaterial {
    provider: Arc<CryptoProvider>,
    versions: Vec<&'static SupportedProtocolVersion>,
    roots: Arc<RootCertStore>,
    crls: Vec<CertificateRevocationListDer<'static>>,
    expected: Option<ServerName<'static>>,
}

impl TlsContext {
    /// Build a context usable for connecting, and for serving when `certfile` is set.
    pub fn new(settings: &Settings) -> EtlsResult<Self> {
        let provider = Arc::new(ciphers::provider(&settings.ciphers)?);
        validate_settings(settings).map_err(|errors| {
            let messages: Vec<String> = errors.iter().map(ToString::to_string).collect();
            EtlsError::Config(messages.join("; "))
        })?;
        let trust = TrustMaterial {
            versions: ciphers::protocol_versions(&provider.cipher_suites),
            roots: Arc::new(trust_anchors(&settings.cacerts)?),
            crls: pem::parse_crls(&settings.crls)?,
            expected: expected_name(settings)?,
            provider,
        };
        let identity = load_identity(settings)?;

        let client = client_config(settings, &trust, identity.as_ref())?;
        let server = identity
            .as_ref()
            .map(|identity| server_config(settings, &trust, identity))
            .transpose()?;

        let suites = trust
            .provider
            .cipher_suites
            .iter()
            .map(|suite| {
                ciphers::openssl_name(suite.suite())
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("{:?}", suite.suite()))
            })
            .collect();

        if settings.verify_client_once {
            tracing::trace!("verify_client_once set; certificates are only requested at handshake");
        }
        tracing::debug!(
            verify = ?settings.verify,
            suites = trust.provider.cipher_suites.len(),
            serving = server.is_some(),
            "TLS context built"
        );

        Ok(Self {
            inner: Arc::new(ContextInner {
                client: Arc::new(client),
                server: server.map(Arc::new),
                verify: settings.verify,
                suites,
            }),
        })
    }

    /// Build a context for listening; a certificate is mandatory and checked first.
    pub fn for_listener(settings: &Settings) -> EtlsResult<Self> {
        if settings.certfile.is_none() {
            return Err(EtlsError::MissingCertificate);
        }
        Self::new(settings)
    }

    pub fn client_config(&self) -> Arc<ClientConfig> {
        Arc::clone(&self.inner.client)
    }

    pub fn server_config(&self) -> EtlsResult<Arc<ServerConfig>> {
        self.inner
            .server
            .as_ref()
            .map(Arc::clone)
            .ok_or(EtlsError::MissingCertificate)
    }

    /// Whether the context carries an identity to serve with.
    pub fn can_serve(&self) -> bool {
        self.inner.server.is_some()
    }

    pub fn verify_mode(&self) -> VerifyMode {
        self.inner.verify
    }

    /// OpenSSL names of the suites this context offers, in preference order.
    pub fn cipher_suites(&self) -> &[String] {
        &self.inner.suites
    }
}

fn load_identity(settings: &Settings) -> EtlsResult<Option<Identity>> {
    let (Some(certfile), Some(keyfile)) = (settings.certfile.as_deref(), settings.key_path()) else {
        return Ok(None);
    };

    let mut chain = pem::load_certs(certfile)?;
    chain.extend(pem::parse_certs(&settings.chain, "chain")?);
    let key = pem::load_private_key(keyfile)?;
    Ok(Some(Identity { chain, key }))
}

fn trust_anchors(cacerts: &[String]) -> EtlsResult<RootCertStore> {
    let mut roots = RootCertStore::empty();
    for cert in pem::parse_certs(cacerts, "cacerts")? {
        roots
            .add(cert)
            .map_err(|e| EtlsError::Config(format!("unusable CA certificate: {e}")))?;
    }
    Ok(roots)
}

fn expected_name(settings: &Settings) -> EtlsResult<Option<ServerName<'static>>> {
    settings
        .verify_hostname
        .as_ref()
        .map(|name| {
            ServerName::try_from(name.clone())
                .map_err(|e| EtlsError::Config(format!("verify_hostname '{name}': {e}")))
        })
        .transpose()
}

fn client_config(
    settings: &Settings,
    trust: &TrustMaterial,
    identity: Option<&Identity>,
) -> EtlsResult<ClientConfig> {
    let verifier: Arc<dyn ServerCertVerifier> = match settings.verify {
        VerifyMode::None => Arc::new(AcceptAnyServerCert::new(Arc::clone(&trust.provider))),
        VerifyMode::Peer => {
            let webpki = WebPkiServerVerifier::builder_with_provider(
                Arc::clone(&trust.roots),
                Arc::clone(&trust.provider),
            )
            .with_crls(trust.crls.iter().cloned())
            .allow_unknown_revocation_status()
            .build()
            .map_err(|e| EtlsError::Config(format!("cannot verify servers: {e}")))?;
            Arc::new(PeerVerifier::new(webpki, trust.expected.clone()))
        }
    };

    let builder = ClientConfig::builder_with_provider(Arc::clone(&trust.provider))
        .with_protocol_versions(&trust.versions)
        .map_err(|e| EtlsError::Config(e.to_string()))?
        .dangerous()
        .with_custom_certificate_verifier(verifier);

    match identity {
        Some(identity) => builder
            .with_client_auth_cert(identity.chain.clone(), identity.key.clone_key())
            .map_err(|e| EtlsError::Config(format!("unusable client identity: {e}"))),
        None => Ok(builder.with_no_client_auth()),
    }
}

fn server_config(
    settings: &Settings,
    trust: &TrustMaterial,
    identity: &Identity,
) -> EtlsResult<ServerConfig> {
    let builder = ServerConfig::builder_with_provider(Arc::clone(&trust.provider))
        .with_protocol_versions(&trust.versions)
        .map_err(|e| EtlsError::Config(e.to_string()))?;

    let builder = match settings.verify {
        VerifyMode::None => builder.with_no_client_auth(),
        VerifyMode::Peer => builder.with_client_cert_verifier(client_verifier(settings, trust)?),
    };

    builder
        .with_single_cert(identity.chain.clone(), identity.key.clone_key())
        .map_err(|e| EtlsError::Config(format!("unusable server identity: {e}")))
}

fn client_verifier(
    settings: &Settings,
    trust: &TrustMaterial,
) -> EtlsResult<Arc<dyn ClientCertVerifier>> {
    let mut builder = WebPkiClientVerifier::builder_with_provider(
        Arc::clone(&trust.roots),
        Arc::clone(&trust.provider),
    )
    .with_crls(trust.crls.iter().cloned())
    .allow_unknown_revocation_status();
    if !settings.fail_if_no_peer_cert {
        builder = builder.allow_unauthenticated();
    }
    let webpki = builder
        .build()
        .map_err(|e| EtlsError::Config(format!("cannot verify clients: {e}")))?;

    Ok(match &trust.expected {
        Some(name) => Arc::new(ClientNameVerifier::new(webpki, name.clone())),
        None => webpki,
    })
}
