//! Peer certificate chain as exposed to callers.

use rustls::pki_types::CertificateDer;
use x509_parser::prelude::*;

use crate::error::{EtlsError, EtlsResult};

/// DER certificates presented by the peer, ordered leaf-last.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CertificateChain {
    certs: Vec<CertificateDer<'static>>,
}

impl CertificateChain {
    /// Build from the handshake's presented list, which rustls orders leaf-first.
    pub fn from_presented(presented: Option<&[CertificateDer<'static>]>) -> Self {
        let mut certs = presented.map(<[_]>::to_vec).unwrap_or_default();
        certs.reverse();
        Self { certs }
    }

    /// The peer's own certificate: the last element.
    pub fn peer_certificate(&self) -> EtlsResult<&CertificateDer<'static>> {
        self.certs.last().ok_or(EtlsError::NoPeerCertificate)
    }

    pub fn len(&self) -> usize {
        self.certs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.certs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CertificateDer<'static>> {
        self.certs.iter()
    }

    /// Subject distinguished names, leaf-last. Unparseable entries are skipped.
    pub fn subjects(&self) -> Vec<String> {
        self.certs
            .iter()
            .filter_map(|cert| X509Certificate::from_der(cert.as_ref()).ok())
            .map(|(_, parsed)| parsed.subject().to_string())
            .collect()
    }
}
