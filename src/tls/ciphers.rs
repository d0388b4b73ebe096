//! Cipher suite naming and OpenSSL-style filtering.
//!
//! # Responsibilities
//! - Map rustls suites to their OpenSSL and IANA names
//! - Evaluate filter strings into an ordered suite list
//! - Build the crypto provider and protocol version set a context uses
//!
//! # Design Decisions
//! - The suite universe is the ring provider's default set, in its order
//! - Tokens that match nothing are skipped, as OpenSSL does; only an empty
//!   final selection is an error
//!
//! Filter grammar, tokens separated by `:`, `,` or spaces:
//! ```text
//! NAME          exact OpenSSL or IANA suite name
//! ALL|DEFAULT|HIGH
//! TLSv1.2|TLSv1.3
//! KEYWORD       ECDHE, ECDSA, RSA/aRSA, AES128, AES256, AESGCM, CHACHA20, SHA256, SHA384
//! A+B           suites matching both A and B
//! !X            remove X permanently
//! -X            remove X, later tokens may add it back
//! +X            move X to the end
//! ```

use rustls::crypto::ring::{self, cipher_suite};
use rustls::crypto::CryptoProvider;
use rustls::{CipherSuite, ProtocolVersion, SupportedCipherSuite, SupportedProtocolVersion};

use crate::config::schema::CipherSpec;
use crate::error::{EtlsError, EtlsResult};

struct SuiteInfo {
    rustls: &'static SupportedCipherSuite,
    openssl_name: &'static str,
    standard_name: &'static str,
    keywords: &'static [&'static str],
}

impl SuiteInfo {
    fn is_tls13(&self) -> bool {
        self.rustls.version().version == ProtocolVersion::TLSv1_3
    }

    fn matches(&self, token: &str) -> bool {
        if token.contains('+') {
            return token
                .split('+')
                .filter(|part| !part.is_empty())
                .all(|part| self.matches(part));
        }
        match token.to_ascii_uppercase().as_str() {
            "ALL" | "DEFAULT" | "HIGH" => true,
            "TLSV1.3" => self.is_tls13(),
            "TLSV1.2" => !self.is_tls13(),
            upper => {
                self.openssl_name == upper
                    || self.standard_name == upper
                    || format!("{:?}", self.rustls.suite()) == upper
                    || self.keywords.iter().any(|k| k.eq_ignore_ascii_case(upper))
            }
        }
    }
}

static SUITES: [SuiteInfo; 9] = [
    SuiteInfo {
        rustls: &cipher_suite::TLS13_AES_256_GCM_SHA384,
        openssl_name: "TLS_AES_256_GCM_SHA384",
        standard_name: "TLS_AES_256_GCM_SHA384",
        keywords: &["AES256", "AES", "AESGCM", "SHA384"],
    },
    SuiteInfo {
        rustls: &cipher_suite::TLS13_AES_128_GCM_SHA256,
        openssl_name: "TLS_AES_128_GCM_SHA256",
        standard_name: "TLS_AES_128_GCM_SHA256",
        keywords: &["AES128", "AES", "AESGCM", "SHA256"],
    },
    SuiteInfo {
        rustls: &cipher_suite::TLS13_CHACHA20_POLY1305_SHA256,
        openssl_name: "TLS_CHACHA20_POLY1305_SHA256",
        standard_name: "TLS_CHACHA20_POLY1305_SHA256",
        keywords: &["CHACHA20", "SHA256"],
    },
    SuiteInfo {
        rustls: &cipher_suite::TLS_ECDHE_ECDSA_WITH_AES_256_GCM_SHA384,
        openssl_name: "ECDHE-ECDSA-AES256-GCM-SHA384",
        standard_name: "TLS_ECDHE_ECDSA_WITH_AES_256_GCM_SHA384",
        keywords: &["ECDHE", "EECDH", "kECDHE", "ECDSA", "aECDSA", "AES256", "AES", "AESGCM", "SHA384"],
    },
    SuiteInfo {
        rustls: &cipher_suite::TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256,
        openssl_name: "ECDHE-ECDSA-AES128-GCM-SHA256",
        standard_name: "TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256",
        keywords: &["ECDHE", "EECDH", "kECDHE", "ECDSA", "aECDSA", "AES128", "AES", "AESGCM", "SHA256"],
    },
    SuiteInfo {
        rustls: &cipher_suite::TLS_ECDHE_ECDSA_WITH_CHACHA20_POLY1305_SHA256,
        openssl_name: "ECDHE-ECDSA-CHACHA20-POLY1305",
        standard_name: "TLS_ECDHE_ECDSA_WITH_CHACHA20_POLY1305_SHA256",
        keywords: &["ECDHE", "EECDH", "kECDHE", "ECDSA", "aECDSA", "CHACHA20", "SHA256"],
    },
    SuiteInfo {
        rustls: &cipher_suite::TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384,
        openssl_name: "ECDHE-RSA-AES256-GCM-SHA384",
        standard_name: "TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384",
        keywords: &["ECDHE", "EECDH", "kECDHE", "RSA", "aRSA", "AES256", "AES", "AESGCM", "SHA384"],
    },
    SuiteInfo {
        rustls: &cipher_suite::TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256,
        openssl_name: "ECDHE-RSA-AES128-GCM-SHA256",
        standard_name: "TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256",
        keywords: &["ECDHE", "EECDH", "kECDHE", "RSA", "aRSA", "AES128", "AES", "AESGCM", "SHA256"],
    },
    SuiteInfo {
        rustls: &cipher_suite::TLS_ECDHE_RSA_WITH_CHACHA20_POLY1305_SHA256,
        openssl_name: "ECDHE-RSA-CHACHA20-POLY1305",
        standard_name: "TLS_ECDHE_RSA_WITH_CHACHA20_POLY1305_SHA256",
        keywords: &["ECDHE", "EECDH", "kECDHE", "RSA", "aRSA", "CHACHA20", "SHA256"],
    },
];

fn matching(token: &str) -> impl Iterator<Item = &'static SuiteInfo> + '_ {
    SUITES.iter().filter(move |info| info.matches(token))
}

fn contains(list: &[&'static SuiteInfo], info: &SuiteInfo) -> bool {
    list.iter().any(|entry| entry.openssl_name == info.openssl_name)
}

fn evaluate(filter: &str) -> Vec<&'static SuiteInfo> {
    let mut selected: Vec<&'static SuiteInfo> = Vec::new();
    let mut banned: Vec<&'static SuiteInfo> = Vec::new();

    let tokens = filter
        .split([':', ',', ' '])
        .map(str::trim)
        .filter(|token| !token.is_empty());

    for token in tokens {
        if let Some(rest) = token.strip_prefix('!') {
            banned.extend(matching(rest));
            selected.retain(|info| !contains(&banned, info));
        } else if let Some(rest) = token.strip_prefix('-') {
            let removed: Vec<_> = matching(rest).collect();
            selected.retain(|info| !contains(&removed, info));
        } else if let Some(rest) = token.strip_prefix('+') {
            let moved: Vec<_> = matching(rest).filter(|info| contains(&selected, info)).collect();
            selected.retain(|info| !contains(&moved, info));
            selected.extend(moved);
        } else {
            for info in matching(token) {
                if !contains(&banned, info) && !contains(&selected, info) {
                    selected.push(info);
                }
            }
        }
    }
    selected
}

/// Suites selected by `filter`, in selection order.
pub fn select(filter: &str) -> EtlsResult<Vec<SupportedCipherSuite>> {
    let selected = evaluate(filter);
    if selected.is_empty() {
        return Err(EtlsError::InvalidCipherSpec(filter.to_string()));
    }
    Ok(selected.into_iter().map(|info| *info.rustls).collect())
}

/// OpenSSL names of the suites a specification selects.
///
/// An empty specification lists the library default set; one that selects
/// nothing is an invalid specification.
pub fn cipher_suites(spec: &CipherSpec) -> EtlsResult<Vec<String>> {
    let selected: Vec<&'static SuiteInfo> = if spec.is_default() {
        SUITES.iter().collect()
    } else {
        evaluate(&spec.to_filter())
    };
    if selected.is_empty() {
        return Err(EtlsError::InvalidCipherSpec(spec.to_filter()));
    }
    Ok(selected
        .into_iter()
        .map(|info| info.openssl_name.to_string())
        .collect())
}

/// Ring provider restricted to the suites a specification selects.
pub fn provider(spec: &CipherSpec) -> EtlsResult<CryptoProvider> {
    let defaults = ring::default_provider();
    if spec.is_default() {
        return Ok(defaults);
    }
    Ok(CryptoProvider {
        cipher_suites: select(&spec.to_filter())?,
        ..defaults
    })
}

/// Protocol versions that have at least one suite in `suites`.
pub fn protocol_versions(suites: &[SupportedCipherSuite]) -> Vec<&'static SupportedProtocolVersion> {
    let mut versions = Vec::new();
    if suites.iter().any(|s| s.version().version == ProtocolVersion::TLSv1_3) {
        versions.push(&rustls::version::TLS13);
    }
    if suites.iter().any(|s| s.version().version == ProtocolVersion::TLSv1_2) {
        versions.push(&rustls::version::TLS12);
    }
    versions
}

/// OpenSSL name of a negotiated suite.
pub fn openssl_name(suite: CipherSuite) -> Option<&'static str> {
    SUITES
        .iter()
        .find(|info| info.rustls.suite() == suite)
        .map(|info| info.openssl_name)
}

/// OpenSSL-style protocol label (`TLSv1.3`).
pub fn protocol_name(version: ProtocolVersion) -> String {
    match version {
        ProtocolVersion::TLSv1_3 => "TLSv1.3".to_string(),
        ProtocolVersion::TLSv1_2 => "TLSv1.2".to_string(),
        other => format!("{other:?}"),
    }
}
