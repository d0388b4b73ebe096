//! RFC 2818 style matching of a certificate against an expected name.
//!
//! DNS names are checked against dNSName SAN entries; the subject common name
//! is consulted only when the certificate carries no dNSName at all. IP
//! literals only match iPAddress SAN entries. Wildcards are honoured in the
//! leftmost label only and must cover exactly one label.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use rustls::pki_types::{CertificateDer, ServerName};
use rustls::CertificateError;
use x509_parser::extensions::GeneralName;
use x509_parser::prelude::*;

/// Check that `cert` is valid for `expected`.
pub fn verify(cert: &CertificateDer<'_>, expected: &ServerName<'_>) -> Result<(), rustls::Error> {
    let (_, parsed) = X509Certificate::from_der(cert.as_ref())
        .map_err(|_| rustls::Error::InvalidCertificate(CertificateError::BadEncoding))?;

    let matched = match expected {
        ServerName::DnsName(dns) => dns_matches(&parsed, dns.as_ref()),
        ServerName::IpAddress(ip) => ip_matches(&parsed, to_std(ip)),
        _ => false,
    };

    if matched {
        Ok(())
    } else {
        tracing::debug!(expected = ?expected, "Certificate does not match expected name");
        Err(rustls::Error::InvalidCertificate(CertificateError::NotValidForName))
    }
}

fn dns_matches(cert: &X509Certificate<'_>, expected: &str) -> bool {
    let sans: Vec<&str> = match cert.subject_alternative_name() {
        Ok(Some(ext)) => ext
            .value
            .general_names
            .iter()
            .filter_map(|name| match name {
                GeneralName::DNSName(dns) => Some(*dns),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    };

    if !sans.is_empty() {
        return sans.iter().any(|pattern| name_matches(expected, pattern));
    }

    cert.subject()
        .iter_common_name()
        .filter_map(|cn| cn.as_str().ok())
        .any(|pattern| name_matches(expected, pattern))
}

fn ip_matches(cert: &X509Certificate<'_>, expected: IpAddr) -> bool {
    let Ok(Some(ext)) = cert.subject_alternative_name() else {
        return false;
    };
    ext.value.general_names.iter().any(|name| match name {
        GeneralName::IPAddress(bytes) => from_octets(bytes) == Some(expected),
        _ => false,
    })
}

fn from_octets(bytes: &[u8]) -> Option<IpAddr> {
    if let Ok(octets) = <[u8; 4]>::try_from(bytes) {
        return Some(IpAddr::V4(Ipv4Addr::from(octets)));
    }
    <[u8; 16]>::try_from(bytes)
        .ok()
        .map(|octets| IpAddr::V6(Ipv6Addr::from(octets)))
}

fn to_std(ip: &rustls::pki_types::IpAddr) -> IpAddr {
    match ip {
        rustls::pki_types::IpAddr::V4(v4) => IpAddr::V4(Ipv4Addr::from(*v4)),
        rustls::pki_types::IpAddr::V6(v6) => IpAddr::V6(Ipv6Addr::from(*v6)),
    }
}

/// Case-insensitive name comparison with a leftmost-label wildcard.
pub fn name_matches(expected: &str, pattern: &str) -> bool {
    let expected = expected.trim_end_matches('.');
    let pattern = pattern.trim_end_matches('.');

    match pattern.strip_prefix("*.") {
        Some(base) => match expected.split_once('.') {
            Some((label, rest)) => {
                !label.is_empty() && base.contains('.') && rest.eq_ignore_ascii_case(base)
            }
            None => false,
        },
        None => expected.eq_ignore_ascii_case(pattern),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(sans: Vec<rcgen::SanType>, cn: &str) -> CertificateDer<'static> {
        let mut params = rcgen::CertificateParams::default();
        params.subject_alt_names = sans;
        params
            .distinguished_name
            .push(rcgen::DnType::CommonName, cn);
        let key = rcgen::KeyPair::generate().unwrap();
        params.self_signed(&key).unwrap().der().clone()
    }

    fn dns(name: &str) -> rcgen::SanType {
        rcgen::SanType::DnsName(name.try_into().unwrap())
    }

    fn name(host: &str) -> ServerName<'static> {
        ServerName::try_from(host.to_string()).unwrap()
    }

    #[test]
    fn wildcards_cover_one_label() {
        assert!(name_matches("api.example.com", "*.example.com"));
        assert!(name_matches("API.Example.com.", "*.example.com"));
        assert!(!name_matches("a.b.example.com", "*.example.com"));
        assert!(!name_matches("example.com", "*.example.com"));
        assert!(!name_matches("host.com", "*.com"));
    }

    #[test]
    fn san_is_preferred_over_common_name() {
        let cert = leaf(vec![dns("api.example.com")], "legacy.example.com");
        assert!(verify(&cert, &name("api.example.com")).is_ok());
        assert!(verify(&cert, &name("legacy.example.com")).is_err());
    }

    #[test]
    fn common_name_is_a_fallback() {
        let cert = leaf(Vec::new(), "legacy.example.com");
        assert!(verify(&cert, &name("legacy.example.com")).is_ok());
        assert!(verify(&cert, &name("other.example.com")).is_err());
    }

    #[test]
    fn ip_literals_match_ip_sans_only() {
        let ip = "10.1.2.3".parse::<IpAddr>().unwrap();
        let cert = leaf(vec![rcgen::SanType::IpAddress(ip)], "10.9.9.9");
        assert!(verify(&cert, &name("10.1.2.3")).is_ok());
        assert!(verify(&cert, &name("10.9.9.9")).is_err());
    }

    #[test]
    fn mismatch_is_a_name_error() {
        let cert = leaf(vec![dns("a.example.com")], "a.example.com");
        assert_eq!(
            verify(&cert, &name("b.example.com")),
            Err(rustls::Error::InvalidCertificate(CertificateError::NotValidForName))
        );
    }
}
