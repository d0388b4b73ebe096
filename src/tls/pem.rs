//! PEM loading for certificates, keys and revocation lists.

use std::fs::File;
use std::io::{BufReader, Cursor};
use std::path::Path;

use rustls::pki_types::{CertificateDer, CertificateRevocationListDer, PrivateKeyDer};

use crate::error::{EtlsError, EtlsResult};

/// Read every certificate in a PEM file.
pub fn load_certs(path: &Path) -> EtlsResult<Vec<CertificateDer<'static>>> {
    let file = open(path, "certificate")?;
    let certs = rustls_pemfile::certs(&mut BufReader::new(file))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| EtlsError::Config(format!("{}: {e}", path.display())))?;
    if certs.is_empty() {
        return Err(EtlsError::Config(format!(
            "{}: no certificates found",
            path.display()
        )));
    }
    Ok(certs)
}

/// Read the first private key (PKCS#8, PKCS#1 or SEC1) in a PEM file.
pub fn load_private_key(path: &Path) -> EtlsResult<PrivateKeyDer<'static>> {
    let file = open(path, "private key")?;
    rustls_pemfile::private_key(&mut BufReader::new(file))
        .map_err(|e| EtlsError::Config(format!("{}: {e}", path.display())))?
        .ok_or_else(|| EtlsError::Config(format!("{}: no private key found", path.display())))
}

/// Parse certificates out of in-memory PEM documents.
pub fn parse_certs(documents: &[String], what: &str) -> EtlsResult<Vec<CertificateDer<'static>>> {
    let mut certs = Vec::new();
    for document in documents {
        let parsed = rustls_pemfile::certs(&mut Cursor::new(document.as_bytes()))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| EtlsError::Config(format!("invalid {what} PEM: {e}")))?;
        if parsed.is_empty() {
            return Err(EtlsError::Config(format!("{what} entry holds no certificate")));
        }
        certs.extend(parsed);
    }
    Ok(certs)
}

/// Parse revocation lists out of in-memory PEM documents.
pub fn parse_crls(documents: &[String]) -> EtlsResult<Vec<CertificateRevocationListDer<'static>>> {
    let mut crls = Vec::new();
    for document in documents {
        let parsed = rustls_pemfile::crls(&mut Cursor::new(document.as_bytes()))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| EtlsError::Config(format!("invalid CRL PEM: {e}")))?;
        if parsed.is_empty() {
            return Err(EtlsError::Config("crls entry holds no revocation list".to_string()));
        }
        crls.extend(parsed);
    }
    Ok(crls)
}

fn open(path: &Path, what: &str) -> EtlsResult<File> {
    File::open(path)
        .map_err(|e| EtlsError::Config(format!("cannot open {what} file {}: {e}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn missing_files_are_config_errors() {
        let err = load_certs(Path::new("/nonexistent/cert.pem")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
        assert!(err.to_string().contains("/nonexistent/cert.pem"));

        let err = load_private_key(Path::new("/nonexistent/key.pem")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
    }

    #[test]
    fn documents_without_pem_blocks_are_rejected() {
        let err = parse_certs(&["not a certificate".to_string()], "cacerts").unwrap_err();
        assert!(err.to_string().contains("cacerts"));
        assert!(parse_crls(&["".to_string()]).is_err());
        assert!(parse_certs(&[], "chain").unwrap().is_empty());
    }
}
