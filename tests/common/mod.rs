//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use etls::config::{Settings, VerifyMode};
use etls::engine::{Engine, TlsAcceptor, TlsSocket};
use etls::error::{EtlsError, EtlsResult};
use etls::tls::TlsContext;
use rcgen::{
    BasicConstraints, Certificate, CertificateParams, DnType, ExtendedKeyUsagePurpose, IsCa,
    KeyPair, KeyUsagePurpose,
};

static DIR_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Certificate and key written to disk.
pub struct IssuedCert {
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
    /// DER serial number bytes, as written in the certificate.
    pub serial: Vec<u8>,
}

/// Throwaway CA with a private directory for its files.
pub struct TestPki {
    dir: PathBuf,
    ca: Certificate,
    ca_key: KeyPair,
    issued: AtomicU64,
}

impl TestPki {
    pub fn new(name: &str) -> Self {
        let dir = std::env::temp_dir().join(format!(
            "etls-test-{}-{}",
            std::process::id(),
            DIR_COUNTER.fetch_add(1, Ordering::SeqCst)
        ));
        fs::create_dir_all(&dir).unwrap();

        let ca_key = KeyPair::generate().unwrap();
        let ca = ca_params(name).self_signed(&ca_key).unwrap();

        Self {
            dir,
            ca,
            ca_key,
            issued: AtomicU64::new(0),
        }
    }

    pub fn ca_pem(&self) -> String {
        self.ca.pem()
    }

    pub fn ca(&self) -> (&Certificate, &KeyPair) {
        (&self.ca, &self.ca_key)
    }

    /// Leaf signed by this CA, valid for `names` (DNS names or IP literals).
    pub fn issue(&self, common_name: &str, names: &[&str]) -> IssuedCert {
        let mut params =
            CertificateParams::new(names.iter().map(|name| name.to_string()).collect::<Vec<_>>())
                .unwrap();
        params.distinguished_name.push(DnType::CommonName, common_name);
        params.extended_key_usages = vec![
            ExtendedKeyUsagePurpose::ServerAuth,
            ExtendedKeyUsagePurpose::ClientAuth,
        ];
        let key = KeyPair::generate().unwrap();
        let cert = params.signed_by(&key, &self.ca, &self.ca_key).unwrap();
        let (_, parsed) = x509_parser::parse_x509_certificate(cert.der()).unwrap();
        let serial = parsed.tbs_certificate.raw_serial().to_vec();

        let n = self.issued.fetch_add(1, Ordering::SeqCst);
        let stem = common_name.replace(|c: char| !c.is_ascii_alphanumeric(), "_");
        let cert_path = self.dir.join(format!("{stem}-{n}.crt"));
        let key_path = self.dir.join(format!("{stem}-{n}.key"));
        fs::write(&cert_path, cert.pem()).unwrap();
        fs::write(&key_path, key.serialize_pem()).unwrap();
        IssuedCert {
            cert_path,
            key_path,
            serial,
        }
    }

    /// Intermediate CA signed by this one, with its own directory.
    pub fn subordinate(&self, name: &str) -> TestPki {
        let dir = std::env::temp_dir().join(format!(
            "etls-test-{}-{}",
            std::process::id(),
            DIR_COUNTER.fetch_add(1, Ordering::SeqCst)
        ));
        fs::create_dir_all(&dir).unwrap();

        let ca_key = KeyPair::generate().unwrap();
        let ca = ca_params(name).signed_by(&ca_key, &self.ca, &self.ca_key).unwrap();

        TestPki {
            dir,
            ca,
            ca_key,
            issued: AtomicU64::new(0),
        }
    }

    /// Certificate and key of `cert` concatenated into one PEM file.
    pub fn combined(&self, cert: &IssuedCert) -> PathBuf {
        let mut pem = fs::read_to_string(&cert.cert_path).unwrap();
        pem.push_str(&fs::read_to_string(&cert.key_path).unwrap());
        let path = cert.cert_path.with_extension("pem");
        fs::write(&path, pem).unwrap();
        path
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

fn ca_params(name: &str) -> CertificateParams {
    let mut params = CertificateParams::new(Vec::<String>::new()).unwrap();
    params.distinguished_name.push(DnType::CommonName, name);
    params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    params.key_usages = vec![
        KeyUsagePurpose::KeyCertSign,
        KeyUsagePurpose::CrlSign,
        KeyUsagePurpose::DigitalSignature,
    ];
    params
}

impl Drop for TestPki {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.dir);
    }
}

/// Settings presenting `cert` without verifying the peer.
pub fn identity_settings(cert: &IssuedCert) -> Settings {
    Settings {
        certfile: Some(cert.cert_path.clone()),
        keyfile: Some(cert.key_path.clone()),
        ..Settings::default()
    }
}

/// Settings verifying the peer against `pki`'s CA.
pub fn trusting(pki: &TestPki, base: Settings) -> Settings {
    Settings {
        verify: VerifyMode::Peer,
        cacerts: vec![pki.ca_pem()],
        ..base
    }
}

pub fn context(settings: &Settings) -> TlsContext {
    TlsContext::new(settings).unwrap()
}

pub fn loopback_listener(engine: &Engine, server: &TlsContext) -> TlsAcceptor {
    engine
        .listen_on(SocketAddr::from(([127, 0, 0, 1], 0)), server, 16)
        .unwrap()
}

/// Accept + server handshake on one side, connect on the other, concurrently.
pub async fn handshake_pair(
    engine: &Engine,
    acceptor: &TlsAcceptor,
    host: &str,
    client: &TlsContext,
) -> (EtlsResult<TlsSocket>, (TlsSocket, EtlsResult<()>)) {
    let port = acceptor.local_address().unwrap().port();
    let socket = engine.socket();
    let server = async {
        let accepted = acceptor.accept().await?;
        accepted.handshake().await?;
        Ok::<_, EtlsError>(accepted)
    };
    let connect = socket.connect(host, port, client);
    let (server, connected) = tokio::join!(server, connect);
    (server, (socket, connected))
}

/// Established server/client pair over loopback.
pub async fn connected_pair(
    engine: &Engine,
    server: &TlsContext,
    client: &TlsContext,
) -> (TlsSocket, TlsSocket) {
    let acceptor = loopback_listener(engine, server);
    let (server, (client, connected)) = handshake_pair(engine, &acceptor, "127.0.0.1", client).await;
    connected.unwrap();
    (server.unwrap(), client)
}

/// A loopback address nothing is listening on.
pub fn refused_addr() -> SocketAddr {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap()
}
