//! TLS configuration subsystem.
//!
//! # Data Flow
//! ```text
//! Settings
//!     → ciphers.rs (filter → restricted ring provider + protocol versions)
//!     → pem.rs (identity, trust anchors, CRLs)
//!     → verify.rs (role- and mode-specific certificate verifiers)
//!         → hostname.rs (SAN/CN matching when verify_hostname is set)
//!     → context.rs (TlsContext: Arc<ClientConfig> + optional Arc<ServerConfig>)
//!
//! After a handshake:
//!     rustls peer certificates → chain.rs (leaf-last CertificateChain)
//! ```

pub mod chain;
pub mod ciphers;
pub mod context;
pub mod hostname;
pub mod pem;
pub mod verify;

pub use chain::CertificateChain;
pub use ciphers::cipher_suites;
pub use context::{Role, TlsContext};
