//! Asynchronous TLS socket engine.
//!
//! Non-blocking TLS client connect, server listen/accept, handshake,
//! encrypted send/receive, certificate-chain retrieval and partial or full
//! shutdown, driven by a tokio worker pool and exposed both as `async fn`s
//! and as exactly-once completion callbacks.

pub mod boundary;
pub mod config;
pub mod engine;
pub mod error;
pub mod net;
pub mod observability;
pub mod tls;

pub use boundary::{Completion, PendingOutcome};
pub use config::{EtlsConfig, Settings, VerifyMode};
pub use engine::{Direction, Engine, SocketInfo, SocketState, TlsAcceptor, TlsSocket};
pub use error::{ErrorKind, EtlsError, EtlsResult, Reason};
pub use tls::{cipher_suites, CertificateChain, TlsContext};
