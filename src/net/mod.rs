//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! (host, port)
//!     → resolver.rs (Resolve trait: DNS or pinned addresses)
//!     → selector.rs (uniform random permutation)
//!     → dialer.rs (sequential attempts, first success wins)
//!     → TcpStream handed to the socket engine for the TLS handshake
//! ```
//!
//! # Design Decisions
//! - Resolution is pluggable so tests never depend on real DNS
//! - Attempts are sequential; one stream per connect, never a race
//! - connection.rs gives every handle a tracing ID and an open count

pub mod connection;
pub mod dialer;
pub mod resolver;
pub mod selector;

pub use connection::{HandleGuard, HandleId, HandleTracker};
pub use resolver::{DnsResolver, Endpoint, Resolve, StaticResolver};
