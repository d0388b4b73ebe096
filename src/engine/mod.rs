//! Socket engine.
//!
//! # Data Flow
//! ```text
//! Engine (runtime + resolver + handle tracker)
//!     → socket() / connect()      → TlsSocket  ─┐
//!     → listen()                  → TlsAcceptor ─┤
//!                                                ↓
//!                 strand.rs: one actor per handle, jobs run in call order
//!                                                ↓
//!                 socket.rs: SocketCore (transport + state.rs machine)
//!                                                ↓
//!                 watch snapshot → synchronous queries
//! ```
//!
//! # Design Decisions
//! - Handles are cheap clones of a channel; the state never leaves its actor
//! - Every operation has an `async fn` form and a `Completion` form for hosts
//!   that are not async

pub mod acceptor;
pub mod runtime;
pub mod socket;
pub mod state;
pub(crate) mod strand;

pub use acceptor::TlsAcceptor;
pub use runtime::Engine;
pub use socket::{SocketInfo, TlsSocket};
pub use state::{Direction, Operation, SocketState};
