//! Listening TLS endpoint.
//!
//! # Responsibilities
//! - Bind and listen synchronously so bind errors reach the caller directly
//! - Accept one plaintext connection per `accept` call, in call order
//! - Wrap each accepted stream in a `TlsSocket` that carries the
//!   acceptor's context for its server handshake
//!
//! # Design Decisions
//! - The handshake is not run on accept; the caller decides when
//! - `SO_REUSEADDR` is set so a restarted listener can rebind at once

use std::net::SocketAddr;

use tokio::net::{TcpListener, TcpSocket};
use tokio::runtime::Handle;

use crate::boundary::Completion;
use crate::engine::runtime::EngineShared;
use crate::engine::socket::TlsSocket;
use crate::engine::state::Operation;
use crate::engine::strand::Strand;
use crate::error::{EtlsError, EtlsResult};
use crate::net::HandleId;
use crate::observability::metrics;
use crate::tls::TlsContext;

pub(crate) struct AcceptorCore {
    listener: TcpListener,
    context: TlsContext,
    shared: EngineShared,
    accepted: u64,
}

impl AcceptorCore {
    async fn accept(&mut self) -> EtlsResult<TlsSocket> {
        let (stream, peer) = self.listener.accept().await?;
        self.accepted += 1;
        tracing::debug!(peer = %peer, accepted = self.accepted, "Connection accepted");
        Ok(TlsSocket::accepted(&self.shared, stream, self.context.clone()))
    }
}

impl Drop for AcceptorCore {
    fn drop(&mut self) {
        tracing::info!(accepted = self.accepted, "Acceptor closed");
    }
}

/// Listening socket. Clones refer to the same listener.
#[derive(Clone)]
pub struct TlsAcceptor {
    id: HandleId,
    strand: Strand<AcceptorCore>,
    local_addr: SocketAddr,
    context: TlsContext,
    runtime: Handle,
}

impl std::fmt::Debug for TlsAcceptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsAcceptor")
            .field("id", &self.id)
            .field("local_addr", &self.local_addr)
            .field("closed", &self.strand.is_closed())
            .finish()
    }
}

impl TlsAcceptor {
    pub(crate) fn bind(
        shared: &EngineShared,
        addr: SocketAddr,
        context: &TlsContext,
        backlog: u32,
    ) -> EtlsResult<Self> {
        if !context.can_serve() {
            return Err(EtlsError::MissingCertificate);
        }

        // Registering the listener needs the engine's reactor.
        let _entered = shared.runtime.enter();
        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()?
        } else {
            TcpSocket::new_v6()?
        };
        socket.set_reuseaddr(true)?;
        socket.bind(addr)?;
        let listener = socket.listen(backlog)?;
        let local_addr = listener.local_addr()?;

        let id = HandleId::new();
        tracing::info!(
            acceptor_id = %id,
            address = %local_addr,
            backlog,
            verify = ?context.verify_mode(),
            "Listening"
        );
        metrics::record_operation(Operation::Listen, Ok(()));

        let core = AcceptorCore {
            listener,
            context: context.clone(),
            shared: shared.clone(),
            accepted: 0,
        };
        let span = tracing::debug_span!("acceptor", acceptor_id = %id);
        Ok(Self {
            id,
            strand: Strand::spawn(&shared.runtime, core, span),
            local_addr,
            context: context.clone(),
            runtime: shared.runtime.clone(),
        })
    }

    /// Wait for the next inbound connection. The returned socket is
    /// `Connected`; call `handshake` on it next.
    pub async fn accept(&self) -> EtlsResult<TlsSocket> {
        self.strand
            .run(Operation::Accept, |core| Box::pin(core.accept()))
            .await
    }

    pub fn accept_async(&self, completion: Completion<TlsSocket>) {
        let acceptor = self.clone();
        completion.deliver_on(&self.runtime, async move { acceptor.accept().await });
    }

    pub fn local_address(&self) -> EtlsResult<SocketAddr> {
        if self.strand.is_closed() {
            return Err(EtlsError::Closed);
        }
        Ok(self.local_addr)
    }

    pub fn context(&self) -> &TlsContext {
        &self.context
    }

    /// Stop listening. Pending accepts fail with `Closed`.
    pub fn close(&self) {
        if self.strand.close() {
            metrics::record_operation(Operation::Close, Ok(()));
        }
    }

    pub fn is_closed(&self) -> bool {
        self.strand.is_closed()
    }
}
