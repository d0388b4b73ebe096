//! TLS socket handles.
//!
//! # Responsibilities
//! - Connect: resolve, permute, dial, client handshake
//! - Server handshake on accepted plaintext transports
//! - Encrypted send/receive and partial or full shutdown
//! - Publish a snapshot (state, addresses, chain, negotiated parameters)
//!   that queries read without queueing behind in-flight work
//!
//! # Design Decisions
//! - All mutable state lives in `SocketCore`, owned by the handle's strand
//! - A failed connect or handshake, or a fatal transport error, drops the
//!   transport and leaves the handle `Closed`
//! - `close()` never waits: it flips the strand's close flag and returns

use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use rustls::pki_types::{CertificateDer, ServerName};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio_rustls::{TlsAcceptor as RustlsAcceptor, TlsConnector, TlsStream};

use crate::boundary::Completion;
use crate::engine::runtime::EngineShared;
use crate::engine::state::{Direction, Operation, SocketState};
use crate::engine::strand::Strand;
use crate::error::{EtlsError, EtlsResult};
use crate::net::{dialer, selector, HandleGuard, HandleId, Resolve};
use crate::observability::metrics;
use crate::tls::{ciphers, CertificateChain, Role, TlsContext};

/// Read size used when the caller asks for "whatever is available".
const READ_CHUNK: usize = 16 * 1024;

/// Published view of a socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocketInfo {
    pub state: SocketState,
    pub local_addr: Option<SocketAddr>,
    pub peer_addr: Option<SocketAddr>,
    /// Peer certificates, leaf-last. Empty before the handshake.
    pub chain: CertificateChain,
    /// OpenSSL name of the negotiated suite.
    pub cipher_suite: Option<String>,
    pub protocol: Option<String>,
}

impl SocketInfo {
    fn unconnected() -> Self {
        Self {
            state: SocketState::Unconnected,
            local_addr: None,
            peer_addr: None,
            chain: CertificateChain::default(),
            cipher_suite: None,
            protocol: None,
        }
    }
}

enum Transport {
    Detached,
    Plain(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

pub(crate) struct SocketCore {
    guard: HandleGuard,
    state: SocketState,
    transport: Transport,
    /// Default context for a server handshake (the acceptor's).
    context: Option<TlsContext>,
    resolver: Arc<dyn Resolve>,
    info: watch::Sender<SocketInfo>,
}

impl SocketCore {
    fn enter(&mut self, next: SocketState) {
        if !self.state.can_advance_to(next) {
            tracing::warn!(from = %self.state, to = %next, "Ignoring backwards state transition");
            return;
        }
        tracing::debug!(from = %self.state, to = %next, "State transition");
        self.state = next;
        self.info.send_modify(|info| info.state = next);
    }

    fn expect(&self, operation: Operation, wanted: SocketState) -> EtlsResult<()> {
        match self.state {
            state if state == wanted => Ok(()),
            SocketState::Closed => Err(EtlsError::Closed),
            state => Err(EtlsError::InvalidState { operation, state }),
        }
    }

    fn ensure_open(&self, operation: Operation, direction: Direction) -> EtlsResult<()> {
        let open = match direction {
            Direction::Read => self.state.is_readable(),
            Direction::Write | Direction::Both => self.state.is_writable(),
        };
        match self.state {
            _ if open => Ok(()),
            SocketState::Closed => Err(EtlsError::Closed),
            SocketState::HalfShutdown(_) | SocketState::ShutDown => {
                Err(EtlsError::DirectionShutDown(direction))
            }
            state => Err(EtlsError::InvalidState { operation, state }),
        }
    }

    /// Tear the transport down after a failure and pass the error through.
    fn fail(&mut self, err: EtlsError) -> EtlsError {
        tracing::debug!(error = %err, "Tearing down transport");
        self.transport = Transport::Detached;
        self.enter(SocketState::Closed);
        err
    }

    fn attach(&mut self, stream: TcpStream) {
        let local = stream.local_addr().ok();
        let peer = stream.peer_addr().ok();
        self.transport = Transport::Plain(stream);
        self.info.send_modify(|info| {
            info.local_addr = local;
            info.peer_addr = peer;
        });
        self.enter(SocketState::Connected);
    }

    fn take_plain(&mut self, operation: Operation) -> EtlsResult<TcpStream> {
        match std::mem::replace(&mut self.transport, Transport::Detached) {
            Transport::Plain(stream) => Ok(stream),
            other => {
                self.transport = other;
                Err(EtlsError::InvalidState {
                    operation,
                    state: self.state,
                })
            }
        }
    }

    fn session(&mut self, operation: Operation) -> EtlsResult<&mut TlsStream<TcpStream>> {
        match &mut self.transport {
            Transport::Tls(stream) => Ok(stream.as_mut()),
            _ => Err(EtlsError::InvalidState {
                operation,
                state: self.state,
            }),
        }
    }

    fn establish(&mut self, stream: TlsStream<TcpStream>, role: Role, started: Instant) {
        let (_, session) = stream.get_ref();
        let chain = CertificateChain::from_presented(session.peer_certificates());
        let cipher_suite = session.negotiated_cipher_suite().map(|suite| {
            ciphers::openssl_name(suite.suite())
                .map(str::to_string)
                .unwrap_or_else(|| format!("{:?}", suite.suite()))
        });
        let protocol = session.protocol_version().map(ciphers::protocol_name);

        metrics::record_handshake(role, started.elapsed());
        tracing::info!(
            role = %role,
            protocol = protocol.as_deref().unwrap_or("unknown"),
            cipher = cipher_suite.as_deref().unwrap_or("unknown"),
            peer_certificates = chain.len(),
            "Handshake complete"
        );

        self.transport = Transport::Tls(Box::new(stream));
        self.info.send_modify(|info| {
            info.chain = chain;
            info.cipher_suite = cipher_suite;
            info.protocol = protocol;
        });
        self.enter(SocketState::Established);
    }

    async fn connect(&mut self, host: String, port: u16, context: TlsContext) -> EtlsResult<()> {
        self.expect(Operation::Connect, SocketState::Unconnected)?;
        self.enter(SocketState::Connecting);
        match self.open(&host, port, &context).await {
            Ok(()) => Ok(()),
            Err(e) => Err(self.fail(e)),
        }
    }

    async fn open(&mut self, host: &str, port: u16, context: &TlsContext) -> EtlsResult<()> {
        let server_name = ServerName::try_from(host.to_string())
            .map_err(|e| EtlsError::Config(format!("invalid server name '{host}': {e}")))?;

        let endpoints = selector::shuffle(self.resolver.resolve(host, port).await?);
        tracing::debug!(host, port, candidates = endpoints.len(), "Connecting");
        let stream = dialer::dial(&endpoints).await?;
        self.attach(stream);

        let stream = self.take_plain(Operation::Handshake)?;
        self.enter(SocketState::Handshaking);
        let started = Instant::now();
        let tls = TlsConnector::from(context.client_config())
            .connect(server_name, stream)
            .await
            .map_err(EtlsError::from_session)?;
        self.establish(tls.into(), Role::Client, started);
        Ok(())
    }

    async fn handshake(&mut self, context: Option<TlsContext>) -> EtlsResult<()> {
        self.expect(Operation::Handshake, SocketState::Connected)?;
        let context = context
            .or_else(|| self.context.clone())
            .ok_or(EtlsError::MissingCertificate)?;
        let config = context.server_config()?;

        let stream = self.take_plain(Operation::Handshake)?;
        self.enter(SocketState::Handshaking);
        let started = Instant::now();
        match RustlsAcceptor::from(config).accept(stream).await {
            Ok(tls) => {
                self.establish(tls.into(), Role::Server, started);
                Ok(())
            }
            Err(e) => Err(self.fail(EtlsError::from_session(e))),
        }
    }

    async fn send(&mut self, data: Vec<u8>) -> EtlsResult<()> {
        self.ensure_open(Operation::Send, Direction::Write)?;
        let stream = self.session(Operation::Send)?;
        let written = async {
            stream.write_all(&data).await?;
            stream.flush().await
        }
        .await;
        written.map_err(|e| self.fail(EtlsError::from_session(e)))
    }

    async fn receive(&mut self, max: usize) -> EtlsResult<Vec<u8>> {
        self.ensure_open(Operation::Receive, Direction::Read)?;
        let stream = self.session(Operation::Receive)?;

        let mut buf = Vec::new();
        let read = if max == 0 {
            buf.resize(READ_CHUNK, 0);
            let read = stream.read(&mut buf).await;
            read.map(|n| buf.truncate(n))
        } else {
            buf.reserve(max.min(READ_CHUNK));
            let mut limited = (&mut *stream).take(max as u64);
            limited.read_to_end(&mut buf).await.map(|_| ())
        };

        match read {
            Ok(()) if buf.is_empty() => Err(EtlsError::EndOfStream),
            Ok(()) => Ok(buf),
            // Peer closed without close_notify; hand over what arrived.
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof && !buf.is_empty() => Ok(buf),
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Err(EtlsError::EndOfStream),
            Err(e) => Err(self.fail(EtlsError::from_session(e))),
        }
    }

    async fn shutdown(&mut self, direction: Direction) -> EtlsResult<()> {
        let next = self.state.after_shutdown(direction)?;
        if self.state.is_writable() && direction != Direction::Read {
            let stream = self.session(Operation::Shutdown)?;
            if let Err(e) = stream.shutdown().await {
                return Err(self.fail(EtlsError::from_session(e)));
            }
        }
        self.enter(next);
        Ok(())
    }
}

impl Drop for SocketCore {
    fn drop(&mut self) {
        self.info.send_modify(|info| info.state = SocketState::Closed);
        tracing::debug!(socket_id = %self.guard.id(), last_state = %self.state, "Socket released");
    }
}

/// Handle to one TLS socket. Clones refer to the same socket.
#[derive(Clone)]
pub struct TlsSocket {
    id: HandleId,
    strand: Strand<SocketCore>,
    info: watch::Receiver<SocketInfo>,
    runtime: Handle,
}

impl fmt::Debug for TlsSocket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsSocket")
            .field("id", &self.id)
            .field("state", &self.state())
            .finish()
    }
}

impl TlsSocket {
    pub(crate) fn unconnected(shared: &EngineShared) -> Self {
        Self::launch(shared, |_| {})
    }

    pub(crate) fn accepted(shared: &EngineShared, stream: TcpStream, context: TlsContext) -> Self {
        Self::launch(shared, move |core| {
            core.context = Some(context);
            core.attach(stream);
        })
    }

    fn launch(shared: &EngineShared, setup: impl FnOnce(&mut SocketCore)) -> Self {
        let guard = shared.handles.track();
        let id = guard.id();
        let (publisher, info) = watch::channel(SocketInfo::unconnected());
        let mut core = SocketCore {
            guard,
            state: SocketState::Unconnected,
            transport: Transport::Detached,
            context: None,
            resolver: Arc::clone(&shared.resolver),
            info: publisher,
        };
        setup(&mut core);

        let span = tracing::debug_span!("socket", socket_id = %id);
        Self {
            id,
            strand: Strand::spawn(&shared.runtime, core, span),
            info,
            runtime: shared.runtime.clone(),
        }
    }

    pub fn id(&self) -> HandleId {
        self.id
    }

    /// Resolve `host`, connect to one of its endpoints and run the client handshake.
    ///
    /// SNI and the webpki name check use `host`; a failure leaves the socket closed.
    pub async fn connect(
        &self,
        host: impl Into<String>,
        port: u16,
        context: &TlsContext,
    ) -> EtlsResult<()> {
        let host = host.into();
        let context = context.clone();
        self.strand
            .run(Operation::Connect, move |core| {
                Box::pin(core.connect(host, port, context))
            })
            .await
    }

    /// Server handshake with the acceptor's context.
    pub async fn handshake(&self) -> EtlsResult<()> {
        self.strand
            .run(Operation::Handshake, |core| Box::pin(core.handshake(None)))
            .await
    }

    /// Server handshake with an explicit context.
    pub async fn handshake_with(&self, context: &TlsContext) -> EtlsResult<()> {
        let context = context.clone();
        self.strand
            .run(Operation::Handshake, move |core| {
                Box::pin(core.handshake(Some(context)))
            })
            .await
    }

    /// Write the whole buffer and flush it.
    pub async fn send(&self, data: impl Into<Vec<u8>>) -> EtlsResult<()> {
        let data = data.into();
        self.strand
            .run(Operation::Send, move |core| Box::pin(core.send(data)))
            .await
    }

    /// Read up to `max` bytes; fewer only at end of stream. `max = 0` returns
    /// the next available chunk.
    pub async fn receive(&self, max: usize) -> EtlsResult<Vec<u8>> {
        self.strand
            .run(Operation::Receive, move |core| Box::pin(core.receive(max)))
            .await
    }

    /// Shut one or both directions. Write shutdown sends `close_notify`.
    pub async fn shutdown(&self, direction: Direction) -> EtlsResult<()> {
        self.strand
            .run(Operation::Shutdown, move |core| {
                Box::pin(core.shutdown(direction))
            })
            .await
    }

    /// Release the socket now. In-flight and later operations fail with `Closed`.
    pub fn close(&self) {
        if self.strand.close() {
            tracing::debug!(socket_id = %self.id, "Socket closed");
            metrics::record_operation(Operation::Close, Ok(()));
        }
    }

    pub fn connect_async(
        &self,
        host: impl Into<String>,
        port: u16,
        context: &TlsContext,
        completion: Completion<()>,
    ) {
        let socket = self.clone();
        let host = host.into();
        let context = context.clone();
        completion.deliver_on(&self.runtime, async move {
            socket.connect(host, port, &context).await
        });
    }

    pub fn handshake_async(&self, completion: Completion<()>) {
        let socket = self.clone();
        completion.deliver_on(&self.runtime, async move { socket.handshake().await });
    }

    pub fn send_async(&self, data: impl Into<Vec<u8>>, completion: Completion<()>) {
        let socket = self.clone();
        let data = data.into();
        completion.deliver_on(&self.runtime, async move { socket.send(data).await });
    }

    pub fn receive_async(&self, max: usize, completion: Completion<Vec<u8>>) {
        let socket = self.clone();
        completion.deliver_on(&self.runtime, async move { socket.receive(max).await });
    }

    pub fn shutdown_async(&self, direction: Direction, completion: Completion<()>) {
        let socket = self.clone();
        completion.deliver_on(&self.runtime, async move { socket.shutdown(direction).await });
    }

    /// Current snapshot.
    pub fn info(&self) -> SocketInfo {
        let mut info = self.info.borrow().clone();
        if self.strand.is_closed() {
            info.state = SocketState::Closed;
        }
        info
    }

    pub fn state(&self) -> SocketState {
        self.info().state
    }

    fn live(&self) -> EtlsResult<SocketInfo> {
        let info = self.info();
        if info.state == SocketState::Closed {
            return Err(EtlsError::Closed);
        }
        Ok(info)
    }

    pub fn local_address(&self) -> EtlsResult<SocketAddr> {
        let info = self.live()?;
        info.local_addr.ok_or(EtlsError::InvalidState {
            operation: Operation::Query,
            state: info.state,
        })
    }

    pub fn peer_address(&self) -> EtlsResult<SocketAddr> {
        let info = self.live()?;
        info.peer_addr.ok_or(EtlsError::InvalidState {
            operation: Operation::Query,
            state: info.state,
        })
    }

    /// Peer certificates, leaf-last; empty before the handshake.
    pub fn certificate_chain(&self) -> EtlsResult<CertificateChain> {
        Ok(self.live()?.chain)
    }

    /// Last element of the chain.
    pub fn peer_certificate(&self) -> EtlsResult<CertificateDer<'static>> {
        self.live()?.chain.peer_certificate().cloned()
    }
}
