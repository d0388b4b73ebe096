//! Engine: worker pool plus the shared pieces every handle needs.
//!
//! # Responsibilities
//! - Own (or borrow) the multi-threaded tokio runtime the handles run on
//! - Hand out sockets and acceptors bound to that runtime
//! - Carry the resolver and the open-handle tracker
//!
//! # Design Decisions
//! - One engine per host process is typical, but nothing is global
//! - An engine built with `from_handle` never shuts the runtime down
//! - Dropping an owning engine uses `shutdown_background`, so it is safe to
//!   drop from inside async code

use std::future::Future;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use tokio::runtime::{Builder, Handle, Runtime};

use crate::boundary::Completion;
use crate::config::EngineConfig;
use crate::engine::acceptor::TlsAcceptor;
use crate::engine::socket::TlsSocket;
use crate::error::{EtlsError, EtlsResult};
use crate::net::{DnsResolver, HandleTracker, Resolve};
use crate::tls::TlsContext;

/// State shared by the engine and every handle it created.
#[derive(Debug, Clone)]
pub(crate) struct EngineShared {
    pub(crate) runtime: Handle,
    pub(crate) resolver: Arc<dyn Resolve>,
    pub(crate) handles: HandleTracker,
}

#[derive(Debug)]
pub struct Engine {
    runtime: Option<Runtime>,
    shared: EngineShared,
}

impl Engine {
    /// Build a dedicated multi-threaded runtime.
    pub fn start(config: &EngineConfig) -> EtlsResult<Self> {
        let mut builder = Builder::new_multi_thread();
        builder.enable_all().thread_name(config.thread_name.clone());
        if config.worker_threads > 0 {
            builder.worker_threads(config.worker_threads);
        }
        let runtime = builder
            .build()
            .map_err(|e| EtlsError::Config(format!("cannot start worker pool: {e}")))?;

        tracing::info!(
            worker_threads = config.worker_threads,
            thread_name = %config.thread_name,
            "Engine started"
        );
        let handle = runtime.handle().clone();
        Ok(Self {
            runtime: Some(runtime),
            shared: EngineShared::new(handle),
        })
    }

    /// Run on a runtime owned by someone else.
    pub fn from_handle(handle: Handle) -> Self {
        Self {
            runtime: None,
            shared: EngineShared::new(handle),
        }
    }

    /// Run on the runtime of the calling task.
    pub fn current() -> EtlsResult<Self> {
        Handle::try_current()
            .map(Self::from_handle)
            .map_err(|e| EtlsError::Config(format!("no tokio runtime: {e}")))
    }

    /// Replace the DNS resolver for handles created afterwards.
    pub fn with_resolver(mut self, resolver: Arc<dyn Resolve>) -> Self {
        self.shared.resolver = resolver;
        self
    }

    pub fn handle(&self) -> &Handle {
        &self.shared.runtime
    }

    /// Socket handles created by this engine that are still alive.
    pub fn open_sockets(&self) -> u64 {
        self.shared.handles.open_count()
    }

    /// A fresh, unconnected socket.
    pub fn socket(&self) -> TlsSocket {
        TlsSocket::unconnected(&self.shared)
    }

    /// Create a socket and connect it to `host:port`.
    pub async fn connect(
        &self,
        host: impl Into<String>,
        port: u16,
        context: &TlsContext,
    ) -> EtlsResult<TlsSocket> {
        let socket = self.socket();
        socket.connect(host, port, context).await?;
        Ok(socket)
    }

    pub fn connect_async(
        &self,
        host: impl Into<String>,
        port: u16,
        context: &TlsContext,
        completion: Completion<TlsSocket>,
    ) {
        let socket = self.socket();
        let host = host.into();
        let context = context.clone();
        completion.deliver_on(&self.shared.runtime, async move {
            socket.connect(host, port, &context).await?;
            Ok(socket)
        });
    }

    /// Listen on every IPv4 interface. Port 0 picks a free port.
    pub fn listen(&self, port: u16, context: &TlsContext, backlog: u32) -> EtlsResult<TlsAcceptor> {
        self.listen_on(SocketAddr::from((Ipv4Addr::UNSPECIFIED, port)), context, backlog)
    }

    pub fn listen_on(
        &self,
        addr: SocketAddr,
        context: &TlsContext,
        backlog: u32,
    ) -> EtlsResult<TlsAcceptor> {
        TlsAcceptor::bind(&self.shared, addr, context, backlog)
    }

    /// Drive `future` to completion from a thread outside the runtime.
    ///
    /// Panics when called from inside an async context.
    pub fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.shared.runtime.block_on(future)
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            tracing::info!(open_sockets = self.open_sockets(), "Engine stopping");
            runtime.shutdown_background();
        }
    }
}

impl EngineShared {
    fn new(runtime: Handle) -> Self {
        Self {
            runtime,
            resolver: Arc::new(DnsResolver),
            handles: HandleTracker::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::engine::SocketState;
    use crate::error::ErrorKind;

    #[test]
    fn start_builds_a_dedicated_runtime() {
        let config = EngineConfig {
            worker_threads: 2,
            ..EngineConfig::default()
        };
        let engine = Engine::start(&config).unwrap();
        let value = engine.block_on(async { 21 * 2 });
        assert_eq!(value, 42);
        assert_eq!(engine.open_sockets(), 0);
    }

    #[test]
    fn current_requires_a_runtime() {
        let err = Engine::current().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
    }

    #[tokio::test]
    async fn sockets_are_counted_until_released() {
        let engine = Engine::current().unwrap();
        let socket = engine.socket();
        assert_eq!(socket.state(), SocketState::Unconnected);
        assert_eq!(engine.open_sockets(), 1);

        socket.close();
        assert_eq!(socket.state(), SocketState::Closed);
        for _ in 0..50 {
            if engine.open_sockets() == 0 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(engine.open_sockets(), 0);
    }

    #[tokio::test]
    async fn listen_without_identity_is_rejected() {
        let engine = Engine::current().unwrap();
        let context = TlsContext::new(&Settings::default()).unwrap();
        let err = engine.listen(0, &context, 16).unwrap_err();
        assert!(matches!(err, EtlsError::MissingCertificate));
    }
}
