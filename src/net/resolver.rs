//! Endpoint resolution.
//!
//! # Responsibilities
//! - Turn a hostname or address literal plus port into candidate endpoints
//! - Report unknown hosts and empty answers as resolution errors
//! - Allow addresses to be pinned per host (tests, service overrides)

use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::future::BoxFuture;

use crate::error::{EtlsError, EtlsResult};

/// A resolved transport endpoint, consumed by one connection attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Endpoint(SocketAddr);

impl Endpoint {
    pub fn new(addr: SocketAddr) -> Self {
        Self(addr)
    }

    pub fn addr(&self) -> SocketAddr {
        self.0
    }
}

impl From<SocketAddr> for Endpoint {
    fn from(addr: SocketAddr) -> Self {
        Self(addr)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Source of endpoints for a host.
///
/// Implementations return a non-empty list or an error of the resolution
/// category.
pub trait Resolve: Send + Sync + fmt::Debug {
    fn resolve<'a>(&'a self, host: &'a str, port: u16) -> BoxFuture<'a, EtlsResult<Vec<Endpoint>>>;
}

/// System resolver backed by `tokio::net::lookup_host`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DnsResolver;

impl Resolve for DnsResolver {
    fn resolve<'a>(&'a self, host: &'a str, port: u16) -> BoxFuture<'a, EtlsResult<Vec<Endpoint>>> {
        Box::pin(async move {
            let addrs = tokio::net::lookup_host((host, port))
                .await
                .map_err(|source| EtlsError::Resolve {
                    host: host.to_string(),
                    source,
                })?;
            non_empty(host, addrs.map(Endpoint::from).collect())
        })
    }
}

/// Resolver with pinned addresses per host.
///
/// Pinned addresses carry their own ports; the requested port is ignored for
/// them. Hosts without a pin go to the fallback resolver, or fail when there
/// is none.
#[derive(Debug, Clone, Default)]
pub struct StaticResolver {
    pins: HashMap<String, Vec<SocketAddr>>,
    fallback: Option<Arc<dyn Resolve>>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pin `addrs` for `host` (case-insensitive).
    pub fn pin(mut self, host: &str, addrs: impl IntoIterator<Item = SocketAddr>) -> Self {
        self.pins
            .insert(host.to_ascii_lowercase(), addrs.into_iter().collect());
        self
    }

    /// Send unpinned hosts to `resolver`.
    pub fn with_fallback(mut self, resolver: Arc<dyn Resolve>) -> Self {
        self.fallback = Some(resolver);
        self
    }
}

impl Resolve for StaticResolver {
    fn resolve<'a>(&'a self, host: &'a str, port: u16) -> BoxFuture<'a, EtlsResult<Vec<Endpoint>>> {
        Box::pin(async move {
            if let Some(addrs) = self.pins.get(&host.to_ascii_lowercase()) {
                return non_empty(host, addrs.iter().copied().map(Endpoint::from).collect());
            }
            match &self.fallback {
                Some(fallback) => fallback.resolve(host, port).await,
                None => Err(EtlsError::NoAddresses {
                    host: host.to_string(),
                }),
            }
        })
    }
}

fn non_empty(host: &str, endpoints: Vec<Endpoint>) -> EtlsResult<Vec<Endpoint>> {
    if endpoints.is_empty() {
        return Err(EtlsError::NoAddresses {
            host: host.to_string(),
        });
    }
    tracing::debug!(host, count = endpoints.len(), "Host resolved");
    Ok(endpoints)
}
