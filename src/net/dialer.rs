//! Sequential connection attempts across candidate endpoints.

use std::io;

use tokio::net::TcpStream;

use crate::error::{EtlsError, EtlsResult};
use crate::net::resolver::Endpoint;

/// Connect to the first endpoint that accepts, trying them in order.
///
/// Stops at the first success. When every attempt fails the error carries
/// the attempt count and the last transport error.
pub async fn dial(endpoints: &[Endpoint]) -> EtlsResult<TcpStream> {
    let mut last = None;
    for (attempt, endpoint) in endpoints.iter().enumerate() {
        match TcpStream::connect(endpoint.addr()).await {
            Ok(stream) => {
                tracing::debug!(endpoint = %endpoint, attempt, "Endpoint accepted connection");
                return Ok(stream);
            }
            Err(e) => {
                tracing::warn!(endpoint = %endpoint, attempt, error = %e, "Connect failed, trying next endpoint");
                last = Some(e);
            }
        }
    }

    Err(EtlsError::Connect {
        attempts: endpoints.len(),
        last: last.unwrap_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no endpoints to try")),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use tokio::net::TcpListener;

    /// Address that refuses connections: bound once, then released.
    async fn refused_endpoint() -> Endpoint {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        Endpoint::new(addr)
    }

    #[tokio::test]
    async fn stops_at_first_accepting_endpoint() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let live = Endpoint::new(listener.local_addr().unwrap());
        let dead = refused_endpoint().await;

        let stream = dial(&[dead, live]).await.unwrap();
        assert_eq!(stream.peer_addr().unwrap(), live.addr());
    }

    #[tokio::test]
    async fn aggregates_when_all_fail() {
        let endpoints = [refused_endpoint().await, refused_endpoint().await];
        let err = dial(&endpoints).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Connection);
        assert!(matches!(err, EtlsError::Connect { attempts: 2, .. }));
    }

    #[tokio::test]
    async fn empty_list_fails_without_attempts() {
        let err = dial(&[]).await.unwrap_err();
        assert!(matches!(err, EtlsError::Connect { attempts: 0, .. }));
    }
}
