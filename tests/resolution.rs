//! Endpoint resolution and failover during connect.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{context, handshake_pair, identity_settings, loopback_listener, refused_addr, TestPki};
use etls::config::Settings;
use etls::engine::{Engine, SocketState};
use etls::error::{ErrorKind, EtlsError};
use etls::net::StaticResolver;

#[tokio::test(flavor = "multi_thread")]
async fn unknown_host_is_a_resolution_error() {
    let engine = Engine::current().unwrap();
    let client_ctx = context(&Settings::default());
    let socket = engine.socket();

    let result = tokio::time::timeout(
        Duration::from_secs(10),
        socket.connect("example.invalid", 443, &client_ctx),
    )
    .await
    .expect("resolution should fail promptly");

    assert_eq!(result.unwrap_err().kind(), ErrorKind::Resolution);
    assert_eq!(socket.state(), SocketState::Closed);
}

#[tokio::test(flavor = "multi_thread")]
async fn unpinned_host_without_fallback_has_no_addresses() {
    let resolver = StaticResolver::new().pin("known.test", [refused_addr()]);
    let engine = Engine::current().unwrap().with_resolver(Arc::new(resolver));
    let client_ctx = context(&Settings::default());

    let err = engine.connect("unknown.test", 443, &client_ctx).await.unwrap_err();
    assert!(matches!(err, EtlsError::NoAddresses { .. }));
    assert_eq!(err.kind(), ErrorKind::Resolution);
}

#[tokio::test(flavor = "multi_thread")]
async fn refused_endpoints_are_skipped() {
    let pki = TestPki::new("failover CA");
    let cert = pki.issue("service.test", &["service.test"]);
    let server_ctx = context(&identity_settings(&cert));
    let client_ctx = context(&Settings::default());

    let probe = Engine::current().unwrap();
    let acceptor = loopback_listener(&probe, &server_ctx);
    let live = acceptor.local_address().unwrap();
    let resolver = StaticResolver::new().pin(
        "service.test",
        [refused_addr(), live, refused_addr(), refused_addr()],
    );
    let engine = Engine::current().unwrap().with_resolver(Arc::new(resolver));

    // Every permutation of the candidates must still reach the live endpoint.
    for _ in 0..8 {
        let (server, (client, connected)) =
            handshake_pair(&engine, &acceptor, "service.test", &client_ctx).await;
        connected.unwrap();
        server.unwrap();
        assert_eq!(client.peer_address().unwrap(), live);
        client.close();
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn all_refused_endpoints_aggregate_into_one_error() {
    let resolver = StaticResolver::new().pin("down.test", [refused_addr(), refused_addr()]);
    let engine = Engine::current().unwrap().with_resolver(Arc::new(resolver));
    let client_ctx = context(&Settings::default());

    let socket = engine.socket();
    let err = socket.connect("down.test", 443, &client_ctx).await.unwrap_err();
    match &err {
        EtlsError::Connect { attempts, .. } => assert_eq!(*attempts, 2),
        other => panic!("expected an aggregated connect error, got {other:?}"),
    }
    assert_eq!(err.kind(), ErrorKind::Connection);
    assert_eq!(socket.state(), SocketState::Closed);
}
