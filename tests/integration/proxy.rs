//! End-to-end proxy tests: real listeners, real client, both request
//! classifications exercised over the wire.

use std::net::{IpAddr, Ipv4Addr, SocketAddrV4};

use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;

use paclan_services::PeerRegistry;

use crate::*;

/// Bind a stand-in peer on loopback without deciding yet what it answers.
async fn bind_stub() -> (TcpListener, String, SocketAddrV4) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = match listener.local_addr().unwrap() {
        std::net::SocketAddr::V4(v4) => v4,
        other => panic!("unexpected address family: {other}"),
    };
    (listener, format!("http://{addr}"), addr)
}

/// Answer every request with a fixed status and body.
fn serve_stub(listener: TcpListener, status: StatusCode, body: &'static str) {
    let app = Router::new().route("/{*path}", get(move || async move { (status, body) }));
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
}

/// The flagship path: pacman asks its local daemon, the daemon fetches
/// from a peer node's cache, and the package arrives intact.
#[tokio::test]
async fn package_crosses_from_one_node_to_another() {
    let Some(lan) = lan_ip() else {
        eprintln!("SKIP: no LAN address on this host");
        return;
    };

    // Serving node: has the package, knows no peers.
    let b_root = temp_cache("node-b");
    put_package(
        &b_root,
        "core/os/x86_64/ripgrep-14.1.0-1-x86_64.pkg.tar.zst",
        b"ripgrep bytes",
    );
    let b_state = node_state(&b_root, PeerRegistry::new(None));
    let (b_addr, b_task) = spawn_surface(IpAddr::V4(lan), b_state).await;

    // Requesting node: empty cache, one registered peer. Both nodes share
    // this host's address, so the self filter stays off.
    let a_root = temp_cache("node-a");
    let a_registry = PeerRegistry::new(None);
    assert!(a_registry.insert(SocketAddrV4::new(lan, b_addr.port())));
    let a_state = node_state(&a_root, a_registry.clone());
    let (a_addr, a_task) = spawn_surface(IpAddr::V4(Ipv4Addr::LOCALHOST), a_state).await;

    // pacman's view: ask the local daemon, receive the peer's package.
    let client = reqwest::Client::new();
    let response = client
        .get(format!(
            "http://{a_addr}/core/os/x86_64/ripgrep-14.1.0-1-x86_64.pkg.tar.zst"
        ))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
    assert_eq!(response.headers()["content-length"], "13");
    assert_eq!(response.bytes().await.unwrap().as_ref(), b"ripgrep bytes");

    // A package nobody has is a plain miss, and the healthy peer stays.
    let response = client
        .get(format!("http://{a_addr}/extra/os/x86_64/nothing.pkg.tar.zst"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 404);
    assert!(a_registry.contains(&format!("http://{lan}:{}", b_addr.port())));

    a_task.abort();
    b_task.abort();
}

/// Requests arriving from the LAN are answered strictly from the local
/// cache; the registry must not be consulted for them.
#[tokio::test]
async fn peers_are_answered_from_the_cache_only() {
    let Some(lan) = lan_ip() else {
        eprintln!("SKIP: no LAN address on this host");
        return;
    };

    let root = temp_cache("remote");
    put_package(&root, "core/os/x86_64/linux-6.10-1.pkg.tar.zst", b"kernel");
    // A registered peer that must never be consulted for remote callers.
    let registry = PeerRegistry::new(None);
    registry.insert(SocketAddrV4::new(Ipv4Addr::new(203, 0, 113, 9), 41234));
    let (addr, task) = spawn_surface(IpAddr::V4(lan), node_state(&root, registry.clone())).await;

    let client = reqwest::Client::new();
    let response = client
        .get(format!("http://{addr}/core/os/x86_64/linux-6.10-1.pkg.tar.zst"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
    assert_eq!(response.bytes().await.unwrap().as_ref(), b"kernel");

    let response = client
        .get(format!("http://{addr}/core/os/x86_64/absent.pkg.tar.zst"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 404);
    // Had the miss triggered a walk, the unroutable peer would have been
    // timed out and evicted; it being present proves no walk happened.
    assert!(registry.contains("http://203.0.113.9:41234"));

    task.abort();
}

/// A walk that misses on the first peer takes the second peer's package,
/// and both peers stay registered.
#[tokio::test]
async fn walk_falls_through_a_miss_to_the_next_peer() {
    let s1 = bind_stub().await;
    let s2 = bind_stub().await;
    let (misser, hitter) = if s1.1 < s2.1 { (s1, s2) } else { (s2, s1) };
    serve_stub(misser.0, StatusCode::NOT_FOUND, "");
    serve_stub(hitter.0, StatusCode::OK, "package X");

    let root = temp_cache("fallthrough");
    let registry = PeerRegistry::new(None);
    registry.insert(misser.2);
    registry.insert(hitter.2);
    let (addr, task) = spawn_surface(
        IpAddr::V4(Ipv4Addr::LOCALHOST),
        node_state(&root, registry.clone()),
    )
    .await;

    let response = reqwest::get(format!("http://{addr}/core/os/x86_64/x.pkg.tar.zst"))
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
    assert_eq!(response.bytes().await.unwrap().as_ref(), b"package X");

    // Answering, even with a miss, is enough to stay registered.
    assert!(registry.contains(&misser.1));
    assert!(registry.contains(&hitter.1));

    task.abort();
}

/// A peer that refuses connections is evicted mid-walk and the request
/// falls through to a plain miss.
#[tokio::test]
async fn unreachable_peer_is_dropped_during_a_walk() {
    // A port that was bound and released: connecting to it is refused.
    let dead_port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };

    let root = temp_cache("evict");
    let registry = PeerRegistry::new(None);
    registry.insert(SocketAddrV4::new(Ipv4Addr::LOCALHOST, dead_port));
    let (addr, task) = spawn_surface(
        IpAddr::V4(Ipv4Addr::LOCALHOST),
        node_state(&root, registry.clone()),
    )
    .await;

    let response = reqwest::get(format!("http://{addr}/core/os/x86_64/anything.pkg.tar.zst"))
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 404);
    assert!(registry.is_empty(), "refused peer should have been evicted");

    task.abort();
}

/// Status, headers, and body survive the relay hop unchanged.
#[tokio::test]
async fn relay_carries_status_headers_and_body_end_to_end() {
    // Stand-in upstream peer with a recognizable response surface.
    let upstream = Router::new().route(
        "/{*path}",
        get(|| async {
            (
                [
                    ("content-type", "application/x-tar"),
                    ("x-cache-origin", "peer"),
                ],
                &b"tarball"[..],
            )
        }),
    );
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let upstream_addr = listener.local_addr().unwrap();
    let upstream_task = tokio::spawn(async move {
        axum::serve(listener, upstream).await.unwrap();
    });

    let root = temp_cache("relay");
    let registry = PeerRegistry::new(None);
    registry.insert(SocketAddrV4::new(Ipv4Addr::LOCALHOST, upstream_addr.port()));
    let (addr, task) =
        spawn_surface(IpAddr::V4(Ipv4Addr::LOCALHOST), node_state(&root, registry)).await;

    let response = reqwest::get(format!("http://{addr}/core/os/x86_64/tool-1.0-1.pkg.tar.zst"))
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
    assert_eq!(response.headers()["content-type"], "application/x-tar");
    assert_eq!(response.headers()["x-cache-origin"], "peer");
    assert_eq!(response.bytes().await.unwrap().as_ref(), b"tarball");

    upstream_task.abort();
    task.abort();
}
