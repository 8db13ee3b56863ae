//! Request handlers for the cache surface.
//!
//! Every request is classified by the address it came from. Loopback means
//! the local pacman following its mirrorlist: the daemon walks the peer
//! registry and relays the first hit. Any other address is a peer asking
//! for a package, answered strictly from the local cache. Remote requests
//! never trigger another forward, so a package travels at most one hop.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Context as _;
use axum::body::Body;
use axum::extract::{ConnectInfo, Path, State};
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Response as HttpResponse, StatusCode};
use axum::response::{IntoResponse, Response};
use paclan_services::{PackageCache, PeerRegistry};
use tokio_util::io::ReaderStream;

/// Shared state for the proxy router.
#[derive(Clone)]
pub struct ProxyState {
    pub registry: PeerRegistry,
    pub cache: PackageCache,
    pub client: reqwest::Client,
}

impl ProxyState {
    /// Build the state with a forwarding client bounded by `peer_timeout`.
    ///
    /// The timeout covers connection establishment and reads going quiet,
    /// never total transfer time. A slow but live package download is
    /// allowed to finish.
    pub fn new(
        registry: PeerRegistry,
        cache: PackageCache,
        peer_timeout: Duration,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("paclan/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(peer_timeout)
            .read_timeout(peer_timeout)
            .build()
            .context("failed to build forwarding client")?;
        Ok(Self {
            registry,
            cache,
            client,
        })
    }
}

/// `GET /{*path}` — the one route.
pub async fn handle_package(
    State(state): State<ProxyState>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    Path(path): Path<String>,
) -> Response {
    let path = format!("/{path}");
    if remote.ip().is_loopback() {
        tracing::debug!(%path, "local request, walking peers");
        proxy_to_peers(&state, &path).await
    } else {
        tracing::debug!(%path, peer = %remote.ip(), "remote request, serving cache");
        serve_cached(&state.cache, &path).await
    }
}

/// Walk the registry in order and relay the first peer that has the file.
///
/// A peer answering with an error status simply does not have the package;
/// it stays registered and the walk moves on. A peer that cannot be
/// reached at all is evicted on the spot. An exhausted walk is a plain
/// miss: pacman sees 404 and falls through to the next mirror in its list.
async fn proxy_to_peers(state: &ProxyState, path: &str) -> Response {
    for peer in state.registry.snapshot() {
        match forward(&state.client, &peer, path).await {
            Ok(Some(upstream)) => {
                tracing::info!(peer = %peer, %path, "serving from peer");
                return relay(upstream);
            }
            Ok(None) => {
                tracing::debug!(peer = %peer, %path, "peer misses");
            }
            Err(e) => {
                tracing::warn!(peer = %peer, error = %e, "peer unreachable, evicting");
                state.registry.evict(&peer);
            }
        }
    }
    StatusCode::NOT_FOUND.into_response()
}

/// One forward attempt. `Ok(None)` means the peer answered but does not
/// have the file; `Err` means it could not be reached.
async fn forward(
    client: &reqwest::Client,
    peer: &str,
    path: &str,
) -> Result<Option<reqwest::Response>, reqwest::Error> {
    let response = client.get(format!("{peer}{path}")).send().await?;
    if response.status().is_success() {
        Ok(Some(response))
    } else {
        Ok(None)
    }
}

/// Relay an upstream response verbatim: status, headers, and a body that
/// streams through without ever buffering a whole package.
fn relay(upstream: reqwest::Response) -> Response {
    let status =
        StatusCode::from_u16(upstream.status().as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
    let mut headers = HeaderMap::new();
    for (name, value) in upstream.headers() {
        let Ok(name) = HeaderName::from_bytes(name.as_str().as_bytes()) else {
            continue;
        };
        let Ok(value) = HeaderValue::from_bytes(value.as_bytes()) else {
            continue;
        };
        headers.append(name, value);
    }

    let mut response = HttpResponse::new(Body::from_stream(upstream.bytes_stream()));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}

/// Answer from the local package directory, streaming the file on a hit.
async fn serve_cached(cache: &PackageCache, path: &str) -> Response {
    match cache.open(path).await {
        Ok(Some((file, len))) => (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, "application/octet-stream".to_string()),
                (header::CONTENT_LENGTH, len.to_string()),
            ],
            Body::from_stream(ReaderStream::new(file)),
        )
            .into_response(),
        Ok(None) => StatusCode::NOT_FOUND.into_response(),
        Err(e) => {
            tracing::error!(error = %e, %path, "cache read failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
