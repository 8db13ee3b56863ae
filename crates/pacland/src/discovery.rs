//! discovery — the multicast protocol loop.
//!
//! One task listens on the group socket and feeds every datagram through
//! [`Discovery::handle_datagram`]; another announces this host on a fixed
//! interval. Startup probes the group once and then waits briefly for the
//! first answer so the proxy does not start routing against an empty
//! registry.

use std::net::{SocketAddr, SocketAddrV4};
use std::time::Duration;

use futures::future::BoxFuture;
use mockall::automock;
use tokio::net::UdpSocket;
use tokio::sync::Notify;

use paclan_core::DiscoveryMessage;
use paclan_services::PeerRegistry;

/// How announcements leave this host. Production uses a multicast socket;
/// tests substitute a mock.
#[automock]
pub trait AnnounceTransport {
    fn send(&self, message: DiscoveryMessage) -> BoxFuture<'static, std::io::Result<()>>;
}

pub struct Discovery<T: AnnounceTransport> {
    registry: PeerRegistry,
    transport: T,
    self_addr: SocketAddrV4,
    peer_seen: Notify,
}

impl<T: AnnounceTransport> Discovery<T> {
    pub fn new(registry: PeerRegistry, transport: T, self_addr: SocketAddrV4) -> Self {
        Self {
            registry,
            transport,
            self_addr,
            peer_seen: Notify::new(),
        }
    }

    /// The registry this discovery instance feeds.
    pub fn registry(&self) -> &PeerRegistry {
        &self.registry
    }

    /// Asks the group who is out there. Answers arrive on the listen loop.
    pub async fn probe(&self) {
        tracing::debug!("probing the discovery group");
        if let Err(e) = self.transport.send(DiscoveryMessage::Discover).await {
            tracing::warn!(error = %e, "discovery probe failed");
        }
    }

    /// Announces this host on a fixed interval, the first time immediately.
    /// Runs forever; cancel by dropping the task handle.
    pub async fn announce_loop(&self, every: Duration) {
        let mut interval = tokio::time::interval(every);
        loop {
            interval.tick().await;
            let message = DiscoveryMessage::Announce {
                addr: self.self_addr,
            };
            if let Err(e) = self.transport.send(message).await {
                tracing::warn!(error = %e, "announcement failed");
            }
        }
    }

    /// Receives group datagrams and feeds them through the protocol.
    /// Runs forever; cancel by dropping the task handle.
    pub async fn listen(&self, socket: UdpSocket) {
        match socket.local_addr() {
            Ok(addr) => tracing::info!(%addr, "listening for discovery datagrams"),
            Err(e) => tracing::warn!(error = %e, "listening for discovery datagrams"),
        }
        let mut buf = vec![0u8; 1024];
        loop {
            let (len, sender) = match socket.recv_from(&mut buf).await {
                Ok(received) => received,
                Err(e) => {
                    tracing::warn!(error = %e, "discovery receive failed");
                    continue;
                }
            };
            let Ok(payload) = std::str::from_utf8(&buf[..len]) else {
                tracing::trace!(%sender, "ignoring non-text datagram");
                continue;
            };
            self.handle_datagram(payload, sender).await;
        }
    }

    /// One step of the protocol. Split from the receive loop so it can be
    /// driven directly in tests.
    pub async fn handle_datagram(&self, payload: &str, sender: SocketAddr) {
        match DiscoveryMessage::parse(payload) {
            Some(DiscoveryMessage::Discover) => {
                tracing::debug!(%sender, "answering discovery probe");
                let answer = DiscoveryMessage::Announce {
                    addr: self.self_addr,
                };
                if let Err(e) = self.transport.send(answer).await {
                    tracing::warn!(error = %e, "failed to answer discovery probe");
                }
            }
            Some(DiscoveryMessage::Announce { addr }) => {
                if self.registry.insert(addr) {
                    self.peer_seen.notify_one();
                }
            }
            None => tracing::trace!(%sender, "ignoring unrecognized datagram"),
        }
    }

    /// Waits until at least one peer has announced itself, or until the
    /// window elapses. The notify permit is stored, so an announcement
    /// that landed before this call still counts.
    pub async fn settled(&self, window: Duration) {
        let _ = tokio::time::timeout(window, self.peer_seen.notified()).await;
    }
}

// ── Tests ──────────────────────────────────────────────────────────────
