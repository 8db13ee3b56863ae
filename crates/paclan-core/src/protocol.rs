//! paclan wire format — the discovery datagrams exchanged on the multicast group.
//!
//! The protocol is two short UTF-8 messages: a `Discover` probe asking every
//! cache on the LAN to identify itself, and an `Announce` carrying the socket
//! address of a cache's HTTP surface. The group is shared with whatever else
//! multicasts on the segment, so any payload that is not an exact paclan
//! message is noise and receivers drop it silently.

use std::net::{Ipv4Addr, SocketAddrV4};

// ── Constants ─────────────────────────────────────────────────────────────────

/// IPv4 multicast group for discovery. Administratively scoped (239/8),
/// never routed beyond the local segment.
pub const MULTICAST_GROUP: Ipv4Addr = Ipv4Addr::new(239, 255, 41, 234);

/// UDP port the discovery group uses.
pub const DISCOVERY_PORT: u16 = 41234;

/// Default TCP port for the HTTP cache surface. Announcements carry the
/// actual configured port, so peers never have to guess it.
pub const DEFAULT_HTTP_PORT: u16 = 41234;

/// Default interval between periodic re-announcements in seconds.
/// Nodes that joined the LAN late, or evicted us after a transient failure,
/// relearn us on the next announcement.
pub const ANNOUNCE_INTERVAL_SECS: u64 = 60;

/// Default settle window in seconds: how long the daemon waits at startup
/// for a first peer announcement before serving traffic anyway.
pub const SETTLE_WINDOW_SECS: u64 = 3;

const DISCOVER_LINE: &str = "PACLAN: discover";
const ANNOUNCE_PREFIX: &str = "PACLAN: server: ";

// ── Messages ──────────────────────────────────────────────────────────────────

/// A single discovery datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryMessage {
    /// Probe asking every cache on the group to announce itself.
    Discover,
    /// A cache announcing where its HTTP surface listens.
    Announce { addr: SocketAddrV4 },
}

impl DiscoveryMessage {
    /// Parse a received datagram. Returns `None` for anything that is not an
    /// exact paclan message; callers drop those without raising an error.
    ///
    /// The announce address must be a literal `ip:port`. Hostnames are never
    /// resolved on the discovery path.
    pub fn parse(payload: &str) -> Option<Self> {
        if payload == DISCOVER_LINE {
            return Some(Self::Discover);
        }
        let addr = payload.strip_prefix(ANNOUNCE_PREFIX)?;
        addr.parse().ok().map(|addr| Self::Announce { addr })
    }

    /// The exact datagram text for this message.
    pub fn encode(&self) -> String {
        match self {
            Self::Discover => DISCOVER_LINE.to_string(),
            Self::Announce { addr } => format!("{ANNOUNCE_PREFIX}{addr}"),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
