//! Peer registry — every LAN cache this node currently believes reachable.
//!
//! Peers are stored as HTTP base URLs ("http://192.168.7.3:41234") and kept
//! sorted, so walks over a snapshot visit peers in a deterministic order.
//! Two invariants are enforced at the insert boundary rather than trusted to
//! callers: a node never registers its own address, and duplicates collapse
//! to a single entry.
//!
//! Insertions come from the discovery listener; evictions come from the
//! proxy when a forward attempt fails at the transport level.

use std::collections::BTreeSet;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Shared, mutex-guarded peer set. Cheap to clone; all clones see one set.
#[derive(Clone)]
pub struct PeerRegistry {
    inner: Arc<Inner>,
}

struct Inner {
    /// Address announcements are matched against for self-suppression.
    /// `None` disables the check (node without a resolvable LAN address).
    local_ip: Option<Ipv4Addr>,
    peers: Mutex<BTreeSet<String>>,
}

impl PeerRegistry {
    pub fn new(local_ip: Option<Ipv4Addr>) -> Self {
        Self {
            inner: Arc::new(Inner {
                local_ip,
                peers: Mutex::new(BTreeSet::new()),
            }),
        }
    }

    /// Register an announced peer. Returns true if the set changed.
    ///
    /// Announcements carrying our own address are dropped on any port; a
    /// node proxying to itself would answer from the same empty cache it
    /// just failed to serve.
    pub fn insert(&self, addr: SocketAddrV4) -> bool {
        if Some(*addr.ip()) == self.inner.local_ip {
            return false;
        }
        let url = format!("http://{addr}");
        let added = self.lock().insert(url.clone());
        if added {
            tracing::info!(peer = %url, "peer added");
        }
        added
    }

    /// Drop a peer after a failed forward. Returns true if it was present.
    pub fn evict(&self, url: &str) -> bool {
        let removed = self.lock().remove(url);
        if removed {
            tracing::info!(peer = %url, "peer evicted");
        }
        removed
    }

    /// All known peers in sorted order. Detached from the live set; the
    /// proxy walks a snapshot while discovery keeps inserting.
    pub fn snapshot(&self) -> Vec<String> {
        self.lock().iter().cloned().collect()
    }

    pub fn contains(&self, url: &str) -> bool {
        self.lock().contains(url)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeSet<String>> {
        // Every mutation is a single set call; poison cannot leave the set
        // inconsistent.
        self.inner
            .peers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
