//! paclan-services — shared daemon state: the peer registry and the package cache.

pub mod cache;
pub mod registry;

pub use cache::PackageCache;
pub use registry::PeerRegistry;
