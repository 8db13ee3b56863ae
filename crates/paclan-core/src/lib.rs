//! paclan-core — wire format and configuration shared by every paclan crate.

pub mod config;
pub mod protocol;

pub use protocol::DiscoveryMessage;
