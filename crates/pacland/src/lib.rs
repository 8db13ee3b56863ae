//! pacland — the paclan daemon.
//!
//! The binary entry point lives in `main.rs`; the modules here are the
//! daemon's moving parts, exposed as a library so the integration tests
//! can drive them directly.

pub mod discovery;
pub mod mirrorlist;
pub mod net;
