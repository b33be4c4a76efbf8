//! Transport layer for the bridge.
//!
//! HTTP via axum is the only front door; it delegates to `BridgeService`.

pub mod http;

pub use http::{ServerConfig, serve, serve_listener};
