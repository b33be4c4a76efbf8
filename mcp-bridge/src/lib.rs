//! mcp-bridge: HTTP front door for a single stdio JSON-RPC (MCP) server process.

mod health;
mod state;
mod version;

pub mod bridge;
pub mod config;
pub mod correlation;
pub mod dispatcher;
pub mod handshake;
pub mod normalize;
pub mod service;
pub mod supervisor;
pub mod transport;

#[cfg(test)]
mod test_support;

pub use bridge::protocol::{JsonRpcError, JsonRpcMessage, RequestId};
pub use config::{BridgeConfig, ConfigError};
pub use correlation::{CallError, CorrelationTable};
pub use dispatcher::{ChildTransport, DispatchError, Dispatcher};
pub use handshake::{HandshakeConfig, HandshakeError, HandshakeSequencer};
pub use health::{ChildInfo, ProcessState};
pub use normalize::{NormalizedResult, Normalizer};
pub use service::{BridgeError, BridgeService, HealthSnapshot};
pub use state::BridgeState;
pub use supervisor::{ChildCommand, ProcessSupervisor, SupervisorConfig, SupervisorError};
pub use version::{BRIDGE_VERSION, VersionInfo};
