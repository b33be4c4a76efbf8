//! initialize / notifications/initialized exchange run against each new child.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::bridge::protocol::{
    ClientInfo, InitializeParams, JsonRpcMessage, METHOD_INITIALIZE, METHOD_INITIALIZED,
};
use crate::dispatcher::{DispatchError, Dispatcher};
use crate::state::BridgeState;
use crate::version::BRIDGE_VERSION;

pub const DEFAULT_PROTOCOL_VERSION: &str = "2024-11-05";

#[derive(Debug, Clone)]
pub struct HandshakeConfig {
    pub protocol_version: String,
    pub client_info: ClientInfo,
    pub capabilities: Value,
    pub timeout: Duration,
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self {
            protocol_version: DEFAULT_PROTOCOL_VERSION.to_string(),
            client_info: ClientInfo {
                name: "mcp-bridge".to_string(),
                version: BRIDGE_VERSION.to_string(),
            },
            capabilities: serde_json::json!({}),
            timeout: Duration::from_secs(20),
        }
    }
}

impl HandshakeConfig {
    pub fn with_protocol_version(mut self, version: impl Into<String>) -> Self {
        self.protocol_version = version.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[derive(Debug, thiserror::Error)]
pub enum HandshakeError {
    #[error("initialize failed: {0}")]
    Dispatch(#[from] DispatchError),
    #[error("initialize rejected by MCP process: {0}")]
    Rejected(String),
    #[error("failed to encode initialize params: {0}")]
    Encode(#[from] serde_json::Error),
}

pub struct HandshakeSequencer {
    dispatcher: Arc<Dispatcher>,
    bridge: Arc<BridgeState>,
    config: HandshakeConfig,
}

impl HandshakeSequencer {
    pub fn new(dispatcher: Arc<Dispatcher>, bridge: Arc<BridgeState>, config: HandshakeConfig) -> Self {
        Self {
            dispatcher,
            bridge,
            config,
        }
    }

    /// Run the handshake. Marks the bridge initialized on success.
    ///
    /// Goes straight to the dispatcher: the readiness gate only applies to
    /// application requests.
    pub async fn run(&self) -> Result<JsonRpcMessage, HandshakeError> {
        let params = serde_json::to_value(InitializeParams {
            protocol_version: self.config.protocol_version.clone(),
            capabilities: self.config.capabilities.clone(),
            client_info: self.config.client_info.clone(),
        })?;

        tracing::debug!(protocol_version = %self.config.protocol_version, "Sending initialize");
        let response = self
            .dispatcher
            .call(
                JsonRpcMessage::request(METHOD_INITIALIZE, params),
                self.config.timeout,
            )
            .await?;

        if let Some(ref error) = response.error {
            return Err(HandshakeError::Rejected(
                error
                    .message
                    .clone()
                    .unwrap_or_else(|| format!("error code {}", error.code)),
            ));
        }

        if let Some(ref result) = response.result {
            let server_info = result.get("serverInfo").cloned().unwrap_or_default();
            let protocol_version = result.get("protocolVersion").cloned().unwrap_or_default();
            tracing::info!(
                %server_info,
                %protocol_version,
                "MCP initialize succeeded"
            );
        }

        self.dispatcher
            .notify(JsonRpcMessage::notification(METHOD_INITIALIZED, None))
            .await?;
        self.bridge.set_initialized(true);
        tracing::info!("MCP bridge ready");

        Ok(response)
    }
}
