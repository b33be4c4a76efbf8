//! BridgeService: transport-agnostic front of the bridge.
//!
//! This service owns:
//! - The readiness gate (handshake done and child running)
//! - Tool listing, tool calls and raw JSON-RPC forwarding via the dispatcher
//! - Health snapshots
//! - Shutdown coordination (bidirectional)
//!
//! Transports (HTTP today) delegate to this service.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::{Value, json};
use tokio::sync::watch;

use crate::bridge::protocol::{JsonRpcMessage, METHOD_TOOLS_CALL, METHOD_TOOLS_LIST};
use crate::config::BridgeConfig;
use crate::dispatcher::{ChildTransport, DispatchError, Dispatcher};
use crate::handshake::HandshakeSequencer;
use crate::health::{ChildInfo, ProcessState};
use crate::normalize::NormalizedResult;
use crate::state::BridgeState;
use crate::supervisor::ProcessSupervisor;
use crate::version::VersionInfo;

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("MCP server not initialized")]
    NotReady,
    #[error("{0}")]
    InvalidInput(String),
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

/// Snapshot of bridge health for transports to serve.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthSnapshot {
    /// Always "ok": the bridge answers even when the child is down.
    pub status: &'static str,
    pub mcp_initialized: bool,
    pub mcp_running: bool,
    pub process: ProcessState,
    pub pending_requests: usize,
    pub queued_requests: usize,
    pub restarts: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub child: Option<ChildInfo>,
    pub version: VersionInfo,
}

/// Tool call arguments: an object, or a string holding a JSON object. Absent means `{}`.
pub fn tool_arguments(arguments: Option<Value>) -> Result<Value, BridgeError> {
    let arguments = match arguments {
        None | Some(Value::Null) => return Ok(json!({})),
        Some(Value::String(raw)) => serde_json::from_str(&raw).map_err(|e| {
            BridgeError::InvalidInput(format!("arguments is not valid JSON: {}", e))
        })?,
        Some(other) => other,
    };
    if !arguments.is_object() {
        return Err(BridgeError::InvalidInput(
            "arguments must be a JSON object".to_string(),
        ));
    }
    Ok(arguments)
}

pub struct BridgeService {
    state: Arc<BridgeState>,
    dispatcher: Arc<Dispatcher>,
    transport: Arc<dyn ChildTransport>,
    call_timeout: Duration,

    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,

    version: VersionInfo,
}

impl BridgeService {
    pub fn new(
        state: Arc<BridgeState>,
        dispatcher: Arc<Dispatcher>,
        transport: Arc<dyn ChildTransport>,
        call_timeout: Duration,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            state,
            dispatcher,
            transport,
            call_timeout,
            shutdown_tx,
            shutdown_rx,
            version: VersionInfo::new(),
        }
    }

    /// Wire up state, supervisor, dispatcher and handshake, and start the child.
    pub fn spawn(config: &BridgeConfig) -> Arc<Self> {
        let state = Arc::new(BridgeState::new());
        let supervisor = ProcessSupervisor::new(config.supervisor_config(), Arc::clone(&state));
        let dispatcher = Dispatcher::spawn(
            Arc::clone(&state),
            Arc::clone(&supervisor) as Arc<dyn ChildTransport>,
            config.normalizer(),
        );
        let handshake = HandshakeSequencer::new(
            Arc::clone(&dispatcher),
            Arc::clone(&state),
            config.handshake_config(),
        );

        tracing::info!(
            program = %config.server_path.display(),
            args = ?config.server_args,
            "Starting MCP process supervisor"
        );
        supervisor.start(Arc::new(handshake));

        Arc::new(
            Self::new(state, dispatcher, supervisor, config.call_timeout)
                .with_version(VersionInfo::new().with_protocol(config.protocol_version.clone())),
        )
    }

    pub fn with_version(mut self, version: VersionInfo) -> Self {
        self.version = version;
        self
    }

    /// Handshake completed and the child is alive.
    pub fn is_ready(&self) -> bool {
        self.state.is_initialized() && self.transport.state().is_running()
    }

    pub fn health(&self) -> HealthSnapshot {
        let process = self.transport.state();
        HealthSnapshot {
            status: "ok",
            mcp_initialized: self.state.is_initialized(),
            mcp_running: process.is_running(),
            process,
            pending_requests: self.state.pending().len(),
            queued_requests: self.dispatcher.queue_depth(),
            restarts: self.transport.restarts(),
            child: self.transport.child_info(),
            version: self.version.clone(),
        }
    }

    /// Raw `tools/list` response.
    pub async fn list_tools(&self) -> Result<Value, BridgeError> {
        self.ensure_ready()?;
        let response = self
            .dispatcher
            .call(
                JsonRpcMessage::request(METHOD_TOOLS_LIST, json!({})),
                self.call_timeout,
            )
            .await?;
        raw(&response)
    }

    /// Invoke a tool and normalize its response.
    ///
    /// Remote errors and keyword-flagged text come back as `Ok` with
    /// `success: false`; only dispatch failures are `Err`.
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: Value,
    ) -> Result<NormalizedResult, BridgeError> {
        self.ensure_ready()?;
        tracing::debug!(tool = name, "Calling tool");
        let response = self
            .dispatcher
            .call(
                JsonRpcMessage::request(
                    METHOD_TOOLS_CALL,
                    json!({ "name": name, "arguments": arguments }),
                ),
                self.call_timeout,
            )
            .await?;
        let result = self.dispatcher.normalizer().normalize(Some(&response));
        if !result.success {
            tracing::info!(
                tool = name,
                error = result.error_message.as_deref().unwrap_or(""),
                "Tool call reported failure"
            );
        }
        Ok(result)
    }

    /// Forward a caller's JSON-RPC message.
    ///
    /// The caller's id (string or number) never reaches the child: the
    /// request goes out under a fresh bridge id and the child's response comes
    /// back carrying the caller's id again. Notifications are written and
    /// yield `None`.
    pub async fn forward(&self, mut request: Value) -> Result<Option<Value>, BridgeError> {
        let Some(members) = request.as_object_mut() else {
            return Err(BridgeError::InvalidInput(
                "JSON-RPC message must be an object".to_string(),
            ));
        };
        let caller_id = match members.remove("id") {
            None | Some(Value::Null) => None,
            Some(id @ (Value::String(_) | Value::Number(_))) => Some(id),
            Some(_) => {
                return Err(BridgeError::InvalidInput(
                    "JSON-RPC id must be a string or a number".to_string(),
                ));
            }
        };
        let message: JsonRpcMessage = serde_json::from_value(request).map_err(|e| {
            BridgeError::InvalidInput(format!("request body is not a JSON-RPC message: {}", e))
        })?;
        if message.method.is_none() {
            return Err(BridgeError::InvalidInput(
                "JSON-RPC message must have a method".to_string(),
            ));
        }
        self.ensure_ready()?;

        let Some(caller_id) = caller_id else {
            self.dispatcher.notify(message).await?;
            return Ok(None);
        };
        let response = self.dispatcher.call(message, self.call_timeout).await?;
        let mut response = raw(&response)?;
        if let Some(members) = response.as_object_mut() {
            members.insert("id".to_string(), caller_id);
        }
        Ok(Some(response))
    }

    /// Stop the child. Pending and later calls fail.
    pub async fn shutdown(&self) {
        self.transport.shutdown().await;
    }

    pub fn trigger_shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    pub fn shutdown_rx(&self) -> watch::Receiver<bool> {
        self.shutdown_rx.clone()
    }

    fn ensure_ready(&self) -> Result<(), BridgeError> {
        if self.is_ready() {
            Ok(())
        } else {
            Err(BridgeError::NotReady)
        }
    }
}

fn raw(message: &JsonRpcMessage) -> Result<Value, BridgeError> {
    message
        .to_value()
        .map_err(|e| BridgeError::Dispatch(DispatchError::Encode(e.into())))
}
