//! In-memory stand-in for the child process, used by unit tests.

use std::collections::HashSet;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio_util::bytes::Bytes;

use crate::bridge::protocol::{JsonRpcMessage, RequestId};
use crate::dispatcher::ChildTransport;
use crate::health::ProcessState;
use crate::state::BridgeState;
use crate::supervisor::SupervisorError;

type Responder = dyn Fn(&JsonRpcMessage) -> Option<JsonRpcMessage> + Send + Sync;

/// Fake child: records every frame and answers requests through `responder`.
///
/// Responses are routed into the shared correlation table exactly like the
/// supervisor's reader task would, optionally after a delay.
pub(crate) struct FakeChild {
    bridge: Arc<BridgeState>,
    responder: Box<Responder>,
    ignored: HashSet<String>,
    stalled: HashSet<String>,
    delay: Duration,
    state: StdMutex<ProcessState>,
    frames: StdMutex<Vec<Bytes>>,
    shutdowns: StdMutex<usize>,
}

impl FakeChild {
    pub(crate) fn new<F>(responder: F) -> Self
    where
        F: Fn(&JsonRpcMessage) -> Option<JsonRpcMessage> + Send + Sync + 'static,
    {
        Self {
            bridge: Arc::new(BridgeState::new()),
            responder: Box::new(responder),
            ignored: HashSet::new(),
            stalled: HashSet::new(),
            delay: Duration::ZERO,
            state: StdMutex::new(ProcessState::Running),
            frames: StdMutex::new(Vec::new()),
            shutdowns: StdMutex::new(0),
        }
    }

    /// Answers every request with `{"echo": params}`.
    pub(crate) fn echo() -> Self {
        Self::new(|msg| {
            let params = msg.params.clone().unwrap_or(serde_json::Value::Null);
            Some(JsonRpcMessage::response(msg.id?, json!({ "echo": params })))
        })
    }

    /// Never answer requests for `method`.
    pub(crate) fn ignoring(mut self, method: &str) -> Self {
        self.ignored.insert(method.to_string());
        self
    }

    /// Writes of `method` never complete, like a child that stopped reading stdin.
    pub(crate) fn stalling(mut self, method: &str) -> Self {
        self.stalled.insert(method.to_string());
        self
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub(crate) fn with_state(self, state: ProcessState) -> Self {
        self.set_state(state);
        self
    }

    pub(crate) fn set_state(&self, state: ProcessState) {
        *self.state.lock().unwrap() = state;
    }

    pub(crate) fn bridge(&self) -> Arc<BridgeState> {
        Arc::clone(&self.bridge)
    }

    pub(crate) fn written(&self) -> Vec<JsonRpcMessage> {
        self.frames
            .lock()
            .unwrap()
            .iter()
            .map(|f| serde_json::from_slice(f).unwrap())
            .collect()
    }

    pub(crate) fn written_ids(&self) -> Vec<RequestId> {
        self.written().iter().filter_map(|m| m.id).collect()
    }

    /// Every frame was exactly one newline-terminated line.
    pub(crate) fn frames_were_single_lines(&self) -> bool {
        self.frames
            .lock()
            .unwrap()
            .iter()
            .all(|f| f.ends_with(b"\n") && f.iter().filter(|b| **b == b'\n').count() == 1)
    }

    pub(crate) fn shutdown_count(&self) -> usize {
        *self.shutdowns.lock().unwrap()
    }
}

#[async_trait]
impl ChildTransport for FakeChild {
    async fn write(&self, frame: Bytes) -> Result<(), SupervisorError> {
        if !self.state().is_running() {
            return Err(SupervisorError::NotRunning);
        }
        let message: JsonRpcMessage = serde_json::from_slice(&frame)
            .map_err(|e| SupervisorError::Io(std::io::Error::other(e)))?;
        if message
            .method
            .as_ref()
            .is_some_and(|m| self.stalled.contains(m))
        {
            std::future::pending::<()>().await;
        }
        self.frames.lock().unwrap().push(frame);

        let ignored = message
            .method
            .as_ref()
            .is_some_and(|m| self.ignored.contains(m));
        if message.id.is_none() || ignored {
            return Ok(());
        }

        if let Some(response) = (self.responder)(&message)
            && let Some(id) = response.id
        {
            let bridge = Arc::clone(&self.bridge);
            let delay = self.delay;
            tokio::spawn(async move {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                bridge.pending().complete(id, response);
            });
        }
        Ok(())
    }

    fn state(&self) -> ProcessState {
        *self.state.lock().unwrap()
    }

    async fn shutdown(&self) {
        *self.shutdowns.lock().unwrap() += 1;
        self.set_state(ProcessState::Stopped);
        self.bridge.pending().drain_all("bridge shutting down");
    }
}
