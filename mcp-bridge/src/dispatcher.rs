//! Serialized dispatcher: at most one request in flight against the child.
//!
//! Callers enqueue onto a single FIFO; one worker task drains it. Each job is
//! registered, written, and awaited (response, timeout or drain) before the
//! next job is looked at. A failing job never stalls the jobs behind it.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tokio_util::bytes::{Bytes, BytesMut};
use tokio_util::codec::Encoder;

use crate::bridge::codec::JsonLineCodec;
use crate::bridge::protocol::{JsonRpcMessage, MessageKind};
use crate::correlation::{CallError, CorrelationError};
use crate::health::{ChildInfo, ProcessState};
use crate::normalize::{NormalizedResult, Normalizer};
use crate::state::BridgeState;
use crate::supervisor::SupervisorError;

/// Write side of the child, as seen by the dispatcher.
///
/// Implemented by [`crate::supervisor::ProcessSupervisor`]; tests substitute
/// an in-memory child.
#[async_trait]
pub trait ChildTransport: Send + Sync {
    /// Write one complete frame to the child's stdin.
    async fn write(&self, frame: Bytes) -> Result<(), SupervisorError>;

    fn state(&self) -> ProcessState;

    /// Restarts since startup.
    fn restarts(&self) -> u64 {
        0
    }

    fn child_info(&self) -> Option<ChildInfo> {
        None
    }

    /// Stop the child for good.
    async fn shutdown(&self);
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error(transparent)]
    Transport(#[from] SupervisorError),
    #[error(transparent)]
    Call(#[from] CallError),
    #[error(transparent)]
    Correlation(#[from] CorrelationError),
    #[error("failed to encode message: {0}")]
    Encode(std::io::Error),
    #[error("message has no method")]
    MissingMethod,
    #[error("dispatcher is shut down")]
    QueueClosed,
    #[error("child did not accept notification within {}ms", .0.as_millis())]
    WriteStalled(Duration),
}

/// Upper bound on writing a notification to the child.
const NOTIFY_WRITE_TIMEOUT: Duration = Duration::from_secs(5);

enum JobKind {
    Call {
        timeout: Duration,
        reply: oneshot::Sender<Result<JsonRpcMessage, DispatchError>>,
    },
    Notify {
        reply: oneshot::Sender<Result<(), DispatchError>>,
    },
}

struct Job {
    message: JsonRpcMessage,
    kind: JobKind,
}

pub struct Dispatcher {
    queue: mpsc::UnboundedSender<Job>,
    depth: Arc<AtomicUsize>,
    normalizer: Normalizer,
}

impl Dispatcher {
    /// Create the dispatcher and start its worker task.
    pub fn spawn(
        state: Arc<BridgeState>,
        transport: Arc<dyn ChildTransport>,
        normalizer: Normalizer,
    ) -> Arc<Self> {
        let (queue, rx) = mpsc::unbounded_channel();
        let depth = Arc::new(AtomicUsize::new(0));

        tokio::spawn(run_queue(rx, state, transport, Arc::clone(&depth)));

        Arc::new(Self {
            queue,
            depth,
            normalizer,
        })
    }

    /// Jobs waiting plus the one in flight.
    pub fn queue_depth(&self) -> usize {
        self.depth.load(Ordering::Acquire)
    }

    pub fn normalizer(&self) -> &Normalizer {
        &self.normalizer
    }

    /// Send a request and wait for its raw response.
    ///
    /// An id is assigned when the message has none. `timeout` starts counting
    /// when the request's turn comes, not when it is queued, and covers both
    /// the write to the child and the wait for its response.
    pub async fn call(
        &self,
        message: JsonRpcMessage,
        timeout: Duration,
    ) -> Result<JsonRpcMessage, DispatchError> {
        if message.method.is_none() {
            return Err(DispatchError::MissingMethod);
        }
        let (reply, rx) = oneshot::channel();
        self.enqueue(Job {
            message,
            kind: JobKind::Call { timeout, reply },
        })?;
        rx.await.map_err(|_| DispatchError::QueueClosed)?
    }

    /// Send a notification. Resolves once it is written; no response is expected.
    pub async fn notify(&self, message: JsonRpcMessage) -> Result<(), DispatchError> {
        if message.method.is_none() {
            return Err(DispatchError::MissingMethod);
        }
        let (reply, rx) = oneshot::channel();
        self.enqueue(Job {
            message,
            kind: JobKind::Notify { reply },
        })?;
        rx.await.map_err(|_| DispatchError::QueueClosed)?
    }

    /// [`call`](Self::call) followed by normalization. Never fails; errors become failures.
    pub async fn dispatch(&self, message: JsonRpcMessage, timeout: Duration) -> NormalizedResult {
        match self.call(message, timeout).await {
            Ok(response) => self.normalizer.normalize(Some(&response)),
            Err(e) => NormalizedResult::failure(e.to_string()),
        }
    }

    fn enqueue(&self, job: Job) -> Result<(), DispatchError> {
        self.depth.fetch_add(1, Ordering::AcqRel);
        self.queue.send(job).map_err(|_| {
            self.depth.fetch_sub(1, Ordering::AcqRel);
            DispatchError::QueueClosed
        })
    }
}

async fn run_queue(
    mut rx: mpsc::UnboundedReceiver<Job>,
    state: Arc<BridgeState>,
    transport: Arc<dyn ChildTransport>,
    depth: Arc<AtomicUsize>,
) {
    let mut codec = JsonLineCodec::new();

    while let Some(job) = rx.recv().await {
        match job.kind {
            JobKind::Call { timeout, reply } => {
                let result =
                    execute_call(&state, transport.as_ref(), &mut codec, job.message, timeout)
                        .await;
                if let Err(ref e) = result {
                    tracing::debug!(error = %e, "Dispatched call failed");
                }
                let _ = reply.send(result);
            }
            JobKind::Notify { reply } => {
                let result = notify_within(transport.as_ref(), &mut codec, &job.message).await;
                let _ = reply.send(result);
            }
        }
        depth.fetch_sub(1, Ordering::AcqRel);
    }

    tracing::debug!("Dispatch queue closed");
}

async fn execute_call(
    state: &BridgeState,
    transport: &dyn ChildTransport,
    codec: &mut JsonLineCodec,
    mut message: JsonRpcMessage,
    timeout: Duration,
) -> Result<JsonRpcMessage, DispatchError> {
    let id = match message.id {
        Some(id) => id,
        None => {
            let id = state.next_id();
            message.id = Some(id);
            id
        }
    };
    debug_assert_eq!(message.kind(), MessageKind::Request);

    let completion = state.pending().register(id, timeout)?;

    let written =
        tokio::time::timeout_at(completion.expires_at(), write_message(transport, codec, &message))
            .await;
    match written {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            state.pending().cancel(id);
            return Err(e);
        }
        Err(_) => {
            tracing::warn!(id, "Child did not accept request before its deadline");
            state.pending().cancel(id);
            return Err(CallError::Timeout { id, after: timeout }.into());
        }
    }
    tracing::debug!(id, method = message.method.as_deref().unwrap_or(""), "Request sent");

    Ok(completion.wait().await?)
}

/// Notifications have no call deadline; a child that stops reading must still
/// not wedge the queue.
async fn notify_within(
    transport: &dyn ChildTransport,
    codec: &mut JsonLineCodec,
    message: &JsonRpcMessage,
) -> Result<(), DispatchError> {
    tokio::time::timeout(NOTIFY_WRITE_TIMEOUT, write_message(transport, codec, message))
        .await
        .map_err(|_| DispatchError::WriteStalled(NOTIFY_WRITE_TIMEOUT))?
}

async fn write_message(
    transport: &dyn ChildTransport,
    codec: &mut JsonLineCodec,
    message: &JsonRpcMessage,
) -> Result<(), DispatchError> {
    let mut buf = BytesMut::new();
    codec
        .encode(message, &mut buf)
        .map_err(DispatchError::Encode)?;
    transport.write(buf.freeze()).await?;
    Ok(())
}
