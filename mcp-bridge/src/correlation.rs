//! Correlation table: outstanding request id -> pending completion slot.
//!
//! Every entry is resolved exactly once, by whichever comes first:
//! a matching response, its deadline, or a drain (child exit / shutdown).
//! Resolution removes the entry, so later resolutions for the same id are no-ops.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::oneshot;

use crate::bridge::protocol::{JsonRpcMessage, RequestId};

/// Why a pending call did not get a response.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CallError {
    #[error("request {id} timed out after {}ms", .after.as_millis())]
    Timeout { id: RequestId, after: Duration },
    #[error("{0}")]
    Drained(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CorrelationError {
    #[error("request id {0} is already outstanding")]
    Duplicate(RequestId),
}

pub type CallResult = Result<JsonRpcMessage, CallError>;

struct PendingRequest {
    created_at: Instant,
    deadline: Duration,
    completion: oneshot::Sender<CallResult>,
}

/// Outstanding requests keyed by id.
#[derive(Default)]
pub struct CorrelationTable {
    pending: DashMap<RequestId, PendingRequest>,
}

impl CorrelationTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `id` and return the handle its caller awaits.
    pub fn register(
        &self,
        id: RequestId,
        deadline: Duration,
    ) -> Result<Completion<'_>, CorrelationError> {
        match self.pending.entry(id) {
            Entry::Occupied(_) => Err(CorrelationError::Duplicate(id)),
            Entry::Vacant(slot) => {
                let (tx, rx) = oneshot::channel();
                slot.insert(PendingRequest {
                    created_at: Instant::now(),
                    deadline,
                    completion: tx,
                });
                Ok(Completion {
                    id,
                    deadline,
                    expires_at: tokio::time::Instant::now() + deadline,
                    rx,
                    table: self,
                })
            }
        }
    }

    /// Resolve `id` with a response. Returns false if nothing was waiting.
    pub fn complete(&self, id: RequestId, message: JsonRpcMessage) -> bool {
        match self.pending.remove(&id) {
            Some((_, pending)) => {
                tracing::trace!(
                    id,
                    elapsed_ms = pending.created_at.elapsed().as_millis() as u64,
                    "Response correlated"
                );
                let _ = pending.completion.send(Ok(message));
                true
            }
            None => false,
        }
    }

    /// Resolve `id` with a timeout failure, unless something got there first.
    pub fn expire(&self, id: RequestId) -> bool {
        match self.pending.remove(&id) {
            Some((_, pending)) => {
                tracing::warn!(
                    id,
                    deadline_ms = pending.deadline.as_millis() as u64,
                    "Request timed out waiting for child"
                );
                let _ = pending.completion.send(Err(CallError::Timeout {
                    id,
                    after: pending.deadline,
                }));
                true
            }
            None => false,
        }
    }

    /// Drop `id` without resolving it. The waiter sees a closed channel.
    pub fn cancel(&self, id: RequestId) -> bool {
        self.pending.remove(&id).is_some()
    }

    /// Fail every outstanding request with `reason` and clear the table.
    pub fn drain_all(&self, reason: &str) -> usize {
        let ids: Vec<RequestId> = self.pending.iter().map(|e| *e.key()).collect();
        let mut drained = 0;
        for id in ids {
            if let Some((_, pending)) = self.pending.remove(&id) {
                let _ = pending
                    .completion
                    .send(Err(CallError::Drained(reason.to_string())));
                drained += 1;
            }
        }
        if drained > 0 {
            tracing::warn!(drained, %reason, "Failed all outstanding requests");
        }
        drained
    }

    pub fn contains(&self, id: RequestId) -> bool {
        self.pending.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

/// Awaitable side of a registered request.
pub struct Completion<'a> {
    id: RequestId,
    deadline: Duration,
    expires_at: tokio::time::Instant,
    rx: oneshot::Receiver<CallResult>,
    table: &'a CorrelationTable,
}

impl Completion<'_> {
    pub fn id(&self) -> RequestId {
        self.id
    }

    /// Registration time plus the deadline.
    pub fn expires_at(&self) -> tokio::time::Instant {
        self.expires_at
    }

    /// Wait for the response, or fail once the deadline passes.
    ///
    /// The deadline counts from registration, so time spent before waiting is
    /// already used up.
    pub async fn wait(mut self) -> CallResult {
        match tokio::time::timeout_at(self.expires_at, &mut self.rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(CallError::Drained("request cancelled".to_string())),
            Err(_) => {
                // A response may have been routed between the timer firing and here.
                self.table.expire(self.id);
                match self.rx.await {
                    Ok(result) => result,
                    Err(_) => Err(CallError::Timeout {
                        id: self.id,
                        after: self.deadline,
                    }),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn response(id: RequestId, value: serde_json::Value) -> JsonRpcMessage {
        JsonRpcMessage::response(id, value)
    }

    #[tokio::test]
    async fn out_of_order_responses_reach_their_callers() {
        let table = CorrelationTable::new();
        let a = table.register(1, Duration::from_secs(5)).unwrap();
        let b = table.register(2, Duration::from_secs(5)).unwrap();
        let c = table.register(3, Duration::from_secs(5)).unwrap();

        assert!(table.complete(3, response(3, json!("c"))));
        assert!(table.complete(1, response(1, json!("a"))));
        assert!(table.complete(2, response(2, json!("b"))));

        assert_eq!(a.wait().await.unwrap().result, Some(json!("a")));
        assert_eq!(b.wait().await.unwrap().result, Some(json!("b")));
        assert_eq!(c.wait().await.unwrap().result, Some(json!("c")));
        assert!(table.is_empty());
    }

    #[test]
    fn duplicate_registration_rejected() {
        let table = CorrelationTable::new();
        let _first = table.register(5, Duration::from_secs(1)).unwrap();
        assert!(matches!(
            table.register(5, Duration::from_secs(1)),
            Err(CorrelationError::Duplicate(5))
        ));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn complete_unknown_id_is_noop() {
        let table = CorrelationTable::new();
        assert!(!table.complete(42, response(42, json!({}))));
    }

    #[tokio::test]
    async fn first_resolution_wins() {
        let table = CorrelationTable::new();
        let pending = table.register(1, Duration::from_secs(5)).unwrap();

        assert!(table.complete(1, response(1, json!("first"))));
        assert!(!table.complete(1, response(1, json!("second"))));
        assert!(!table.expire(1));

        assert_eq!(pending.wait().await.unwrap().result, Some(json!("first")));
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_fires_at_deadline_and_spares_others() {
        let table = CorrelationTable::new();
        let slow = table.register(1, Duration::from_millis(500)).unwrap();
        let other = table.register(2, Duration::from_secs(10)).unwrap();

        let started = tokio::time::Instant::now();
        let err = slow.wait().await.unwrap_err();
        assert_eq!(
            err,
            CallError::Timeout {
                id: 1,
                after: Duration::from_millis(500)
            }
        );
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(500));
        assert!(elapsed < Duration::from_millis(510));

        assert!(table.contains(2));
        assert!(table.complete(2, response(2, json!("ok"))));
        assert_eq!(other.wait().await.unwrap().result, Some(json!("ok")));
    }

    #[tokio::test(start_paused = true)]
    async fn late_response_after_timeout_is_discarded() {
        let table = CorrelationTable::new();
        let pending = table.register(9, Duration::from_millis(100)).unwrap();
        assert!(pending.wait().await.is_err());
        assert!(!table.complete(9, response(9, json!({}))));
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_counts_from_registration() {
        let table = CorrelationTable::new();
        let pending = table.register(6, Duration::from_millis(300)).unwrap();
        let started = tokio::time::Instant::now();

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(matches!(
            pending.wait().await,
            Err(CallError::Timeout { id: 6, .. })
        ));
        assert_eq!(started.elapsed(), Duration::from_millis(300));
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn drain_all_fails_everything() {
        let table = CorrelationTable::new();
        let waiters: Vec<_> = (1..=4)
            .map(|id| table.register(id, Duration::from_secs(30)).unwrap())
            .collect();

        assert_eq!(table.drain_all("process exited"), 4);
        assert!(table.is_empty());

        for waiter in waiters {
            assert_eq!(
                waiter.wait().await.unwrap_err(),
                CallError::Drained("process exited".to_string())
            );
        }
    }

    #[tokio::test]
    async fn cancel_removes_without_response() {
        let table = CorrelationTable::new();
        let pending = table.register(3, Duration::from_secs(5)).unwrap();
        assert!(table.cancel(3));
        assert!(!table.contains(3));
        assert!(matches!(pending.wait().await, Err(CallError::Drained(_))));
    }

    #[test]
    fn call_error_display() {
        let err = CallError::Timeout {
            id: 4,
            after: Duration::from_millis(1500),
        };
        assert_eq!(err.to_string(), "request 4 timed out after 1500ms");
        assert_eq!(
            CallError::Drained("process exited".into()).to_string(),
            "process exited"
        );
    }
}
