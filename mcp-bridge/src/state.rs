//! Process-wide bridge context shared by the supervisor, dispatcher and handshake.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::bridge::protocol::RequestId;
use crate::correlation::CorrelationTable;

/// Ids wrap below this bound (largest integer a JavaScript child can hold exactly).
pub const MAX_REQUEST_ID: RequestId = (1 << 53) - 1;

/// Shared mutable state of one bridge instance.
///
/// Constructed once at startup and handed around by `Arc`. The child handle
/// itself lives in the supervisor; the dispatch queue lives in the dispatcher.
pub struct BridgeState {
    initialized: AtomicBool,
    next_id: AtomicU64,
    pending: CorrelationTable,
}

impl Default for BridgeState {
    fn default() -> Self {
        Self::new()
    }
}

impl BridgeState {
    pub fn new() -> Self {
        Self {
            initialized: AtomicBool::new(false),
            next_id: AtomicU64::new(1),
            pending: CorrelationTable::new(),
        }
    }

    /// True once the handshake has completed against the current child.
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// Returns the previous value.
    pub fn set_initialized(&self, initialized: bool) -> bool {
        self.initialized.swap(initialized, Ordering::AcqRel)
    }

    pub fn pending(&self) -> &CorrelationTable {
        &self.pending
    }

    /// Next free request id. Skips ids that are still outstanding.
    pub fn next_id(&self) -> RequestId {
        loop {
            let id = self
                .next_id
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                    Some(if current >= MAX_REQUEST_ID {
                        1
                    } else {
                        current + 1
                    })
                })
                .unwrap_or(1);
            if !self.pending.contains(id) {
                return id;
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn with_next_id(self, id: RequestId) -> Self {
        self.next_id.store(id, Ordering::Release);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn ids_are_monotonic() {
        let state = BridgeState::new();
        assert_eq!(state.next_id(), 1);
        assert_eq!(state.next_id(), 2);
        assert_eq!(state.next_id(), 3);
    }

    #[test]
    fn ids_wrap_below_bound() {
        let state = BridgeState::new().with_next_id(MAX_REQUEST_ID);
        assert_eq!(state.next_id(), MAX_REQUEST_ID);
        assert_eq!(state.next_id(), 1);
    }

    #[test]
    fn outstanding_ids_are_skipped() {
        let state = BridgeState::new();
        let _held = state.pending().register(1, Duration::from_secs(5)).unwrap();
        assert_eq!(state.next_id(), 2);
    }

    #[test]
    fn initialized_flag() {
        let state = BridgeState::new();
        assert!(!state.is_initialized());
        assert!(!state.set_initialized(true));
        assert!(state.is_initialized());
        assert!(state.set_initialized(false));
    }
}
