//! Child process status types reported by the bridge.

use serde::{Deserialize, Serialize};

/// Lifecycle state of the supervised child.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProcessState {
    /// Not started, or shut down (no auto-restart)
    #[default]
    Stopped,
    /// Spawning the child
    Starting,
    /// Child alive; handshake may still be pending
    Running,
    /// Child died, waiting out the restart backoff
    Exited,
}

impl ProcessState {
    pub fn is_running(&self) -> bool {
        *self == ProcessState::Running
    }
}

/// Identity of the current child process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChildInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    /// Increments on every spawn.
    pub generation: u64,
    /// When the child was spawned (RFC 3339).
    pub started_at: String,
}

impl ChildInfo {
    pub fn new(pid: Option<u32>, generation: u64) -> Self {
        Self {
            pid,
            generation,
            started_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}
