use std::time::Duration;

use serde::{Deserialize, Serialize};

use toolmesh_core_types::{BackendName, CallId, SessionId, ToolContent};
use toolmesh_planner::ExecutionPlan;

/// Per-call state machine. `Pending → WaitingConfirmation → Running →
/// {Completed | Failed}`; a retriable failure loops `Running → Pending`
/// until the retry budget runs out.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallState {
    Pending,
    WaitingConfirmation,
    Running,
    Completed,
    Failed,
}

impl CallState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Live status of one call within a session.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CallStatus {
    pub call_id: CallId,
    pub tool: String,
    pub state: CallState,
    pub attempts: u32,
    #[serde(default)]
    pub backend: Option<BackendName>,
    #[serde(default)]
    pub result: Option<ToolContent>,
    #[serde(default)]
    pub error: Option<String>,
}

impl CallStatus {
    pub(crate) fn pending(call_id: CallId, tool: String) -> Self {
        Self {
            call_id,
            tool,
            state: CallState::Pending,
            attempts: 0,
            backend: None,
            result: None,
            error: None,
        }
    }
}

/// Aggregate counters recomputed from call statuses on every read, so
/// repeated reads without intervening transitions are identical.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct ProgressSummary {
    pub total: usize,
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub waiting_confirmation: usize,
}

impl ProgressSummary {
    pub fn is_terminal(&self) -> bool {
        self.pending == 0 && self.running == 0 && self.waiting_confirmation == 0
    }
}

/// Everything a caller can learn about a session in one read.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionStatus {
    pub session: SessionId,
    pub plan: ExecutionPlan,
    pub calls: Vec<CallStatus>,
    pub progress: ProgressSummary,
}

/// Engine-wide execution policy.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Retries per call on retriable errors, on top of the first attempt.
    pub max_retries: u32,
    /// Linear backoff unit: the n-th retry waits `n * base_delay`.
    pub retry_base_delay_ms: u64,
    /// Confirmation wait budget. `None` waits indefinitely.
    pub confirmation_timeout_ms: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            retry_base_delay_ms: 500,
            confirmation_timeout_ms: Some(120_000),
        }
    }
}

impl EngineConfig {
    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }
}
