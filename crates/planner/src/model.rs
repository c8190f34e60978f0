use serde::{Deserialize, Serialize};

use toolmesh_core_types::{CallId, ToolCall};

/// How the calls inside one phase are dispatched.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PhaseMode {
    Parallel,
    Serial,
}

/// One scheduling unit of a plan. Either every call runs concurrently
/// (parallel) or exactly one call runs (serial).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExecutionPhase {
    pub id: usize,
    pub calls: Vec<ToolCall>,
    pub mode: PhaseMode,
    pub requires_confirmation: bool,
    /// Ids of earlier phases this phase's calls declared dependencies on.
    pub upstream: Vec<usize>,
    /// Advisory only: max of member estimates for parallel, sum for serial.
    pub estimated_duration_ms: u64,
}

/// Ordered phases produced by the planner. Each submitted call appears in
/// exactly one phase, strictly after the phases of all its dependencies.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub phases: Vec<ExecutionPhase>,
    pub estimated_total_duration_ms: u64,
}

impl ExecutionPlan {
    pub fn call_count(&self) -> usize {
        self.phases.iter().map(|phase| phase.calls.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.phases.is_empty()
    }

    pub fn call_ids(&self) -> impl Iterator<Item = &CallId> {
        self.phases
            .iter()
            .flat_map(|phase| phase.calls.iter().map(|call| &call.call_id))
    }
}
