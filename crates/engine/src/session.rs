use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use toolmesh_core_types::{BackendName, CallId, InteractionId, MeshError, SessionId};
use toolmesh_planner::ExecutionPlan;
use toolmesh_registry::CallOutcome;

use crate::model::{CallState, CallStatus, ProgressSummary, SessionStatus};

/// Session-private runtime state: the plan, per-call statuses, and the
/// cancellation token. Shared between the engine front-end and the one
/// worker task walking the plan; nothing here crosses sessions.
pub struct SessionRuntime {
    id: SessionId,
    plan: ExecutionPlan,
    statuses: RwLock<HashMap<CallId, CallStatus>>,
    /// Plan order, for stable status listings.
    order: Vec<CallId>,
    cancel_token: CancellationToken,
    /// Set when a denied or timed-out confirmation abandons the rest of
    /// the plan. Untouched calls keep state `Pending` but count as failed.
    abandoned: AtomicBool,
    finished: AtomicBool,
    current_interaction: Mutex<Option<InteractionId>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl SessionRuntime {
    pub fn new(id: SessionId, plan: ExecutionPlan) -> Self {
        let mut statuses = HashMap::with_capacity(plan.call_count());
        let mut order = Vec::with_capacity(plan.call_count());
        for phase in &plan.phases {
            for call in &phase.calls {
                order.push(call.call_id.clone());
                statuses.insert(
                    call.call_id.clone(),
                    CallStatus::pending(call.call_id.clone(), call.tool.clone()),
                );
            }
        }
        Self {
            id,
            plan,
            statuses: RwLock::new(statuses),
            order,
            cancel_token: CancellationToken::new(),
            abandoned: AtomicBool::new(false),
            finished: AtomicBool::new(false),
            current_interaction: Mutex::new(None),
            worker: Mutex::new(None),
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn plan(&self) -> &ExecutionPlan {
        &self.plan
    }

    pub fn token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    pub fn abandon(&self) {
        self.abandoned.store(true, Ordering::SeqCst);
    }

    pub fn is_abandoned(&self) -> bool {
        self.abandoned.load(Ordering::SeqCst)
    }

    pub fn finish(&self) {
        self.finished.store(true, Ordering::SeqCst);
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }

    pub fn set_worker(&self, handle: JoinHandle<()>) {
        *self.worker.lock() = Some(handle);
    }

    pub fn take_worker(&self) -> Option<JoinHandle<()>> {
        self.worker.lock().take()
    }

    pub fn set_interaction(&self, id: Option<InteractionId>) {
        *self.current_interaction.lock() = id;
    }

    pub fn take_interaction(&self) -> Option<InteractionId> {
        self.current_interaction.lock().take()
    }

    pub fn interaction_matches(&self, id: &InteractionId) -> bool {
        self.current_interaction.lock().as_ref() == Some(id)
    }

    pub fn mark_waiting(&self, calls: &[CallId]) {
        let mut statuses = self.statuses.write();
        for id in calls {
            if let Some(status) = statuses.get_mut(id) {
                if !status.state.is_terminal() {
                    status.state = CallState::WaitingConfirmation;
                }
            }
        }
    }

    pub fn mark_running(&self, id: &CallId, attempt: u32) {
        let mut statuses = self.statuses.write();
        if let Some(status) = statuses.get_mut(id) {
            if !status.state.is_terminal() {
                status.state = CallState::Running;
                status.attempts = attempt;
            }
        }
    }

    /// Retriable failure: back to `Pending` for the next attempt.
    pub fn mark_retry(&self, id: &CallId) {
        let mut statuses = self.statuses.write();
        if let Some(status) = statuses.get_mut(id) {
            if !status.state.is_terminal() {
                status.state = CallState::Pending;
            }
        }
    }

    /// Completion only lands on a call still `Running`; a result arriving
    /// after cancellation already failed the call is discarded.
    pub fn complete(&self, id: &CallId, outcome: CallOutcome) -> bool {
        let mut statuses = self.statuses.write();
        match statuses.get_mut(id) {
            Some(status) if status.state == CallState::Running => {
                status.state = CallState::Completed;
                status.backend = Some(outcome.backend);
                status.result = Some(outcome.content);
                status.error = None;
                true
            }
            _ => false,
        }
    }

    pub fn fail(&self, id: &CallId, error: &MeshError) {
        let mut statuses = self.statuses.write();
        if let Some(status) = statuses.get_mut(id) {
            if !status.state.is_terminal() {
                status.state = CallState::Failed;
                status.error = Some(error.to_string());
            }
        }
    }

    /// A tool-level failure that still names the backend it ran on.
    pub fn fail_on_backend(&self, id: &CallId, backend: BackendName, reason: &str) {
        let mut statuses = self.statuses.write();
        if let Some(status) = statuses.get_mut(id) {
            if !status.state.is_terminal() {
                status.state = CallState::Failed;
                status.backend = Some(backend);
                status.error = Some(reason.to_string());
            }
        }
    }

    pub fn fail_all_non_terminal(&self, error: &MeshError) {
        let mut statuses = self.statuses.write();
        for status in statuses.values_mut() {
            if !status.state.is_terminal() {
                status.state = CallState::Failed;
                status.error = Some(error.to_string());
            }
        }
    }

    pub fn call_state(&self, id: &CallId) -> Option<CallState> {
        self.statuses.read().get(id).map(|status| status.state)
    }

    pub fn progress(&self) -> ProgressSummary {
        let abandoned = self.is_abandoned();
        let statuses = self.statuses.read();
        let mut progress = ProgressSummary {
            total: statuses.len(),
            ..ProgressSummary::default()
        };
        for status in statuses.values() {
            match status.state {
                // Calls the abandoned plan never reached count as failed
                // even though they keep their pending state.
                CallState::Pending if abandoned => progress.failed += 1,
                CallState::Pending => progress.pending += 1,
                CallState::WaitingConfirmation => progress.waiting_confirmation += 1,
                CallState::Running => progress.running += 1,
                CallState::Completed => progress.completed += 1,
                CallState::Failed => progress.failed += 1,
            }
        }
        progress
    }

    pub fn status(&self) -> SessionStatus {
        let statuses = self.statuses.read();
        let calls = self
            .order
            .iter()
            .filter_map(|id| statuses.get(id).cloned())
            .collect();
        drop(statuses);
        SessionStatus {
            session: self.id.clone(),
            plan: self.plan.clone(),
            calls,
            progress: self.progress(),
        }
    }
}
