use std::sync::Arc;

use dashmap::DashMap;
use futures::future::join_all;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use toolmesh_core_types::{CallId, InteractionId, MeshError, SessionId, ToolCall};
use toolmesh_gateway::{ConfirmationGateway, Interaction, Resolution};
use toolmesh_planner::{ExecutionPhase, ExecutionPlan, ExecutionPlanner, PhaseMode};
use toolmesh_registry::ToolRouter;

use crate::metrics;
use crate::model::{EngineConfig, SessionStatus};
use crate::session::SessionRuntime;

/// Walks execution plans phase by phase, one worker task per session.
///
/// The router is the only cross-session shared state; each session owns
/// its plan, statuses and cancellation token. A suspended session (on a
/// confirmation, a network round trip or a retry delay) never blocks any
/// other session.
pub struct TaskExecutionEngine<R> {
    router: Arc<R>,
    planner: ExecutionPlanner,
    gateway: Arc<ConfirmationGateway>,
    config: EngineConfig,
    sessions: DashMap<SessionId, Arc<SessionRuntime>>,
}

impl<R> TaskExecutionEngine<R>
where
    R: ToolRouter + 'static,
{
    pub fn new(
        router: Arc<R>,
        planner: ExecutionPlanner,
        gateway: Arc<ConfirmationGateway>,
        config: EngineConfig,
    ) -> Self {
        Self {
            router,
            planner,
            gateway,
            config,
            sessions: DashMap::new(),
        }
    }

    pub fn gateway(&self) -> Arc<ConfirmationGateway> {
        Arc::clone(&self.gateway)
    }

    fn session(&self, id: &SessionId) -> Result<Arc<SessionRuntime>, MeshError> {
        self.sessions
            .get(id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| MeshError::SessionNotFound(id.0.clone()))
    }

    /// Plan the calls and start executing them under `session`. Planning
    /// errors reject the submission before any side effect; a session
    /// already mid-execution rejects resubmission.
    pub fn submit(
        &self,
        session: SessionId,
        calls: Vec<ToolCall>,
    ) -> Result<ExecutionPlan, MeshError> {
        if let Some(existing) = self.sessions.get(&session) {
            if !existing.is_finished() {
                return Err(MeshError::internal(format!(
                    "session {session} is still executing"
                )));
            }
        }

        let call_count = calls.len();
        let plan = self.planner.plan(calls)?;
        let runtime = Arc::new(SessionRuntime::new(session.clone(), plan.clone()));
        metrics::record_submitted(call_count);
        info!(
            target: "engine",
            session = %session,
            calls = call_count,
            phases = plan.phases.len(),
            "plan submitted"
        );

        if plan.is_empty() {
            runtime.finish();
        } else {
            let worker = tokio::spawn(run_session(
                Arc::clone(&self.router),
                Arc::clone(&self.gateway),
                self.config.clone(),
                Arc::clone(&runtime),
            ));
            runtime.set_worker(worker);
        }
        self.sessions.insert(session, runtime);
        Ok(plan)
    }

    pub fn status(&self, session: &SessionId) -> Result<SessionStatus, MeshError> {
        Ok(self.session(session)?.status())
    }

    /// Answer the session's outstanding confirmation. Returns false when
    /// the interaction is unknown, stale, or already resolved.
    pub fn resolve_confirmation(
        &self,
        session: &SessionId,
        interaction: &InteractionId,
        resolution: Resolution,
    ) -> Result<bool, MeshError> {
        let runtime = self.session(session)?;
        if !runtime.interaction_matches(interaction) {
            return Ok(false);
        }
        Ok(self.gateway.resolve(interaction, resolution))
    }

    /// Cancel a session: every non-terminal call fails with `Cancelled`,
    /// any outstanding confirmation resolves as cancelled, and no further
    /// phase starts. Idempotent; results of calls already in flight are
    /// discarded when they arrive.
    pub fn cancel(&self, session: &SessionId) -> Result<(), MeshError> {
        let runtime = self.session(session)?;
        if runtime.is_cancelled() {
            return Ok(());
        }
        runtime.cancel();
        if let Some(interaction) = runtime.take_interaction() {
            self.gateway.cancel(&interaction);
        }
        runtime.fail_all_non_terminal(&MeshError::Cancelled);
        metrics::record_cancelled();
        info!(target: "engine", session = %session, "session cancelled");
        Ok(())
    }

    /// Drop a session's transient state, cancelling it first if needed.
    pub fn cleanup(&self, session: &SessionId) -> bool {
        if let Some((_, runtime)) = self.sessions.remove(session) {
            if !runtime.is_finished() {
                runtime.cancel();
                if let Some(interaction) = runtime.take_interaction() {
                    self.gateway.cancel(&interaction);
                }
                runtime.fail_all_non_terminal(&MeshError::Cancelled);
            }
            debug!(target: "engine", session = %session, "session cleaned up");
            true
        } else {
            false
        }
    }

    /// Block until the session's worker has settled every call.
    pub async fn wait(&self, session: &SessionId) -> Result<SessionStatus, MeshError> {
        let runtime = self.session(session)?;
        if let Some(worker) = runtime.take_worker() {
            let _ = worker.await;
        }
        Ok(runtime.status())
    }
}

async fn run_session<R>(
    router: Arc<R>,
    gateway: Arc<ConfirmationGateway>,
    config: EngineConfig,
    runtime: Arc<SessionRuntime>,
) where
    R: ToolRouter + 'static,
{
    let plan = runtime.plan().clone();
    for phase in &plan.phases {
        if runtime.is_cancelled() {
            break;
        }
        if phase.requires_confirmation && !confirm_phase(&gateway, &config, &runtime, phase).await {
            break;
        }
        if runtime.is_cancelled() {
            break;
        }

        match phase.mode {
            PhaseMode::Parallel => {
                // Siblings settle independently; one failure does not
                // cancel the others.
                let calls = phase
                    .calls
                    .iter()
                    .map(|call| run_call(&router, &config, &runtime, call));
                join_all(calls).await;
            }
            PhaseMode::Serial => {
                for call in &phase.calls {
                    if !run_call(&router, &config, &runtime, call).await {
                        break;
                    }
                }
            }
        }
        debug!(
            target: "engine",
            session = %runtime.id(),
            phase = phase.id,
            progress = ?runtime.progress(),
            "phase settled"
        );
    }
    runtime.finish();
    info!(
        target: "engine",
        session = %runtime.id(),
        progress = ?runtime.progress(),
        "session finished"
    );
}

/// Gate one phase behind a user confirmation. Returns false when the
/// rest of the plan must be abandoned.
async fn confirm_phase(
    gateway: &Arc<ConfirmationGateway>,
    config: &EngineConfig,
    runtime: &Arc<SessionRuntime>,
    phase: &ExecutionPhase,
) -> bool {
    let mut interaction = Interaction::confirmation(phase_prompt(phase));
    if let Some(ms) = config.confirmation_timeout_ms {
        interaction = interaction.with_timeout(std::time::Duration::from_millis(ms));
    }
    let ids: Vec<CallId> = phase.calls.iter().map(|c| c.call_id.clone()).collect();
    runtime.set_interaction(Some(interaction.id.clone()));
    runtime.mark_waiting(&ids);
    metrics::record_confirmation_requested();

    let resolution = gateway.request(interaction).await;
    runtime.set_interaction(None);

    if resolution.approved() {
        return true;
    }
    let reason = match resolution {
        Resolution::Denied => MeshError::UserDenied,
        Resolution::TimedOut => MeshError::ConfirmationTimeout,
        _ => MeshError::Cancelled,
    };
    warn!(
        target: "engine",
        session = %runtime.id(),
        phase = phase.id,
        %reason,
        "confirmation not granted; abandoning remaining plan"
    );
    for call in &phase.calls {
        runtime.fail(&call.call_id, &reason);
        metrics::record_failed(&call.tool);
    }
    if !matches!(reason, MeshError::Cancelled) {
        metrics::record_confirmation_denied();
        runtime.abandon();
    }
    false
}

fn phase_prompt(phase: &ExecutionPhase) -> String {
    if let Some(message) = phase
        .calls
        .iter()
        .find_map(|call| call.confirmation_message.clone())
    {
        return message;
    }
    let tools: Vec<&str> = phase.calls.iter().map(|call| call.tool.as_str()).collect();
    match phase
        .calls
        .iter()
        .find_map(|call| call.rationale.as_deref())
    {
        Some(rationale) => format!("Run {}? ({rationale})", tools.join(", ")),
        None => format!("Run {}?", tools.join(", ")),
    }
}

/// Execute one call to a terminal state. Returns true on completion.
async fn run_call<R>(
    router: &Arc<R>,
    config: &EngineConfig,
    runtime: &Arc<SessionRuntime>,
    call: &ToolCall,
) -> bool
where
    R: ToolRouter + 'static,
{
    let token = runtime.token();
    let mut attempt: u32 = 0;
    loop {
        if runtime.is_cancelled() {
            runtime.fail(&call.call_id, &MeshError::Cancelled);
            return false;
        }
        runtime.mark_running(&call.call_id, attempt + 1);
        metrics::record_started(&call.tool);

        let result = router
            .call(&call.tool, call.args.clone(), call.backend_hint.as_ref())
            .await;

        if runtime.is_cancelled() {
            // The transport round trip was not aborted; its result is
            // discarded now that the session is cancelled.
            runtime.fail(&call.call_id, &MeshError::Cancelled);
            return false;
        }

        match result {
            Ok(outcome) if !outcome.content.is_error => {
                debug!(
                    target: "engine",
                    call = %call.call_id,
                    tool = %call.tool,
                    backend = %outcome.backend,
                    latency_ms = outcome.latency_ms,
                    "call completed"
                );
                runtime.complete(&call.call_id, outcome);
                metrics::record_completed(&call.tool);
                return true;
            }
            Ok(outcome) => {
                // The backend answered, the tool itself reported failure.
                // Retrying would repeat the same tool error.
                warn!(
                    target: "engine",
                    call = %call.call_id,
                    tool = %call.tool,
                    backend = %outcome.backend,
                    "tool reported an error result"
                );
                runtime.fail_on_backend(
                    &call.call_id,
                    outcome.backend,
                    "tool reported an error result",
                );
                metrics::record_failed(&call.tool);
                return false;
            }
            Err(err) if err.retriable() && attempt < config.max_retries => {
                attempt += 1;
                runtime.mark_retry(&call.call_id);
                let delay = config.retry_base_delay() * attempt;
                warn!(
                    target: "engine",
                    call = %call.call_id,
                    tool = %call.tool,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    %err,
                    "call failed, backing off before retry"
                );
                tokio::select! {
                    _ = token.cancelled() => {
                        runtime.fail(&call.call_id, &MeshError::Cancelled);
                        return false;
                    }
                    _ = sleep(delay) => {}
                }
            }
            Err(err) => {
                warn!(
                    target: "engine",
                    call = %call.call_id,
                    tool = %call.tool,
                    attempts = attempt + 1,
                    %err,
                    "call failed"
                );
                runtime.fail(&call.call_id, &err);
                metrics::record_failed(&call.tool);
                return false;
            }
        }
    }
}
