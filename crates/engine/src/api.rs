use async_trait::async_trait;

use toolmesh_core_types::{InteractionId, MeshError, SessionId, ToolCall};
use toolmesh_gateway::Resolution;
use toolmesh_planner::ExecutionPlan;
use toolmesh_registry::ToolRouter;

use crate::engine::TaskExecutionEngine;
use crate::model::SessionStatus;

/// Session-facing surface of the engine, for callers that should not
/// know the concrete router type.
#[async_trait]
pub trait EngineService: Send + Sync {
    /// Plan and start executing `calls` under `session`.
    async fn submit(
        &self,
        session: SessionId,
        calls: Vec<ToolCall>,
    ) -> Result<ExecutionPlan, MeshError>;

    /// Current plan, per-call statuses and progress counters.
    async fn status(&self, session: &SessionId) -> Result<SessionStatus, MeshError>;

    /// Answer an outstanding confirmation.
    async fn resolve_confirmation(
        &self,
        session: &SessionId,
        interaction: &InteractionId,
        resolution: Resolution,
    ) -> Result<bool, MeshError>;

    /// Cancel all non-terminal work in the session.
    async fn cancel(&self, session: &SessionId) -> Result<(), MeshError>;

    /// Drop the session's transient state.
    async fn cleanup(&self, session: &SessionId) -> bool;

    /// Block until every call in the session has settled.
    async fn wait(&self, session: &SessionId) -> Result<SessionStatus, MeshError>;
}

#[async_trait]
impl<R> EngineService for TaskExecutionEngine<R>
where
    R: ToolRouter + 'static,
{
    async fn submit(
        &self,
        session: SessionId,
        calls: Vec<ToolCall>,
    ) -> Result<ExecutionPlan, MeshError> {
        TaskExecutionEngine::submit(self, session, calls)
    }

    async fn status(&self, session: &SessionId) -> Result<SessionStatus, MeshError> {
        TaskExecutionEngine::status(self, session)
    }

    async fn resolve_confirmation(
        &self,
        session: &SessionId,
        interaction: &InteractionId,
        resolution: Resolution,
    ) -> Result<bool, MeshError> {
        TaskExecutionEngine::resolve_confirmation(self, session, interaction, resolution)
    }

    async fn cancel(&self, session: &SessionId) -> Result<(), MeshError> {
        TaskExecutionEngine::cancel(self, session)
    }

    async fn cleanup(&self, session: &SessionId) -> bool {
        TaskExecutionEngine::cleanup(self, session)
    }

    async fn wait(&self, session: &SessionId) -> Result<SessionStatus, MeshError> {
        TaskExecutionEngine::wait(self, session).await
    }
}
