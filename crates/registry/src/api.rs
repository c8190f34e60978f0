use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use toolmesh_core_types::{BackendName, MeshError};
use toolmesh_transport::ToolTransport;

use crate::model::{BackendConfig, BackendStatusSnapshot, CallOutcome, ToolWithProvenance};

/// Routing surface consumed by the execution engine.
#[async_trait]
pub trait ToolRouter: Send + Sync {
    /// Admit a backend after a successful connectivity probe.
    async fn register(
        &self,
        config: BackendConfig,
        transport: Arc<dyn ToolTransport>,
    ) -> Result<(), MeshError>;

    /// Remove a backend. In-flight calls finish or fail naturally.
    async fn unregister(&self, name: &BackendName) -> bool;

    /// Union of tools from all connected backends, with provenance.
    async fn all_tools(&self) -> Vec<ToolWithProvenance>;

    /// Pick the backend that should serve `tool` right now.
    async fn select_backend(
        &self,
        tool: &str,
        preferred: Option<&BackendName>,
    ) -> Result<BackendName, MeshError>;

    /// Route and invoke, with failover to one alternate backend.
    async fn call(
        &self,
        tool: &str,
        args: Value,
        preferred: Option<&BackendName>,
    ) -> Result<CallOutcome, MeshError>;

    /// One health sweep over every registered backend.
    async fn health_check(&self);

    /// Status snapshot of every registered backend.
    async fn backends(&self) -> Vec<BackendStatusSnapshot>;
}

#[async_trait]
impl<R> ToolRouter for Arc<R>
where
    R: ToolRouter + ?Sized,
{
    async fn register(
        &self,
        config: BackendConfig,
        transport: Arc<dyn ToolTransport>,
    ) -> Result<(), MeshError> {
        (**self).register(config, transport).await
    }

    async fn unregister(&self, name: &BackendName) -> bool {
        (**self).unregister(name).await
    }

    async fn all_tools(&self) -> Vec<ToolWithProvenance> {
        (**self).all_tools().await
    }

    async fn select_backend(
        &self,
        tool: &str,
        preferred: Option<&BackendName>,
    ) -> Result<BackendName, MeshError> {
        (**self).select_backend(tool, preferred).await
    }

    async fn call(
        &self,
        tool: &str,
        args: Value,
        preferred: Option<&BackendName>,
    ) -> Result<CallOutcome, MeshError> {
        (**self).call(tool, args, preferred).await
    }

    async fn health_check(&self) {
        (**self).health_check().await
    }

    async fn backends(&self) -> Vec<BackendStatusSnapshot> {
        (**self).backends().await
    }
}
