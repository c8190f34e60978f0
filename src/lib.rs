//! Toolmesh: a client-side orchestration runtime for tool-providing
//! backends. Wires the catalog, registry, planner, gateway and engine
//! together for the CLI and for embedders.

pub mod config;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use toolmesh_catalog::{CatalogError, ToolCatalog};
use toolmesh_core_types::{ExecutionMode, ToolSpec};
use toolmesh_engine::{EngineConfig, TaskExecutionEngine};
use toolmesh_gateway::ConfirmationGateway;
use toolmesh_planner::ExecutionPlanner;
use toolmesh_registry::{
    spawn_health_task, BackendConfig, BackendRegistry, ToolRouter, TransportKind,
};
use toolmesh_transport::{HttpTransport, LocalTransport, ToolTransport, WsTransport};

pub use config::MeshConfig;

/// A fully wired orchestration stack. The health task stops when this is
/// dropped.
pub struct Toolmesh {
    pub catalog: Arc<ToolCatalog>,
    pub registry: Arc<BackendRegistry>,
    pub engine: TaskExecutionEngine<BackendRegistry>,
    health: Option<JoinHandle<()>>,
}

impl Drop for Toolmesh {
    fn drop(&mut self) {
        if let Some(handle) = self.health.take() {
            handle.abort();
        }
    }
}

/// Build the transport adapter a backend config asks for.
pub fn build_transport(config: &BackendConfig) -> Result<Arc<dyn ToolTransport>> {
    match config.transport {
        TransportKind::Http => {
            let mut transport = HttpTransport::new(&config.endpoint, config.timeout())
                .with_context(|| format!("building http transport for {}", config.name))?;
            if let Some(token) = config
                .auth
                .as_ref()
                .and_then(|auth| auth.bearer_token.as_deref())
            {
                transport = transport.with_bearer_token(token);
            }
            Ok(Arc::new(transport))
        }
        TransportKind::WebSocket => Ok(Arc::new(WsTransport::new(
            &config.endpoint,
            config.timeout(),
        ))),
        // Only meaningful for embedders that register handlers directly.
        TransportKind::Local => Ok(Arc::new(LocalTransport::new())),
    }
}

/// Connect every enabled backend, build a catalog from the advertised
/// tools, and assemble the engine. Backends that fail their probe are
/// skipped with a warning rather than failing the whole startup.
pub async fn bootstrap(
    config: &MeshConfig,
    engine_config: EngineConfig,
    health_interval: Option<Duration>,
) -> Result<Toolmesh> {
    let registry = Arc::new(BackendRegistry::new());
    for backend in config.enabled_backends() {
        let transport = build_transport(backend)?;
        match registry.register(backend.clone(), transport).await {
            Ok(()) => {}
            Err(err) => {
                warn!(target: "cli", backend = %backend.name, %err, "skipping backend");
            }
        }
    }

    let catalog = Arc::new(ToolCatalog::new());
    for tool in registry.all_tools().await {
        let mut spec = ToolSpec::new(&tool.descriptor.name, ExecutionMode::Parallel)
            .with_schema(tool.descriptor.input_schema.clone());
        spec.description = tool.descriptor.description.clone();
        match catalog.register(spec) {
            // Same tool from a second backend; routing handles provenance.
            Ok(()) | Err(CatalogError::AlreadyRegistered(_)) => {}
            Err(err) => return Err(err.into()),
        }
    }
    info!(
        target: "cli",
        backends = registry.backends().await.len(),
        tools = catalog.len(),
        "toolmesh bootstrapped"
    );

    let health = health_interval.map(|interval| spawn_health_task(Arc::clone(&registry), interval));
    let engine = TaskExecutionEngine::new(
        Arc::clone(&registry),
        ExecutionPlanner::new(Arc::clone(&catalog)),
        Arc::new(ConfirmationGateway::new()),
        engine_config,
    );

    Ok(Toolmesh {
        catalog,
        registry,
        engine,
        health,
    })
}
