use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;
use serde_json::Value;
use tracing::{debug, info, warn};

use toolmesh_core_types::{BackendName, MeshError, ToolDescriptor};
use toolmesh_transport::{ToolTransport, TransportError, TransportErrorKind};

use crate::errors::RegistryError;
use crate::metrics;
use crate::model::{
    BackendConfig, BackendStatusSnapshot, CallOutcome, ConnState, ToolWithProvenance,
};
use crate::ToolRouter;

/// Success-rate nudge applied per call outcome: +δ on success capped at
/// 1.0, −2δ on failure floored at 0.0.
const SUCCESS_DELTA: f64 = 0.05;

struct AdvertisedTool {
    descriptor: ToolDescriptor,
    success_rate: f64,
}

/// A live binding of a backend config to a transport instance, plus the
/// rolling health/latency/success state mutated by every call outcome.
pub struct BackendConnection {
    config: BackendConfig,
    transport: Arc<dyn ToolTransport>,
    state: RwLock<ConnState>,
    last_seen: RwLock<Option<Instant>>,
    latency_ms: AtomicU64,
    success_count: AtomicU64,
    error_count: AtomicU64,
    tools: RwLock<HashMap<String, AdvertisedTool>>,
}

impl BackendConnection {
    fn new(config: BackendConfig, transport: Arc<dyn ToolTransport>) -> Self {
        Self {
            config,
            transport,
            state: RwLock::new(ConnState::Connecting),
            last_seen: RwLock::new(None),
            latency_ms: AtomicU64::new(0),
            success_count: AtomicU64::new(0),
            error_count: AtomicU64::new(0),
            tools: RwLock::new(HashMap::new()),
        }
    }

    fn is_connected(&self) -> bool {
        *self.state.read() == ConnState::Connected
    }

    fn advertises(&self, tool: &str) -> bool {
        self.tools.read().contains_key(tool)
    }

    fn success_rate(&self, tool: &str) -> f64 {
        self.tools
            .read()
            .get(tool)
            .map(|t| t.success_rate)
            .unwrap_or(1.0)
    }

    fn apply_probe(&self, descriptors: Vec<ToolDescriptor>, latency_ms: u64) {
        let mut tools = self.tools.write();
        let mut refreshed = HashMap::with_capacity(descriptors.len());
        for descriptor in descriptors {
            let success_rate = tools
                .get(&descriptor.name)
                .map(|t| t.success_rate)
                .unwrap_or(1.0);
            refreshed.insert(
                descriptor.name.clone(),
                AdvertisedTool {
                    descriptor,
                    success_rate,
                },
            );
        }
        *tools = refreshed;
        drop(tools);

        self.latency_ms.store(latency_ms, Ordering::Relaxed);
        *self.last_seen.write() = Some(Instant::now());
        *self.state.write() = ConnState::Connected;
    }

    fn mark_error(&self) {
        *self.state.write() = ConnState::Error;
    }

    fn record_success(&self, tool: &str, latency_ms: u64) {
        self.success_count.fetch_add(1, Ordering::Relaxed);
        self.latency_ms.store(latency_ms, Ordering::Relaxed);
        *self.last_seen.write() = Some(Instant::now());
        if let Some(entry) = self.tools.write().get_mut(tool) {
            entry.success_rate = (entry.success_rate + SUCCESS_DELTA).min(1.0);
        }
    }

    fn record_failure(&self, tool: &str) {
        self.error_count.fetch_add(1, Ordering::Relaxed);
        if let Some(entry) = self.tools.write().get_mut(tool) {
            entry.success_rate = (entry.success_rate - 2.0 * SUCCESS_DELTA).max(0.0);
        }
    }

    fn snapshot(&self) -> BackendStatusSnapshot {
        BackendStatusSnapshot {
            name: self.config.name.clone(),
            display_name: self.config.display_name.clone(),
            state: *self.state.read(),
            priority: self.config.priority,
            latency_ms: self.latency_ms.load(Ordering::Relaxed),
            success_count: self.success_count.load(Ordering::Relaxed),
            error_count: self.error_count.load(Ordering::Relaxed),
            last_seen: *self.last_seen.read(),
            tool_count: self.tools.read().len(),
        }
    }
}

/// Process-wide registry of backend connections. Safe for concurrent
/// read/route/call access; counters commute, so no locking beyond the
/// per-connection state guards is needed.
#[derive(Default)]
pub struct BackendRegistry {
    connections: DashMap<BackendName, Arc<BackendConnection>>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
        }
    }

    fn get(&self, name: &BackendName) -> Option<Arc<BackendConnection>> {
        self.connections
            .get(name)
            .map(|entry| Arc::clone(entry.value()))
    }

    /// Rank connected backends advertising `tool` for routing: priority
    /// desc, then latency asc, then name asc. The sort key is the whole
    /// scoring policy; swap it here to change routing behavior.
    fn rank_backends(&self, tool: &str, exclude: &[&BackendName]) -> Vec<Arc<BackendConnection>> {
        let mut candidates: Vec<Arc<BackendConnection>> = self
            .connections
            .iter()
            .filter(|entry| !exclude.contains(&entry.key()))
            .map(|entry| Arc::clone(entry.value()))
            .filter(|conn| conn.is_connected() && conn.advertises(tool))
            .collect();
        candidates.sort_by(|a, b| {
            b.config
                .priority
                .cmp(&a.config.priority)
                .then_with(|| {
                    a.latency_ms
                        .load(Ordering::Relaxed)
                        .cmp(&b.latency_ms.load(Ordering::Relaxed))
                })
                .then_with(|| a.config.name.0.cmp(&b.config.name.0))
        });
        candidates
    }

    fn select(
        &self,
        tool: &str,
        preferred: Option<&BackendName>,
        exclude: &[&BackendName],
    ) -> Result<Arc<BackendConnection>, MeshError> {
        if let Some(name) = preferred {
            if !exclude.contains(&name) {
                if let Some(conn) = self.get(name) {
                    if conn.is_connected() && conn.advertises(tool) {
                        return Ok(conn);
                    }
                }
            }
        }
        self.rank_backends(tool, exclude)
            .into_iter()
            .next()
            .ok_or_else(|| MeshError::NoBackendAvailable(tool.to_string()))
    }

    /// One attempt against one backend, bounded by its configured timeout.
    async fn invoke(
        &self,
        conn: &Arc<BackendConnection>,
        tool: &str,
        args: Value,
    ) -> Result<CallOutcome, MeshError> {
        let timeout = conn.config.timeout();
        let started = Instant::now();
        let result = tokio::time::timeout(timeout, conn.transport.call_tool(tool, args)).await;
        let latency_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(Ok(content)) => {
                if content.is_error {
                    // Tool-level failure: counts against the success rate
                    // but the payload still reaches the caller.
                    conn.record_failure(tool);
                    metrics::record_call_error(&conn.config.name.0);
                } else {
                    conn.record_success(tool, latency_ms);
                }
                metrics::record_call(&conn.config.name.0);
                Ok(CallOutcome {
                    content,
                    backend: conn.config.name.clone(),
                    latency_ms,
                })
            }
            Ok(Err(err)) => {
                conn.record_failure(tool);
                conn.mark_error();
                metrics::record_call_error(&conn.config.name.0);
                Err(map_transport_error(err, timeout.as_millis() as u64))
            }
            Err(_) => {
                conn.record_failure(tool);
                conn.mark_error();
                metrics::record_call_error(&conn.config.name.0);
                Err(MeshError::Timeout(timeout.as_millis() as u64))
            }
        }
    }

    /// Attempts against a single backend per its own retry policy.
    async fn invoke_with_retries(
        &self,
        conn: &Arc<BackendConnection>,
        tool: &str,
        args: &Value,
    ) -> Result<CallOutcome, MeshError> {
        let mut attempt = 0;
        loop {
            match self.invoke(conn, tool, args.clone()).await {
                Ok(outcome) => return Ok(outcome),
                Err(err) if err.retriable() && attempt < conn.config.retry_count => {
                    attempt += 1;
                    debug!(
                        target: "registry",
                        backend = %conn.config.name,
                        tool,
                        attempt,
                        "retrying call against same backend"
                    );
                }
                Err(err) => return Err(err),
            }
        }
    }
}

fn map_transport_error(err: TransportError, timeout_ms: u64) -> MeshError {
    match err.kind {
        TransportErrorKind::Timeout => MeshError::Timeout(timeout_ms),
        _ if err.retriable => MeshError::transport(err.to_string()),
        _ => MeshError::transport_fatal(err.to_string()),
    }
}

#[async_trait]
impl ToolRouter for BackendRegistry {
    async fn register(
        &self,
        config: BackendConfig,
        transport: Arc<dyn ToolTransport>,
    ) -> Result<(), MeshError> {
        if self.connections.contains_key(&config.name) {
            return Err(
                RegistryError::AlreadyRegistered.into_mesh_error(config.name.0.clone())
            );
        }

        let name = config.name.clone();
        let conn = Arc::new(BackendConnection::new(config, transport));

        // Connectivity probe before admission; on failure no state is kept.
        let started = Instant::now();
        let probe = tokio::time::timeout(conn.config.timeout(), conn.transport.list_tools()).await;
        let descriptors = match probe {
            Ok(Ok(descriptors)) => descriptors,
            Ok(Err(err)) => {
                warn!(target: "registry", backend = %name, %err, "registration probe failed");
                return Err(RegistryError::ProbeFailed
                    .into_mesh_error(format!("{name}: {err}")));
            }
            Err(_) => {
                warn!(target: "registry", backend = %name, "registration probe timed out");
                return Err(RegistryError::ProbeFailed.into_mesh_error(format!("{name}: timeout")));
            }
        };

        let latency_ms = started.elapsed().as_millis() as u64;
        let tool_count = descriptors.len();
        conn.apply_probe(descriptors, latency_ms);
        self.connections.insert(name.clone(), conn);
        metrics::set_backend_count(self.connections.len());
        info!(target: "registry", backend = %name, tools = tool_count, latency_ms, "backend registered");
        Ok(())
    }

    async fn unregister(&self, name: &BackendName) -> bool {
        let removed = self.connections.remove(name).is_some();
        if removed {
            metrics::set_backend_count(self.connections.len());
            info!(target: "registry", backend = %name, "backend unregistered");
        }
        removed
    }

    async fn all_tools(&self) -> Vec<ToolWithProvenance> {
        let mut tools: Vec<ToolWithProvenance> = Vec::new();
        for entry in self.connections.iter() {
            let conn = entry.value();
            let state = *conn.state.read();
            let guard = conn.tools.read();
            for advertised in guard.values() {
                tools.push(ToolWithProvenance {
                    descriptor: advertised.descriptor.clone(),
                    backend: conn.config.name.clone(),
                    backend_state: state,
                    backend_priority: conn.config.priority,
                    success_rate: advertised.success_rate,
                });
            }
        }
        // Backend name last so equal-priority duplicates of a tool do not
        // reorder between calls (the connection map iterates unordered).
        tools.sort_by(|a, b| {
            b.backend_priority
                .cmp(&a.backend_priority)
                .then_with(|| b.success_rate.total_cmp(&a.success_rate))
                .then_with(|| a.descriptor.name.cmp(&b.descriptor.name))
                .then_with(|| a.backend.0.cmp(&b.backend.0))
        });
        tools
    }

    async fn select_backend(
        &self,
        tool: &str,
        preferred: Option<&BackendName>,
    ) -> Result<BackendName, MeshError> {
        self.select(tool, preferred, &[])
            .map(|conn| conn.config.name.clone())
    }

    async fn call(
        &self,
        tool: &str,
        args: Value,
        preferred: Option<&BackendName>,
    ) -> Result<CallOutcome, MeshError> {
        let primary = self.select(tool, preferred, &[])?;
        let primary_name = primary.config.name.clone();
        let first_err = match self.invoke_with_retries(&primary, tool, &args).await {
            Ok(outcome) => return Ok(outcome),
            Err(err) => err,
        };

        // Failover: exactly one alternate, never the backend that just
        // failed.
        let alternate = match self.select(tool, None, &[&primary_name]) {
            Ok(conn) => conn,
            Err(_) => {
                let message =
                    format!("tool {tool} failed on backend {primary_name}: {first_err}");
                return Err(if first_err.retriable() {
                    MeshError::transport(message)
                } else {
                    MeshError::transport_fatal(message)
                });
            }
        };
        let alternate_name = alternate.config.name.clone();
        info!(
            target: "registry",
            tool,
            failed = %primary_name,
            alternate = %alternate_name,
            "failing over to alternate backend"
        );
        match self.invoke(&alternate, tool, args).await {
            Ok(outcome) => Ok(outcome),
            Err(second_err) => {
                let message = format!(
                    "tool {tool} failed on backends {primary_name}, {alternate_name}: \
                     {first_err}; {second_err}"
                );
                Err(if first_err.retriable() || second_err.retriable() {
                    MeshError::transport(message)
                } else {
                    MeshError::transport_fatal(message)
                })
            }
        }
    }

    async fn health_check(&self) {
        let connections: Vec<Arc<BackendConnection>> = self
            .connections
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();

        for conn in connections {
            let name = conn.config.name.clone();
            let was_connected = conn.is_connected();
            let started = Instant::now();
            let probe =
                tokio::time::timeout(conn.config.timeout(), conn.transport.list_tools()).await;
            match probe {
                Ok(Ok(descriptors)) => {
                    let latency_ms = started.elapsed().as_millis() as u64;
                    conn.apply_probe(descriptors, latency_ms);
                    if !was_connected {
                        info!(target: "registry", backend = %name, latency_ms, "backend recovered");
                        metrics::record_health_transition(&name.0, "connected");
                    }
                }
                Ok(Err(err)) => {
                    conn.mark_error();
                    if was_connected {
                        warn!(target: "registry", backend = %name, %err, "health check failed");
                        metrics::record_health_transition(&name.0, "error");
                    }
                }
                Err(_) => {
                    conn.mark_error();
                    if was_connected {
                        warn!(target: "registry", backend = %name, "health check timed out");
                        metrics::record_health_transition(&name.0, "error");
                    }
                }
            }
        }
    }

    async fn backends(&self) -> Vec<BackendStatusSnapshot> {
        let mut snapshots: Vec<BackendStatusSnapshot> = self
            .connections
            .iter()
            .map(|entry| entry.value().snapshot())
            .collect();
        snapshots.sort_by(|a, b| a.name.0.cmp(&b.name.0));
        snapshots
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;
    use toolmesh_core_types::ToolContent;
    use toolmesh_transport::LocalTransport;

    fn descriptor(name: &str) -> ToolDescriptor {
        ToolDescriptor {
            name: name.to_string(),
            description: String::new(),
            input_schema: json!({ "type": "object" }),
        }
    }

    fn healthy_transport(tools: &[&str]) -> Arc<LocalTransport> {
        let transport = LocalTransport::new();
        for tool in tools {
            let tool_name = tool.to_string();
            transport.register_fn(descriptor(tool), move |_| {
                Ok(ToolContent {
                    content: json!({ "served": tool_name }),
                    is_error: false,
                })
            });
        }
        Arc::new(transport)
    }

    /// Lists tools fine but fails every call; counts the attempts.
    struct FailingTransport {
        tools: Vec<ToolDescriptor>,
        calls: AtomicUsize,
    }

    impl FailingTransport {
        fn new(tools: &[&str]) -> Self {
            Self {
                tools: tools.iter().map(|t| descriptor(t)).collect(),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ToolTransport for FailingTransport {
        async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, TransportError> {
            Ok(self.tools.clone())
        }

        async fn call_tool(
            &self,
            _name: &str,
            _args: Value,
        ) -> Result<ToolContent, TransportError> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            Err(TransportError::new(TransportErrorKind::Io).with_hint("socket reset"))
        }
    }

    /// Rejects every call with a failure marked non-retriable, the way a
    /// backend refuses malformed or unsupported requests.
    struct RejectingTransport {
        tools: Vec<ToolDescriptor>,
        calls: AtomicUsize,
    }

    impl RejectingTransport {
        fn new(tools: &[&str]) -> Self {
            Self {
                tools: tools.iter().map(|t| descriptor(t)).collect(),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ToolTransport for RejectingTransport {
        async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, TransportError> {
            Ok(self.tools.clone())
        }

        async fn call_tool(
            &self,
            _name: &str,
            _args: Value,
        ) -> Result<ToolContent, TransportError> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            Err(TransportError::new(TransportErrorKind::Remote).with_hint("unsupported arguments"))
        }
    }

    /// Refuses even the list-tools probe.
    struct DeadTransport;

    #[async_trait]
    impl ToolTransport for DeadTransport {
        async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, TransportError> {
            Err(TransportError::new(TransportErrorKind::Connect).with_hint("refused"))
        }

        async fn call_tool(
            &self,
            _name: &str,
            _args: Value,
        ) -> Result<ToolContent, TransportError> {
            Err(TransportError::new(TransportErrorKind::Connect).with_hint("refused"))
        }
    }

    fn config(name: &str, priority: u8) -> BackendConfig {
        BackendConfig::new(name, crate::model::TransportKind::Local, "local://test")
            .with_priority(priority)
            .with_retry_count(0)
    }

    #[tokio::test]
    async fn register_probes_before_admission() {
        let registry = BackendRegistry::new();
        let err = registry
            .register(config("dead", 5), Arc::new(DeadTransport))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("probe failed"));
        assert!(registry.backends().await.is_empty());
    }

    #[tokio::test]
    async fn register_rejects_duplicate_names() {
        let registry = BackendRegistry::new();
        registry
            .register(config("snap", 5), healthy_transport(&["capture"]))
            .await
            .unwrap();
        let err = registry
            .register(config("snap", 5), healthy_transport(&["capture"]))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("already registered"));
    }

    #[tokio::test]
    async fn select_prefers_hinted_backend_when_eligible() {
        let registry = BackendRegistry::new();
        registry
            .register(config("low", 2), healthy_transport(&["capture"]))
            .await
            .unwrap();
        registry
            .register(config("high", 9), healthy_transport(&["capture"]))
            .await
            .unwrap();

        let hinted = BackendName::new("low");
        let picked = registry
            .select_backend("capture", Some(&hinted))
            .await
            .unwrap();
        assert_eq!(picked, hinted);

        let unhinted = registry.select_backend("capture", None).await.unwrap();
        assert_eq!(unhinted, BackendName::new("high"));
    }

    #[tokio::test]
    async fn select_fails_when_no_backend_advertises_tool() {
        let registry = BackendRegistry::new();
        registry
            .register(config("snap", 5), healthy_transport(&["capture"]))
            .await
            .unwrap();
        let err = registry
            .select_backend("teleport", None)
            .await
            .unwrap_err();
        assert!(matches!(err, MeshError::NoBackendAvailable(tool) if tool == "teleport"));
    }

    #[tokio::test]
    async fn call_fails_over_to_healthy_lower_priority_backend() {
        let registry = BackendRegistry::new();
        let failing = Arc::new(FailingTransport::new(&["capture"]));
        registry
            .register(config("flaky", 9), failing.clone())
            .await
            .unwrap();
        registry
            .register(config("steady", 5), healthy_transport(&["capture"]))
            .await
            .unwrap();

        let outcome = registry.call("capture", json!({}), None).await.unwrap();
        assert_eq!(outcome.backend, BackendName::new("steady"));
        assert_eq!(failing.calls.load(Ordering::Relaxed), 1);

        let snapshots = registry.backends().await;
        let flaky = snapshots.iter().find(|s| s.name.0 == "flaky").unwrap();
        assert_eq!(flaky.error_count, 1);
        assert_eq!(flaky.state, ConnState::Error);
    }

    #[tokio::test]
    async fn call_error_names_every_backend_attempted() {
        let registry = BackendRegistry::new();
        registry
            .register(
                config("alpha", 9),
                Arc::new(FailingTransport::new(&["capture"])),
            )
            .await
            .unwrap();
        registry
            .register(
                config("beta", 5),
                Arc::new(FailingTransport::new(&["capture"])),
            )
            .await
            .unwrap();

        let err = registry.call("capture", json!({}), None).await.unwrap_err();
        let message = err.to_string();
        assert!(message.contains("alpha"));
        assert!(message.contains("beta"));
    }

    #[tokio::test]
    async fn same_backend_retry_policy_is_honored() {
        let registry = BackendRegistry::new();
        let failing = Arc::new(FailingTransport::new(&["capture"]));
        registry
            .register(
                config("flaky", 9).with_retry_count(2),
                failing.clone(),
            )
            .await
            .unwrap();

        let _ = registry.call("capture", json!({}), None).await;
        // 1 initial + 2 same-backend retries, no alternate available.
        assert_eq!(failing.calls.load(Ordering::Relaxed), 3);
    }

    #[tokio::test]
    async fn non_retriable_failures_skip_same_backend_retries() {
        let registry = BackendRegistry::new();
        let rejecting = Arc::new(RejectingTransport::new(&["capture"]));
        registry
            .register(
                config("picky", 9).with_retry_count(2),
                rejecting.clone(),
            )
            .await
            .unwrap();

        let err = registry.call("capture", json!({}), None).await.unwrap_err();
        // The transport marked the failure deterministic; re-attempting
        // the same request cannot change the outcome.
        assert_eq!(rejecting.calls.load(Ordering::Relaxed), 1);
        assert!(!err.retriable());
    }

    #[tokio::test]
    async fn health_check_marks_error_and_recovers() {
        let registry = BackendRegistry::new();
        let failing = Arc::new(FailingTransport::new(&["capture"]));
        registry
            .register(config("flaky", 9), failing.clone())
            .await
            .unwrap();

        // Call failure marks the backend as error; routing then skips it.
        let _ = registry.call("capture", json!({}), None).await;
        assert!(registry.select_backend("capture", None).await.is_err());

        // The tool stays listed while the backend is in error state.
        let tools = registry.all_tools().await;
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].backend_state, ConnState::Error);
        let snapshot = &registry.backends().await[0];
        assert_eq!(snapshot.state, ConnState::Error);
        assert_eq!(snapshot.tool_count, 1);

        // list_tools still succeeds for this transport, so a health sweep
        // restores routing eligibility.
        registry.health_check().await;
        let picked = registry.select_backend("capture", None).await.unwrap();
        assert_eq!(picked, BackendName::new("flaky"));
    }

    #[tokio::test]
    async fn success_rate_nudges_are_capped_and_floored() {
        let registry = BackendRegistry::new();
        registry
            .register(config("snap", 5), healthy_transport(&["capture"]))
            .await
            .unwrap();

        for _ in 0..4 {
            registry.call("capture", json!({}), None).await.unwrap();
        }
        let tools = registry.all_tools().await;
        assert_eq!(tools.len(), 1);
        // Started at 1.0; successes must not push past the cap.
        assert!((tools[0].success_rate - 1.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn all_tools_sorted_by_priority_then_rate_then_name() {
        let registry = BackendRegistry::new();
        registry
            .register(config("low", 2), healthy_transport(&["zoom", "capture"]))
            .await
            .unwrap();
        registry
            .register(config("high", 8), healthy_transport(&["analyze"]))
            .await
            .unwrap();

        let tools = registry.all_tools().await;
        let names: Vec<(&str, &str)> = tools
            .iter()
            .map(|t| (t.backend.0.as_str(), t.descriptor.name.as_str()))
            .collect();
        assert_eq!(
            names,
            vec![("high", "analyze"), ("low", "capture"), ("low", "zoom")]
        );
    }

    #[tokio::test]
    async fn all_tools_breaks_full_ties_on_backend_name() {
        let registry = BackendRegistry::new();
        // Same priority, same fresh success rate, same tool.
        registry
            .register(config("beta", 5), healthy_transport(&["capture"]))
            .await
            .unwrap();
        registry
            .register(config("alpha", 5), healthy_transport(&["capture"]))
            .await
            .unwrap();

        for _ in 0..3 {
            let tools = registry.all_tools().await;
            let backends: Vec<&str> = tools.iter().map(|t| t.backend.0.as_str()).collect();
            assert_eq!(backends, vec!["alpha", "beta"]);
        }
    }

    #[tokio::test]
    async fn unregister_removes_connection() {
        let registry = BackendRegistry::new();
        registry
            .register(config("snap", 5), healthy_transport(&["capture"]))
            .await
            .unwrap();
        assert!(registry.unregister(&BackendName::new("snap")).await);
        assert!(!registry.unregister(&BackendName::new("snap")).await);
        assert!(registry.all_tools().await.is_empty());
    }
}
