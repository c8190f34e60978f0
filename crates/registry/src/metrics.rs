use lazy_static::lazy_static;
use prometheus::{core::Collector, opts, IntCounterVec, IntGauge, Registry};
use tracing::error;

lazy_static! {
    static ref REGISTRY_BACKENDS_TOTAL: IntGauge =
        IntGauge::new("toolmesh_registry_backends_total", "Registered backends").unwrap();
    static ref REGISTRY_CALLS_TOTAL: IntCounterVec = IntCounterVec::new(
        opts!(
            "toolmesh_registry_calls_total",
            "Routed tool calls grouped by backend"
        ),
        &["backend"]
    )
    .unwrap();
    static ref REGISTRY_CALL_ERRORS_TOTAL: IntCounterVec = IntCounterVec::new(
        opts!(
            "toolmesh_registry_call_errors_total",
            "Failed tool calls grouped by backend"
        ),
        &["backend"]
    )
    .unwrap();
    static ref REGISTRY_HEALTH_TRANSITIONS: IntCounterVec = IntCounterVec::new(
        opts!(
            "toolmesh_registry_health_transitions_total",
            "Backend health transitions grouped by backend and new state"
        ),
        &["backend", "state"]
    )
    .unwrap();
}

fn register<C>(registry: &Registry, collector: C)
where
    C: Collector + Clone + Send + Sync + 'static,
{
    if let Err(err) = registry.register(Box::new(collector.clone())) {
        if !matches!(err, prometheus::Error::AlreadyReg) {
            error!(?err, "failed to register registry metric");
        }
    }
}

pub fn register_metrics(registry: &Registry) {
    register(registry, REGISTRY_BACKENDS_TOTAL.clone());
    register(registry, REGISTRY_CALLS_TOTAL.clone());
    register(registry, REGISTRY_CALL_ERRORS_TOTAL.clone());
    register(registry, REGISTRY_HEALTH_TRANSITIONS.clone());
}

pub fn set_backend_count(count: usize) {
    REGISTRY_BACKENDS_TOTAL.set(count as i64);
}

pub fn record_call(backend: &str) {
    REGISTRY_CALLS_TOTAL.with_label_values(&[backend]).inc();
}

pub fn record_call_error(backend: &str) {
    REGISTRY_CALL_ERRORS_TOTAL
        .with_label_values(&[backend])
        .inc();
}

pub fn record_health_transition(backend: &str, state: &str) {
    REGISTRY_HEALTH_TRANSITIONS
        .with_label_values(&[backend, state])
        .inc();
}
