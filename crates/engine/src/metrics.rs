use once_cell::sync::Lazy;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Default)]
struct Counters {
    submitted: AtomicU64,
    started: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    cancelled: AtomicU64,
    confirmations_requested: AtomicU64,
    confirmations_denied: AtomicU64,
}

static COUNTERS: Lazy<Counters> = Lazy::new(Counters::default);

fn increment(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

pub fn record_submitted(calls: usize) {
    COUNTERS.submitted.fetch_add(calls as u64, Ordering::Relaxed);
}

pub fn record_started(_tool: &str) {
    increment(&COUNTERS.started);
}

pub fn record_completed(_tool: &str) {
    increment(&COUNTERS.completed);
}

pub fn record_failed(_tool: &str) {
    increment(&COUNTERS.failed);
}

pub fn record_cancelled() {
    increment(&COUNTERS.cancelled);
}

pub fn record_confirmation_requested() {
    increment(&COUNTERS.confirmations_requested);
}

pub fn record_confirmation_denied() {
    increment(&COUNTERS.confirmations_denied);
}

#[derive(Clone, Debug, Default)]
pub struct EngineMetricsSnapshot {
    pub submitted: u64,
    pub started: u64,
    pub completed: u64,
    pub failed: u64,
    pub cancelled: u64,
    pub confirmations_requested: u64,
    pub confirmations_denied: u64,
}

pub fn snapshot() -> EngineMetricsSnapshot {
    EngineMetricsSnapshot {
        submitted: COUNTERS.submitted.load(Ordering::Relaxed),
        started: COUNTERS.started.load(Ordering::Relaxed),
        completed: COUNTERS.completed.load(Ordering::Relaxed),
        failed: COUNTERS.failed.load(Ordering::Relaxed),
        cancelled: COUNTERS.cancelled.load(Ordering::Relaxed),
        confirmations_requested: COUNTERS.confirmations_requested.load(Ordering::Relaxed),
        confirmations_denied: COUNTERS.confirmations_denied.load(Ordering::Relaxed),
    }
}
