use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use toolmesh_core_types::{BackendName, ToolContent, ToolDescriptor};

/// Wire protocol a backend speaks.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    Http,
    WebSocket,
    Local,
}

/// Authentication material attached to outbound requests.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub bearer_token: Option<String>,
}

/// Persisted description of a backend. The only state that survives a
/// process restart.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BackendConfig {
    pub name: BackendName,
    #[serde(default)]
    pub display_name: String,
    pub transport: TransportKind,
    pub endpoint: String,
    #[serde(default)]
    pub auth: Option<AuthConfig>,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,
    #[serde(default = "default_backend_priority")]
    pub priority: u8,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_retry_count() -> u32 {
    1
}

fn default_backend_priority() -> u8 {
    5
}

fn default_enabled() -> bool {
    true
}

impl BackendConfig {
    pub fn new(
        name: impl Into<String>,
        transport: TransportKind,
        endpoint: impl Into<String>,
    ) -> Self {
        let name = name.into();
        Self {
            display_name: name.clone(),
            name: BackendName(name),
            transport,
            endpoint: endpoint.into(),
            auth: None,
            timeout_ms: default_timeout_ms(),
            retry_count: default_retry_count(),
            priority: default_backend_priority(),
            enabled: default_enabled(),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_retry_count(mut self, retries: u32) -> Self {
        self.retry_count = retries;
        self
    }
}

/// Connectivity state as of the last probe or call.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnState {
    Connected,
    Connecting,
    Disconnected,
    Error,
}

/// Point-in-time view of a connection, for status surfaces.
#[derive(Clone, Debug)]
pub struct BackendStatusSnapshot {
    pub name: BackendName,
    pub display_name: String,
    pub state: ConnState,
    pub priority: u8,
    pub latency_ms: u64,
    pub success_count: u64,
    pub error_count: u64,
    pub last_seen: Option<Instant>,
    pub tool_count: usize,
}

/// A tool advertisement annotated with the backend that provides it.
/// Unhealthy backends stay listed (with their state) even though routing
/// skips them.
#[derive(Clone, Debug)]
pub struct ToolWithProvenance {
    pub descriptor: ToolDescriptor,
    pub backend: BackendName,
    pub backend_state: ConnState,
    pub backend_priority: u8,
    pub success_rate: f64,
}

/// Result of a routed call, naming the backend that actually served it.
#[derive(Clone, Debug)]
pub struct CallOutcome {
    pub content: ToolContent,
    pub backend: BackendName,
    pub latency_ms: u64,
}
