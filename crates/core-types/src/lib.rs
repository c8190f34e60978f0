use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Shared error taxonomy for the toolmesh kernel crates.
///
/// Planning-time variants (`UnknownTool`, `CyclicDependency`,
/// `InvalidArguments`) abort before any side effect. Call-time variants are
/// scoped to the failing call or phase and never fatal to the process.
#[derive(Debug, Error, Clone, PartialEq, Serialize, Deserialize)]
pub enum MeshError {
    #[error("unknown tool: {0}")]
    UnknownTool(String),
    #[error("cyclic dependency involving tool {0}")]
    CyclicDependency(String),
    #[error("invalid arguments for {tool}: {reason}")]
    InvalidArguments { tool: String, reason: String },
    #[error("no backend available for tool {0}")]
    NoBackendAvailable(String),
    #[error("transport error: {message}")]
    Transport { message: String, retriable: bool },
    #[error("timed out after {0}ms")]
    Timeout(u64),
    #[error("confirmation denied by user")]
    UserDenied,
    #[error("confirmation timed out")]
    ConfirmationTimeout,
    #[error("cancelled")]
    Cancelled,
    #[error("session not found: {0}")]
    SessionNotFound(String),
    #[error("{0}")]
    Internal(String),
}

impl MeshError {
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retriable: true,
        }
    }

    /// A transport failure that will repeat on every attempt, such as a
    /// rejected request or an unknown capability.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retriable: false,
        }
    }

    /// Whether retrying the same call can plausibly change the outcome.
    pub fn retriable(&self) -> bool {
        matches!(
            self,
            Self::Transport { retriable: true, .. } | Self::Timeout(_)
        )
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct CallId(pub String);

impl CallId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for CallId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct InteractionId(pub String);

impl InteractionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for InteractionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for InteractionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// User-chosen backend identifier, unique within a registry.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct BackendName(pub String);

impl BackendName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }
}

impl fmt::Display for BackendName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How a tool may be scheduled relative to other calls in the same plan.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// May share a phase with other non-conflicting parallel tools.
    Parallel,
    /// Always runs alone in its phase.
    Serial,
    /// Runs alone and forces a user confirmation before the phase starts.
    Interactive,
}

/// Static tool metadata registered with the catalog. Immutable once
/// registered.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_schema")]
    pub input_schema: serde_json::Value,
    pub execution_mode: ExecutionMode,
    #[serde(default)]
    pub category: String,
    #[serde(default = "default_priority")]
    pub priority: u8,
    #[serde(default)]
    pub requires_confirmation: bool,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub conflicts_with: Vec<String>,
    #[serde(default)]
    pub estimated_duration_ms: u64,
}

fn default_schema() -> serde_json::Value {
    serde_json::json!({ "type": "object" })
}

fn default_priority() -> u8 {
    5
}

impl ToolSpec {
    pub fn new(name: impl Into<String>, execution_mode: ExecutionMode) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            input_schema: default_schema(),
            execution_mode,
            category: String::new(),
            priority: default_priority(),
            requires_confirmation: false,
            dependencies: Vec::new(),
            conflicts_with: Vec::new(),
            estimated_duration_ms: 0,
        }
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_dependencies(mut self, deps: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.dependencies = deps.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_conflicts(
        mut self,
        conflicts: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.conflicts_with = conflicts.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_confirmation(mut self) -> Self {
        self.requires_confirmation = true;
        self
    }

    pub fn with_schema(mut self, schema: serde_json::Value) -> Self {
        self.input_schema = schema;
        self
    }

    pub fn with_duration_ms(mut self, estimate: u64) -> Self {
        self.estimated_duration_ms = estimate;
        self
    }
}

/// A requested tool invocation, created fresh per request.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolCall {
    pub call_id: CallId,
    pub tool: String,
    #[serde(default)]
    pub backend_hint: Option<BackendName>,
    #[serde(default)]
    pub args: serde_json::Value,
    #[serde(default)]
    pub rationale: Option<String>,
    #[serde(default)]
    pub confirmation_message: Option<String>,
}

impl ToolCall {
    pub fn new(tool: impl Into<String>) -> Self {
        Self {
            call_id: CallId::new(),
            tool: tool.into(),
            backend_hint: None,
            args: serde_json::Value::Null,
            rationale: None,
            confirmation_message: None,
        }
    }

    pub fn with_args(mut self, args: serde_json::Value) -> Self {
        self.args = args;
        self
    }

    pub fn with_backend_hint(mut self, backend: BackendName) -> Self {
        self.backend_hint = Some(backend);
        self
    }
}

/// Tool advertisement as reported by a backend's `list_tools`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_schema", rename = "inputSchema")]
    pub input_schema: serde_json::Value,
}

/// Result payload of a backend `call_tool` invocation.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ToolContent {
    pub content: serde_json::Value,
    #[serde(default, rename = "isError")]
    pub is_error: bool,
}
