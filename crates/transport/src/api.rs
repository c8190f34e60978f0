use async_trait::async_trait;
use serde_json::Value;

use toolmesh_core_types::{ToolContent, ToolDescriptor};

use crate::error::{TransportError, TransportErrorKind};

/// Uniform invocation surface over heterogeneous wire protocols.
///
/// The registry and engine stay agnostic to the concrete framing; adapters
/// implement this trait over request/response HTTP, a persistent WebSocket
/// connection, or an in-process capability table.
#[async_trait]
pub trait ToolTransport: Send + Sync {
    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, TransportError>;
    async fn call_tool(&self, name: &str, args: Value) -> Result<ToolContent, TransportError>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct NoopTransport;

#[async_trait]
impl ToolTransport for NoopTransport {
    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, TransportError> {
        Ok(Vec::new())
    }

    async fn call_tool(&self, name: &str, _args: Value) -> Result<ToolContent, TransportError> {
        Err(TransportError::new(TransportErrorKind::Internal)
            .with_hint(format!("transport not available for tool {name}")))
    }
}
