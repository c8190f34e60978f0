use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use parking_lot::RwLock;
use serde_json::Value;

use toolmesh_core_types::{ToolContent, ToolDescriptor};

use crate::api::ToolTransport;
use crate::error::{TransportError, TransportErrorKind};

/// Async handler for an in-process capability.
pub type LocalHandler =
    Arc<dyn Fn(Value) -> BoxFuture<'static, Result<ToolContent, TransportError>> + Send + Sync>;

/// In-process transport for local capabilities. Also the workhorse of the
/// test suites: handlers can be plain closures returning canned results.
#[derive(Default)]
pub struct LocalTransport {
    handlers: RwLock<HashMap<String, (ToolDescriptor, LocalHandler)>>,
}

impl LocalTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, descriptor: ToolDescriptor, handler: LocalHandler) {
        self.handlers
            .write()
            .insert(descriptor.name.clone(), (descriptor, handler));
    }

    /// Convenience wrapper for handlers that are synchronous functions.
    pub fn register_fn<F>(&self, descriptor: ToolDescriptor, handler: F)
    where
        F: Fn(Value) -> Result<ToolContent, TransportError> + Send + Sync + 'static,
    {
        let handler = Arc::new(handler);
        self.register(
            descriptor,
            Arc::new(move |args| {
                let handler = Arc::clone(&handler);
                Box::pin(async move { handler(args) })
            }),
        );
    }
}

#[async_trait]
impl ToolTransport for LocalTransport {
    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, TransportError> {
        let mut tools: Vec<ToolDescriptor> = self
            .handlers
            .read()
            .values()
            .map(|(descriptor, _)| descriptor.clone())
            .collect();
        tools.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(tools)
    }

    async fn call_tool(&self, name: &str, args: Value) -> Result<ToolContent, TransportError> {
        let handler = {
            let guard = self.handlers.read();
            guard.get(name).map(|(_, handler)| Arc::clone(handler))
        };
        match handler {
            Some(handler) => handler(args).await,
            None => Err(TransportError::new(TransportErrorKind::Remote)
                .with_hint(format!("local capability {name} not registered"))
                .retriable(false)),
        }
    }
}
