use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use toolmesh_core_types::{ToolContent, ToolDescriptor};

use crate::api::ToolTransport;
use crate::error::{TransportError, TransportErrorKind};

/// Request/response adapter speaking `POST {endpoint}/tools/list` and
/// `POST {endpoint}/tools/call {name, arguments}`.
pub struct HttpTransport {
    endpoint: String,
    client: reqwest::Client,
    bearer_token: Option<String>,
}

#[derive(Deserialize)]
struct ListToolsBody {
    #[serde(default)]
    tools: Vec<ToolDescriptor>,
}

impl HttpTransport {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| {
                TransportError::new(TransportErrorKind::Internal).with_hint(err.to_string())
            })?;
        Ok(Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            client,
            bearer_token: None,
        })
    }

    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    async fn post(&self, path: &str, body: Value) -> Result<Value, TransportError> {
        let url = format!("{}{}", self.endpoint, path);
        let mut request = self.client.post(&url).json(&body);
        if let Some(token) = &self.bearer_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(map_reqwest_error)?;
        let status = response.status();
        if !status.is_success() {
            let retriable = status.is_server_error();
            return Err(TransportError::new(TransportErrorKind::Remote)
                .with_hint(format!("{url} returned {status}"))
                .retriable(retriable));
        }

        response.json().await.map_err(|err| {
            TransportError::new(TransportErrorKind::Protocol).with_hint(err.to_string())
        })
    }
}

fn map_reqwest_error(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::new(TransportErrorKind::Timeout).with_hint(err.to_string())
    } else if err.is_connect() {
        TransportError::new(TransportErrorKind::Connect).with_hint(err.to_string())
    } else {
        TransportError::new(TransportErrorKind::Io).with_hint(err.to_string())
    }
}

#[async_trait]
impl ToolTransport for HttpTransport {
    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, TransportError> {
        let body = self.post("/tools/list", json!({})).await?;
        let parsed: ListToolsBody = serde_json::from_value(body).map_err(|err| {
            TransportError::new(TransportErrorKind::Protocol).with_hint(err.to_string())
        })?;
        debug!(target: "transport", endpoint = %self.endpoint, count = parsed.tools.len(), "listed tools over http");
        Ok(parsed.tools)
    }

    async fn call_tool(&self, name: &str, args: Value) -> Result<ToolContent, TransportError> {
        let body = self
            .post("/tools/call", json!({ "name": name, "arguments": args }))
            .await?;
        serde_json::from_value(body).map_err(|err| {
            TransportError::new(TransportErrorKind::Protocol).with_hint(err.to_string())
        })
    }
}
