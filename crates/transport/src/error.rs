use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use toolmesh_core_types::MeshError;

/// High-level failure categories surfaced by a transport adapter.
#[derive(Clone, Debug, Error, Serialize, Deserialize)]
pub enum TransportErrorKind {
    #[error("connection failed")]
    Connect,
    #[error("i/o failure")]
    Io,
    #[error("request timed out")]
    Timeout,
    #[error("protocol violation")]
    Protocol,
    #[error("backend reported an error")]
    Remote,
    #[error("internal error")]
    Internal,
}

/// Enriched error metadata passed back to the registry and engine.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub hint: Option<String>,
    pub retriable: bool,
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(hint) = &self.hint {
            write!(f, ": {}", hint)?;
        }
        Ok(())
    }
}

impl std::error::Error for TransportError {}

impl TransportError {
    pub fn new(kind: TransportErrorKind) -> Self {
        let retriable = matches!(
            kind,
            TransportErrorKind::Connect | TransportErrorKind::Io | TransportErrorKind::Timeout
        );
        Self {
            kind,
            hint: None,
            retriable,
        }
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn retriable(mut self, flag: bool) -> Self {
        self.retriable = flag;
        self
    }
}

impl From<TransportError> for MeshError {
    fn from(value: TransportError) -> Self {
        match value.kind {
            TransportErrorKind::Timeout => MeshError::Timeout(0),
            _ if value.retriable => MeshError::transport(value.to_string()),
            _ => MeshError::transport_fatal(value.to_string()),
        }
    }
}
