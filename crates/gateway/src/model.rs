use std::time::Duration;

use serde::{Deserialize, Serialize};

use toolmesh_core_types::InteractionId;

/// What kind of answer the interaction expects from the user.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InteractionKind {
    Confirmation,
    Selection,
    FreeText,
}

/// A question posed to the user, awaited by exactly one engine task.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Interaction {
    pub id: InteractionId,
    pub kind: InteractionKind,
    pub prompt: String,
    #[serde(default)]
    pub options: Vec<String>,
    /// Milliseconds until the interaction auto-resolves as `TimedOut`.
    /// `None` waits indefinitely.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

impl Interaction {
    pub fn confirmation(prompt: impl Into<String>) -> Self {
        Self {
            id: InteractionId::new(),
            kind: InteractionKind::Confirmation,
            prompt: prompt.into(),
            options: Vec::new(),
            timeout_ms: None,
        }
    }

    pub fn selection(
        prompt: impl Into<String>,
        options: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            id: InteractionId::new(),
            kind: InteractionKind::Selection,
            prompt: prompt.into(),
            options: options.into_iter().map(Into::into).collect(),
            timeout_ms: None,
        }
    }

    pub fn free_text(prompt: impl Into<String>) -> Self {
        Self {
            id: InteractionId::new(),
            kind: InteractionKind::FreeText,
            prompt: prompt.into(),
            options: Vec::new(),
            timeout_ms: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

/// Terminal outcome of an interaction. Exactly one of these is ever
/// delivered per interaction.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resolution {
    Confirmed,
    Denied,
    Selected(String),
    Text(String),
    TimedOut,
    Cancelled,
}

impl Resolution {
    /// Whether the gated work may proceed.
    pub fn approved(&self) -> bool {
        matches!(self, Self::Confirmed | Self::Selected(_) | Self::Text(_))
    }
}
