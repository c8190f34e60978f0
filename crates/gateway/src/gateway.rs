use dashmap::DashMap;
use tokio::sync::{broadcast, oneshot};
use tracing::{debug, warn};

use toolmesh_core_types::InteractionId;

use crate::model::{Interaction, Resolution};

struct PendingInteraction {
    interaction: Interaction,
    responder: oneshot::Sender<Resolution>,
}

/// Mediates between engine tasks awaiting an answer and whatever surface
/// collects it from the user. Each interaction resolves exactly once:
/// the first of resolve / cancel / timeout wins and the rest are no-ops.
pub struct ConfirmationGateway {
    pending: DashMap<InteractionId, PendingInteraction>,
    announce: broadcast::Sender<Interaction>,
}

impl Default for ConfirmationGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfirmationGateway {
    pub fn new() -> Self {
        let (announce, _) = broadcast::channel(64);
        Self {
            pending: DashMap::new(),
            announce,
        }
    }

    /// Post an interaction and await its resolution. The configured
    /// timeout auto-resolves as `TimedOut`; the timer is dropped the
    /// moment any other resolution lands.
    pub async fn request(&self, interaction: Interaction) -> Resolution {
        let id = interaction.id.clone();
        let timeout = interaction.timeout();
        let (responder, waiter) = oneshot::channel();
        self.pending.insert(
            id.clone(),
            PendingInteraction {
                interaction: interaction.clone(),
                responder,
            },
        );
        // Nobody listening is fine; pollers use pending().
        let _ = self.announce.send(interaction);
        debug!(target: "gateway", interaction = %id, "interaction posted");

        let resolution = match timeout {
            Some(deadline) => match tokio::time::timeout(deadline, waiter).await {
                Ok(Ok(resolution)) => resolution,
                Ok(Err(_)) => Resolution::Cancelled,
                Err(_) => {
                    warn!(target: "gateway", interaction = %id, "interaction timed out");
                    Resolution::TimedOut
                }
            },
            None => waiter.await.unwrap_or(Resolution::Cancelled),
        };
        self.pending.remove(&id);
        debug!(target: "gateway", interaction = %id, ?resolution, "interaction resolved");
        resolution
    }

    /// Deliver a resolution. Returns false if the interaction is unknown
    /// or already resolved.
    pub fn resolve(&self, id: &InteractionId, resolution: Resolution) -> bool {
        match self.pending.remove(id) {
            Some((_, pending)) => pending.responder.send(resolution).is_ok(),
            None => false,
        }
    }

    /// Resolve one interaction as cancelled.
    pub fn cancel(&self, id: &InteractionId) -> bool {
        self.resolve(id, Resolution::Cancelled)
    }

    /// Resolve every outstanding interaction as cancelled. Used when a
    /// session is torn down with questions still on screen.
    pub fn cancel_all(&self) {
        let ids: Vec<InteractionId> = self
            .pending
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        for id in ids {
            self.cancel(&id);
        }
    }

    /// Outstanding interactions, for polling surfaces.
    pub fn pending(&self) -> Vec<Interaction> {
        self.pending
            .iter()
            .map(|entry| entry.value().interaction.clone())
            .collect()
    }

    /// Live feed of newly posted interactions, for push surfaces.
    pub fn subscribe(&self) -> broadcast::Receiver<Interaction> {
        self.announce.subscribe()
    }
}
