use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::debug;

use crate::ToolRouter;

/// Spawn the periodic health sweep. The loop runs until the returned
/// handle is aborted; missed ticks are skipped rather than bunched.
pub fn spawn_health_task<R>(router: Arc<R>, interval: Duration) -> JoinHandle<()>
where
    R: ToolRouter + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // The first tick fires immediately; skip it so freshly registered
        // backends are not probed twice in a row.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            debug!(target: "registry", "running health sweep");
            router.health_check().await;
        }
    })
}
