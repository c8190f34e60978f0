pub mod api;
pub mod errors;
pub mod health;
pub mod metrics;
pub mod model;
pub mod state;

pub use api::ToolRouter;
pub use health::spawn_health_task;
pub use model::{
    AuthConfig, BackendConfig, BackendStatusSnapshot, CallOutcome, ConnState, ToolWithProvenance,
    TransportKind,
};
pub use state::BackendRegistry;
