pub mod api;
pub mod engine;
pub mod metrics;
pub mod model;
pub mod session;

pub use api::EngineService;
pub use engine::TaskExecutionEngine;
pub use model::{CallState, CallStatus, EngineConfig, ProgressSummary, SessionStatus};
