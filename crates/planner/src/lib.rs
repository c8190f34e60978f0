pub mod model;
pub mod planner;

pub use model::{ExecutionPhase, ExecutionPlan, PhaseMode};
pub use planner::ExecutionPlanner;
