pub mod gateway;
pub mod model;

pub use gateway::ConfirmationGateway;
pub use model::{Interaction, InteractionKind, Resolution};
