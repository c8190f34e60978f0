use thiserror::Error;

use toolmesh_core_types::MeshError;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("backend already registered")]
    AlreadyRegistered,
    #[error("backend not found")]
    NotFound,
    #[error("connectivity probe failed")]
    ProbeFailed,
    #[error("internal error")]
    Internal,
}

impl RegistryError {
    pub fn into_mesh_error(self, detail: impl Into<String>) -> MeshError {
        let message = format!("{}: {}", self, detail.into());
        MeshError::internal(message)
    }
}
