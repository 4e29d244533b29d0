use crate::types::DbId;

/// Domain-level error taxonomy shared by all crates.
///
/// The HTTP layer maps each variant to a status code; the check engine
/// never returns these across its boundary (failures become result rows).
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: DbId },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    /// The installed license is invalid or lacks a required feature.
    #[error("License denied: {0}")]
    LicenseDenied(String),

    /// An agent call carried a missing or invalid bearer token.
    #[error("Agent unauthenticated: {0}")]
    Unauthenticated(String),

    /// An external collaborator (cluster API server, Prometheus) is down.
    #[error("Dependency unavailable: {0}")]
    Dependency(String),

    #[error("Internal error: {0}")]
    Internal(String),
}
