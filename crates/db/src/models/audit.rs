//! Audit log entity models.
//!
//! Audit entries are append-only and immutable once created (no
//! `updated_at`).

use inspect_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A single audit log entry.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct AuditLog {
    pub id: DbId,
    pub actor: String,
    pub action: String,
    pub entity_type: String,
    pub entity_id: Option<DbId>,
    pub detail: Option<String>,
    pub created_at: Timestamp,
}

/// Fields for appending a new audit entry.
#[derive(Debug, Clone)]
pub struct CreateAuditLog {
    pub actor: String,
    pub action: String,
    pub entity_type: String,
    pub entity_id: Option<DbId>,
    pub detail: Option<String>,
}
