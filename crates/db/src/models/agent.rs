//! Inspection agent entity models and DTOs.

use inspect_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A row from the `inspection_agents` table.
///
/// `token_hash` never leaves the repository layer in API responses; the
/// plaintext token exists only in the registration response.
#[derive(Debug, Clone, FromRow)]
pub struct InspectionAgent {
    pub id: DbId,
    pub name: String,
    pub cluster_id: Option<DbId>,
    pub description: Option<String>,
    pub is_enabled: bool,
    pub prometheus_url: Option<String>,
    pub token_hash: String,
    pub last_seen_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// Token-free view of an agent, safe to serialise in API responses.
#[derive(Debug, Clone, Serialize)]
pub struct AgentView {
    pub id: DbId,
    pub name: String,
    pub cluster_id: Option<DbId>,
    pub description: Option<String>,
    pub is_enabled: bool,
    pub prometheus_url: Option<String>,
    pub last_seen_at: Option<Timestamp>,
    pub created_at: Timestamp,
}

impl From<InspectionAgent> for AgentView {
    fn from(agent: InspectionAgent) -> Self {
        AgentView {
            id: agent.id,
            name: agent.name,
            cluster_id: agent.cluster_id,
            description: agent.description,
            is_enabled: agent.is_enabled,
            prometheus_url: agent.prometheus_url,
            last_seen_at: agent.last_seen_at,
            created_at: agent.created_at,
        }
    }
}

/// DTO for `POST /agents`.
#[derive(Debug, Clone, Deserialize)]
pub struct RegisterAgent {
    pub name: String,
    #[serde(default)]
    pub cluster_id: Option<DbId>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub prometheus_url: Option<String>,
}
