//! Cluster entity models and DTOs.

use inspect_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `clusters` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Cluster {
    pub id: DbId,
    pub name: String,
    /// Path of the stored kubeconfig blob under the data directory.
    pub kubeconfig_path: String,
    pub prometheus_url: Option<String>,
    /// JSON array of kubeconfig context names.
    pub contexts_json: Option<String>,
    pub connection_status: String,
    pub connection_message: Option<String>,
    pub kubernetes_version: Option<String>,
    pub node_count: Option<i64>,
    pub last_checked_at: Option<Timestamp>,
    pub execution_mode: String,
    pub default_agent_id: Option<DbId>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Cluster {
    /// Context names parsed from the stored JSON array.
    pub fn contexts(&self) -> Vec<String> {
        self.contexts_json
            .as_deref()
            .and_then(|raw| serde_json::from_str(raw).ok())
            .unwrap_or_default()
    }
}

/// Fields for inserting a new cluster.
#[derive(Debug, Clone)]
pub struct CreateCluster {
    pub name: String,
    pub kubeconfig_path: String,
    pub prometheus_url: Option<String>,
    pub contexts_json: Option<String>,
    pub execution_mode: String,
    pub default_agent_id: Option<DbId>,
}

/// Optional-field update for a cluster; `None` leaves a column untouched.
#[derive(Debug, Clone, Default)]
pub struct UpdateCluster {
    pub name: Option<String>,
    pub kubeconfig_path: Option<String>,
    pub prometheus_url: Option<Option<String>>,
    pub contexts_json: Option<String>,
    pub execution_mode: Option<String>,
    pub default_agent_id: Option<Option<DbId>>,
}

/// Probe result recorded onto a cluster row.
#[derive(Debug, Clone)]
pub struct ConnectionRecord {
    pub connection_status: String,
    pub connection_message: Option<String>,
    pub kubernetes_version: Option<String>,
    pub node_count: Option<i64>,
    pub last_checked_at: Timestamp,
}
