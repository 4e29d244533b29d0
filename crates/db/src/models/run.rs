//! Inspection run entity models and DTOs.

use inspect_core::item::ItemSnapshot;
use inspect_core::status::RunStatus;
use inspect_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A row from the `inspection_runs` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct InspectionRun {
    pub id: DbId,
    pub cluster_id: DbId,
    pub operator: Option<String>,
    pub status: String,
    pub executor: String,
    pub agent_id: Option<DbId>,
    /// Agent-side phase; only set when `executor = 'agent'`.
    pub agent_status: Option<String>,
    pub total_items: i64,
    pub processed_items: i64,
    /// `round(100 * processed / total)`, frozen at terminal status.
    pub progress: i64,
    pub summary: Option<String>,
    pub report_path: Option<String>,
    /// Frozen item snapshots in submission order.
    pub plan_json: String,
    pub created_at: Timestamp,
    pub started_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
    pub lease_expires_at: Option<Timestamp>,
}

impl InspectionRun {
    /// The item plan snapshotted at admission, in submission order.
    pub fn plan(&self) -> Vec<ItemSnapshot> {
        serde_json::from_str(&self.plan_json).unwrap_or_default()
    }

    pub fn run_status(&self) -> Option<RunStatus> {
        RunStatus::parse(&self.status)
    }

    pub fn is_terminal(&self) -> bool {
        self.run_status().map(RunStatus::is_terminal).unwrap_or(false)
    }
}

/// Fields for inserting a new run.
#[derive(Debug, Clone)]
pub struct CreateRun {
    pub cluster_id: DbId,
    pub operator: Option<String>,
    pub executor: String,
    pub agent_id: Option<DbId>,
    pub agent_status: Option<String>,
    pub total_items: i64,
    pub plan_json: String,
}

/// Run list row with the cluster name joined in.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct RunListRow {
    pub id: DbId,
    pub cluster_id: DbId,
    pub cluster_name: String,
    pub operator: Option<String>,
    pub status: String,
    pub executor: String,
    pub agent_id: Option<DbId>,
    pub agent_status: Option<String>,
    pub total_items: i64,
    pub processed_items: i64,
    pub progress: i64,
    pub summary: Option<String>,
    pub report_path: Option<String>,
    pub created_at: Timestamp,
    pub started_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
}

/// DTO for `POST /inspection-runs`.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateRunRequest {
    pub cluster_id: DbId,
    pub item_ids: Vec<DbId>,
    #[serde(default)]
    pub operator: Option<String>,
}
