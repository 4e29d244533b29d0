//! Inspection result entity models.

use inspect_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A row from the `inspection_results` table.
///
/// `item_id` goes null when the referenced item is deleted; `item_name`
/// is the snapshot taken at run admission and survives such deletions.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct InspectionResult {
    pub id: DbId,
    pub run_id: DbId,
    pub item_id: Option<DbId>,
    pub item_name: String,
    pub status: String,
    pub detail: Option<String>,
    pub suggestion: Option<String>,
    pub created_at: Timestamp,
}

/// Fields for inserting one result row.
#[derive(Debug, Clone)]
pub struct CreateResult {
    pub run_id: DbId,
    pub item_id: Option<DbId>,
    pub item_name: String,
    pub status: String,
    pub detail: Option<String>,
    pub suggestion: Option<String>,
}

/// One element of an agent's result submission batch.
#[derive(Debug, Clone, Deserialize)]
pub struct SubmittedResult {
    pub item_id: DbId,
    pub status: String,
    #[serde(default)]
    pub detail: Option<String>,
    #[serde(default)]
    pub suggestion: Option<String>,
}
