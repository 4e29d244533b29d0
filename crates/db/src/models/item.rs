//! Inspection item entity models and DTOs.

use inspect_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A row from the `inspection_items` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct InspectionItem {
    pub id: DbId,
    pub name: String,
    pub description: Option<String>,
    pub check_type: String,
    /// Free-form JSON config; validated per kind at evaluation time.
    pub config_json: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl InspectionItem {
    /// Parsed config object; malformed or absent config reads as `{}`.
    pub fn config(&self) -> serde_json::Value {
        self.config_json
            .as_deref()
            .and_then(|raw| serde_json::from_str(raw).ok())
            .unwrap_or_else(|| serde_json::json!({}))
    }
}

/// DTO for `POST /inspection-items` and the import payload.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateItem {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub check_type: String,
    #[serde(default)]
    pub config: Option<serde_json::Value>,
}

/// DTO for `PUT /inspection-items/:id`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateItem {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub check_type: Option<String>,
    #[serde(default)]
    pub config: Option<serde_json::Value>,
}
