//! Handler for the read-only audit log tail.

use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::Json;
use inspect_db::repositories::AuditRepo;
use serde::Deserialize;

use crate::error::AppResult;
use crate::response::DataResponse;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct AuditParams {
    pub limit: Option<i64>,
}

/// GET /audit-logs
pub async fn list_audit_logs(
    State(state): State<AppState>,
    Query(params): Query<AuditParams>,
) -> AppResult<impl IntoResponse> {
    let entries = AuditRepo::tail(&state.pool, params.limit).await?;
    Ok(Json(DataResponse { data: entries }))
}
