//! Handlers for license status and upload.

use axum::extract::{Multipart, State};
use axum::response::IntoResponse;
use axum::Json;
use inspect_core::audit::{actions, entities};
use inspect_core::error::CoreError;

use crate::engine;
use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

/// GET /license/status
pub async fn license_status(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    Ok(Json(DataResponse {
        data: state.license.status(),
    }))
}

/// POST /license/upload
///
/// Multipart `file` upload of a license blob; verified before it replaces
/// the installed one.
pub async fn upload_license(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> AppResult<impl IntoResponse> {
    let mut blob: Option<String> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("Invalid multipart body: {e}")))?
    {
        if matches!(field.name(), Some("file") | Some("license")) {
            let text = field
                .text()
                .await
                .map_err(|e| AppError::BadRequest(format!("Cannot read upload: {e}")))?;
            blob = Some(text);
        }
    }
    let blob = blob.ok_or(AppError::Core(CoreError::Validation(
        "A license file upload is required.".into(),
    )))?;

    let status = state.license.install(&blob)?;

    engine::audit_system(
        &state.pool,
        actions::LICENSE_IMPORTED,
        entities::LICENSE,
        None,
        format!(
            "License installed (licensee: {})",
            status.licensee.as_deref().unwrap_or("unknown")
        ),
    )
    .await;

    Ok(Json(DataResponse { data: status }))
}
