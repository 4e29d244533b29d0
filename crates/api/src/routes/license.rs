//! Route definitions for license management.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::license;
use crate::state::AppState;

/// Routes mounted at `/license`.
///
/// ```text
/// GET  /status  -> license_status
/// POST /upload  -> upload_license (multipart)
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/status", get(license::license_status))
        .route("/upload", post(license::upload_license))
}
