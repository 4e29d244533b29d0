//! Route definitions for inspection runs.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::runs;
use crate::state::AppState;

/// Routes mounted at `/inspection-runs`.
///
/// ```text
/// GET    /              -> list_runs
/// POST   /              -> create_run
/// GET    /{id}          -> get_run
/// DELETE /{id}          -> delete_run (?delete_files=bool)
/// POST   /{id}/cancel   -> cancel_run
/// GET    /{id}/report   -> download_report (?format=pdf|md)
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(runs::list_runs).post(runs::create_run))
        .route("/{id}", get(runs::get_run).delete(runs::delete_run))
        .route("/{id}/cancel", post(runs::cancel_run))
        .route("/{id}/report", get(runs::download_report))
}
