//! Route definitions for the agent plane.
//!
//! Registration and listing are operator-facing; the `{id}`-scoped
//! routes are bearer-token-authenticated via the `AuthedAgent` extractor.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::agents;
use crate::state::AppState;

/// Routes mounted at `/agents`.
///
/// ```text
/// GET    /                -> list_agents
/// POST   /                -> register_agent (returns one-time token)
/// DELETE /{id}            -> delete_agent
/// POST   /{id}/heartbeat  -> heartbeat           (bearer)
/// GET    /{id}/tasks      -> pull_tasks          (bearer)
/// POST   /{id}/results    -> submit_results      (bearer)
/// POST   /{id}/failures   -> report_run_failure  (bearer)
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(agents::list_agents).post(agents::register_agent))
        .route("/{id}", axum::routing::delete(agents::delete_agent))
        .route("/{id}/heartbeat", post(agents::heartbeat))
        .route("/{id}/tasks", get(agents::pull_tasks))
        .route("/{id}/results", post(agents::submit_results))
        .route("/{id}/failures", post(agents::report_run_failure))
}
