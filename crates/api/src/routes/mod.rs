pub mod agents;
pub mod audit;
pub mod clusters;
pub mod health;
pub mod items;
pub mod license;
pub mod runs;

use axum::Router;

use crate::state::AppState;

/// All resource routes, mounted at the root.
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/clusters", clusters::router())
        .nest("/inspection-items", items::router())
        .nest("/inspection-runs", runs::router())
        .nest("/agents", agents::router())
        .nest("/license", license::router())
        .nest("/audit-logs", audit::router())
}
