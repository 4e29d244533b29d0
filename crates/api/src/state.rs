use std::sync::Arc;

use inspect_core::license::LicenseManager;

use crate::config::ServerConfig;
use crate::engine::registry::RunRegistry;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc` or is already `Clone`).
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub pool: inspect_db::DbPool,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Installed license and feature gate.
    pub license: Arc<LicenseManager>,
    /// Cancellation flags of in-flight server-executor runs.
    pub runs: Arc<RunRegistry>,
}
