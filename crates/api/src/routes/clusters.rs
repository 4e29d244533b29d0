//! Route definitions for cluster management.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::clusters;
use crate::state::AppState;

/// Routes mounted at `/clusters`.
///
/// ```text
/// GET    /                      -> list_clusters
/// POST   /                      -> create_cluster (multipart)
/// GET    /{id}                  -> get_cluster
/// PUT    /{id}                  -> update_cluster (multipart)
/// DELETE /{id}                  -> delete_cluster (?delete_files=bool)
/// POST   /{id}/test-connection  -> test_connection
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(clusters::list_clusters).post(clusters::create_cluster))
        .route(
            "/{id}",
            get(clusters::get_cluster)
                .put(clusters::update_cluster)
                .delete(clusters::delete_cluster),
        )
        .route("/{id}/test-connection", post(clusters::test_connection))
}
