//! Route definitions for inspection item management.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::items;
use crate::state::AppState;

/// Routes mounted at `/inspection-items`.
///
/// ```text
/// GET    /         -> list_items
/// POST   /         -> create_item
/// GET    /export   -> export_items
/// POST   /import   -> import_items (multipart)
/// GET    /{id}     -> get_item
/// PUT    /{id}     -> update_item
/// DELETE /{id}     -> delete_item
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(items::list_items).post(items::create_item))
        .route("/export", get(items::export_items))
        .route("/import", post(items::import_items))
        .route(
            "/{id}",
            get(items::get_item)
                .put(items::update_item)
                .delete(items::delete_item),
        )
}
