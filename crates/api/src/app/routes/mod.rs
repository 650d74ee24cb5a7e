use axum::{routing::get, Router};

pub mod families;
pub mod system;

/// Router for all family endpoints.
pub fn router() -> Router {
    Router::new()
        .nest("/families", families::router())
        .route("/parents/:parent_id/families", get(families::find_by_parent))
        .route("/children/:child_id/family", get(families::find_by_child))
}
