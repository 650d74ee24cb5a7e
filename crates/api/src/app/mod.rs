//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: the family application service and storage wiring
//! - `routes/`: HTTP routes + handlers
//! - `dto.rs`: request/response DTOs and JSON mapping helpers
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{routing::get, Extension, Router};
use tower::ServiceBuilder;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

use services::FamilyService;

/// Build the full HTTP router (public entrypoint used by `main.rs`).
pub fn build_app(service: Arc<FamilyService>) -> Router {
    Router::new()
        .route("/health", get(routes::system::health))
        .merge(routes::router())
        .layer(ServiceBuilder::new().layer(Extension(service)))
}
