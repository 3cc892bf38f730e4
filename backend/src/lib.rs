pub mod builder;
pub mod cache;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod keys;
pub mod models;
pub mod pending;
pub mod route_handlers;
pub mod routing;
pub mod service;
pub mod stream;
pub mod upstream;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

use std::sync::Arc;

use axum::{routing::get, Router};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::service::RouteService;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<RouteService>,
}

pub fn create_router(state: AppState) -> Router {
    // The tracker frontend is served from another origin
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route(
            "/api/routing",
            get(route_handlers::cache_stats)
                .post(route_handlers::compute_route)
                .delete(route_handlers::evict_cache),
        )
        .route("/health", get(route_handlers::health))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
