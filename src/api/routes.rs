use axum::{
    http::HeaderValue,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};

use crate::api::handlers;
use crate::config::CorsConfig;
use crate::store::traits::Store;

pub fn create_router<S: Store + 'static>() -> Router<Arc<S>> {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Work orders
        .route(
            "/workorders",
            get(handlers::list_work_orders::<S>).post(handlers::create_work_order::<S>),
        )
        .route(
            "/workorders/MainOrders",
            get(handlers::list_main_orders::<S>),
        )
        .route(
            "/workorders/Validate",
            get(handlers::validate_order_no::<S>),
        )
        .route(
            "/workorders/SubOrders",
            post(handlers::create_sub_orders::<S>),
        )
        .route(
            "/workorders/:id",
            get(handlers::get_work_order::<S>)
                .put(handlers::update_work_order::<S>)
                .delete(handlers::delete_work_order::<S>),
        )
        .route(
            "/workorders/:id/family",
            get(handlers::get_work_order_family::<S>),
        )
}

/// Any origin unless an explicit origin list is configured
pub fn cors_layer(config: &CorsConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|origin| {
            let trimmed = origin.trim();
            if trimmed.is_empty() {
                None
            } else {
                HeaderValue::from_str(trimmed).ok()
            }
        })
        .collect();

    if origins.is_empty() {
        CorsLayer::permissive()
    } else {
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}

/// Router with state and middleware applied, ready to serve
pub fn build_app<S: Store + 'static>(store: Arc<S>, cors: &CorsConfig) -> Router {
    create_router::<S>()
        .layer(ServiceBuilder::new().layer(cors_layer(cors)))
        .with_state(store)
}
