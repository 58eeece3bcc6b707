pub mod api;
pub mod config;
pub mod logic;
pub mod model;
pub mod store;

// Export API types
pub use api::handlers;
pub use api::routes;

// Export logic types
pub use logic::{
    check_placement, check_update, derive_workshop, releases_split, resolve_family, validate_split,
    FamilyResolution, HierarchyError, IntegrityWarning, ReferenceError, SplitRejection,
};

// Export all model types
pub use model::*;

// Export store types
pub use store::{DeleteOutcome, InMemoryStore, PostgresStore, SplitOutcome, Store, UpdateOutcome};

/// Bind the configured address and serve `app` until the process stops
pub async fn serve_app(app: axum::Router, config: &crate::config::AppConfig) -> anyhow::Result<()> {
    use tokio::net::TcpListener;

    let bind_address = config.server_address();
    let listener = TcpListener::bind(&bind_address).await?;
    log::info!("SmartMES API listening on http://{}", bind_address);

    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_router_builds_without_route_conflicts() {
        // axum panics on overlapping routes at construction time
        let _router = api::routes::create_router::<InMemoryStore>();
    }

    #[test]
    fn test_build_app_with_restricted_cors() {
        let cors = crate::config::CorsConfig {
            allowed_origins: vec!["http://mes.local".to_string(), " ".to_string()],
        };
        let _app = api::build_app(std::sync::Arc::new(InMemoryStore::new()), &cors);
    }
}
