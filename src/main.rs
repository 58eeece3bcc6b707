use smartmes_api::api::build_app;
use smartmes_api::config::AppConfig;
use smartmes_api::serve_app;
use smartmes_api::store::{InMemoryStore, PostgresStore};
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if it exists
    dotenvy::dotenv().ok();

    // Initialize logging with explicit filter to suppress sqlx debug logs
    use env_logger::Builder;
    use log::LevelFilter;

    Builder::new()
        .filter_level(LevelFilter::Info)
        .filter_module("sqlx", LevelFilter::Warn)
        .parse_default_env()
        .init();

    println!("SmartMES: manufacturing execution API");

    // Load configuration
    let config = AppConfig::load()?;
    println!(
        "Configuration loaded: server={}:{}",
        config.server.host, config.server.port
    );

    if config.database.in_memory {
        println!("Using in-memory store (data is not persisted)");
        let app = build_app(Arc::new(InMemoryStore::new()), &config.cors);
        return serve_app(app, &config).await;
    }

    println!("Connecting to PostgreSQL...");
    let database_url = config.database_url()?;
    let store = PostgresStore::new(&database_url, config.max_connections()).await?;
    println!("Database ready");

    serve_app(build_app(Arc::new(store), &config.cors), &config).await
}
