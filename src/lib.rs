pub mod api;
pub mod config;
pub mod error;
pub mod logic;
pub mod model;
pub mod seed;
pub mod store;

// Export API types
pub use api::routes;
pub use api::{AppContext, AppState};

// Export error types
pub use error::{AppError, AppResult};

// Export logic types
pub use logic::{
    ApiKeyOperations, BillingOperations, CertificateOperations, CourseOperations,
    EnrollmentOperations, InvitationOperations, OrganizationOperations, RateLimitOperations,
    ThemeOperations,
};

// Export all model types
pub use model::*;

// Export seed module
pub use seed::*;

// Export store types
pub use store::{MemoryStore, PostgresStore, Store};

use std::sync::Arc;

/// The full application: routes, state and the CORS layer
pub fn build_app<S: Store + 'static>(store: S, config: config::AppConfig) -> axum::Router {
    let state: AppState<S> = Arc::new(AppContext::new(store, config));
    api::routes::create_router::<S>()
        .layer(
            tower::ServiceBuilder::new().layer(tower_http::cors::CorsLayer::permissive()),
        )
        .with_state(state)
}

/// Serve `app` on the configured address until the process stops
pub async fn serve_app(app: axum::Router, config: &config::AppConfig) -> anyhow::Result<()> {
    let bind_address = config.server_address();
    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    log::info!("LMS API listening on http://{}", bind_address);
    axum::serve(listener, app).await?;
    Ok(())
}

/// Start the server from configuration; used by `main` and for integration testing
pub async fn run_server() -> anyhow::Result<()> {
    // Load environment variables from .env file if it exists
    dotenvy::dotenv().ok();

    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .filter_module("sqlx", log::LevelFilter::Warn)
        .try_init();

    let config = config::AppConfig::load()?;
    let load_seed = std::env::var("LOAD_SEED_DATA").unwrap_or_default() == "true";

    if config.use_memory_store() {
        log::warn!("Using the in-memory store; data is lost on shutdown");
        let store = MemoryStore::new();
        if load_seed {
            seed::load_seed_data(&store).await?;
        }
        return serve_app(build_app(store, config.clone()), &config).await;
    }

    log::info!("Connecting to PostgreSQL...");
    let database_url = config.database_url()?;
    let postgres_store =
        PostgresStore::new(&database_url, config.database.max_connections.unwrap_or(10)).await?;

    log::info!("Running database migrations...");
    postgres_store.migrate().await?;

    if load_seed {
        log::info!("Loading seed data...");
        seed::load_seed_data(&postgres_store).await?;
    }

    serve_app(build_app(postgres_store, config.clone()), &config).await
}
