use content_portal::{
    AppState, DiskStorage, PostgresRepository, StorageState, TokenStore,
    config::{AppConfig, Env},
    create_router, ensure_admin_user,
    repository::RepositoryState,
    storage::StorageService,
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// main
///
/// The asynchronous entry point for the application, responsible for
/// initializing all core components: Configuration, Logging, Database,
/// Storage, and the HTTP Server.
#[tokio::main]
async fn main() {
    // 1. Configuration & Environment Loading (Fail-Fast)
    dotenv::dotenv().ok();
    let config = AppConfig::load();

    // 2. Logging Filter Setup
    // Prioritizes RUST_LOG, falling back to sensible defaults for local
    // development.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "content_portal=debug,tower_http=info,axum=trace".into());

    // 3. Initialize Logging based on Environment
    match config.env {
        Env::Local => {
            // LOCAL: pretty output for human readability during debugging.
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
        Env::Production => {
            // PROD: JSON output for ingestion by centralized log aggregators.
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
    }

    tracing::info!("Application starting in {:?} mode", config.env);

    // 4. Database Initialization (Postgres)
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.db_url)
        .await
        .expect("FATAL: Failed to connect to Postgres. Check DATABASE_URL.");

    // Instantiate the Repository, wrapping it in an Arc for thread-safe sharing.
    let repo = Arc::new(PostgresRepository::new(pool)) as RepositoryState;

    // 5. Storage Initialization (image file store)
    let disk = DiskStorage::new(config.upload_dir.clone());
    disk.ensure_root_exists()
        .await
        .expect("FATAL: Failed to create the upload directory.");
    let storage = Arc::new(disk) as StorageState;

    // 6. Token Store
    let tokens = TokenStore::new(repo.clone(), config.token_ttl_hours);

    // Bootstrap: make a fresh local database usable.
    if let Err(e) = ensure_admin_user(&repo, &config).await {
        tracing::error!("admin bootstrap failed: {:?}", e);
    }

    // 7. Unified State Assembly
    let app_state = AppState {
        repo,
        storage,
        tokens,
        config: config.clone(),
    };

    // 8. Router and Server Startup
    let app = create_router(app_state);

    let listener = TcpListener::bind(("0.0.0.0", config.port)).await.unwrap();

    tracing::info!("HTTP server bound successfully.");
    tracing::info!("Listening on 0.0.0.0:{}", config.port);
    tracing::info!(
        "API Documentation (Swagger UI) available at: http://localhost:{}/swagger-ui",
        config.port
    );

    // The long-running Axum server process.
    axum::serve(listener, app).await.unwrap();
}
