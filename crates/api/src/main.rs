// OrgDB API Server
// Organization provisioning over shared and dedicated MongoDB databases

mod config;
mod error;
mod handlers;
mod middleware;
mod routes;

use config::Config;
use dotenvy::dotenv;
use orgdb_auth::{Argon2Hasher, TokenService};
use orgdb_database::{
    ConnectionRegistry, DocumentDatabase, MongoConnector, MongoTenantDirectory, TenantDirectory,
};
use orgdb_tenant::TenantLifecycle;
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub struct AppState {
    pub lifecycle: Arc<TenantLifecycle>,
    pub tokens: TokenService,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenv().ok();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "info,orgdb_api=debug,tower_http=debug".to_string()),
        )
        .init();

    tracing::info!("🚀 Starting OrgDB API Server");
    tracing::info!("📦 Version: {}", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env()?;
    tracing::info!("🔌 Server: {}", config.bind_address());

    // Master database: organization directory plus every shared partition
    tracing::info!("🗄️  Connecting to master database {}...", config.database.master_db_name);
    let connector = Arc::new(MongoConnector::new());
    let master = connector
        .open(
            &config.database.uri,
            &config.database.master_db_name,
            &config.database.pool,
        )
        .await?;
    tracing::info!("✅ Database connected");

    let directory = MongoTenantDirectory::new(&master);
    directory.ensure_indexes().await?;
    tracing::info!("📇 Directory indexes ensured");

    let shared: Arc<dyn DocumentDatabase> = Arc::new(master);
    let registry = Arc::new(ConnectionRegistry::new(
        shared.clone(),
        connector,
        config.tenant_pool.clone(),
    ));

    let lifecycle = Arc::new(TenantLifecycle::new(
        Arc::new(directory),
        registry.clone(),
        config.migration.clone(),
        Arc::new(Argon2Hasher::new()),
    ));
    tracing::info!(
        batch_size = config.migration.batch_size,
        atomic_rename_threshold = config.migration.atomic_rename_threshold,
        "🏢 Tenant lifecycle initialized"
    );

    let state = Arc::new(AppState {
        lifecycle,
        tokens: TokenService::new(&config.jwt_secret, config.jwt_expiration_minutes),
    });

    let app = routes::create_router(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http());

    tracing::info!("📡 Routes configured:");
    tracing::info!("   GET    /health");
    tracing::info!("   POST   /org/create");
    tracing::info!("   GET    /org/get");
    tracing::info!("   PUT    /org/update");
    tracing::info!("   DELETE /org/delete");
    tracing::info!("   POST   /admin/login");
    tracing::info!("   GET    /admin/stats");

    let addr = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("✅ Server ready at http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // In-flight requests are drained; release tenant connections, then the master
    registry.close_all().await;
    if let Err(e) = shared.close().await {
        tracing::warn!(error = %e, "Failed to close master database connection");
    }
    tracing::info!("👋 Shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received SIGINT, initiating graceful shutdown"),
        _ = terminate => tracing::info!("Received SIGTERM, initiating graceful shutdown"),
    }
}
