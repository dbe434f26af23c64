use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use yanblog::{
    AppState, Argon2Verifier, CredentialState, MemoryRepository,
    config::{AppConfig, Env},
    create_router,
    repository::{PostgresRepository, RepositoryState, bootstrap_super_admin},
};

/// main
///
/// Loads configuration and logging, connects and migrates the database (or
/// falls back to memory locally), makes sure a first super-admin exists, then
/// serves the HTTP API.
#[tokio::main]
async fn main() {
    // 1. Configuration (fail-fast on missing production secrets)
    dotenv::dotenv().ok();
    let config = AppConfig::load();

    // 2. Logging: RUST_LOG wins, otherwise verbose for this crate.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "yanblog=debug,tower_http=info,axum=trace".into());

    match config.env {
        Env::Local => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
        Env::Production => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
    }

    tracing::info!("Application starting in {:?} mode", config.env);

    // 3. Storage: Postgres when configured, otherwise the in-memory store (local only).
    let repo = match &config.db_url {
        Some(db_url) => {
            let pool = PgPoolOptions::new()
                .max_connections(5)
                .connect(db_url)
                .await
                .expect("FATAL: Failed to connect to Postgres. Check DATABASE_URL.");

            let postgres = PostgresRepository::new(pool);
            postgres
                .migrate()
                .await
                .expect("FATAL: Failed to apply database migrations.");
            Arc::new(postgres) as RepositoryState
        }
        None => {
            tracing::warn!("DATABASE_URL not set; accounts live in memory and vanish on exit");
            Arc::new(MemoryRepository::new()) as RepositoryState
        }
    };

    // 4. Credentials and the first account
    let credentials = Arc::new(Argon2Verifier) as CredentialState;
    bootstrap_super_admin(
        repo.as_ref(),
        credentials.as_ref(),
        &config.bootstrap_username,
        &config.bootstrap_password,
    )
    .await
    .expect("FATAL: Failed to hash the default super-admin password.");

    // 5. State, router and server
    let addr = config.http_addr.clone();
    let app = create_router(AppState::new(repo, credentials, config));

    let listener = TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|e| panic!("FATAL: Failed to bind {addr}: {e}"));

    tracing::info!("Listening on {}", addr);
    tracing::info!("API Documentation (Swagger UI) available at: http://{}/swagger-ui", addr);

    axum::serve(listener, app)
        .await
        .expect("FATAL: HTTP server terminated unexpectedly.");
}
