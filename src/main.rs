use fleet_admin::{
    AppState,
    auth::hash_password,
    config::{AppConfig, Env},
    create_router,
    repository::{PostgresRepository, RepositoryState},
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// main
///
/// Entry point: configuration, logging, database and migrations, optional admin
/// bootstrap, then the HTTP server.
#[tokio::main]
async fn main() {
    // 1. Environment. Missing production secrets stop startup here.
    dotenv::dotenv().ok();
    let config = AppConfig::load();

    // 2. Log filter
    // RUST_LOG wins; otherwise debug for this crate and request-level tower-http logs.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "fleet_admin=debug,tower_http=info,axum=trace".into());

    // 3. Pretty output locally, JSON for log aggregation in production.
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

    tracing::info!(env = ?config.env, "fleet-admin starting");

    // 4. Pool and schema
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.db_url)
        .await
        .expect("FATAL: Failed to connect to Postgres. Check DATABASE_URL.");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("FATAL: Database migrations failed.");

    let repo = Arc::new(PostgresRepository::new(pool)) as RepositoryState;

    // 5. Admin bootstrap. Admins never come from public registration.
    if let (Some(username), Some(password)) = (&config.admin_username, &config.admin_password) {
        let hash = hash_password(password.clone(), config.bcrypt_cost)
            .await
            .expect("FATAL: Failed to hash ADMIN_PASSWORD.");
        match repo.ensure_admin(username, hash).await {
            Ok(true) => tracing::info!(%username, "admin account created"),
            Ok(false) => tracing::debug!(%username, "admin account already present"),
            Err(e) => panic!("FATAL: Admin bootstrap failed: {}", e),
        }
    }

    // 6. Shared state
    let bind_addr = config.bind_addr.clone();
    let app_state = AppState { repo, config };

    // 7. Serve
    let app = create_router(app_state);

    let listener = TcpListener::bind(&bind_addr)
        .await
        .unwrap_or_else(|e| panic!("FATAL: Cannot bind {}: {}", bind_addr, e));

    tracing::info!("Listening on {}", bind_addr);
    tracing::info!("API Documentation (Swagger UI) available at: http://{}/swagger-ui", bind_addr);

    axum::serve(listener, app).await.expect("HTTP server terminated unexpectedly");
}
