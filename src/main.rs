use notehub::{
    AppState,
    config::{AppConfig, Env},
    create_router,
    mailer::{MailerState, SmtpMailer},
    repository::{PostgresRepository, RepositoryState},
    storage::{S3StorageClient, StorageService, StorageState},
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// main
///
/// Loads configuration, initialises logging, connects Postgres, the object store and the
/// mail relay, then serves the API.
#[tokio::main]
async fn main() {
    // 1. Configuration (fail-fast on missing production secrets)
    dotenv::dotenv().ok();
    let config = AppConfig::load();

    // 2. Logging: RUST_LOG wins, otherwise debug for this crate.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "notehub=debug,tower_http=info".into());

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

    // 3. Database
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.db_url)
        .await
        .expect("FATAL: Failed to connect to Postgres. Check DATABASE_URL.");
    let repo = Arc::new(PostgresRepository::new(pool)) as RepositoryState;

    // 4. Object store
    let s3_client = S3StorageClient::new(
        &config.s3_endpoint,
        &config.s3_region,
        &config.s3_key,
        &config.s3_secret,
        &config.s3_bucket,
        &config.s3_public_url,
    )
    .await;

    // LOCAL-ONLY: provision the MinIO bucket of the docker setup.
    if config.env == Env::Local {
        s3_client.ensure_bucket_exists().await;
    }
    let storage = Arc::new(s3_client) as StorageState;

    // 5. Mail relay (optional: without SMTP_URL reset mails are logged and skipped)
    let mailer = SmtpMailer::new(
        config.smtp_url.as_deref(),
        &config.mail_from,
        &config.frontend_url,
    )
    .expect("FATAL: Invalid SMTP_URL.");
    let mailer = Arc::new(mailer) as MailerState;

    // 6. State, router, server
    let bind_addr = config.bind_addr.clone();
    let app = create_router(AppState::new(repo, storage, mailer, config));

    let listener = TcpListener::bind(&bind_addr)
        .await
        .unwrap_or_else(|e| panic!("FATAL: Failed to bind {}: {}", bind_addr, e));

    tracing::info!("Listening on {}", bind_addr);
    tracing::info!("API Documentation (Swagger UI) available at /swagger-ui");

    axum::serve(listener, app).await.expect("server error");
}
