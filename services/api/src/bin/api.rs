//! services/api/src/bin/api.rs

use api_lib::{
    adapters::{GoogleTokenVerifier, LogMailer, PgStore, SmtpMailer},
    config::Config,
    error::ApiError,
    notify::{NotificationQueue, NotificationWorker},
    web::{self, middleware::BODY_LIMIT, ApiDoc},
};
use axum::{
    extract::DefaultBodyLimit,
    http::{
        header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
        HeaderValue, Method,
    },
    Router,
};
use forum_core::{ForumStore, Mailer, TokenVerifier};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Connect to Database & Run Migrations ---
    info!("Connecting to database...");
    let db_pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await?;
    let store = Arc::new(PgStore::new(db_pool.clone()));
    info!("Running database migrations...");
    store.run_migrations().await?;
    info!("Database migrations complete.");

    // --- 3. Initialize Service Adapters ---
    let verifier: Arc<dyn TokenVerifier> =
        Arc::new(GoogleTokenVerifier::new(config.google_client_id.clone()));

    let mailer: Arc<dyn Mailer> = match &config.smtp {
        Some(smtp) => Arc::new(SmtpMailer::new(smtp)?),
        None => {
            warn!("SMTP is not configured; notification emails will be logged instead of sent");
            Arc::new(LogMailer)
        }
    };

    // --- 4. Start the Notification Worker ---
    let (notifications, notification_rx) = NotificationQueue::new();
    let worker_token = CancellationToken::new();
    let worker = NotificationWorker::new(
        Arc::clone(&store) as Arc<dyn ForumStore>,
        mailer,
        config.clone(),
    )
    .spawn(notification_rx, worker_token.clone());

    // --- 5. Build the Shared AppState ---
    let app_state = Arc::new(web::state::AppState {
        store,
        verifier,
        notifications,
        config: config.clone(),
        listing: config.listing(),
    });

    let cors_origin = config
        .cors_origin
        .parse::<HeaderValue>()
        .map_err(|_| ApiError::Internal(format!("Invalid CORS origin: '{}'", config.cors_origin)))?;
    let cors = CorsLayer::new()
        .allow_origin(cors_origin)
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE, ACCEPT]);

    // --- 6. Create the Web Router ---
    let api_router = web::router(app_state)
        .layer(DefaultBodyLimit::max(BODY_LIMIT))
        .layer(cors);

    // Merge the API router with the Swagger UI router for a complete application.
    let app = Router::new()
        .merge(api_router)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    // --- 7. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // --- 8. Shut Down the Notification Worker ---
    worker_token.cancel();
    if let Err(e) = worker.await {
        error!(error = %e, "Notification worker did not shut down cleanly");
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for the shutdown signal");
    }
}
