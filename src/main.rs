//! Triage desk - adaptive symptom triage service
//!
//! Guides a user through a symptom conversation, consults an external
//! classifier and routes the outcome to a department and urgency level.

mod api;
mod classifier;
mod db;
mod engine;
mod state_machine;
mod triage;

use api::{create_router, AppState};
use axum::http::HeaderValue;
use classifier::{ClassifierConfig, ClassifierService, HttpClassifier, LoggingClassifier};
use db::Database;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "triage_desk=info,tower_http=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    // Configuration
    let db_path = std::env::var("TRIAGE_DB_PATH").unwrap_or_else(|_| {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
        format!("{home}/.triage-desk/triage.db")
    });

    let port: u16 = std::env::var("TRIAGE_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(5000);

    let client_origin = std::env::var("TRIAGE_CLIENT_ORIGIN").ok();

    // Ensure database directory exists
    if let Some(parent) = PathBuf::from(&db_path).parent() {
        std::fs::create_dir_all(parent)?;
    }

    // Initialize database
    tracing::info!(path = %db_path, "Opening database");
    let db = Database::open(&db_path)?;

    // Initialize classifier client
    let classifier_config = ClassifierConfig::from_env();
    tracing::info!(
        url = %classifier_config.base_url,
        timeout_ms = %classifier_config.timeout.as_millis(),
        "Classifier configured"
    );
    let http: Arc<dyn ClassifierService> = Arc::new(HttpClassifier::new(&classifier_config)?);
    let classifier: Arc<dyn ClassifierService> = Arc::new(LoggingClassifier::new(http));

    // Create application state
    let state = AppState::new(db, classifier);

    // Create router
    let cors = match client_origin {
        Some(origin) => CorsLayer::new()
            .allow_origin(HeaderValue::from_str(&origin)?)
            .allow_methods(Any)
            .allow_headers(Any),
        None => CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any),
    };

    let app = create_router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Triage desk listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
