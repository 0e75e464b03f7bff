//! consentis-api — HTTP surface over the consent ledger.
//!
//! Read endpoints serve the ledger the listener maintains; write endpoints
//! cover the off-chain side of the product (record metadata uploads and
//! researcher profiles). The router is plain axum with shared state, CORS,
//! and request tracing.

pub mod handlers;
pub mod pinning;
pub mod validate;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use consentis_storage::ConsentStore;

use crate::pinning::PinningClient;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ConsentStore>,
    /// Absent when pinning credentials are not configured; record uploads
    /// are rejected in that case.
    pub pinning: Option<Arc<PinningClient>>,
}

/// Build the application router.
pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route(
            "/consents/:record_id/:researcher",
            get(handlers::get_consent),
        )
        .route(
            "/researchers/:wallet/consents",
            get(handlers::researcher_consents),
        )
        .route(
            "/records",
            get(handlers::list_records).post(handlers::create_record),
        )
        .route("/patients/:wallet/records", get(handlers::patient_records))
        .route("/researchers", post(handlers::create_researcher))
        .route(
            "/researchers/:wallet",
            get(handlers::get_researcher).put(handlers::update_researcher),
        )
        // Uploads carry up to MAX_FILE_SIZE of payload plus form overhead.
        .layer(DefaultBodyLimit::max(pinning::MAX_FILE_SIZE + 64 * 1024))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve `app` on `addr` until the future is dropped or the listener fails.
pub async fn run_server(app: Router, addr: SocketAddr) -> anyhow::Result<()> {
    info!(%addr, "HTTP API listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
