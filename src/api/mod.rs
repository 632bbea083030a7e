pub mod nodes;
pub mod payment_status;
pub mod payments;

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use tokio::sync::watch;

use crate::chains::symbol::config::NodeRegistry;
use crate::chains::symbol::health::NodeHealthTracker;
use crate::chains::symbol::matcher::TransferSource;
use crate::config::PaymentsConfig;
use crate::database::payment_repository::PaymentStore;
use crate::health::{HealthChecker, HealthStatus};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn PaymentStore>,
    pub source: Arc<dyn TransferSource>,
    pub registry: Arc<NodeRegistry>,
    pub tracker: Arc<NodeHealthTracker>,
    pub health_checker: HealthChecker,
    pub payments: PaymentsConfig,
    pub currency_mosaic_id: String,
    pub shutdown: watch::Receiver<bool>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/health/ready", get(readiness))
        .route("/health/live", get(liveness))
        .route("/api/payments", post(payments::create_payment))
        .route("/api/payments/{id}", get(payments::get_payment))
        .route("/api/payments/{id}/events", get(payment_status::payment_events))
        .route("/api/nodes/health", get(nodes::node_health))
        .route("/api/nodes/reset", post(nodes::reset_node))
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthStatus>) {
    let status = state.health_checker.check_health().await;
    let code = if status.is_ready() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(status))
}

async fn readiness(State(state): State<AppState>) -> StatusCode {
    if state.health_checker.check_health().await.is_ready() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

async fn liveness() -> StatusCode {
    StatusCode::OK
}
