//! Node health table for operators

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::api::AppState;
use crate::chains::symbol::health::NodeStatusRow;
use crate::error::{AppError, AppResult};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeHealthResponse {
    pub circuit_breaker_threshold: u32,
    pub available: usize,
    pub nodes: Vec<NodeStatusRow>,
}

#[derive(Debug, Deserialize)]
pub struct ResetNodeRequest {
    pub url: String,
}

/// `GET /api/nodes/health`
pub async fn node_health(State(state): State<AppState>) -> Json<NodeHealthResponse> {
    let nodes = state.tracker.status_table(&state.registry);
    Json(NodeHealthResponse {
        circuit_breaker_threshold: state.tracker.threshold(),
        available: nodes.iter().filter(|n| !n.circuit_open).count(),
        nodes,
    })
}

/// `POST /api/nodes/reset` closes a node's circuit by hand.
pub async fn reset_node(
    State(state): State<AppState>,
    Json(request): Json<ResetNodeRequest>,
) -> AppResult<Json<NodeHealthResponse>> {
    let url = request.url.trim().trim_end_matches('/');
    if !state.registry.list_nodes().iter().any(|n| n.url == url) {
        return Err(AppError::validation("url", "not a configured node"));
    }

    state.tracker.reset(url);
    info!(node = %url, "Node circuit reset by operator");
    Ok(node_health(State(state)).await)
}
