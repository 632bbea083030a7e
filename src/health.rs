//! Health check module
//! Reports payment store reachability and Symbol node availability.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{error, info, warn};

use crate::chains::symbol::health::NodeHealthTracker;
use crate::database::payment_repository::PaymentStore;

/// Health status response
#[derive(Debug, Serialize, Clone)]
pub struct HealthStatus {
    pub status: HealthState,
    pub checks: HashMap<String, ComponentHealth>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Overall health state
#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub enum HealthState {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Individual component health status
#[derive(Debug, Serialize, Clone)]
pub struct ComponentHealth {
    pub status: ComponentState,
    pub response_time_ms: Option<u128>,
    pub details: Option<String>,
}

/// Component state
#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub enum ComponentState {
    Up,
    Down,
    Warning,
}

impl HealthStatus {
    pub fn new() -> Self {
        Self {
            status: HealthState::Healthy,
            checks: HashMap::new(),
            timestamp: chrono::Utc::now(),
        }
    }

    pub fn is_healthy(&self) -> bool {
        matches!(self.status, HealthState::Healthy)
    }

    /// Ready to serve when nothing is down. Degraded still counts.
    pub fn is_ready(&self) -> bool {
        !matches!(self.status, HealthState::Unhealthy)
    }
}

impl Default for HealthStatus {
    fn default() -> Self {
        Self::new()
    }
}

impl ComponentHealth {
    pub fn up(response_time_ms: Option<u128>) -> Self {
        Self {
            status: ComponentState::Up,
            response_time_ms,
            details: None,
        }
    }

    pub fn down(details: Option<String>) -> Self {
        Self {
            status: ComponentState::Down,
            response_time_ms: None,
            details,
        }
    }

    pub fn warning(response_time_ms: Option<u128>, details: Option<String>) -> Self {
        Self {
            status: ComponentState::Warning,
            response_time_ms,
            details,
        }
    }
}

/// Health checker for the application
#[derive(Clone)]
pub struct HealthChecker {
    store: Arc<dyn PaymentStore>,
    tracker: Arc<NodeHealthTracker>,
}

impl HealthChecker {
    pub fn new(store: Arc<dyn PaymentStore>, tracker: Arc<NodeHealthTracker>) -> Self {
        Self { store, tracker }
    }

    pub async fn check_health(&self) -> HealthStatus {
        let mut health_status = HealthStatus::new();

        let store = match timeout(Duration::from_secs(5), check_store_health(self.store.as_ref()))
            .await
        {
            Ok(Ok(response_time)) => {
                info!("Payment store health check: OK ({}ms)", response_time);
                ComponentHealth::up(Some(response_time))
            }
            Ok(Err(e)) => {
                error!("Payment store health check failed: {}", e);
                ComponentHealth::down(Some(e))
            }
            Err(_) => {
                error!("Payment store health check timed out");
                ComponentHealth::down(Some("Timeout".to_string()))
            }
        };
        health_status.checks.insert("payment_store".to_string(), store);
        health_status
            .checks
            .insert("symbol_nodes".to_string(), check_nodes_health(&self.tracker));

        let states: Vec<&ComponentState> =
            health_status.checks.values().map(|c| &c.status).collect();
        health_status.status = if states.iter().any(|s| **s == ComponentState::Down) {
            HealthState::Unhealthy
        } else if states.iter().any(|s| **s == ComponentState::Warning) {
            HealthState::Degraded
        } else {
            HealthState::Healthy
        };

        health_status
    }
}

pub async fn check_store_health(store: &dyn PaymentStore) -> Result<u128, String> {
    let start = Instant::now();
    store
        .ping()
        .await
        .map(|_| start.elapsed().as_millis())
        .map_err(|e| e.to_string())
}

/// Up while every circuit is closed, warning while some are open, down
/// once none is left.
pub fn check_nodes_health(tracker: &NodeHealthTracker) -> ComponentHealth {
    let total = tracker.node_count();
    let available = tracker.healthy_count();
    let details = Some(format!("{}/{} nodes with closed circuit", available, total));

    if total == 0 || available == 0 {
        warn!(available, total, "No Symbol node available");
        ComponentHealth::down(details)
    } else if available < total {
        ComponentHealth::warning(None, details)
    } else {
        ComponentHealth {
            details,
            ..ComponentHealth::up(None)
        }
    }
}
