//! Per-node health and circuit-breaker bookkeeping.
//!
//! A node's circuit is open once its consecutive error count reaches the
//! configured threshold. Only a recorded success closes it again, either
//! from live traffic, the background probe, or a manual reset.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info, warn};

use crate::chains::symbol::config::NodeRegistry;

pub const DEFAULT_CIRCUIT_BREAKER_THRESHOLD: u32 = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeHealth {
    pub url: String,
    pub is_healthy: bool,
    pub last_checked_at: Option<DateTime<Utc>>,
    pub last_response_time_ms: Option<u64>,
    pub consecutive_error_count: u32,
    pub last_error_message: Option<String>,
}

impl NodeHealth {
    fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            is_healthy: true,
            last_checked_at: None,
            last_response_time_ms: None,
            consecutive_error_count: 0,
            last_error_message: None,
        }
    }
}

/// Row of the node status table served to operators.
#[derive(Debug, Clone, Serialize)]
pub struct NodeStatusRow {
    pub priority: u32,
    pub display_name: String,
    pub region: String,
    pub circuit_open: bool,
    #[serde(flatten)]
    pub health: NodeHealth,
}

#[derive(Debug)]
pub struct NodeHealthTracker {
    threshold: u32,
    nodes: RwLock<HashMap<String, NodeHealth>>,
}

impl NodeHealthTracker {
    pub fn new(registry: &NodeRegistry, threshold: u32) -> Self {
        let nodes = registry
            .list_nodes()
            .iter()
            .map(|n| (n.url.clone(), NodeHealth::new(&n.url)))
            .collect();
        Self {
            threshold: threshold.max(1),
            nodes: RwLock::new(nodes),
        }
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    pub fn record_success(&self, url: &str, response_time_ms: u64) {
        let mut nodes = self.write();
        let entry = nodes
            .entry(url.to_string())
            .or_insert_with(|| NodeHealth::new(url));

        if entry.consecutive_error_count >= self.threshold {
            info!(
                node = %url,
                previous_errors = entry.consecutive_error_count,
                "Circuit closed after successful call"
            );
        }

        entry.is_healthy = true;
        entry.consecutive_error_count = 0;
        entry.last_error_message = None;
        entry.last_response_time_ms = Some(response_time_ms);
        entry.last_checked_at = Some(Utc::now());
    }

    pub fn record_failure(&self, url: &str, message: &str) {
        let mut nodes = self.write();
        let entry = nodes
            .entry(url.to_string())
            .or_insert_with(|| NodeHealth::new(url));

        entry.is_healthy = false;
        entry.consecutive_error_count = entry.consecutive_error_count.saturating_add(1);
        entry.last_error_message = Some(message.to_string());
        entry.last_checked_at = Some(Utc::now());

        if entry.consecutive_error_count == self.threshold {
            warn!(
                node = %url,
                errors = entry.consecutive_error_count,
                error = %message,
                "Circuit opened"
            );
        } else {
            debug!(
                node = %url,
                errors = entry.consecutive_error_count,
                error = %message,
                "Node failure recorded"
            );
        }
    }

    pub fn is_circuit_open(&self, url: &str) -> bool {
        self.read()
            .get(url)
            .map(|h| h.consecutive_error_count >= self.threshold)
            .unwrap_or(false)
    }

    /// Manual reset. Counts as a success with no timing information.
    pub fn reset(&self, url: &str) {
        let mut nodes = self.write();
        let entry = nodes
            .entry(url.to_string())
            .or_insert_with(|| NodeHealth::new(url));
        entry.is_healthy = true;
        entry.consecutive_error_count = 0;
        entry.last_error_message = None;
        entry.last_checked_at = Some(Utc::now());
        info!(node = %url, "Node health manually reset");
    }

    pub fn get(&self, url: &str) -> Option<NodeHealth> {
        self.read().get(url).cloned()
    }

    /// Health for every registered node, in registry order.
    pub fn status_table(&self, registry: &NodeRegistry) -> Vec<NodeStatusRow> {
        let nodes = self.read();
        registry
            .list_nodes()
            .iter()
            .map(|endpoint| {
                let health = nodes
                    .get(&endpoint.url)
                    .cloned()
                    .unwrap_or_else(|| NodeHealth::new(&endpoint.url));
                NodeStatusRow {
                    priority: endpoint.priority,
                    display_name: endpoint.display_name.clone(),
                    region: endpoint.region.clone(),
                    circuit_open: health.consecutive_error_count >= self.threshold,
                    health,
                }
            })
            .collect()
    }

    pub fn healthy_count(&self) -> usize {
        self.read()
            .values()
            .filter(|h| h.consecutive_error_count < self.threshold)
            .count()
    }

    pub fn node_count(&self) -> usize {
        self.read().len()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, NodeHealth>> {
        self.nodes.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, NodeHealth>> {
        self.nodes.write().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chains::symbol::config::NodeEndpoint;

    const NODE: &str = "https://node-a.example:3001";

    fn tracker(threshold: u32) -> NodeHealthTracker {
        let registry = NodeRegistry::new(vec![NodeEndpoint::new(NODE, 1, 1000)], Vec::new(), None);
        NodeHealthTracker::new(&registry, threshold)
    }

    #[test]
    fn circuit_opens_at_threshold() {
        let tracker = tracker(3);
        tracker.record_failure(NODE, "boom");
        tracker.record_failure(NODE, "boom");
        assert!(!tracker.is_circuit_open(NODE));
        tracker.record_failure(NODE, "boom");
        assert!(tracker.is_circuit_open(NODE));

        let health = tracker.get(NODE).unwrap();
        assert!(!health.is_healthy);
        assert_eq!(health.consecutive_error_count, 3);
        assert_eq!(health.last_error_message.as_deref(), Some("boom"));
    }

    #[test]
    fn single_success_resets_counter_to_zero() {
        let tracker = tracker(3);
        for _ in 0..7 {
            tracker.record_failure(NODE, "timeout");
        }
        tracker.record_success(NODE, 42);

        let health = tracker.get(NODE).unwrap();
        assert_eq!(health.consecutive_error_count, 0);
        assert!(health.is_healthy);
        assert!(health.last_error_message.is_none());
        assert_eq!(health.last_response_time_ms, Some(42));
        assert!(!tracker.is_circuit_open(NODE));
    }

    #[test]
    fn manual_reset_closes_circuit() {
        let tracker = tracker(1);
        tracker.record_failure(NODE, "down");
        assert!(tracker.is_circuit_open(NODE));
        tracker.reset(NODE);
        assert!(!tracker.is_circuit_open(NODE));
    }

    #[test]
    fn unknown_nodes_are_closed() {
        let tracker = tracker(1);
        assert!(!tracker.is_circuit_open("https://unknown.example"));
    }

    #[test]
    fn status_table_follows_registry_order() {
        let registry = NodeRegistry::new(
            vec![
                NodeEndpoint::new("https://b.example", 2, 1000),
                NodeEndpoint::new("https://a.example", 1, 1000),
            ],
            Vec::new(),
            None,
        );
        let tracker = NodeHealthTracker::new(&registry, 1);
        tracker.record_failure("https://b.example", "refused");

        let table = tracker.status_table(&registry);
        assert_eq!(table[0].health.url, "https://a.example");
        assert!(!table[0].circuit_open);
        assert!(table[1].circuit_open);
        assert_eq!(tracker.healthy_count(), 1);
    }
}
