use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::chains::symbol::{
    client::SymbolClient,
    config::NodeRegistry,
    errors::{SymbolError, SymbolResult},
    health::NodeHealthTracker,
};

/// Runs an operation against the best available node, walking the
/// registry in priority order until one succeeds.
#[derive(Debug, Clone)]
pub struct FailoverExecutor {
    clients: Arc<Vec<SymbolClient>>,
    tracker: Arc<NodeHealthTracker>,
}

impl FailoverExecutor {
    pub fn new(
        registry: &NodeRegistry,
        http_client: reqwest::Client,
        tracker: Arc<NodeHealthTracker>,
    ) -> Self {
        let clients = registry
            .list_nodes()
            .iter()
            .cloned()
            .map(|endpoint| SymbolClient::new(http_client.clone(), endpoint))
            .collect();
        Self {
            clients: Arc::new(clients),
            tracker,
        }
    }

    pub fn tracker(&self) -> &Arc<NodeHealthTracker> {
        &self.tracker
    }

    pub fn clients(&self) -> &[SymbolClient] {
        &self.clients
    }

    pub async fn execute<T, F, Fut>(&self, operation: F) -> SymbolResult<T>
    where
        F: Fn(SymbolClient) -> Fut,
        Fut: Future<Output = SymbolResult<T>>,
    {
        if self.clients.is_empty() {
            return Err(SymbolError::NoNodesConfigured);
        }

        let mut last_error: Option<String> = None;
        let mut attempted = 0usize;

        for client in self.clients.iter() {
            if self.tracker.is_circuit_open(client.url()) {
                debug!(node = %client.url(), "Skipping node with open circuit");
                continue;
            }
            attempted += 1;
            match self.attempt(client, &operation).await {
                Ok(value) => return Ok(value),
                Err(e) => last_error = Some(e.to_string()),
            }
        }

        if attempted == 0 {
            // Every circuit is open. Try the preferred node once anyway so
            // a recovered network is noticed before the next probe cycle.
            let client = &self.clients[0];
            warn!(
                node = %client.url(),
                nodes = self.clients.len(),
                "All circuits open; attempting highest-priority node as last resort"
            );
            match self.attempt(client, &operation).await {
                Ok(value) => return Ok(value),
                Err(e) => last_error = Some(e.to_string()),
            }
        }

        let message = last_error.unwrap_or_else(|| "no node attempted".to_string());
        warn!(attempted = attempted, error = %message, "All Symbol nodes unavailable");
        Err(SymbolError::all_nodes_unavailable(message))
    }

    async fn attempt<T, F, Fut>(&self, client: &SymbolClient, operation: &F) -> SymbolResult<T>
    where
        F: Fn(SymbolClient) -> Fut,
        Fut: Future<Output = SymbolResult<T>>,
    {
        let endpoint = client.endpoint();
        let start = Instant::now();

        let result = match timeout(endpoint.timeout(), operation(client.clone())).await {
            Ok(result) => result,
            Err(_) => Err(SymbolError::timeout_error(endpoint.timeout_ms)),
        };

        match result {
            Ok(value) => {
                let elapsed = start.elapsed().as_millis() as u64;
                self.tracker.record_success(&endpoint.url, elapsed);
                debug!(node = %endpoint.url, response_time_ms = elapsed, "Node call succeeded");
                Ok(value)
            }
            Err(e) => {
                let unavailable = SymbolError::node_unavailable(&endpoint.url, e.to_string());
                self.tracker.record_failure(&endpoint.url, &e.to_string());
                info!(node = %endpoint.url, error = %e, "Node call failed, trying next node");
                Err(unavailable)
            }
        }
    }
}
