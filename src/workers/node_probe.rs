use futures::future::join_all;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{timeout, MissedTickBehavior};
use tracing::{info, warn};

use crate::chains::symbol::{
    client::SymbolClient,
    errors::{SymbolError, SymbolResult},
    failover::FailoverExecutor,
};

/// Result of probing one node.
#[derive(Debug, Clone)]
pub struct ProbeOutcome {
    pub url: String,
    pub result: Result<u64, String>,
}

/// Periodically asks every configured node for its network identity and
/// feeds the outcome into the shared health tracker.
///
/// Probes never block live traffic: they share only the tracker with the
/// failover executor.
pub struct NodeProbeWorker {
    executor: FailoverExecutor,
    interval: Duration,
}

impl NodeProbeWorker {
    pub fn new(executor: FailoverExecutor, interval: Duration) -> Self {
        Self { executor, interval }
    }

    pub async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        info!(
            interval_secs = self.interval.as_secs(),
            nodes = self.executor.clients().len(),
            "symbol node probe worker started"
        );

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        info!("symbol node probe worker stopping");
                        break;
                    }
                }
                _ = ticker.tick() => {
                    // A slow cycle must not hold up shutdown.
                    tokio::select! {
                        outcomes = self.probe_once() => self.log_table(&outcomes),
                        changed = shutdown_rx.changed() => {
                            if changed.is_err() || *shutdown_rx.borrow() {
                                info!("symbol node probe worker stopping mid-cycle");
                                break;
                            }
                        }
                    }
                }
            }
        }

        info!("symbol node probe worker stopped");
    }

    /// Probes every node in parallel and records each result.
    pub async fn probe_once(&self) -> Vec<ProbeOutcome> {
        let probes = self.executor.clients().iter().map(probe_node);
        let results = join_all(probes).await;

        let tracker = self.executor.tracker();
        self.executor
            .clients()
            .iter()
            .zip(results)
            .map(|(client, result)| {
                let url = client.url().to_string();
                match result {
                    Ok(elapsed_ms) => {
                        tracker.record_success(&url, elapsed_ms);
                        ProbeOutcome {
                            url,
                            result: Ok(elapsed_ms),
                        }
                    }
                    Err(e) => {
                        let message = e.to_string();
                        tracker.record_failure(&url, &message);
                        ProbeOutcome {
                            url,
                            result: Err(message),
                        }
                    }
                }
            })
            .collect()
    }

    fn log_table(&self, outcomes: &[ProbeOutcome]) {
        let tracker = self.executor.tracker();
        for outcome in outcomes {
            let errors = tracker
                .get(&outcome.url)
                .map(|h| h.consecutive_error_count)
                .unwrap_or_default();
            match &outcome.result {
                Ok(ms) => info!(
                    node = %outcome.url,
                    response_time_ms = ms,
                    circuit_open = tracker.is_circuit_open(&outcome.url),
                    "node probe ok"
                ),
                Err(e) => warn!(
                    node = %outcome.url,
                    error = %e,
                    consecutive_errors = errors,
                    circuit_open = tracker.is_circuit_open(&outcome.url),
                    "node probe failed"
                ),
            }
        }

        let healthy = outcomes.iter().filter(|o| o.result.is_ok()).count();
        info!(
            healthy = healthy,
            total = outcomes.len(),
            "node probe cycle complete"
        );
    }
}

async fn probe_node(client: &SymbolClient) -> SymbolResult<u64> {
    let limit = client.endpoint().timeout();
    match timeout(limit, client.probe()).await {
        Ok(result) => result.map(|(_, elapsed_ms)| elapsed_ms),
        Err(_) => Err(SymbolError::timeout_error(client.endpoint().timeout_ms)),
    }
}
