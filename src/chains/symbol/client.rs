use crate::chains::symbol::{
    config::NodeEndpoint,
    errors::{SymbolError, SymbolResult},
    types::{NetworkInfo, SymbolAddress, TransactionPage, TRANSFER_TRANSACTION_TYPE},
};
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::time::Instant;
use tokio::time::timeout;
use tracing::debug;

pub fn build_http_client() -> SymbolResult<Client> {
    Client::builder()
        .pool_max_idle_per_host(10)
        .user_agent("Symbol-Payment-Gateway/1.0")
        .build()
        .map_err(|e| SymbolError::config_error(format!("Failed to create HTTP client: {}", e)))
}

/// REST client bound to a single node.
#[derive(Debug, Clone)]
pub struct SymbolClient {
    http_client: Client,
    endpoint: NodeEndpoint,
}

impl SymbolClient {
    pub fn new(http_client: Client, endpoint: NodeEndpoint) -> Self {
        Self {
            http_client,
            endpoint,
        }
    }

    pub fn endpoint(&self) -> &NodeEndpoint {
        &self.endpoint
    }

    pub fn url(&self) -> &str {
        &self.endpoint.url
    }

    /// Network identity query. Cheap enough for connectivity tests and the
    /// periodic probe.
    pub async fn network_info(&self) -> SymbolResult<NetworkInfo> {
        self.get_json(&format!("{}/network", self.endpoint.url)).await
    }

    /// Like [`network_info`](Self::network_info), also reporting the round trip.
    pub async fn probe(&self) -> SymbolResult<(NetworkInfo, u64)> {
        let start = Instant::now();
        let info = self.network_info().await?;
        Ok((info, start.elapsed().as_millis() as u64))
    }

    /// Newest-first page of confirmed transfers addressed to `recipient`.
    pub async fn confirmed_transfers(
        &self,
        recipient: &SymbolAddress,
        page_size: usize,
    ) -> SymbolResult<TransactionPage> {
        let url = format!(
            "{}/transactions/confirmed?recipientAddress={}&type={}&pageSize={}&order=desc",
            self.endpoint.url,
            recipient.canonical(),
            TRANSFER_TRANSACTION_TYPE,
            page_size
        );
        debug!(node = %self.endpoint.url, recipient = %recipient, "Fetching confirmed transfers");
        self.get_json(&url).await
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> SymbolResult<T> {
        let response = timeout(self.endpoint.timeout(), self.http_client.get(url).send())
            .await
            .map_err(|_| SymbolError::timeout_error(self.endpoint.timeout_ms))?
            .map_err(|e| {
                if e.is_timeout() {
                    SymbolError::timeout_error(self.endpoint.timeout_ms)
                } else {
                    SymbolError::network_error(format!("{}: {}", self.endpoint.url, e))
                }
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(SymbolError::RateLimitError);
        }
        if !status.is_success() {
            return Err(SymbolError::network_error(format!(
                "{} returned HTTP status {}",
                self.endpoint.url, status
            )));
        }

        let body = timeout(self.endpoint.timeout(), response.text())
            .await
            .map_err(|_| SymbolError::timeout_error(self.endpoint.timeout_ms))?
            .map_err(|e| SymbolError::network_error(format!("read error: {}", e)))?;

        serde_json::from_str::<T>(&body)
            .map_err(|e| SymbolError::serialization_error(format!("JSON parsing error: {}", e)))
    }
}
