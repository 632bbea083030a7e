use crate::chains::symbol::errors::{SymbolError, SymbolResult};
use serde::Serialize;
use std::env;
use std::time::Duration;

/// Number of indexable `SYMBOL_NODE_{n}_*` slots read from the environment.
pub const MAX_CUSTOM_NODES: usize = 5;

pub const DEFAULT_NODE_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_TRANSFER_PAGE_SIZE: usize = 50;

/// Namespace id of `symbol.xym`; transfers may reference the currency by alias.
pub const XYM_NAMESPACE_ALIAS: &str = "E74B99BA41F4AFEE";

const CUSTOM_PRIORITY_BASE: u32 = 100;
const LEGACY_PRIORITY: u32 = 1_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SymbolNetwork {
    Mainnet,
    Testnet,
}

impl SymbolNetwork {
    pub fn from_name(name: &str) -> SymbolResult<Self> {
        match name.trim().to_lowercase().as_str() {
            "mainnet" | "public" => Ok(SymbolNetwork::Mainnet),
            "testnet" | "public_test" => Ok(SymbolNetwork::Testnet),
            other => Err(SymbolError::config_error(format!(
                "unsupported SYMBOL_NETWORK: {}",
                other
            ))),
        }
    }

    pub fn currency_mosaic_id(&self) -> &'static str {
        match self {
            SymbolNetwork::Mainnet => "6BED913FA20223F8",
            SymbolNetwork::Testnet => "72C0212E67A08BCE",
        }
    }

    /// Seconds between the Unix epoch and the network's nemesis block.
    pub fn epoch_adjustment(&self) -> i64 {
        match self {
            SymbolNetwork::Mainnet => 1_615_853_185,
            SymbolNetwork::Testnet => 1_667_250_467,
        }
    }

    fn primary_nodes(&self) -> Vec<(&'static str, &'static str, &'static str)> {
        match self {
            SymbolNetwork::Mainnet => vec![
                ("https://sym-main-01.opening-line.jp:3001", "opening-line-01", "ap-northeast"),
                ("https://symbol-mikun.net:3001", "mikun", "ap-northeast"),
                ("https://dual-1.nodes-xym.work:3001", "nodes-xym-1", "eu-central"),
            ],
            SymbolNetwork::Testnet => vec![
                ("https://sym-test-01.opening-line.jp:3001", "opening-line-test-01", "ap-northeast"),
                ("https://001-sai-dual.symboltest.net:3001", "sai-dual-001", "eu-central"),
            ],
        }
    }
}

/// One observation endpoint. Immutable once the registry is built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeEndpoint {
    pub url: String,
    /// Lower is preferred.
    pub priority: u32,
    pub timeout_ms: u64,
    pub display_name: String,
    pub region: String,
}

impl NodeEndpoint {
    pub fn new(url: impl Into<String>, priority: u32, timeout_ms: u64) -> Self {
        let url = url.into().trim_end_matches('/').to_string();
        Self {
            display_name: url.clone(),
            url,
            priority,
            timeout_ms,
            region: "unknown".to_string(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = name.into();
        self
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn validate(&self) -> SymbolResult<()> {
        if !self.url.starts_with("http://") && !self.url.starts_with("https://") {
            return Err(SymbolError::config_error(format!(
                "node url must be http(s): {}",
                self.url
            )));
        }
        if self.timeout_ms == 0 {
            return Err(SymbolError::config_error(format!(
                "node timeout must be positive: {}",
                self.url
            )));
        }
        Ok(())
    }
}

/// Static, priority-ordered list of observation endpoints.
#[derive(Debug, Clone, Default)]
pub struct NodeRegistry {
    nodes: Vec<NodeEndpoint>,
}

impl NodeRegistry {
    /// Builds the registry from a primary set, up to [`MAX_CUSTOM_NODES`]
    /// custom entries and an optional legacy slot.
    ///
    /// Primary nodes keep their given priorities. Custom entries are placed
    /// after them in slot order and the legacy endpoint always sorts last.
    /// Duplicate URLs keep their first (best priority) occurrence.
    pub fn new(
        primary: Vec<NodeEndpoint>,
        custom: Vec<NodeEndpoint>,
        legacy: Option<NodeEndpoint>,
    ) -> Self {
        let mut nodes = primary;
        nodes.extend(
            custom
                .into_iter()
                .take(MAX_CUSTOM_NODES)
                .enumerate()
                .map(|(slot, mut node)| {
                    node.priority = CUSTOM_PRIORITY_BASE + slot as u32;
                    node
                }),
        );
        if let Some(mut node) = legacy {
            node.priority = LEGACY_PRIORITY;
            nodes.push(node);
        }

        nodes.sort_by_key(|n| n.priority);
        let mut seen = std::collections::HashSet::new();
        nodes.retain(|n| seen.insert(n.url.clone()));

        Self { nodes }
    }

    pub fn from_config(config: &SymbolConfig) -> Self {
        let primary = if config.use_default_nodes {
            config
                .network
                .primary_nodes()
                .into_iter()
                .enumerate()
                .map(|(i, (url, name, region))| {
                    NodeEndpoint::new(url, i as u32 + 1, config.default_timeout_ms)
                        .with_name(name)
                        .with_region(region)
                })
                .collect()
        } else {
            Vec::new()
        };

        Self::new(
            primary,
            config.custom_nodes.clone(),
            config.legacy_node.clone(),
        )
    }

    /// Endpoints in ascending priority.
    pub fn list_nodes(&self) -> &[NodeEndpoint] {
        &self.nodes
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }
}

#[derive(Debug, Clone)]
pub struct SymbolConfig {
    pub network: SymbolNetwork,
    pub use_default_nodes: bool,
    pub custom_nodes: Vec<NodeEndpoint>,
    pub legacy_node: Option<NodeEndpoint>,
    pub default_timeout_ms: u64,
    /// Mosaic ids (upper-case hex) whose amounts count as payment currency.
    pub currency_mosaic_ids: Vec<String>,
    pub epoch_adjustment: i64,
    pub transfer_page_size: usize,
    pub health_check_interval: Duration,
    pub circuit_breaker_threshold: u32,
}

impl SymbolConfig {
    pub fn for_network(network: SymbolNetwork) -> Self {
        Self {
            network,
            use_default_nodes: true,
            custom_nodes: Vec::new(),
            legacy_node: None,
            default_timeout_ms: DEFAULT_NODE_TIMEOUT_MS,
            currency_mosaic_ids: vec![
                network.currency_mosaic_id().to_string(),
                XYM_NAMESPACE_ALIAS.to_string(),
            ],
            epoch_adjustment: network.epoch_adjustment(),
            transfer_page_size: DEFAULT_TRANSFER_PAGE_SIZE,
            health_check_interval: Duration::from_secs(30),
            circuit_breaker_threshold: 5,
        }
    }

    pub fn from_env() -> SymbolResult<Self> {
        let network = SymbolNetwork::from_name(
            &env::var("SYMBOL_NETWORK").unwrap_or_else(|_| "testnet".to_string()),
        )?;
        let mut cfg = Self::for_network(network);

        cfg.use_default_nodes = env::var("SYMBOL_USE_DEFAULT_NODES")
            .map(|v| v.to_lowercase() != "false")
            .unwrap_or(true);
        cfg.default_timeout_ms = parse_env("SYMBOL_DEFAULT_TIMEOUT_MS", cfg.default_timeout_ms)?;

        for slot in 1..=MAX_CUSTOM_NODES {
            let url = match env::var(format!("SYMBOL_NODE_{}_URL", slot)) {
                Ok(url) if !url.trim().is_empty() => url,
                _ => continue,
            };
            let timeout_ms = parse_env(
                &format!("SYMBOL_NODE_{}_TIMEOUT_MS", slot),
                cfg.default_timeout_ms,
            )?;
            let mut node = NodeEndpoint::new(url.trim(), 0, timeout_ms);
            if let Ok(name) = env::var(format!("SYMBOL_NODE_{}_NAME", slot)) {
                node = node.with_name(name);
            }
            if let Ok(region) = env::var(format!("SYMBOL_NODE_{}_REGION", slot)) {
                node = node.with_region(region);
            }
            cfg.custom_nodes.push(node);
        }

        if let Ok(url) = env::var("SYMBOL_NODE_URL") {
            if !url.trim().is_empty() {
                let timeout_ms = parse_env("SYMBOL_NODE_TIMEOUT_MS", cfg.default_timeout_ms)?;
                cfg.legacy_node =
                    Some(NodeEndpoint::new(url.trim(), 0, timeout_ms).with_name("legacy"));
            }
        }

        if let Ok(ids) = env::var("SYMBOL_CURRENCY_MOSAIC_IDS") {
            let ids: Vec<String> = ids
                .split(',')
                .map(|s| s.trim().to_uppercase())
                .filter(|s| !s.is_empty())
                .collect();
            if !ids.is_empty() {
                cfg.currency_mosaic_ids = ids;
            }
        }

        cfg.epoch_adjustment = parse_env("SYMBOL_EPOCH_ADJUSTMENT", cfg.epoch_adjustment)?;
        cfg.transfer_page_size = parse_env("SYMBOL_TRANSFER_PAGE_SIZE", cfg.transfer_page_size)?;
        cfg.health_check_interval = Duration::from_secs(parse_env(
            "NODE_HEALTH_CHECK_INTERVAL_SECS",
            cfg.health_check_interval.as_secs(),
        )?);
        cfg.circuit_breaker_threshold =
            parse_env("CIRCUIT_BREAKER_THRESHOLD", cfg.circuit_breaker_threshold)?;

        Ok(cfg)
    }

    pub fn validate(&self) -> SymbolResult<()> {
        for node in self.custom_nodes.iter().chain(self.legacy_node.iter()) {
            node.validate()?;
        }
        if !(10..=100).contains(&self.transfer_page_size) {
            return Err(SymbolError::config_error(
                "SYMBOL_TRANSFER_PAGE_SIZE must be between 10 and 100",
            ));
        }
        if self.circuit_breaker_threshold == 0 {
            return Err(SymbolError::config_error(
                "CIRCUIT_BREAKER_THRESHOLD must be at least 1",
            ));
        }
        if self.health_check_interval.is_zero() {
            return Err(SymbolError::config_error(
                "NODE_HEALTH_CHECK_INTERVAL_SECS must be positive",
            ));
        }
        if self.currency_mosaic_ids.is_empty() {
            return Err(SymbolError::config_error(
                "at least one currency mosaic id is required",
            ));
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> SymbolResult<T> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| SymbolError::config_error(format!("invalid value for {}", key))),
        Err(_) => Ok(default),
    }
}
