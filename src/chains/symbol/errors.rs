use thiserror::Error;

pub type SymbolResult<T> = Result<T, SymbolError>;

#[derive(Debug, Clone, Error)]
pub enum SymbolError {
    #[error("Node {url} unavailable: {message}")]
    NodeUnavailable { url: String, message: String },

    #[error("All Symbol nodes unavailable. Last error: {message}")]
    AllNodesUnavailable { message: String },

    #[error("No Symbol nodes configured")]
    NoNodesConfigured,

    #[error("Invalid Symbol address: {address}")]
    InvalidAddress { address: String },

    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("Skipped transaction {transaction_id}: {message}")]
    MatchScan {
        transaction_id: String,
        message: String,
    },

    #[error("Network error: {message}")]
    NetworkError { message: String },

    #[error("Rate limit exceeded. Please try again later")]
    RateLimitError,

    #[error("Timeout error: operation timed out after {millis} ms")]
    TimeoutError { millis: u64 },

    #[error("Serialization error: {message}")]
    SerializationError { message: String },

    #[error("Configuration error: {message}")]
    ConfigError { message: String },
}

impl SymbolError {
    pub fn node_unavailable(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::NodeUnavailable {
            url: url.into(),
            message: message.into(),
        }
    }

    pub fn all_nodes_unavailable(message: impl Into<String>) -> Self {
        Self::AllNodesUnavailable {
            message: message.into(),
        }
    }

    pub fn invalid_address(address: impl Into<String>) -> Self {
        Self::InvalidAddress {
            address: address.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn match_scan(transaction_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::MatchScan {
            transaction_id: transaction_id.into(),
            message: message.into(),
        }
    }

    pub fn network_error(message: impl Into<String>) -> Self {
        Self::NetworkError {
            message: message.into(),
        }
    }

    pub fn timeout_error(millis: u64) -> Self {
        Self::TimeoutError { millis }
    }

    pub fn serialization_error(message: impl Into<String>) -> Self {
        Self::SerializationError {
            message: message.into(),
        }
    }

    pub fn config_error(message: impl Into<String>) -> Self {
        Self::ConfigError {
            message: message.into(),
        }
    }

    /// Errors that say something about the node rather than about the
    /// request. These are the ones worth failing over for.
    pub fn is_connectivity(&self) -> bool {
        matches!(
            self,
            SymbolError::NodeUnavailable { .. }
                | SymbolError::AllNodesUnavailable { .. }
                | SymbolError::NoNodesConfigured
                | SymbolError::NetworkError { .. }
                | SymbolError::RateLimitError
                | SymbolError::TimeoutError { .. }
                | SymbolError::SerializationError { .. }
        )
    }
}

impl From<reqwest::Error> for SymbolError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            SymbolError::timeout_error(0)
        } else if err.status() == Some(reqwest::StatusCode::TOO_MANY_REQUESTS) {
            SymbolError::RateLimitError
        } else {
            SymbolError::network_error(format!("Request error: {}", err))
        }
    }
}

impl From<serde_json::Error> for SymbolError {
    fn from(err: serde_json::Error) -> Self {
        SymbolError::serialization_error(format!("JSON error: {}", err))
    }
}
