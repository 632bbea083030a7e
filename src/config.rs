//! Application configuration module
//! Loads settings from the environment (after `.env`) and validates them.

use std::env;
use std::time::Duration;

use crate::chains::symbol::config::SymbolConfig;
use crate::chains::symbol::errors::SymbolError;
use crate::chains::symbol::types::SymbolAddress;

/// Main application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub symbol: SymbolConfig,
    pub payments: PaymentsConfig,
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Database configuration. Without a URL the gateway keeps payments in memory.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: Option<String>,
    pub max_connections: u32,
    pub connection_timeout: u64, // seconds
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// Log format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Plain,
}

/// Payment lifecycle settings
#[derive(Debug, Clone)]
pub struct PaymentsConfig {
    pub poll_interval: Duration,
    pub expiry: chrono::Duration,
    pub recipient_address: Option<String>,
    pub keepalive: Duration,
}

impl Default for PaymentsConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(60),
            expiry: chrono::Duration::minutes(30),
            recipient_address: None,
            keepalive: Duration::from_secs(15),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenv::dotenv().ok();

        Ok(AppConfig {
            server: ServerConfig::from_env()?,
            database: DatabaseConfig::from_env()?,
            logging: LoggingConfig::from_env(),
            symbol: SymbolConfig::from_env()?,
            payments: PaymentsConfig::from_env()?,
        })
    }

    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.validate()?;
        self.database.validate()?;
        self.logging.validate()?;
        self.symbol.validate()?;
        self.payments.validate()?;

        Ok(())
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(ServerConfig {
            host: env::var("SERVER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: env::var("SERVER_PORT")
                .unwrap_or_else(|_| "8000".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("SERVER_PORT".to_string()))?,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::InvalidValue(
                "SERVER_PORT cannot be 0".to_string(),
            ));
        }

        if self.host.is_empty() {
            return Err(ConfigError::InvalidValue(
                "SERVER_HOST cannot be empty".to_string(),
            ));
        }

        Ok(())
    }
}

impl DatabaseConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(DatabaseConfig {
            url: env::var("DATABASE_URL").ok().filter(|url| !url.trim().is_empty()),
            max_connections: env::var("DB_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("DB_MAX_CONNECTIONS".to_string()))?,
            connection_timeout: env::var("DB_CONNECTION_TIMEOUT")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("DB_CONNECTION_TIMEOUT".to_string()))?,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(url) = &self.url {
            if !url.starts_with("postgres://") && !url.starts_with("postgresql://") {
                return Err(ConfigError::InvalidValue(
                    "DATABASE_URL must be a PostgreSQL URL".to_string(),
                ));
            }
        }

        if self.max_connections == 0 {
            return Err(ConfigError::InvalidValue(
                "DB_MAX_CONNECTIONS must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

impl LoggingConfig {
    pub fn from_env() -> Self {
        LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            format: match env::var("LOG_FORMAT")
                .unwrap_or_else(|_| "plain".to_string())
                .to_lowercase()
                .as_str()
            {
                "json" => LogFormat::Json,
                _ => LogFormat::Plain,
            },
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let valid_levels = ["TRACE", "DEBUG", "INFO", "WARN", "ERROR"];
        if !valid_levels.contains(&self.level.to_uppercase().as_str()) {
            return Err(ConfigError::InvalidValue("LOG_LEVEL".to_string()));
        }

        Ok(())
    }
}

impl PaymentsConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let poll_secs: u64 = parse_var("PAYMENT_POLL_INTERVAL_SECS", defaults.poll_interval.as_secs())?;
        let expiry_minutes: i64 = parse_var("PAYMENT_EXPIRY_MINUTES", defaults.expiry.num_minutes())?;
        let keepalive_secs: u64 = parse_var("STATUS_KEEPALIVE_SECS", defaults.keepalive.as_secs())?;

        Ok(PaymentsConfig {
            poll_interval: Duration::from_secs(poll_secs),
            expiry: chrono::Duration::try_minutes(expiry_minutes)
                .ok_or_else(|| ConfigError::InvalidValue("PAYMENT_EXPIRY_MINUTES".to_string()))?,
            recipient_address: env::var("PAYMENT_RECIPIENT_ADDRESS")
                .ok()
                .filter(|a| !a.trim().is_empty()),
            keepalive: Duration::from_secs(keepalive_secs),
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval.is_zero() {
            return Err(ConfigError::InvalidValue(
                "PAYMENT_POLL_INTERVAL_SECS must be greater than 0".to_string(),
            ));
        }

        if self.expiry <= chrono::Duration::zero() {
            return Err(ConfigError::InvalidValue(
                "PAYMENT_EXPIRY_MINUTES must be greater than 0".to_string(),
            ));
        }

        if chrono::Utc::now().checked_add_signed(self.expiry).is_none() {
            return Err(ConfigError::InvalidValue(
                "PAYMENT_EXPIRY_MINUTES is too large".to_string(),
            ));
        }

        if self.keepalive.is_zero() {
            return Err(ConfigError::InvalidValue(
                "STATUS_KEEPALIVE_SECS must be greater than 0".to_string(),
            ));
        }

        if let Some(address) = &self.recipient_address {
            SymbolAddress::parse(address).map_err(|_| {
                ConfigError::InvalidValue("PAYMENT_RECIPIENT_ADDRESS".to_string())
            })?;
        }

        Ok(())
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(key.to_string())),
        Err(_) => Ok(default),
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for configuration: {0}")]
    InvalidValue(String),

    #[error("Symbol configuration: {0}")]
    Symbol(#[from] SymbolError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_config_validation() {
        let config = ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 8000,
        };

        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_port_validation() {
        let config = ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
        };

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_host_validation() {
        let config = ServerConfig {
            host: "".to_string(),
            port: 8000,
        };

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_database_url_scheme() {
        let mut config = DatabaseConfig {
            url: None,
            max_connections: 10,
            connection_timeout: 30,
        };
        assert!(config.validate().is_ok());

        config.url = Some("mysql://localhost/payments".to_string());
        assert!(config.validate().is_err());

        config.url = Some("postgres://localhost/payments".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_payments_config_validation() {
        let mut config = PaymentsConfig::default();
        assert!(config.validate().is_ok());

        config.recipient_address = Some("not-an-address".to_string());
        assert!(config.validate().is_err());

        config.recipient_address = Some("TBRQRUEHXI3OLJD47R3IKMX5TTVV3N6SQ7KY5UA".to_string());
        assert!(config.validate().is_ok());

        config.expiry = chrono::Duration::zero();
        assert!(config.validate().is_err());

        // fits in a TimeDelta but not in a DateTime once added to now
        config.expiry = chrono::Duration::try_minutes(1_000_000_000_000).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_log_level_validation() {
        let config = LoggingConfig {
            level: "verbose".to_string(),
            format: LogFormat::Plain,
        };
        assert!(config.validate().is_err());
    }
}
