pub mod client;
pub mod config;
pub mod errors;
pub mod failover;
pub mod health;
pub mod matcher;
pub mod types;
