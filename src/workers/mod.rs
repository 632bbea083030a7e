pub mod node_probe;
pub mod payment_watch;
