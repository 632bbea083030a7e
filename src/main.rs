use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::watch;
use tower::ServiceBuilder;
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};
use tracing::{error, info, warn};

use symbol_payment_gateway::api::{self, AppState};
use symbol_payment_gateway::chains::symbol::{
    client::build_http_client,
    config::NodeRegistry,
    failover::FailoverExecutor,
    health::NodeHealthTracker,
    matcher::{MatchRules, TransactionMatcher},
};
use symbol_payment_gateway::config::AppConfig;
use symbol_payment_gateway::database::payment_repository::{InMemoryPaymentStore, PaymentStore};
use symbol_payment_gateway::health::HealthChecker;
use symbol_payment_gateway::logging::init_tracing;
use symbol_payment_gateway::middleware::logging::{request_logging_middleware, UuidRequestId};
use symbol_payment_gateway::workers::node_probe::NodeProbeWorker;

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, starting graceful shutdown");
}

async fn shutdown_signal_with_notify(shutdown_tx: watch::Sender<bool>) {
    shutdown_signal().await;
    let _ = shutdown_tx.send(true);
}

async fn build_store(config: &AppConfig) -> anyhow::Result<Arc<dyn PaymentStore>> {
    #[cfg(feature = "database")]
    if let Some(url) = &config.database.url {
        use symbol_payment_gateway::database::{
            init_pool_from_config, payment_repository::PgPaymentRepository,
        };

        info!("📊 Initializing database connection pool...");
        let pool = init_pool_from_config(url, &config.database)
            .await
            .map_err(|e| {
                error!("Failed to initialize database pool: {}", e);
                e
            })?;
        info!(
            max_connections = pool.options().get_max_connections(),
            "✅ Database connection pool initialized"
        );
        return Ok(Arc::new(PgPaymentRepository::new(pool)));
    }

    #[cfg(not(feature = "database"))]
    if config.database.url.is_some() {
        warn!("DATABASE_URL is set but the `database` feature is disabled");
    }

    warn!("⏭️  No database configured, payments are kept in memory");
    Ok(Arc::new(InMemoryPaymentStore::new()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env()?;
    init_tracing(&config.logging);
    config.validate()?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        network = ?config.symbol.network,
        "🚀 Starting Symbol payment gateway"
    );

    let store = build_store(&config).await?;

    let registry = Arc::new(NodeRegistry::from_config(&config.symbol));
    if registry.is_empty() {
        warn!("No Symbol nodes configured; every chain lookup will fail");
    }
    for node in registry.list_nodes() {
        info!(
            node = %node.url,
            name = %node.display_name,
            region = %node.region,
            priority = node.priority,
            timeout_ms = node.timeout_ms,
            "Symbol node registered"
        );
    }

    let tracker = Arc::new(NodeHealthTracker::new(
        &registry,
        config.symbol.circuit_breaker_threshold,
    ));
    let executor = FailoverExecutor::new(&registry, build_http_client()?, tracker.clone());
    let matcher = TransactionMatcher::new(
        executor.clone(),
        MatchRules::new(
            &config.symbol.currency_mosaic_ids,
            config.symbol.epoch_adjustment,
            config.symbol.transfer_page_size,
        ),
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let probe = NodeProbeWorker::new(executor, config.symbol.health_check_interval);
    let probe_handle = tokio::spawn(probe.run(shutdown_rx.clone()));
    info!("✅ Node probe worker started");

    let state = AppState {
        store: store.clone(),
        source: Arc::new(matcher),
        registry,
        tracker: tracker.clone(),
        health_checker: HealthChecker::new(store, tracker),
        payments: config.payments.clone(),
        currency_mosaic_id: config.symbol.network.currency_mosaic_id().to_string(),
        shutdown: shutdown_rx,
    };

    let app = api::router(state).layer(
        ServiceBuilder::new()
            .layer(SetRequestIdLayer::x_request_id(UuidRequestId))
            .layer(axum::middleware::from_fn(request_logging_middleware))
            .layer(PropagateRequestIdLayer::x_request_id()),
    );

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
        error!("❌ Failed to bind to address {}: {}", addr, e);
        e
    })?;

    info!(address = %addr, "🌐 Symbol payment gateway listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal_with_notify(shutdown_tx))
        .await?;

    if let Err(e) = probe_handle.await {
        warn!(error = %e, "Node probe worker did not stop cleanly");
    }

    info!("Server shut down");
    Ok(())
}
