use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use wikindex_core::{config, Store, StoreConfig};
use wikindex_server::api::create_router;
use wikindex_server::api::handlers::AppState;
use wikindex_server::api::metrics;

#[derive(Parser)]
#[command(name = "wikindex", about = "Wiki document indexing and search service")]
struct Args {
    /// Port to listen on
    #[arg(short, long, env = "WIKINDEX_PORT", default_value_t = config::DEFAULT_PORT)]
    port: u16,

    /// Address to bind
    #[arg(long, env = "WIKINDEX_HOST", default_value = config::DEFAULT_HOST)]
    host: String,

    /// Data directory shared by every instance
    #[arg(short, long, env = "WIKINDEX_DATA_DIR", default_value = config::DEFAULT_DATA_DIR)]
    data_dir: PathBuf,

    /// Maximum concurrent store operations per instance
    #[arg(long, env = "WIKINDEX_POOL_SIZE", default_value_t = config::DEFAULT_POOL_SIZE)]
    pool_size: usize,

    /// Log size in bytes that triggers compaction after a write (0 = disabled)
    #[arg(long, env = "WIKINDEX_COMPACT_THRESHOLD_BYTES", default_value_t = config::DEFAULT_COMPACT_THRESHOLD_BYTES)]
    compact_threshold_bytes: u64,

    /// Compaction interval in seconds (0 = disabled)
    #[arg(long, env = "WIKINDEX_SNAPSHOT_INTERVAL", default_value_t = config::DEFAULT_SNAPSHOT_INTERVAL_SECS)]
    snapshot_interval: u64,

    /// Graceful shutdown timeout in seconds
    #[arg(long, env = "WIKINDEX_SHUTDOWN_TIMEOUT", default_value_t = config::DEFAULT_SHUTDOWN_TIMEOUT_SECS)]
    shutdown_timeout: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("wikindex_server=info".parse()?)
                .add_directive("wikindex_core=info".parse()?),
        )
        .init();

    let args = Args::parse();

    if args.port == 0 {
        eprintln!("Error: port must be > 0");
        std::process::exit(1);
    }
    if args.pool_size == 0 {
        eprintln!("Error: pool_size must be > 0");
        std::process::exit(1);
    }
    if args.data_dir.exists() && !args.data_dir.is_dir() {
        eprintln!(
            "Error: data_dir '{}' exists but is not a directory",
            args.data_dir.display()
        );
        std::process::exit(1);
    }

    let store_config = StoreConfig::new(&args.data_dir)
        .with_pool_size(args.pool_size)
        .with_compact_threshold(args.compact_threshold_bytes);
    let store = Arc::new(Store::open(store_config)?);

    let prometheus_handle =
        metrics_exporter_prometheus::PrometheusBuilder::new().install_recorder()?;
    metrics::update_store_metrics(&store);

    let app = create_router(AppState::new(Arc::clone(&store), prometheus_handle));
    let addr = format!("{}:{}", args.host, args.port);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        addr = %addr,
        data_dir = %args.data_dir.display(),
        pool_size = args.pool_size,
        compact_threshold_bytes = args.compact_threshold_bytes,
        snapshot_interval_secs = args.snapshot_interval,
        documents = store.document_count(),
        "wikindex ready"
    );

    // Spawn store metrics background task
    let metrics_store = Arc::clone(&store);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(15));
        loop {
            interval.tick().await;
            metrics::update_store_metrics(&metrics_store);
        }
    });

    // Spawn periodic compaction task
    if args.snapshot_interval > 0 {
        let snap_store = Arc::clone(&store);
        let snap_interval = args.snapshot_interval;
        tracing::info!("Periodic compaction enabled every {}s", snap_interval);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(snap_interval));
            interval.tick().await;
            loop {
                interval.tick().await;
                tracing::info!("Running periodic compaction...");
                let store = Arc::clone(&snap_store);
                match tokio::task::spawn_blocking(move || store.compact()).await {
                    Ok(Ok(_)) => {}
                    Ok(Err(e)) => tracing::error!("Periodic compaction failed: {}", e),
                    Err(e) => tracing::error!("Periodic compaction task failed: {}", e),
                }
            }
        });
    }

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(wait_for_signal())
        .await?;

    compact_and_shutdown(store, args.shutdown_timeout).await;

    Ok(())
}

async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received SIGINT"),
        _ = terminate => tracing::info!("Received SIGTERM"),
    }

    tracing::info!("Shutting down gracefully, draining in-flight requests...");
}

/// Folds the log into a snapshot so the next start replays nothing.
///
/// Every write is already durable, so running out of time only costs a
/// longer replay on the next start.
async fn compact_and_shutdown(store: Arc<Store>, timeout_secs: u64) {
    tracing::info!("All requests drained, compacting store...");
    let task = tokio::task::spawn_blocking(move || store.compact());
    match tokio::time::timeout(Duration::from_secs(timeout_secs), task).await {
        Ok(Ok(Ok(stats))) => tracing::info!(
            documents = stats.documents,
            generation = stats.generation,
            "Shutdown compaction complete"
        ),
        Ok(Ok(Err(e))) => tracing::error!("Shutdown compaction failed, log preserved: {}", e),
        Ok(Err(e)) => tracing::error!("Shutdown compaction task failed: {}", e),
        Err(_) => tracing::error!(
            "Shutdown compaction timeout ({}s) exceeded, log preserved",
            timeout_secs
        ),
    }
}
