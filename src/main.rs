//! swapwatch entry point.
//!
//! Loads configuration, initialises structured logging, opens the order
//! store, then runs the funding watcher and the HTTP API side by side until
//! Ctrl+C (or a fatal watcher error).

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use swapwatch::api::{self, ApiState};
use swapwatch::chain::esplora::EsploraClient;
use swapwatch::chain::ChainClient;
use swapwatch::config::AppConfig;
use swapwatch::engine::evaluator::OrderEvaluator;
use swapwatch::engine::scheduler::Watcher;
use swapwatch::engine::WatchError;
use swapwatch::storage::sqlite::SqliteStore;
use swapwatch::storage::OrderStore;
use swapwatch::wallet::ocean::OceanClient;
use swapwatch::wallet::WalletService;

const BANNER: &str = r#"
  swapwatch
  order funding watcher and trade settlement
"#;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let cfg = AppConfig::load("config.toml")?;
    init_logging();

    println!("{BANNER}");
    info!(
        version = env!("CARGO_PKG_VERSION"),
        database = %cfg.storage.database_url,
        wallet = %cfg.wallet.endpoint,
        explorer = %cfg.chain.explorer_url,
        "swapwatch starting up"
    );

    // -- Services --------------------------------------------------------

    let store: Arc<dyn OrderStore> = Arc::new(
        SqliteStore::connect(&cfg.storage.database_url)
            .await
            .context("Failed to open order store")?,
    );
    let chain: Arc<dyn ChainClient> = Arc::new(EsploraClient::new(
        &cfg.chain.explorer_url,
        Duration::from_secs(cfg.chain.timeout_secs),
    )?);
    let wallet: Arc<dyn WalletService> = Arc::new(OceanClient::new(
        &cfg.wallet.endpoint,
        cfg.wallet_token()?,
        Duration::from_secs(cfg.wallet.timeout_secs),
    )?);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // -- Watcher ---------------------------------------------------------

    let mut watcher_task = match cfg.watch_interval() {
        Some(interval) => {
            let evaluator =
                OrderEvaluator::new(chain.clone(), wallet.clone(), store.clone(), cfg.expiry());
            let watcher = Watcher::new(
                store.clone(),
                evaluator,
                interval,
                cfg.watcher.on_fetch_failure,
            );
            let rx = shutdown_rx.clone();
            Some(tokio::spawn(async move { watcher.run(rx).await }))
        }
        None => {
            warn!(
                interval_secs = cfg.watcher.interval_secs,
                "Watch interval not positive, watcher disabled"
            );
            None
        }
    };

    // -- API -------------------------------------------------------------

    let state = Arc::new(ApiState {
        store,
        chain,
        wallet,
    });
    let mut api_task = tokio::spawn(api::serve(state, cfg.server.port, shutdown_rx));

    info!("Running. Press Ctrl+C to stop.");

    let outcome = tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received.");
            Ok(())
        }
        res = join_watcher(&mut watcher_task) => res.context("Watcher terminated"),
        res = &mut api_task => match res {
            Ok(served) => served,
            Err(e) => Err(anyhow::anyhow!("API task panicked: {e}")),
        },
    };

    // -- Shutdown --------------------------------------------------------

    let _ = shutdown_tx.send(true);
    if let Some(handle) = watcher_task {
        match handle.await {
            Ok(Err(e)) => error!(error = %e, "Watcher stopped with error"),
            Err(e) => error!(error = %e, "Watcher task panicked"),
            Ok(Ok(())) => {}
        }
    }
    if !api_task.is_finished()
        && tokio::time::timeout(Duration::from_secs(5), api_task)
            .await
            .is_err()
    {
        warn!("API server did not stop within 5s");
    }

    match &outcome {
        Ok(()) => info!("swapwatch shut down cleanly."),
        Err(e) => error!(error = %e, "swapwatch exiting on error"),
    }
    outcome
}

/// Wait for the watcher task, or forever when the watcher is disabled.
async fn join_watcher(task: &mut Option<JoinHandle<Result<(), WatchError>>>) -> Result<()> {
    match task {
        Some(handle) => {
            let joined = handle.await;
            *task = None;
            joined.context("Watcher task panicked")??;
            Ok(())
        }
        None => std::future::pending().await,
    }
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("swapwatch=info"));

    let json_logging = std::env::var("SWAPWATCH_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
