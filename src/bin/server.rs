use std::error::Error;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use sea_orm::{ConnectOptions, Database};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use hotspot_sync::db::EntityStore;
use hotspot_sync::db::schema::create_tables;
use hotspot_sync::http_server::{AppState, run_http_server};
use hotspot_sync::notifications::TrafficNotifier;
use hotspot_sync::payments::PaystackClient;
use hotspot_sync::router::RouterClient;
use hotspot_sync::server::config::ServerConfig;
use hotspot_sync::server::logging::init_logging;
use hotspot_sync::sync::{ChangeDispatcher, PushExecutor, PushQueue, PushWorkerPool, ReconciliationEngine, Scheduler};

const TRAFFIC_CHANNEL_CAPACITY: usize = 256;

#[derive(Parser, Debug)]
#[command(author, version, about = "Keeps the hotspot database and the router's user manager in sync")]
struct Args {
    /// Path to a TOML config file. Environment variables override its values.
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    let config = ServerConfig::load(args.config.as_deref())?;
    init_logging(&config.log_dir);
    info!(version = env!("CARGO_PKG_VERSION"), "Starting hotspot-sync...");

    let mut opt = ConnectOptions::new(config.database_url.clone());
    opt.max_connections(20)
        .min_connections(2)
        .connect_timeout(Duration::from_secs(8))
        .sqlx_logging(false);
    let db = Database::connect(opt).await?;
    create_tables(&db).await?;
    info!("Database ready.");

    let router = RouterClient::from_config(&config)?;
    let (queue, push_rx) = PushQueue::new();
    let store = EntityStore::new(db.clone(), Arc::new(ChangeDispatcher::new()), queue);
    let notifier = TrafficNotifier::new(TRAFFIC_CHANNEL_CAPACITY);
    let executor = Arc::new(PushExecutor::new(router.clone(), db.clone()));
    let engine = Arc::new(ReconciliationEngine::new(router, store.clone(), notifier.clone()));

    let gateway = if config.gateway_secret_key.is_empty() {
        warn!("No payment gateway secret configured; online payments are disabled.");
        None
    } else {
        Some(PaystackClient::from_config(&config)?)
    };

    let shutdown = CancellationToken::new();
    let workers = PushWorkerPool::spawn(executor.clone(), push_rx, config.push_workers, shutdown.clone());
    let scheduler = Scheduler::new(engine.clone(), Duration::from_secs(config.sync_interval_secs))
        .spawn(shutdown.clone());

    let app_state = Arc::new(AppState {
        store,
        engine,
        executor,
        notifier,
        gateway,
        currency: config.currency.clone(),
    });
    let addr: SocketAddr = config.listen_addr.parse()?;
    let http = tokio::spawn(run_http_server(app_state, addr, shutdown.clone()));

    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for shutdown signal.");
        }
        info!("Shutdown requested.");
        signal_token.cancel();
    });

    match http.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            error!(error = %e, "HTTP server stopped with an error.");
            shutdown.cancel();
        }
        Err(e) => {
            error!(error = %e, "HTTP server task panicked.");
            shutdown.cancel();
        }
    }

    if let Err(e) = scheduler.await {
        error!(error = %e, "Scheduler task ended abnormally.");
    }
    if let Err(e) = workers.await {
        error!(error = %e, "Push worker pool ended abnormally.");
    }
    info!("hotspot-sync stopped.");
    Ok(())
}
