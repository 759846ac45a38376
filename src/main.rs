//! Auction operator entry point.
//!
//! Loads configuration, initialises structured logging, connects to the
//! auction hook and runs one worker per configured pool, plus fee
//! withdrawal and wallet health checks, until Ctrl+C.

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use auction_operator::chain::hook::HookContract;
use auction_operator::chain::AuctionContract;
use auction_operator::config::AppConfig;
use auction_operator::dashboard::{self, routes::DashboardState};
use auction_operator::engine::{
    ActionExecutor, AuctionReader, BalanceMonitor, CycleReport, FeeWithdrawer, PoolWorker,
};
use auction_operator::estimator::StaticEstimator;
use auction_operator::types::short_address;

const BANNER: &str = r#"
    _              _   _                ___
   / \  _   _  ___| |_(_) ___  _ __    / _ \ _ __
  / _ \| | | |/ __| __| |/ _ \| '_ \  | | | | '_ \
 / ___ \ |_| | (__| |_| | (_) | | | | | |_| | |_) |
/_/   \_\__,_|\___|\__|_|\___/|_| |_|  \___/| .__/
                                            |_|
  Rent-auction pool operator
  v0.1.0
"#;

/// Cycle reports buffered between the workers and the dashboard.
const REPORT_BUFFER: usize = 256;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let cfg = AppConfig::load("config.toml")?;

    init_logging();

    println!("{BANNER}");
    info!(
        agent_name = %cfg.agent.name,
        poll_interval_secs = cfg.agent.poll_interval_secs,
        dry_run = cfg.agent.dry_run,
        pools = cfg.pools.len(),
        "Auction operator starting up"
    );

    // -- Chain -------------------------------------------------------------

    let rpc_url = cfg.rpc_url()?;
    let private_key = cfg.private_key()?;
    let hook = HookContract::connect(&rpc_url, cfg.hook_address()?, &private_key)
        .await
        .context("Failed to connect to the auction hook")?;
    let chain: Arc<dyn AuctionContract> = Arc::new(hook);
    let operator = chain.operator();

    let mut rules = cfg.auction_rules()?;
    if cfg.chain.discover_rules {
        match chain.read_rules().await {
            Ok(onchain) => {
                for field in rules.apply_contract(&onchain) {
                    warn!(field, "Configured auction rule differs from contract, using contract value");
                }
            }
            Err(e) => warn!(error = %e, "Could not read auction rules from contract, using configured values"),
        }
    }
    info!(
        min_bid_increment = %rules.min_bid_increment,
        min_deposit_blocks = rules.min_deposit_blocks,
        activation_delay = rules.activation_delay,
        min_fee = rules.min_fee,
        max_fee = rules.max_fee,
        "Auction rules"
    );

    // -- Dashboard ---------------------------------------------------------

    let dashboard_state = Arc::new(DashboardState::new(cfg.agent.name.clone(), cfg.agent.dry_run));
    *dashboard_state.operator.write().await = Some(operator.to_string());
    *dashboard_state.rules.write().await = Some(rules.clone());
    if cfg.dashboard.enabled {
        dashboard::spawn_dashboard(dashboard_state.clone(), cfg.dashboard.port);
    }

    let (report_tx, mut report_rx) = mpsc::channel::<CycleReport>(REPORT_BUFFER);
    let sink = dashboard_state.clone();
    let forwarder = tokio::spawn(async move {
        while let Some(report) = report_rx.recv().await {
            sink.record(report).await;
        }
    });

    // -- Workers -----------------------------------------------------------

    let (profit_per_block, volatility) = cfg.static_estimate()?;
    let params = cfg.decision_params(&rules, operator)?;
    let shutdown = CancellationToken::new();
    let mut handles = Vec::with_capacity(cfg.pools.len());

    for pool_cfg in &cfg.pools {
        let pool = pool_cfg.pool_id()?;
        let executor = ActionExecutor::new(
            chain.clone(),
            cfg.pool_key(pool_cfg)?,
            rules.clone(),
            cfg.executor_config()?,
        );
        let worker = PoolWorker::new(
            pool,
            AuctionReader::new(chain.clone()),
            Arc::new(StaticEstimator::new(profit_per_block, volatility)),
            executor,
            params.clone(),
            cfg.worker_config(),
        )
        .with_reports(report_tx.clone());

        dashboard_state.register_pool(pool, pool_cfg.display_name()).await;
        if let Some(history) = worker.audit_history().await {
            dashboard_state
                .set_bid_history(pool, history.len(), history.latest().cloned())
                .await;
        }

        if cfg.upkeep.withdraw_fees {
            let withdrawer = FeeWithdrawer::new(
                chain.clone(),
                pool,
                cfg.pool_key(pool_cfg)?,
                cfg.withdrawal_config()?,
            );
            let token = shutdown.clone();
            handles.push(tokio::spawn(async move { withdrawer.run(token).await }));
        }

        info!(pool = %pool.short(), label = %pool_cfg.display_name(), "Spawning pool worker");
        let worker = Arc::new(worker);
        let token = shutdown.clone();
        handles.push(tokio::spawn(async move { worker.run(token).await }));
    }
    drop(report_tx);

    let (health_interval, low_balance) = cfg.health_check()?;
    let monitor = BalanceMonitor::new(chain.clone(), health_interval, low_balance);
    let token = shutdown.clone();
    handles.push(tokio::spawn(async move { monitor.run(token).await }));

    info!(operator = %short_address(&operator), "Workers running. Press Ctrl+C to stop.");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Shutdown signal received.");
    shutdown.cancel();

    for result in futures::future::join_all(handles).await {
        if let Err(e) = result {
            error!(error = %e, "Background task failed");
        }
    }
    if let Err(e) = forwarder.await {
        error!(error = %e, "Report forwarder failed");
    }

    info!(agent_name = %cfg.agent.name, "Auction operator shut down cleanly.");
    Ok(())
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("auction_operator=info"));

    let json_logging = std::env::var("OPERATOR_LOG_JSON").is_ok();

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
