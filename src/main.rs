mod config;
mod error;
mod ledger;
mod logging;
mod rewards;
mod server;
mod settlement;

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing::{error, info, warn};

use crate::config::{Config, SETTLEMENT_PERIOD_SECS};
use crate::ledger::{LedgerClient, SnapshotSource};
use crate::rewards::report::render_rates;
use crate::settlement::{LedgerSettlementTrigger, SettlementScheduler, SettlementTrigger};

#[derive(Parser, Debug)]
#[command(name = "settlement-keeper")]
#[command(about = "Triggers settlement of the betting pool on every minute boundary")]
struct Cli {
    /// Run a single settlement and exit (0 on success, 1 on failure)
    #[arg(long)]
    once: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Trigger settlement every minute until interrupted
    Run {
        /// Run a single settlement and exit
        #[arg(long)]
        once: bool,
    },
    /// Show projected daily reward rates from the current pool snapshot
    Rates {
        /// Account whose positions and eligibility are shown
        #[arg(long)]
        owner: Option<String>,

        /// Hypothetical stake to project on every target
        #[arg(long)]
        bet: Option<u64>,

        /// Keep refreshing the snapshot until interrupted
        #[arg(long)]
        watch: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            logging::init_tracing(None);
            error!("❌ Invalid configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };
    logging::init_tracing(Some(&config.log_path));

    let result = match cli.command {
        Some(Command::Rates { owner, bet, watch }) => show_rates(&config, owner, bet, watch).await,
        Some(Command::Run { once }) if once || cli.once => settle_once(&config).await,
        None if cli.once => settle_once(&config).await,
        _ => run_continuous(&config).await,
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            error!("❌ {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn build_trigger(config: &Config) -> Result<LedgerSettlementTrigger> {
    let client = LedgerClient::new(&config.endpoint, config.request_timeout)
        .context("Failed to build ledger client")?;
    Ok(LedgerSettlementTrigger::new(
        Arc::new(client),
        config.keeper_account.clone(),
    ))
}

async fn settle_once(config: &Config) -> Result<ExitCode> {
    info!(
        "🚀 Running single settlement for chain {} app {}",
        config.chain_id, config.app_id
    );
    let trigger = build_trigger(config)?;

    Ok(match settlement::run_once(&trigger).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(_) => ExitCode::FAILURE,
    })
}

async fn run_continuous(config: &Config) -> Result<ExitCode> {
    info!("🚀 Starting settlement keeper");
    info!("📡 Endpoint: {}", config.endpoint);
    info!("👤 Keeper account: {}", config.keeper_account);
    info!("📝 Log file: {}", config.log_path.display());

    if config.settlement_interval_secs != SETTLEMENT_PERIOD_SECS {
        warn!(
            "⚠️ KEEPER_INTERVAL_SECS={} is ignored, settlement runs on every minute boundary",
            config.settlement_interval_secs
        );
    }

    let trigger: Arc<dyn SettlementTrigger> = Arc::new(build_trigger(config)?);
    let scheduler = SettlementScheduler::new(trigger).start();

    let status_server = config.status_addr.clone().map(|addr| {
        let app = server::create_app(scheduler.monitor());
        tokio::spawn(async move {
            if let Err(e) = server::run_server(app, &addr).await {
                error!("❌ Status server failed: {:#}", e);
            }
        })
    });

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("❌ Failed to listen for shutdown signal: {}", e);
    }
    info!("🛑 Shutdown requested, waiting for the scheduler to stop");

    if let Some(server) = status_server {
        server.abort();
    }
    let status = scheduler.shutdown().await;

    info!(
        "✓ Settlement keeper stopped ({} fired, {} skipped, {} succeeded, {} failed)",
        status.fired, status.skipped, status.succeeded, status.failed
    );
    Ok(ExitCode::SUCCESS)
}

async fn show_rates(
    config: &Config,
    owner: Option<String>,
    bet: Option<u64>,
    watch: bool,
) -> Result<ExitCode> {
    let client = LedgerClient::new(&config.endpoint, config.request_timeout)
        .context("Failed to build ledger client")?;

    if !watch {
        print_rates(&client, owner.as_deref(), bet).await?;
        return Ok(ExitCode::SUCCESS);
    }

    // Snapshots refresh on their own period, independent of the settlement cadence
    let mut refresh = tokio::time::interval(config.snapshot_refresh);
    loop {
        tokio::select! {
            _ = refresh.tick() => {
                if let Err(e) = print_rates(&client, owner.as_deref(), bet).await {
                    warn!("⚠️ Snapshot refresh failed: {:#}", e);
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    Ok(ExitCode::SUCCESS)
}

async fn print_rates(source: &dyn SnapshotSource, owner: Option<&str>, bet: Option<u64>) -> Result<()> {
    let snapshot = source
        .fetch_snapshot()
        .await
        .context("Failed to fetch pool snapshot")?;

    let positions = match owner {
        Some(owner) => source
            .fetch_positions(owner)
            .await
            .with_context(|| format!("Failed to fetch positions for {}", owner))?,
        None => Vec::new(),
    };

    println!("{}", render_rates(&snapshot, &positions, bet, Utc::now()));
    println!();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_modes() {
        let cli = Cli::try_parse_from(["settlement-keeper"]).unwrap();
        assert!(!cli.once);
        assert!(cli.command.is_none());

        let cli = Cli::try_parse_from(["settlement-keeper", "--once"]).unwrap();
        assert!(cli.once);

        let cli = Cli::try_parse_from(["settlement-keeper", "run", "--once"]).unwrap();
        assert!(matches!(cli.command, Some(Command::Run { once: true })));
    }

    #[test]
    fn test_cli_rates() {
        let cli = Cli::try_parse_from([
            "settlement-keeper",
            "rates",
            "--owner",
            "0xowner",
            "--bet",
            "250",
            "--watch",
        ])
        .unwrap();

        match cli.command {
            Some(Command::Rates { owner, bet, watch }) => {
                assert_eq!(owner.as_deref(), Some("0xowner"));
                assert_eq!(bet, Some(250));
                assert!(watch);
            }
            other => panic!("unexpected command: {:?}", other),
        }

        assert!(Cli::try_parse_from(["settlement-keeper", "rates", "--bet", "-5"]).is_err());
    }
}
