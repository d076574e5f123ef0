//! SUREBET — Sports-Betting Arbitrage Scanner
//!
//! Entry point. Loads configuration, initialises structured logging,
//! opens the database, and runs the scan→detect→persist→alert loop
//! with graceful shutdown.

use anyhow::Result;
use std::time::Duration;
use tracing::{error, info, warn};

use surebet::alerts::{AlertSink, TelegramNotifier};
use surebet::arb::detector::OpportunityDetector;
use surebet::config::AppConfig;
use surebet::engine::Scanner;
use surebet::feeds::odds_api::TheOddsApiClient;
use surebet::feeds::sample::SampleFeed;
use surebet::feeds::OddsFeed;
use surebet::quota::QuotaTracker;
use surebet::storage::SqliteStore;

const BANNER: &str = r#"
 ____  _   _ ____  _____ ____  _____ _____
/ ___|| | | |  _ \| ____| __ )| ____|_   _|
\___ \| | | | |_) |  _| |  _ \|  _|   | |
 ___) | |_| |  _ <| |___| |_) | |___  | |
|____/ \___/|_| \_\_____|____/|_____| |_|

  Cross-Bookmaker Arbitrage Scanner
  v0.1.0
"#;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    // Configuration errors are the one fatal startup condition.
    let cfg = AppConfig::load("config.toml")?;

    init_logging();

    println!("{BANNER}");
    info!(
        sports = cfg.scanner.sports.len(),
        scan_interval_secs = cfg.scanner.scan_interval_secs,
        min_profit_pct = cfg.scanner.min_profit_pct,
        "SUREBET starting up"
    );

    // -- Initialise components -------------------------------------------

    let store = SqliteStore::connect(&cfg.database.path).await?;

    let feed: Box<dyn OddsFeed> = match AppConfig::resolve_secret(&cfg.odds_api.api_key_env) {
        Ok(api_key) => {
            let client =
                TheOddsApiClient::new(api_key, &cfg.odds_api.regions, &cfg.odds_api.markets)?;
            // Cheap key check before we start burning quota on odds calls.
            match client.list_sports().await {
                Ok(sports) => info!(available = sports.len(), "The Odds API connected"),
                Err(e) => warn!(error = %e, "API key check failed — continuing, fetches may fail"),
            }
            Box::new(client)
        }
        Err(_) => {
            warn!("No Odds API key configured — running against sample data");
            Box::new(SampleFeed)
        }
    };

    let sink: Option<Box<dyn AlertSink>> = if cfg.alerts.enabled {
        match build_telegram(&cfg) {
            Ok(notifier) => Some(Box::new(notifier)),
            Err(e) => {
                warn!(error = %e, "Telegram alerts disabled");
                None
            }
        }
    } else {
        None
    };

    let quota = QuotaTracker::new(
        cfg.quota.calls_limit,
        chrono::Duration::days(cfg.quota.window_days),
    );

    let scanner = Scanner::new(
        feed,
        OpportunityDetector::new(cfg.detector_config()),
        store,
        sink,
        quota,
        cfg.scanner.sports.clone(),
    );

    // -- Main loop -------------------------------------------------------

    let scan_interval = Duration::from_secs(cfg.scanner.scan_interval_secs);
    let mut interval = tokio::time::interval(scan_interval);
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    info!(
        interval_secs = cfg.scanner.scan_interval_secs,
        "Entering scan loop. Press Ctrl+C to stop."
    );

    let mut cycle_number: u64 = 0;
    loop {
        tokio::select! {
            _ = interval.tick() => {
                cycle_number += 1;
                // The cycle (including in-flight persistence) runs to
                // completion before shutdown is observed again.
                let report = scanner.run_cycle(cycle_number).await;
                log_cycle_report(&report);

                if cycle_number % 10 == 0 {
                    match scanner.stats().await {
                        Ok(stats) => info!(
                            cycle = cycle_number,
                            opportunities_today = stats.opportunities_today,
                            opportunities_total = stats.opportunities_total,
                            snapshots = stats.snapshots_total,
                            "Running totals"
                        ),
                        Err(e) => error!(error = %e, "Failed to read stats"),
                    }
                }
            }
            _ = &mut shutdown => {
                info!("Shutdown signal received.");
                break;
            }
        }
    }

    info!(
        cycles = cycle_number,
        quota_remaining = scanner.quota_remaining(),
        "SUREBET shut down cleanly."
    );

    Ok(())
}

fn build_telegram(cfg: &AppConfig) -> Result<TelegramNotifier> {
    let token_env = cfg
        .alerts
        .telegram_bot_token_env
        .as_deref()
        .ok_or_else(|| anyhow::anyhow!("alerts.telegram_bot_token_env not set"))?;
    let chat_env = cfg
        .alerts
        .telegram_chat_id_env
        .as_deref()
        .ok_or_else(|| anyhow::anyhow!("alerts.telegram_chat_id_env not set"))?;

    let token = AppConfig::resolve_secret(token_env)?;
    let chat_id = std::env::var(chat_env)
        .map_err(|_| anyhow::anyhow!("Environment variable not set: {chat_env}"))?;

    TelegramNotifier::new(token, &chat_id)
}

/// Log a human-readable cycle summary.
fn log_cycle_report(report: &surebet::engine::CycleReport) {
    info!(
        cycle = report.cycle_number,
        scanned = report.sports_scanned,
        skipped_quota = report.sports_skipped_quota,
        failed = report.sports_failed,
        events = report.events_seen,
        snapshots = report.snapshots_built,
        detected = report.opportunities_detected,
        new = report.opportunities_new,
        alerts = report.alerts_sent,
        persist_failures = report.persist_failures,
        quota_remaining = report.quota_remaining,
        "Cycle complete"
    );
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("surebet=info"));

    let json_logging = std::env::var("SUREBET_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    } else {
        fmt().with_env_filter(env_filter).with_target(true).init();
    }
}
