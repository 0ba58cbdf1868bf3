//! `pricelens watch` — run rounds on the configured wall-clock schedule.

use crate::browser::chromium::ChromiumDriver;
use crate::cli::{output, run_cmd};
use crate::config::AuditConfig;
use crate::round::Orchestrator;
use crate::schedule::{sleep_until_next, Schedule};
use crate::store::SqliteStore;
use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;

/// Loop forever: wait for the next scheduled slot, run a round, report.
/// Ctrl-C exits between rounds (or mid-round at an identity boundary).
pub async fn run(config_path: &Path) -> Result<()> {
    let config = AuditConfig::load(config_path)?;
    let schedule = Schedule::from_settings(&config.schedule)?;
    let store_path = config.store_path();
    let store =
        SqliteStore::open(&store_path).context("failed to open observation store")?;
    let driver = Arc::new(ChromiumDriver::new()?);

    output::say(&format!(
        "Watching: {} identities, {} targets, runs at {}",
        config.identities.len(),
        config.targets.len(),
        config.schedule.run_times.join(", ")
    ));
    if config.schedule.weekdays_only {
        output::say("  (weekdays only)");
    }

    let mut orchestrator = Orchestrator::new(config, driver, store);
    let stop = orchestrator.stop_flag();
    {
        let stop = Arc::clone(&stop);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("stop requested");
                stop.store(true, std::sync::atomic::Ordering::Relaxed);
            }
        });
    }

    loop {
        if !sleep_until_next(&schedule, &stop).await {
            break;
        }
        let report = orchestrator.run_round().await?;
        run_cmd::present(&report);
        if report.stopped_early {
            break;
        }
    }

    output::say("Watch stopped.");
    Ok(())
}
