//! `pricelens run` — execute one audit round now.

use crate::browser::chromium::ChromiumDriver;
use crate::cli::output;
use crate::config::AuditConfig;
use crate::round::{Orchestrator, RoundReport};
use crate::store::SqliteStore;
use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;

/// Run one round against the configured identities and targets.
pub async fn run(config_path: &Path) -> Result<()> {
    let config = AuditConfig::load(config_path)?;
    let store_path = config.store_path();
    let store =
        SqliteStore::open(&store_path).context("failed to open observation store")?;
    let driver = Arc::new(ChromiumDriver::new()?);

    let mut orchestrator = Orchestrator::new(config, driver, store);

    // Ctrl-C stops the round at the next identity/target boundary.
    let stop = orchestrator.stop_flag();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("stop requested, finishing current target");
            stop.store(true, std::sync::atomic::Ordering::Relaxed);
        }
    });

    let report = orchestrator.run_round().await?;
    present(&report);
    Ok(())
}

/// Render a round report to the terminal (or JSON under `--json`).
pub fn present(report: &RoundReport) {
    if output::is_json() {
        output::print_json(report);
        return;
    }

    output::say(&format!(
        "Round finished: {} observations ({} unpersisted)",
        report.observations, report.unpersisted
    ));
    if report.stopped_early {
        output::say("  (stopped early by request)");
    }
    for identity in &report.session_failures {
        output::say(&format!("  session failed for identity {identity}"));
    }

    output::say("\nPer identity:");
    for (identity, counts) in &report.by_identity {
        output::say(&format!(
            "  {identity}: {} ok, {} timeout, {} error",
            counts.ok, counts.timeout, counts.error
        ));
    }
    output::say("\nPer target:");
    for (target, counts) in &report.by_target {
        output::say(&format!(
            "  {target}: {} ok, {} timeout, {} error",
            counts.ok, counts.timeout, counts.error
        ));
    }

    let flagged: Vec<_> = report.verdicts.iter().filter(|v| v.flagged).collect();
    if flagged.is_empty() {
        output::say("\nNo significant price personalization detected.");
    } else {
        output::say(&format!(
            "\nPossible price personalization ({} bucket(s)):",
            flagged.len()
        ));
        for v in flagged {
            output::say(&format!(
                "  {} {} @ {}: spread {:.2} ({:.1}%), {} samples, {:.2}-{:.2}",
                v.target_name,
                v.query,
                v.bucket.format("%Y-%m-%d %H:%M"),
                v.spread,
                v.spread_pct,
                v.samples,
                v.min,
                v.max
            ));
        }
    }
}
