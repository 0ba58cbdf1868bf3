//! `pricelens analyze` — re-run the analysis over the stored history.
//!
//! Verdicts are always derived from the observation log, so this can be
//! run any time, with any threshold, without touching a browser.

use crate::analyze::{analyze, PersonalizationVerdict};
use crate::cli::output;
use crate::collect::{Observation, ObservationStatus};
use crate::config::{AnalysisSettings, AuditConfig};
use crate::store::{ObservationStore, SqliteStore};
use anyhow::{Context, Result};
use chrono::Utc;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::Path;

/// Analyze stored observations; threshold/bucket flags override config.
pub async fn run(
    config_path: &Path,
    threshold: Option<f64>,
    bucket_minutes: Option<i64>,
    report_path: Option<&Path>,
) -> Result<()> {
    let config = AuditConfig::load(config_path)?;
    let store = SqliteStore::open(&config.store_path())
        .context("failed to open observation store")?;
    let observations = store.load_all().context("failed to read observations")?;

    let settings = AnalysisSettings {
        field: config.analysis.field.clone(),
        significance_threshold: threshold.unwrap_or(config.analysis.significance_threshold),
        bucket_minutes: bucket_minutes.unwrap_or(config.analysis.bucket_minutes),
    };
    let verdicts = analyze(&observations, &settings);

    if output::is_json() {
        output::print_json(&serde_json::json!({
            "observations": observations.len(),
            "verdicts": verdicts,
        }));
    } else {
        present(&observations, &verdicts, &settings, &config.currency);
    }

    if let Some(path) = report_path {
        let text = render_report(&observations, &verdicts, &settings, &config.currency);
        std::fs::write(path, text)
            .with_context(|| format!("failed to write report: {}", path.display()))?;
        output::say(&format!("Report written to {}", path.display()));
    }

    Ok(())
}

fn present(
    observations: &[Observation],
    verdicts: &[PersonalizationVerdict],
    settings: &AnalysisSettings,
    currency: &str,
) {
    output::say(&format!(
        "History: {} observations, {} ok / {} timeout / {} error",
        observations.len(),
        count(observations, ObservationStatus::Ok),
        count(observations, ObservationStatus::Timeout),
        count(observations, ObservationStatus::Error),
    ));

    let by_identity = identity_counts(observations);
    if !by_identity.is_empty() {
        output::say("\nObservations per identity:");
        for (identity, n) in by_identity {
            output::say(&format!("  {identity}: {n}"));
        }
    }

    output::say(&format!(
        "\nComparable buckets: {} (threshold {:.2} {currency}, {} min buckets)",
        verdicts.len(),
        settings.significance_threshold,
        settings.bucket_minutes
    ));

    let flagged: Vec<_> = verdicts.iter().filter(|v| v.flagged).collect();
    if flagged.is_empty() {
        output::say("No significant price personalization detected.");
        return;
    }
    output::say(&format!("\nFlagged buckets ({}):", flagged.len()));
    for v in flagged {
        output::say(&format!(
            "  {} {} @ {}: {:.2}-{:.2} {currency}, spread {:.2} ({:.1}%), stddev {:.2}, {} samples",
            v.target_name,
            v.query,
            v.bucket.format("%Y-%m-%d %H:%M"),
            v.min,
            v.max,
            v.spread,
            v.spread_pct,
            v.stddev,
            v.samples
        ));
    }
}

/// Render the plain-text report file.
fn render_report(
    observations: &[Observation],
    verdicts: &[PersonalizationVerdict],
    settings: &AnalysisSettings,
    currency: &str,
) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "PRICE PERSONALIZATION AUDIT REPORT");
    let _ = writeln!(out, "generated: {}", Utc::now().format("%Y-%m-%d %H:%M:%S UTC"));
    let _ = writeln!(
        out,
        "field: {} | threshold: {:.2} {currency} | bucket: {} min",
        settings.field, settings.significance_threshold, settings.bucket_minutes
    );
    let _ = writeln!(out);
    let _ = writeln!(out, "observations: {}", observations.len());
    for (identity, n) in identity_counts(observations) {
        let _ = writeln!(out, "  {identity}: {n}");
    }
    let _ = writeln!(out);
    let _ = writeln!(out, "verdicts: {}", verdicts.len());
    for v in verdicts {
        let _ = writeln!(
            out,
            "  [{}] {} {} @ {} | min {:.2} max {:.2} mean {:.2} stddev {:.2} | spread {:.2} ({:.1}%) | {} samples",
            if v.flagged { "FLAG" } else { " ok " },
            v.target_name,
            v.query,
            v.bucket.format("%Y-%m-%d %H:%M"),
            v.min,
            v.max,
            v.mean,
            v.stddev,
            v.spread,
            v.spread_pct,
            v.samples
        );
    }
    out
}

fn count(observations: &[Observation], status: ObservationStatus) -> usize {
    observations.iter().filter(|o| o.status == status).count()
}

fn identity_counts(observations: &[Observation]) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for obs in observations {
        *counts.entry(obs.identity_id.clone()).or_insert(0) += 1;
    }
    counts
}
