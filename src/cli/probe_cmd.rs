//! `pricelens probe` — quick smoke run: first identity, one target, no
//! pacing, nothing persisted. For checking selectors before a real round.

use crate::browser::chromium::ChromiumDriver;
use crate::browser::Driver;
use crate::cli::output;
use crate::collect::{Collector, ObservationStatus};
use crate::config::{AuditConfig, Pacing};
use crate::normalize::Normalizer;
use anyhow::{bail, Context, Result};
use std::path::Path;
use std::sync::Arc;

/// Probe one target (by name, or the first configured) with the first
/// identity and print the extracted fields.
pub async fn run(config_path: &Path, target_name: Option<&str>) -> Result<()> {
    let config = AuditConfig::load(config_path)?;

    let identity = &config.identities[0];
    let target = match target_name {
        Some(name) => config
            .targets
            .iter()
            .find(|t| t.name == name)
            .with_context(|| format!("no target named {name} in config"))?,
        None => &config.targets[0],
    };

    output::say(&format!(
        "Probing {} ({}) as identity {}",
        target.name, target.query, identity.id
    ));

    let driver = Arc::new(ChromiumDriver::new()?);
    let mut session = driver.new_session(identity).await?;

    let collector = Collector::new(
        config.timeouts,
        Pacing::none(),
        Normalizer::with_sentinels(&config.sentinels),
    );
    let observation = collector
        .collect(session.as_mut(), identity, target)
        .await;
    session.close().await?;

    if output::is_json() {
        output::print_json(&observation);
        return Ok(());
    }

    output::say(&format!("  status: {:?}", observation.status));
    if let Some(error) = &observation.error {
        output::say(&format!("  error:  {error}"));
    }
    for (field, value) in &observation.fields {
        match value.amount() {
            Some(v) => output::say(&format!("  {field}: {v:.2} {}", config.currency)),
            None => output::say(&format!("  {field}: missing")),
        }
    }

    if observation.status != ObservationStatus::Ok {
        bail!("probe did not produce a usable primary price");
    }
    Ok(())
}
