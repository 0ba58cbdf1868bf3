//! `pricelens init` — write a starter configuration file.

use crate::cli::output;
use crate::config::AuditConfig;
use anyhow::{bail, Context, Result};
use std::path::Path;

/// Write an example config to `path`, refusing to overwrite unless forced.
pub async fn run(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!(
            "{} already exists (use --force to overwrite)",
            path.display()
        );
    }

    let config = AuditConfig::example();
    let json = serde_json::to_string_pretty(&config)?;
    std::fs::write(path, json)
        .with_context(|| format!("failed to write {}", path.display()))?;

    output::say(&format!("Wrote starter config to {}", path.display()));
    output::say("Edit the target URLs and selectors, then check with `pricelens doctor`.");
    Ok(())
}
