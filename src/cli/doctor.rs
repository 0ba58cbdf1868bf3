//! `pricelens doctor` — check the environment and diagnose issues.

use crate::browser::chromium::find_chromium;
use crate::cli::output;
use crate::config::AuditConfig;
use crate::store::SqliteStore;
use anyhow::Result;
use std::path::Path;

/// Check Chromium availability, config validity, and store writability.
pub async fn run(config_path: &Path) -> Result<()> {
    let mut problems = 0;

    match find_chromium() {
        Some(path) => output::say(&format!("  ok  Chromium: {}", path.display())),
        None => {
            output::say("  !!  Chromium not found. Install Chrome/Chromium or set PRICELENS_CHROMIUM_PATH.");
            problems += 1;
        }
    }

    match AuditConfig::load(config_path) {
        Ok(config) => {
            output::say(&format!(
                "  ok  config: {} identities, {} targets ({})",
                config.identities.len(),
                config.targets.len(),
                config_path.display()
            ));
            match SqliteStore::open(&config.store_path()) {
                Ok(store) => {
                    use crate::store::ObservationStore;
                    let n = store.load_all().map(|o| o.len()).unwrap_or(0);
                    output::say(&format!(
                        "  ok  store: {} observations ({})",
                        n,
                        config.store_path().display()
                    ));
                }
                Err(e) => {
                    output::say(&format!("  !!  store not writable: {e}"));
                    problems += 1;
                }
            }
        }
        Err(e) => {
            output::say(&format!("  !!  config: {e:#}"));
            output::say("      Run `pricelens init` to write a starter config.");
            problems += 1;
        }
    }

    if problems == 0 {
        output::say("\nAll checks passed.");
        Ok(())
    } else {
        anyhow::bail!("{problems} problem(s) found")
    }
}
