//! Audit orchestration — one full round across identities and targets.
//!
//! A round walks identities sequentially: open a session carrying the
//! identity's fingerprint, probe every target through it, clear cookies
//! between targets, close the session, then analyze the full observation
//! history and report. Failure isolation is the whole point: one bad
//! target costs one observation, one bad session costs one identity's
//! remaining targets, and the report always completes.

use crate::analyze::{analyze, PersonalizationVerdict};
use crate::browser::Driver;
use crate::collect::{jitter_sleep, Collector, Observation, ObservationStatus};
use crate::config::AuditConfig;
use crate::normalize::Normalizer;
use crate::store::ObservationStore;
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// How many times persistence is retried at the end of a round before the
/// held observations are dumped to a backup file.
const PERSIST_RETRIES: u32 = 3;

/// Per-key ok/timeout/error tallies.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct StatusCounts {
    pub ok: usize,
    pub timeout: usize,
    pub error: usize,
}

impl StatusCounts {
    fn record(&mut self, status: ObservationStatus) {
        match status {
            ObservationStatus::Ok => self.ok += 1,
            ObservationStatus::Timeout => self.timeout += 1,
            ObservationStatus::Error => self.error += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.ok + self.timeout + self.error
    }
}

/// What one round produced. Returned by `run_round`; never persisted as
/// authoritative state (the observation log is).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub observations: usize,
    pub by_identity: BTreeMap<String, StatusCounts>,
    pub by_target: BTreeMap<String, StatusCounts>,
    /// Identities whose session could not be opened at all.
    pub session_failures: Vec<String>,
    /// Observations that could not be persisted even after retries.
    pub unpersisted: usize,
    /// Verdicts over the full stored history, freshest analysis.
    pub verdicts: Vec<PersonalizationVerdict>,
    /// Whether the round was cut short by a stop request.
    pub stopped_early: bool,
}

/// Drives audit rounds against a browser driver and an observation store.
pub struct Orchestrator<S: ObservationStore> {
    config: AuditConfig,
    driver: Arc<dyn Driver>,
    store: S,
    stop: Arc<AtomicBool>,
}

impl<S: ObservationStore> Orchestrator<S> {
    pub fn new(config: AuditConfig, driver: Arc<dyn Driver>, store: S) -> Self {
        Self {
            config,
            driver,
            store,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flag checked between identities and between targets; setting it
    /// stops the round at the next checkpoint.
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    /// Run one full audit round and report on it.
    ///
    /// The report always completes, even when every target fails: the
    /// analyzer runs against whatever partial data exists.
    pub async fn run_round(&mut self) -> Result<RoundReport> {
        let started_at = Utc::now();
        tracing::info!(
            identities = self.config.identities.len(),
            targets = self.config.targets.len(),
            "starting audit round"
        );

        let collector = Collector::new(
            self.config.timeouts,
            self.config.pacing,
            Normalizer::with_sentinels(&self.config.sentinels),
        );

        let mut collected: Vec<Observation> = Vec::new();
        let mut session_failures = Vec::new();
        let mut stopped_early = false;

        'identities: for (i, identity) in self.config.identities.iter().enumerate() {
            if self.stop.load(Ordering::Relaxed) {
                stopped_early = true;
                break;
            }

            tracing::info!(
                identity = %identity.id,
                progress = %format!("{}/{}", i + 1, self.config.identities.len()),
                "processing identity"
            );

            let mut session = match self.driver.new_session(identity).await {
                Ok(s) => s,
                Err(e) => {
                    // This identity is lost for the round; the round goes on.
                    tracing::warn!(identity = %identity.id, "session setup failed: {e:#}");
                    session_failures.push(identity.id.clone());
                    continue;
                }
            };

            for (t, target) in self.config.targets.iter().enumerate() {
                if self.stop.load(Ordering::Relaxed) {
                    stopped_early = true;
                    let _ = session.close().await;
                    break 'identities;
                }

                let obs = collector.collect(session.as_mut(), identity, target).await;
                collected.push(obs);

                // Fresh cookie jar before the next target.
                if let Err(e) = session.clear_cookies().await {
                    tracing::debug!(identity = %identity.id, "cookie clear failed: {e:#}");
                }
                if t + 1 < self.config.targets.len() {
                    jitter_sleep(self.config.pacing.between_targets_ms).await;
                }
            }

            if let Err(e) = session.close().await {
                tracing::debug!(identity = %identity.id, "session close failed: {e:#}");
            }
            if i + 1 < self.config.identities.len() {
                jitter_sleep(self.config.pacing.between_identities_ms).await;
            }
        }

        let unpersisted = self.persist(&collected);

        let mut by_identity: BTreeMap<String, StatusCounts> = BTreeMap::new();
        let mut by_target: BTreeMap<String, StatusCounts> = BTreeMap::new();
        for obs in &collected {
            by_identity
                .entry(obs.identity_id.clone())
                .or_default()
                .record(obs.status);
            by_target
                .entry(obs.target_name.clone())
                .or_default()
                .record(obs.status);
        }

        // Analyze the full history, not just this round, so earlier rounds
        // in the same bucket still contribute.
        let verdicts = match self.store.load_all() {
            Ok(history) => analyze(&history, &self.config.analysis),
            Err(e) => {
                tracing::warn!("store read failed, analyzing this round only: {e}");
                analyze(&collected, &self.config.analysis)
            }
        };

        let report = RoundReport {
            started_at,
            finished_at: Utc::now(),
            observations: collected.len(),
            by_identity,
            by_target,
            session_failures,
            unpersisted,
            verdicts,
            stopped_early,
        };

        tracing::info!(
            observations = report.observations,
            flagged = report.verdicts.iter().filter(|v| v.flagged).count(),
            "round finished"
        );

        Ok(report)
    }

    /// Append all observations, retrying stragglers and dumping a JSON
    /// backup for anything that still will not persist. Returns the count
    /// of unpersisted records.
    fn persist(&mut self, collected: &[Observation]) -> usize {
        let mut pending: Vec<&Observation> = Vec::new();
        for obs in collected {
            if let Err(e) = self.store.append(obs) {
                tracing::warn!("append failed, holding in memory: {e}");
                pending.push(obs);
            }
        }

        for attempt in 1..=PERSIST_RETRIES {
            if pending.is_empty() {
                break;
            }
            tracing::info!(
                remaining = pending.len(),
                attempt,
                "retrying observation persistence"
            );
            pending.retain(|obs| self.store.append(obs).is_err());
        }

        if !pending.is_empty() {
            match write_backup(&pending) {
                Ok(path) => {
                    tracing::warn!(
                        count = pending.len(),
                        backup = %path.display(),
                        "observations written to backup file instead of store"
                    );
                }
                Err(e) => {
                    tracing::error!(count = pending.len(), "backup write failed: {e:#}");
                }
            }
        }
        pending.len()
    }
}

/// Dump unpersistable observations to a timestamped JSON file next to the
/// default data directory.
fn write_backup(pending: &[&Observation]) -> Result<std::path::PathBuf> {
    let dir = dirs::home_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("/tmp"))
        .join(".pricelens");
    std::fs::create_dir_all(&dir)?;
    let path = dir.join(format!(
        "backup_{}.json",
        Utc::now().format("%Y%m%d_%H%M%S")
    ));
    let json = serde_json::to_string_pretty(pending)?;
    std::fs::write(&path, json)?;
    Ok(path)
}
