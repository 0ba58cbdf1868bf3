//! Audit configuration — identities, targets, timeouts, pacing, policy.
//!
//! Loaded once from a JSON file before a round and treated as immutable
//! for the round's duration. `pricelens init` writes a starter file.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Field name the collector treats as the primary price signal.
pub const PRIMARY_FIELD: &str = "base_price";

/// One synthetic requester: a stable id plus the fingerprint attributes
/// the browser session is launched with.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityProfile {
    pub id: String,
    pub user_agent: String,
    pub viewport: Viewport,
    #[serde(default)]
    pub locale: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

/// One probed site/query combination.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetSpec {
    /// Short retailer code, e.g. "RYANAIR".
    pub name: String,
    /// Search key this URL encodes, e.g. "MAD-BRU-2026-02-19".
    pub query: String,
    /// Fully resolved search URL.
    pub url: String,
    /// Candidate selectors for the cookie-consent dismiss button.
    #[serde(default)]
    pub cookie_locators: Vec<String>,
    /// Field name → ordered candidate selectors, most specific first.
    pub field_locators: BTreeMap<String, Vec<String>>,
}

/// Per-operation wait budgets, in milliseconds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Timeouts {
    #[serde(default = "default_navigation_ms")]
    pub navigation_ms: u64,
    /// Per-locator wait for ordinary field reads.
    #[serde(default = "default_field_ms")]
    pub field_ms: u64,
    /// Per-locator wait for the cookie banner (shorter; it's best-effort).
    #[serde(default = "default_cookie_ms")]
    pub cookie_ms: u64,
}

fn default_navigation_ms() -> u64 {
    30_000
}
fn default_field_ms() -> u64 {
    5_000
}
fn default_cookie_ms() -> u64 {
    3_000
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            navigation_ms: default_navigation_ms(),
            field_ms: default_field_ms(),
            cookie_ms: default_cookie_ms(),
        }
    }
}

/// Randomized delays that pace the round like a human browsing session.
/// Each pair is a (min, max) range in milliseconds; (0, 0) disables.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Pacing {
    /// After navigation, before touching the page.
    #[serde(default = "default_settle")]
    pub page_settle_ms: (u64, u64),
    /// Between targets within one identity.
    #[serde(default = "default_between_targets")]
    pub between_targets_ms: (u64, u64),
    /// Between identities.
    #[serde(default = "default_between_identities")]
    pub between_identities_ms: (u64, u64),
}

fn default_settle() -> (u64, u64) {
    (4_000, 7_000)
}
fn default_between_targets() -> (u64, u64) {
    (2_000, 4_000)
}
fn default_between_identities() -> (u64, u64) {
    (5_000, 10_000)
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            page_settle_ms: default_settle(),
            between_targets_ms: default_between_targets(),
            between_identities_ms: default_between_identities(),
        }
    }
}

impl Pacing {
    /// Pacing with every delay zeroed, for tests and probes.
    pub fn none() -> Self {
        Self {
            page_settle_ms: (0, 0),
            between_targets_ms: (0, 0),
            between_identities_ms: (0, 0),
        }
    }
}

/// Significance policy for the analyzer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisSettings {
    /// Field compared across identities.
    #[serde(default = "default_field")]
    pub field: String,
    /// Minimum spread (in the configured currency) that counts as
    /// personalization.
    #[serde(default = "default_threshold")]
    pub significance_threshold: f64,
    /// Observations within the same bucket are treated as simultaneous.
    #[serde(default = "default_bucket_minutes")]
    pub bucket_minutes: i64,
}

fn default_field() -> String {
    PRIMARY_FIELD.to_string()
}
fn default_threshold() -> f64 {
    5.0
}
fn default_bucket_minutes() -> i64 {
    30
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            field: default_field(),
            significance_threshold: default_threshold(),
            bucket_minutes: default_bucket_minutes(),
        }
    }
}

/// Wall-clock schedule for watch mode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleSettings {
    /// Local times in "HH:MM" format.
    #[serde(default = "default_run_times")]
    pub run_times: Vec<String>,
    /// Skip rounds on Saturday and Sunday.
    #[serde(default)]
    pub weekdays_only: bool,
}

fn default_run_times() -> Vec<String> {
    vec![
        "09:00".to_string(),
        "13:00".to_string(),
        "17:00".to_string(),
        "21:00".to_string(),
    ]
}

impl Default for ScheduleSettings {
    fn default() -> Self {
        Self {
            run_times: default_run_times(),
            weekdays_only: false,
        }
    }
}

/// Full audit configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    /// Observation store path. Defaults to ~/.pricelens/observations.db.
    #[serde(default)]
    pub store_path: Option<PathBuf>,
    /// ISO currency code all prices are assumed to be in.
    #[serde(default = "default_currency")]
    pub currency: String,
    /// Extra sentinel strings that mean "no price" on these pages.
    #[serde(default)]
    pub sentinels: Vec<String>,
    #[serde(default)]
    pub timeouts: Timeouts,
    #[serde(default)]
    pub pacing: Pacing,
    #[serde(default)]
    pub analysis: AnalysisSettings,
    #[serde(default)]
    pub schedule: ScheduleSettings,
    pub identities: Vec<IdentityProfile>,
    pub targets: Vec<TargetSpec>,
}

fn default_currency() -> String {
    "EUR".to_string()
}

impl AuditConfig {
    /// Load and validate a configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config: {}", path.display()))?;
        let config: AuditConfig = serde_json::from_str(&data)
            .with_context(|| format!("failed to parse config: {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate cross-field invariants.
    pub fn validate(&self) -> Result<()> {
        if self.identities.is_empty() {
            bail!("config declares no identities");
        }
        if self.targets.is_empty() {
            bail!("config declares no targets");
        }

        let mut seen = std::collections::HashSet::new();
        for identity in &self.identities {
            if !seen.insert(identity.id.as_str()) {
                bail!("duplicate identity id: {}", identity.id);
            }
        }

        for target in &self.targets {
            if !target.field_locators.contains_key(PRIMARY_FIELD) {
                bail!(
                    "target {} declares no '{PRIMARY_FIELD}' field locators",
                    target.name
                );
            }
            url::Url::parse(&target.url)
                .with_context(|| format!("target {} has an invalid url", target.name))?;
        }

        for time in &self.schedule.run_times {
            chrono::NaiveTime::parse_from_str(time, "%H:%M")
                .with_context(|| format!("invalid schedule time: {time}"))?;
        }

        Ok(())
    }

    /// Resolved store path (configured, or ~/.pricelens/observations.db).
    pub fn store_path(&self) -> PathBuf {
        self.store_path.clone().unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("/tmp"))
                .join(".pricelens")
                .join("observations.db")
        })
    }

    /// A small working example config, written by `pricelens init`.
    pub fn example() -> Self {
        let mut field_locators = BTreeMap::new();
        field_locators.insert(
            PRIMARY_FIELD.to_string(),
            vec![
                "flights-trip-details-price .flight-card-summary__price-value".to_string(),
                ".flight-card-summary__price".to_string(),
                "span[data-ref='price.currency']".to_string(),
            ],
        );
        field_locators.insert(
            "fee_bag".to_string(),
            vec![".bag-fee".to_string(), ".baggage-price".to_string()],
        );
        field_locators.insert(
            "fee_seat".to_string(),
            vec![".seat-price".to_string(), "span[data-ref='seat.price']".to_string()],
        );
        field_locators.insert(
            "fee_priority".to_string(),
            vec![".priority-price".to_string()],
        );

        Self {
            store_path: None,
            currency: default_currency(),
            sentinels: Vec::new(),
            timeouts: Timeouts::default(),
            pacing: Pacing::default(),
            analysis: AnalysisSettings::default(),
            schedule: ScheduleSettings::default(),
            identities: vec![
                IdentityProfile {
                    id: "win-chrome".to_string(),
                    user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string(),
                    viewport: Viewport { width: 1920, height: 1080 },
                    locale: Some("es-ES".to_string()),
                },
                IdentityProfile {
                    id: "mac-safari".to_string(),
                    user_agent: "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.1 Safari/605.1.15".to_string(),
                    viewport: Viewport { width: 1440, height: 900 },
                    locale: Some("es-ES".to_string()),
                },
                IdentityProfile {
                    id: "android-mobile".to_string(),
                    user_agent: "Mozilla/5.0 (Linux; Android 13; SM-S918B) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Mobile Safari/537.36".to_string(),
                    viewport: Viewport { width: 412, height: 915 },
                    locale: Some("es-ES".to_string()),
                },
            ],
            targets: vec![TargetSpec {
                name: "RYANAIR".to_string(),
                query: "MAD-BRU-2026-02-19".to_string(),
                url: "https://www.ryanair.com/es/es/trip/flights/select?originIata=MAD&destinationIata=BRU&dateOut=2026-02-19&adults=1".to_string(),
                cookie_locators: vec![
                    "button.cookie-popup-with-overlay__button".to_string(),
                    "button[data-ref='cookie.accept-all']".to_string(),
                    ".cookie-popup button".to_string(),
                ],
                field_locators,
            }],
        }
    }
}
