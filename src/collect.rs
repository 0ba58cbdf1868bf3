//! Observation collection — one identity probing one target.
//!
//! The collector owns the per-target sequence: navigate, dismiss the
//! cookie banner (best effort), then read every configured field through
//! the extractor. Fields are isolated from each other: one broken selector
//! degrades that field to `Missing` and nothing else.

use crate::browser::PageSession;
use crate::config::{IdentityProfile, Pacing, TargetSpec, Timeouts, PRIMARY_FIELD};
use crate::extract::{extract, ExtractMode, RawField};
use crate::normalize::{Normalizer, PriceValue};
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Outcome class for one observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObservationStatus {
    /// The primary price field produced a usable value.
    Ok,
    /// Every locator for the primary field was exhausted without a match.
    Timeout,
    /// Navigation or session setup faulted, or the primary text was
    /// present but not interpretable as a price.
    Error,
}

/// One recorded set of extracted field values for one
/// identity/target/query/time. Immutable once built; appended to the
/// store and never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Observation {
    pub timestamp: DateTime<Utc>,
    pub identity_id: String,
    pub target_name: String,
    pub query: String,
    /// Exactly the keys declared by the target's `field_locators`.
    pub fields: BTreeMap<String, PriceValue>,
    pub status: ObservationStatus,
    #[serde(default)]
    pub error: Option<String>,
}

impl Observation {
    /// Build an all-`Missing` observation for a target that could not be
    /// probed at all. The field map still carries the declared keys.
    pub fn failed(
        identity: &IdentityProfile,
        target: &TargetSpec,
        status: ObservationStatus,
        error: impl Into<String>,
    ) -> Self {
        let fields = target
            .field_locators
            .keys()
            .map(|k| (k.clone(), PriceValue::Missing))
            .collect();
        Self {
            timestamp: Utc::now(),
            identity_id: identity.id.clone(),
            target_name: target.name.clone(),
            query: target.query.clone(),
            fields,
            status,
            error: Some(error.into()),
        }
    }
}

/// Drives extraction for one (identity, target) pair at a time.
pub struct Collector {
    timeouts: Timeouts,
    pacing: Pacing,
    normalizer: Normalizer,
}

impl Collector {
    pub fn new(timeouts: Timeouts, pacing: Pacing, normalizer: Normalizer) -> Self {
        Self {
            timeouts,
            pacing,
            normalizer,
        }
    }

    /// Probe one target within an open session and assemble an observation.
    ///
    /// Never returns an error: faults are folded into the observation's
    /// status so a single bad target cannot abort the identity's round.
    pub async fn collect(
        &self,
        session: &mut dyn PageSession,
        identity: &IdentityProfile,
        target: &TargetSpec,
    ) -> Observation {
        tracing::info!(identity = %identity.id, target = %target.name, "collecting");

        if let Err(e) = session
            .navigate(&target.url, self.timeouts.navigation_ms)
            .await
        {
            tracing::warn!(target = %target.name, "navigation failed: {e:#}");
            return Observation::failed(
                identity,
                target,
                ObservationStatus::Error,
                format!("{e:#}"),
            );
        }

        // Let dynamic content land before probing the DOM.
        jitter_sleep(self.pacing.page_settle_ms).await;

        // Cookie banner: best effort, changes the DOM for everything after.
        if !target.cookie_locators.is_empty() {
            let dismissed = extract(
                session,
                &target.cookie_locators,
                ExtractMode::Click,
                self.timeouts.cookie_ms,
            )
            .await;
            if dismissed.is_found() {
                tracing::debug!(target = %target.name, "cookie banner dismissed");
            }
        }

        let mut fields = BTreeMap::new();
        let mut primary_raw = RawField::NotFound;
        for (name, locators) in &target.field_locators {
            let raw = extract(session, locators, ExtractMode::ReadText, self.timeouts.field_ms)
                .await;
            if name == PRIMARY_FIELD {
                primary_raw = raw.clone();
            }
            let value = self.normalizer.normalize(&raw);
            if let PriceValue::Amount(v) = value {
                tracing::info!(target = %target.name, field = %name, value = v, "field extracted");
            }
            fields.insert(name.clone(), value);
        }

        let primary_value = fields
            .get(PRIMARY_FIELD)
            .copied()
            .unwrap_or(PriceValue::Missing);
        let (status, error) = match (&primary_raw, primary_value) {
            (_, PriceValue::Amount(_)) => (ObservationStatus::Ok, None),
            (RawField::NotFound, _) => (ObservationStatus::Timeout, None),
            (RawField::Found(text), _) => (
                ObservationStatus::Error,
                Some(format!("primary price text not parseable: {text:?}")),
            ),
        };

        Observation {
            timestamp: Utc::now(),
            identity_id: identity.id.clone(),
            target_name: target.name.clone(),
            query: target.query.clone(),
            fields,
            status,
            error,
        }
    }
}

/// Sleep a random duration within the (min, max) range; (0, 0) is a no-op.
pub async fn jitter_sleep(range_ms: (u64, u64)) {
    let (min, max) = range_ms;
    if max == 0 {
        return;
    }
    let ms = if min >= max {
        min
    } else {
        rand::thread_rng().gen_range(min..=max)
    };
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::tests::MockSession;
    use std::collections::BTreeMap;

    fn target() -> TargetSpec {
        let mut field_locators = BTreeMap::new();
        field_locators.insert(
            PRIMARY_FIELD.to_string(),
            vec![".price".to_string(), ".price-fallback".to_string()],
        );
        field_locators.insert("fee_bag".to_string(), vec![".bag".to_string()]);
        field_locators.insert("fee_seat".to_string(), vec![".seat".to_string()]);
        TargetSpec {
            name: "RYANAIR".to_string(),
            query: "MAD-BRU".to_string(),
            url: "https://example.test/flights".to_string(),
            cookie_locators: vec!["#accept".to_string()],
            field_locators,
        }
    }

    fn identity() -> IdentityProfile {
        IdentityProfile {
            id: "win-chrome".to_string(),
            user_agent: "ua".to_string(),
            viewport: crate::config::Viewport {
                width: 1920,
                height: 1080,
            },
            locale: None,
        }
    }

    fn collector() -> Collector {
        Collector::new(Timeouts::default(), Pacing::none(), Normalizer::default())
    }

    #[tokio::test]
    async fn test_collect_happy_path() {
        let mut session = MockSession {
            clickable: vec!["#accept".to_string()],
            ..Default::default()
        };
        session
            .texts
            .insert(".price".to_string(), "45,99€".to_string());
        session.texts.insert(".bag".to_string(), "25€".to_string());

        let obs = collector().collect(&mut session, &identity(), &target()).await;

        assert_eq!(obs.status, ObservationStatus::Ok);
        assert_eq!(obs.fields[PRIMARY_FIELD], PriceValue::Amount(45.99));
        assert_eq!(obs.fields["fee_bag"], PriceValue::Amount(25.0));
        assert_eq!(obs.fields["fee_seat"], PriceValue::Missing);
        // Cookie banner was clicked before field reads.
        assert_eq!(session.clicks, vec!["#accept"]);
    }

    #[tokio::test]
    async fn test_field_map_has_exactly_declared_keys() {
        let mut session = MockSession::default();
        let target = target();
        let obs = collector().collect(&mut session, &identity(), &target).await;

        let declared: Vec<&String> = target.field_locators.keys().collect();
        let present: Vec<&String> = obs.fields.keys().collect();
        assert_eq!(declared, present);
    }

    #[tokio::test]
    async fn test_primary_not_found_is_timeout() {
        let mut session = MockSession::default();
        session.texts.insert(".bag".to_string(), "25€".to_string());

        let obs = collector().collect(&mut session, &identity(), &target()).await;

        assert_eq!(obs.status, ObservationStatus::Timeout);
        assert_eq!(obs.fields[PRIMARY_FIELD], PriceValue::Missing);
        // The other field still got through: isolation.
        assert_eq!(obs.fields["fee_bag"], PriceValue::Amount(25.0));
    }

    #[tokio::test]
    async fn test_navigation_fault_is_error_with_declared_keys() {
        let mut session = MockSession {
            fail_navigation: Some("https://example.test/flights".to_string()),
            ..Default::default()
        };

        let obs = collector().collect(&mut session, &identity(), &target()).await;

        assert_eq!(obs.status, ObservationStatus::Error);
        assert!(obs.error.is_some());
        assert_eq!(obs.fields.len(), 3);
        assert!(obs.fields.values().all(|v| v.is_missing()));
    }

    #[tokio::test]
    async fn test_unparsable_primary_is_error() {
        let mut session = MockSession::default();
        session
            .texts
            .insert(".price".to_string(), "Sold out".to_string());

        let obs = collector().collect(&mut session, &identity(), &target()).await;

        assert_eq!(obs.status, ObservationStatus::Error);
        assert!(obs.error.as_deref().unwrap().contains("not parseable"));
        assert_eq!(obs.fields[PRIMARY_FIELD], PriceValue::Missing);
    }

    #[tokio::test]
    async fn test_broken_fee_selector_does_not_blank_observation() {
        let mut session = MockSession {
            faulty: vec![".bag".to_string()],
            ..Default::default()
        };
        session
            .texts
            .insert(".price".to_string(), "38,50€".to_string());

        let obs = collector().collect(&mut session, &identity(), &target()).await;

        assert_eq!(obs.status, ObservationStatus::Ok);
        assert_eq!(obs.fields[PRIMARY_FIELD], PriceValue::Amount(38.50));
        assert_eq!(obs.fields["fee_bag"], PriceValue::Missing);
    }
}
