//! Personalization analysis — compare observations across identities.
//!
//! Observations sharing a (target, query, time bucket) were taken against
//! the same live inventory, so any price dispersion inside a bucket is
//! attributable to the requester identity rather than market movement.
//! Verdicts are recomputed from the full log on every call; there is no
//! incremental state to drift out of sync.

use crate::collect::Observation;
use crate::config::AnalysisSettings;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The analyzer's conclusion about one (target, query, bucket) group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonalizationVerdict {
    pub target_name: String,
    pub query: String,
    /// Bucket start (timestamps floored to the bucket width).
    pub bucket: DateTime<Utc>,
    /// Number of non-missing samples compared.
    pub samples: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub stddev: f64,
    /// `max - min`.
    pub spread: f64,
    /// `spread / min * 100`, or 0 when `min` is 0.
    pub spread_pct: f64,
    /// Whether the spread crosses the significance threshold.
    pub flagged: bool,
}

/// Group observations by (target, query, bucket) and judge each group.
///
/// A group yields a verdict only when at least two observations carry a
/// non-missing value for the compared field. Repeated samples from the
/// same identity within a bucket count independently: intra-identity noise
/// is part of the signal this tool surfaces, and callers wanting strict
/// cross-identity comparison pre-filter to one observation per identity.
pub fn analyze(
    observations: &[Observation],
    settings: &AnalysisSettings,
) -> Vec<PersonalizationVerdict> {
    let bucket_secs = (settings.bucket_minutes.max(1)) * 60;

    let mut groups: BTreeMap<(String, String, i64), Vec<f64>> = BTreeMap::new();
    for obs in observations {
        let Some(value) = obs.fields.get(&settings.field).and_then(|v| v.amount()) else {
            continue;
        };
        let bucket = obs.timestamp.timestamp().div_euclid(bucket_secs) * bucket_secs;
        groups
            .entry((obs.target_name.clone(), obs.query.clone(), bucket))
            .or_default()
            .push(value);
    }

    let mut verdicts = Vec::new();
    for ((target_name, query, bucket_ts), values) in groups {
        if values.len() < 2 {
            continue;
        }

        let n = values.len() as f64;
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let mean = values.iter().sum::<f64>() / n;
        let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        let stddev = variance.sqrt();
        let spread = max - min;
        let spread_pct = if min == 0.0 { 0.0 } else { spread / min * 100.0 };
        let flagged = spread >= settings.significance_threshold;

        if flagged {
            tracing::warn!(
                target = %target_name,
                query = %query,
                spread,
                spread_pct,
                "price personalization flagged"
            );
        }

        verdicts.push(PersonalizationVerdict {
            target_name,
            query,
            bucket: Utc.timestamp_opt(bucket_ts, 0).single().unwrap_or_default(),
            samples: values.len(),
            min,
            max,
            mean,
            stddev,
            spread,
            spread_pct,
            flagged,
        });
    }

    verdicts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collect::ObservationStatus;
    use crate::normalize::PriceValue;
    use chrono::Duration;

    fn settings(threshold: f64, bucket_minutes: i64) -> AnalysisSettings {
        AnalysisSettings {
            field: "base_price".to_string(),
            significance_threshold: threshold,
            bucket_minutes,
        }
    }

    fn obs(
        identity: &str,
        target: &str,
        price: PriceValue,
        at: DateTime<Utc>,
    ) -> Observation {
        let mut fields = std::collections::BTreeMap::new();
        fields.insert("base_price".to_string(), price);
        Observation {
            timestamp: at,
            identity_id: identity.to_string(),
            target_name: target.to_string(),
            query: "MAD-BRU".to_string(),
            fields,
            status: match price {
                PriceValue::Amount(_) => ObservationStatus::Ok,
                PriceValue::Missing => ObservationStatus::Timeout,
            },
            error: None,
        }
    }

    fn bucket_start(minutes: i64) -> DateTime<Utc> {
        // Align to a bucket boundary so same-bucket fixtures stay together.
        let now = Utc::now().timestamp();
        let secs = minutes * 60;
        Utc.timestamp_opt(now.div_euclid(secs) * secs, 0).unwrap()
    }

    #[test]
    fn test_two_values_flagged_at_threshold() {
        let t = bucket_start(30);
        let observations = vec![
            obs("a", "RYANAIR", PriceValue::Amount(40.0), t),
            obs("b", "RYANAIR", PriceValue::Amount(45.0), t + Duration::minutes(1)),
        ];

        let verdicts = analyze(&observations, &settings(5.0, 30));
        assert_eq!(verdicts.len(), 1);
        let v = &verdicts[0];
        assert!(v.flagged);
        assert_eq!(v.spread, 5.0);
        assert_eq!(v.spread_pct, 12.5);
        assert_eq!(v.min, 40.0);
        assert_eq!(v.max, 45.0);
        assert_eq!(v.mean, 42.5);
        assert_eq!(v.samples, 2);
        assert!((v.stddev - 2.5).abs() < 1e-9);
    }

    #[test]
    fn test_spread_below_threshold_not_flagged() {
        let t = bucket_start(30);
        let observations = vec![
            obs("a", "RYANAIR", PriceValue::Amount(40.0), t),
            obs("b", "RYANAIR", PriceValue::Amount(42.0), t),
        ];

        let verdicts = analyze(&observations, &settings(5.0, 30));
        assert_eq!(verdicts.len(), 1);
        assert!(!verdicts[0].flagged);
        assert_eq!(verdicts[0].spread, 2.0);
    }

    #[test]
    fn test_single_value_yields_no_verdict() {
        let t = bucket_start(30);
        let observations = vec![obs("a", "RYANAIR", PriceValue::Amount(40.0), t)];
        assert!(analyze(&observations, &settings(5.0, 30)).is_empty());
    }

    #[test]
    fn test_missing_value_does_not_count_toward_minimum() {
        // Identity A timed out, identity B succeeded: one usable value,
        // so the bucket yields no verdict.
        let t = bucket_start(30);
        let observations = vec![
            obs("a", "RYANAIR", PriceValue::Missing, t),
            obs("b", "RYANAIR", PriceValue::Amount(38.50), t),
        ];
        assert!(analyze(&observations, &settings(5.0, 30)).is_empty());
    }

    #[test]
    fn test_same_identity_repeats_count_independently() {
        let t = bucket_start(30);
        let observations = vec![
            obs("a", "RYANAIR", PriceValue::Amount(40.0), t),
            obs("a", "RYANAIR", PriceValue::Amount(50.0), t + Duration::minutes(2)),
        ];

        let verdicts = analyze(&observations, &settings(5.0, 30));
        assert_eq!(verdicts.len(), 1);
        assert_eq!(verdicts[0].samples, 2);
        assert!(verdicts[0].flagged);
    }

    #[test]
    fn test_observations_partition_by_target() {
        let t = bucket_start(30);
        let observations = vec![
            obs("a", "RYANAIR", PriceValue::Amount(40.0), t),
            obs("b", "RYANAIR", PriceValue::Amount(46.0), t),
            obs("a", "IBERIA", PriceValue::Amount(80.0), t),
            obs("b", "IBERIA", PriceValue::Amount(81.0), t),
        ];

        let verdicts = analyze(&observations, &settings(5.0, 30));
        assert_eq!(verdicts.len(), 2);
        let ryanair = verdicts.iter().find(|v| v.target_name == "RYANAIR").unwrap();
        let iberia = verdicts.iter().find(|v| v.target_name == "IBERIA").unwrap();
        assert!(ryanair.flagged);
        assert!(!iberia.flagged);
    }

    #[test]
    fn test_observations_partition_by_bucket() {
        let t = bucket_start(30);
        let observations = vec![
            obs("a", "RYANAIR", PriceValue::Amount(40.0), t),
            obs("b", "RYANAIR", PriceValue::Amount(45.0), t + Duration::hours(4)),
        ];
        // Different buckets → each has one value → no verdicts.
        assert!(analyze(&observations, &settings(5.0, 30)).is_empty());
    }

    #[test]
    fn test_spread_pct_zero_when_min_is_zero() {
        let t = bucket_start(30);
        let observations = vec![
            obs("a", "FREEBIE", PriceValue::Amount(0.0), t),
            obs("b", "FREEBIE", PriceValue::Amount(10.0), t),
        ];

        let verdicts = analyze(&observations, &settings(5.0, 30));
        assert_eq!(verdicts.len(), 1);
        assert_eq!(verdicts[0].spread_pct, 0.0);
        assert!(verdicts[0].flagged);
    }

    #[test]
    fn test_missing_field_key_skipped() {
        // An observation lacking the compared field entirely is ignored.
        let t = bucket_start(30);
        let mut stripped = obs("a", "RYANAIR", PriceValue::Amount(40.0), t);
        stripped.fields.clear();
        let observations = vec![stripped, obs("b", "RYANAIR", PriceValue::Amount(45.0), t)];
        assert!(analyze(&observations, &settings(5.0, 30)).is_empty());
    }
}
