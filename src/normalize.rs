//! Price normalization — turn raw price text into comparable numbers.
//!
//! Retailer pages render prices in wildly inconsistent shapes ("45,99€",
//! "€ 1.234,50", "1,234.50 EUR", "desde 39€"). The normalizer reduces all
//! of them to a plain `f64` amount, degrading to `Missing` on anything it
//! cannot interpret. It never errors: a price either normalizes or it
//! doesn't count.

use crate::extract::RawField;
use serde::{Deserialize, Serialize};

/// A normalized price: a numeric amount in the configured currency, or
/// `Missing` when the field was absent, a sentinel, or unparsable.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum PriceValue {
    Amount(f64),
    Missing,
}

impl PriceValue {
    /// The numeric amount, if present.
    pub fn amount(&self) -> Option<f64> {
        match self {
            PriceValue::Amount(v) => Some(*v),
            PriceValue::Missing => None,
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, PriceValue::Missing)
    }
}

/// Sentinel strings that mean "no price" rather than a price.
///
/// The last entry is the legacy marker older observation logs used for
/// extraction failures; it is kept so re-analysis of imported data works.
const DEFAULT_SENTINELS: &[&str] = &["Error", "N/A", "Error/No encontrado"];

/// Currency markers stripped before parsing.
const DEFAULT_CURRENCY_MARKERS: &[&str] = &["€", "$", "£", "EUR", "USD", "GBP"];

/// Locale-tolerant price parser.
pub struct Normalizer {
    sentinels: Vec<String>,
    currency_markers: Vec<String>,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self {
            sentinels: DEFAULT_SENTINELS.iter().map(|s| s.to_string()).collect(),
            currency_markers: DEFAULT_CURRENCY_MARKERS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl Normalizer {
    /// Build a normalizer with extra sentinel strings on top of the defaults.
    pub fn with_sentinels(extra: &[String]) -> Self {
        let mut n = Self::default();
        n.sentinels.extend(extra.iter().cloned());
        n
    }

    /// Normalize an extraction result into a `PriceValue`.
    pub fn normalize(&self, raw: &RawField) -> PriceValue {
        match raw {
            RawField::NotFound => PriceValue::Missing,
            RawField::Found(text) => self.normalize_text(text),
        }
    }

    /// Normalize raw price text into a `PriceValue`.
    ///
    /// Decimal-separator heuristic: the last `,` or `.` immediately
    /// followed by exactly one or two trailing digits is the decimal
    /// separator; every other `,`/`.` is a thousands separator and is
    /// dropped. This handles both `45,99` and `1,234.50` without knowing
    /// the page locale.
    pub fn normalize_text(&self, text: &str) -> PriceValue {
        let trimmed = text.trim();
        if trimmed.is_empty() || self.sentinels.iter().any(|s| s == trimmed) {
            return PriceValue::Missing;
        }

        let mut cleaned = trimmed.to_string();
        for marker in &self.currency_markers {
            cleaned = cleaned.replace(marker.as_str(), "");
        }

        // Keep only digits and separator candidates.
        let slim: String = cleaned
            .chars()
            .filter(|c| c.is_ascii_digit() || *c == ',' || *c == '.')
            .collect();
        if !slim.chars().any(|c| c.is_ascii_digit()) {
            return PriceValue::Missing;
        }

        let decimal_sep = last_separator_as_decimal(&slim);

        let mut number = String::with_capacity(slim.len());
        for (i, c) in slim.char_indices() {
            if c.is_ascii_digit() {
                number.push(c);
            } else if Some(i) == decimal_sep {
                number.push('.');
            }
            // other separators are thousands marks: dropped
        }

        match number.parse::<f64>() {
            Ok(v) if v.is_finite() => PriceValue::Amount(v),
            _ => PriceValue::Missing,
        }
    }
}

/// Byte index of the separator that acts as the decimal point, if any.
///
/// A separator qualifies when it is the last `,`/`.` in the string and is
/// followed by exactly 1–2 digits and nothing else.
fn last_separator_as_decimal(s: &str) -> Option<usize> {
    let idx = s.rfind([',', '.'])?;
    let tail = &s[idx + 1..];
    let digits = tail.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits == tail.len() && (1..=2).contains(&digits) {
        Some(idx)
    } else {
        None
    }
}
