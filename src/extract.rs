//! Resilient field extraction — ordered locator fallback.
//!
//! Page structure drifts constantly, so every field is described by a
//! ranked list of candidate selectors, most specific first. The extractor
//! walks the list once: the first locator that yields something within its
//! bounded wait wins and nothing after it is evaluated. Brittleness is
//! absorbed by trying increasingly generic guesses, never by retrying.

use crate::browser::PageSession;

/// Extraction result for one field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawField {
    /// A locator matched. For `ReadText` this is the element's text; for
    /// `Click` it is the selector that was clicked (useful in logs).
    Found(String),
    /// Every locator was exhausted without a match.
    NotFound,
}

impl RawField {
    pub fn is_found(&self) -> bool {
        matches!(self, RawField::Found(_))
    }
}

/// What to do with the first matching element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractMode {
    /// Click it (cookie banners, consent dialogs). Mutates page state.
    Click,
    /// Read its visible text.
    ReadText,
}

/// Try `locators` in order against the session; first success wins.
///
/// Each locator gets its own bounded wait of `per_locator_timeout_ms`. A
/// driver error on one locator is treated the same as absence: log it and
/// move on. A single pass — exhaustion returns `NotFound`, never an error.
pub async fn extract(
    session: &mut dyn PageSession,
    locators: &[String],
    mode: ExtractMode,
    per_locator_timeout_ms: u64,
) -> RawField {
    for locator in locators {
        match mode {
            ExtractMode::Click => match session.click(locator, per_locator_timeout_ms).await {
                Ok(true) => {
                    tracing::debug!(%locator, "click succeeded");
                    return RawField::Found(locator.clone());
                }
                Ok(false) => continue,
                Err(e) => {
                    tracing::debug!(%locator, "click errored, trying next: {e}");
                    continue;
                }
            },
            ExtractMode::ReadText => {
                match session.read_text(locator, per_locator_timeout_ms).await {
                    Ok(Some(text)) if !text.trim().is_empty() => {
                        tracing::debug!(%locator, "text found");
                        return RawField::Found(text);
                    }
                    Ok(_) => continue,
                    Err(e) => {
                        tracing::debug!(%locator, "read errored, trying next: {e}");
                        continue;
                    }
                }
            }
        }
    }
    RawField::NotFound
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use anyhow::{bail, Result};
    use async_trait::async_trait;
    use std::collections::HashMap;

    /// Scripted page session: maps selectors to canned outcomes and records
    /// every call so tests can assert what was (not) evaluated.
    #[derive(Default)]
    pub struct MockSession {
        /// selector → text returned by `read_text`.
        pub texts: HashMap<String, String>,
        /// selectors that accept a click.
        pub clickable: Vec<String>,
        /// selectors whose lookup errors out.
        pub faulty: Vec<String>,
        /// URL that fails navigation when matched.
        pub fail_navigation: Option<String>,
        pub clicks: Vec<String>,
        pub reads: Vec<String>,
        pub navigations: Vec<String>,
        pub cookie_clears: usize,
    }

    #[async_trait]
    impl PageSession for MockSession {
        async fn navigate(&mut self, url: &str, _timeout_ms: u64) -> Result<()> {
            self.navigations.push(url.to_string());
            if self.fail_navigation.as_deref() == Some(url) {
                bail!("navigation failed: connection refused");
            }
            Ok(())
        }

        async fn click(&mut self, selector: &str, _timeout_ms: u64) -> Result<bool> {
            if self.faulty.iter().any(|s| s == selector) {
                bail!("driver fault on {selector}");
            }
            self.clicks.push(selector.to_string());
            Ok(self.clickable.iter().any(|s| s == selector))
        }

        async fn read_text(&mut self, selector: &str, _timeout_ms: u64) -> Result<Option<String>> {
            if self.faulty.iter().any(|s| s == selector) {
                bail!("driver fault on {selector}");
            }
            self.reads.push(selector.to_string());
            Ok(self.texts.get(selector).cloned())
        }

        async fn clear_cookies(&mut self) -> Result<()> {
            self.cookie_clears += 1;
            Ok(())
        }

        async fn close(self: Box<Self>) -> Result<()> {
            Ok(())
        }
    }

    fn locators(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_first_matching_locator_wins() {
        let mut session = MockSession::default();
        session
            .texts
            .insert(".price".to_string(), "45,99€".to_string());
        session
            .texts
            .insert(".fallback".to_string(), "99,99€".to_string());

        let raw = extract(
            &mut session,
            &locators(&[".price", ".fallback"]),
            ExtractMode::ReadText,
            100,
        )
        .await;

        assert_eq!(raw, RawField::Found("45,99€".to_string()));
        // The fallback was never evaluated.
        assert_eq!(session.reads, vec![".price"]);
    }

    #[tokio::test]
    async fn test_later_click_locator_not_clicked_after_success() {
        let mut session = MockSession {
            clickable: vec!["#accept".to_string(), "#accept-all".to_string()],
            ..Default::default()
        };

        let raw = extract(
            &mut session,
            &locators(&["#accept", "#accept-all"]),
            ExtractMode::Click,
            100,
        )
        .await;

        assert_eq!(raw, RawField::Found("#accept".to_string()));
        // Only the first candidate produced a click side effect.
        assert_eq!(session.clicks, vec!["#accept"]);
    }

    #[tokio::test]
    async fn test_falls_through_to_later_locator() {
        let mut session = MockSession::default();
        session
            .texts
            .insert(".generic".to_string(), "38,50€".to_string());

        let raw = extract(
            &mut session,
            &locators(&[".specific", ".less-specific", ".generic"]),
            ExtractMode::ReadText,
            100,
        )
        .await;

        assert_eq!(raw, RawField::Found("38,50€".to_string()));
        assert_eq!(session.reads, vec![".specific", ".less-specific", ".generic"]);
    }

    #[tokio::test]
    async fn test_exhaustion_returns_not_found() {
        let mut session = MockSession::default();
        let raw = extract(
            &mut session,
            &locators(&[".a", ".b", ".c"]),
            ExtractMode::ReadText,
            100,
        )
        .await;
        assert_eq!(raw, RawField::NotFound);
    }

    #[tokio::test]
    async fn test_driver_error_on_one_locator_continues() {
        let mut session = MockSession {
            faulty: vec![".broken".to_string()],
            ..Default::default()
        };
        session
            .texts
            .insert(".ok".to_string(), "12,00€".to_string());

        let raw = extract(
            &mut session,
            &locators(&[".broken", ".ok"]),
            ExtractMode::ReadText,
            100,
        )
        .await;
        assert_eq!(raw, RawField::Found("12,00€".to_string()));
    }

    #[tokio::test]
    async fn test_empty_text_does_not_count_as_found() {
        let mut session = MockSession::default();
        session.texts.insert(".blank".to_string(), "  ".to_string());
        session
            .texts
            .insert(".real".to_string(), "20€".to_string());

        let raw = extract(
            &mut session,
            &locators(&[".blank", ".real"]),
            ExtractMode::ReadText,
            100,
        )
        .await;
        assert_eq!(raw, RawField::Found("20€".to_string()));
    }

    #[tokio::test]
    async fn test_empty_locator_list() {
        let mut session = MockSession::default();
        let raw = extract(&mut session, &[], ExtractMode::ReadText, 100).await;
        assert_eq!(raw, RawField::NotFound);
    }
}
