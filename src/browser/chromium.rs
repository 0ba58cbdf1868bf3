//! Chromium-based driver using chromiumoxide.
//!
//! Each identity gets its own headless Chromium process so fingerprint
//! attributes (user agent, window size, locale) are set at launch and
//! cookie jars never bleed between identities.

use super::{Driver, PageSession};
use crate::config::IdentityProfile;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::ClearBrowserCookiesParams;
use chromiumoxide::page::Page;
use futures::StreamExt;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

/// How often to re-probe the DOM while waiting for an element.
const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Find the Chromium binary path.
pub fn find_chromium() -> Option<PathBuf> {
    // 1. PRICELENS_CHROMIUM_PATH env
    if let Ok(p) = std::env::var("PRICELENS_CHROMIUM_PATH") {
        let path = PathBuf::from(&p);
        if path.exists() {
            return Some(path);
        }
    }

    // 2. ~/.pricelens/chromium/
    if let Some(home) = dirs::home_dir() {
        let candidates = if cfg!(target_os = "macos") {
            vec![
                home.join(".pricelens/chromium/chrome-mac-arm64/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing"),
                home.join(".pricelens/chromium/chrome-mac-x64/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing"),
                home.join(".pricelens/chromium/chrome"),
            ]
        } else {
            vec![
                home.join(".pricelens/chromium/chrome-linux64/chrome"),
                home.join(".pricelens/chromium/chrome"),
            ]
        };
        for c in candidates {
            if c.exists() {
                return Some(c);
            }
        }
    }

    // 3. System PATH
    for name in ["google-chrome", "chromium", "chromium-browser"] {
        if let Ok(path) = which::which(name) {
            return Some(path);
        }
    }

    // 4. Common macOS location
    if cfg!(target_os = "macos") {
        let common =
            PathBuf::from("/Applications/Google Chrome.app/Contents/MacOS/Google Chrome");
        if common.exists() {
            return Some(common);
        }
    }

    None
}

/// Chromium-based driver. Stateless; each session launches its own browser.
pub struct ChromiumDriver {
    chrome_path: PathBuf,
}

impl ChromiumDriver {
    /// Create a driver, verifying a Chromium binary is available.
    pub fn new() -> Result<Self> {
        let chrome_path = find_chromium()
            .context("Chromium not found. Install Chrome/Chromium or set PRICELENS_CHROMIUM_PATH.")?;
        Ok(Self { chrome_path })
    }
}

#[async_trait]
impl Driver for ChromiumDriver {
    async fn new_session(&self, identity: &IdentityProfile) -> Result<Box<dyn PageSession>> {
        let mut builder = BrowserConfig::builder()
            .chrome_executable(&self.chrome_path)
            .arg("--headless=new")
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-blink-features=AutomationControlled")
            .arg(format!("--user-agent={}", identity.user_agent))
            .arg(format!(
                "--window-size={},{}",
                identity.viewport.width, identity.viewport.height
            ));
        if let Some(locale) = &identity.locale {
            builder = builder.arg(format!("--lang={locale}"));
        }
        let config = builder
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build browser config: {e}"))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .with_context(|| format!("failed to launch Chromium for identity {}", identity.id))?;

        // Drive CDP events until the browser goes away.
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                let _ = event;
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .context("failed to create page")?;

        tracing::debug!(identity = %identity.id, "browser session opened");

        Ok(Box::new(ChromiumSession {
            browser,
            page,
            handler_task,
        }))
    }

    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }
}

/// A single Chromium session: one browser process, one page.
pub struct ChromiumSession {
    browser: Browser,
    page: Page,
    handler_task: JoinHandle<()>,
}

impl ChromiumSession {
    /// Poll for an element until it appears or the deadline passes.
    async fn wait_for_element(
        &self,
        selector: &str,
        timeout_ms: u64,
    ) -> Option<chromiumoxide::element::Element> {
        let deadline = Instant::now() + Duration::from_millis(timeout_ms);
        loop {
            if let Ok(el) = self.page.find_element(selector).await {
                return Some(el);
            }
            if Instant::now() >= deadline {
                return None;
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }
}

#[async_trait]
impl PageSession for ChromiumSession {
    async fn navigate(&mut self, url: &str, timeout_ms: u64) -> Result<()> {
        let result = tokio::time::timeout(
            Duration::from_millis(timeout_ms),
            self.page.goto(url),
        )
        .await;

        match result {
            Ok(Ok(_)) => {
                // Best-effort settle; dynamic pages keep loading after this.
                let _ = self.page.wait_for_navigation().await;
                Ok(())
            }
            Ok(Err(e)) => bail!("navigation failed: {e}"),
            Err(_) => bail!("navigation timed out after {timeout_ms}ms"),
        }
    }

    async fn click(&mut self, selector: &str, timeout_ms: u64) -> Result<bool> {
        match self.wait_for_element(selector, timeout_ms).await {
            Some(el) => match el.click().await {
                Ok(_) => Ok(true),
                Err(e) => {
                    // Present but not clickable (covered, detached) counts
                    // as absent for fallback purposes.
                    tracing::debug!(selector, "click failed: {e}");
                    Ok(false)
                }
            },
            None => Ok(false),
        }
    }

    async fn read_text(&mut self, selector: &str, timeout_ms: u64) -> Result<Option<String>> {
        let Some(el) = self.wait_for_element(selector, timeout_ms).await else {
            return Ok(None);
        };
        let text = el
            .inner_text()
            .await
            .unwrap_or(None)
            .map(|t| t.trim().replace('\n', " "))
            .filter(|t| !t.is_empty());
        Ok(text)
    }

    async fn clear_cookies(&mut self) -> Result<()> {
        self.page
            .execute(ClearBrowserCookiesParams::default())
            .await
            .context("failed to clear cookies")?;
        Ok(())
    }

    async fn close(self: Box<Self>) -> Result<()> {
        let _ = self.page.close().await;
        drop(self.browser);
        self.handler_task.abort();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Viewport;

    #[tokio::test]
    #[ignore] // Requires Chromium to be installed
    async fn test_chromium_session_reads_text() {
        let identity = IdentityProfile {
            id: "test-desktop".to_string(),
            user_agent: "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36".to_string(),
            viewport: Viewport {
                width: 1280,
                height: 800,
            },
            locale: None,
        };

        let driver = ChromiumDriver::new().expect("driver");
        let mut session = driver.new_session(&identity).await.expect("session");

        session
            .navigate("data:text/html,<span class='price'>45,99€</span>", 10_000)
            .await
            .expect("navigate");

        let text = session.read_text(".price", 2_000).await.expect("read");
        assert_eq!(text.as_deref(), Some("45,99€"));

        let absent = session.read_text(".no-such", 500).await.expect("read");
        assert!(absent.is_none());

        session.close().await.expect("close");
    }
}
