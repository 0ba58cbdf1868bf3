//! Browser driver abstraction.
//!
//! Defines the `Driver` and `PageSession` traits that abstract over the
//! browser engine (currently Chromium via chromiumoxide). The audit core
//! depends only on this capability set — navigate, bounded-wait click,
//! bounded-wait text read — so collectors can be tested against scripted
//! sessions without a browser.

pub mod chromium;

use crate::config::IdentityProfile;
use anyhow::Result;
use async_trait::async_trait;

/// A browser engine that can open sessions for synthetic identities.
#[async_trait]
pub trait Driver: Send + Sync {
    /// Open a fresh browser session carrying the identity's fingerprint
    /// (user agent, viewport, locale). Each identity gets its own session;
    /// sessions are never shared across identities.
    async fn new_session(&self, identity: &IdentityProfile) -> Result<Box<dyn PageSession>>;

    /// Shut down the engine.
    async fn shutdown(&self) -> Result<()>;
}

/// One live browser session (page/tab) with cookie state.
///
/// All waits are time-bounded: an element that never appears within the
/// timeout yields `Ok(false)` / `Ok(None)`, never an indefinite block.
#[async_trait]
pub trait PageSession: Send + Sync {
    /// Navigate to a URL, waiting up to `timeout_ms` for the load.
    async fn navigate(&mut self, url: &str, timeout_ms: u64) -> Result<()>;

    /// Wait up to `timeout_ms` for an element matching `selector` to be
    /// clickable, then click it. `Ok(false)` when no such element appeared.
    /// Clicking mutates page state; subsequent reads see a changed DOM.
    async fn click(&mut self, selector: &str, timeout_ms: u64) -> Result<bool>;

    /// Wait up to `timeout_ms` for an element matching `selector`, then
    /// return its visible text. `Ok(None)` when no element appeared or its
    /// text was empty.
    async fn read_text(&mut self, selector: &str, timeout_ms: u64) -> Result<Option<String>>;

    /// Drop all cookies so the next target starts from a clean slate.
    async fn clear_cookies(&mut self) -> Result<()>;

    /// Close the session and release the browser.
    async fn close(self: Box<Self>) -> Result<()>;
}
