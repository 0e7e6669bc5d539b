//! Page driver abstraction for the pipeline's browser interactions.
//!
//! The pipeline stages never talk to a browser directly; they depend on the
//! [`PageDriver`] trait, which is the narrow surface the core needs:
//! navigation, form filling, clicking, bounded waits, table reads, and a few
//! diagnostic reads. [`webdriver::WebDriverPage`] is the production
//! implementation (WebDriver via `fantoccini`); [`scripted::ScriptedDriver`]
//! is a deterministic in-memory implementation backing the unit tests.

pub mod scripted;
pub mod webdriver;

use std::path::Path;
use std::time::Duration;

use rankpipe_shared::{DiagnosticSnapshot, Result};

pub use webdriver::{WebDriverConfig, WebDriverFactory, WebDriverPage};

// ---------------------------------------------------------------------------
// PageDriver
// ---------------------------------------------------------------------------

/// The browser surface the pipeline stages are written against.
///
/// Every wait takes an explicit bounded timeout; there are no unbounded
/// waits. `wait_for_selector` reports absence as `Ok(false)` rather than an
/// error so callers can classify timeouts themselves.
pub trait PageDriver: Send {
    /// Navigate to a URL and wait for the page load to complete.
    fn navigate(&mut self, url: &str) -> impl Future<Output = Result<()>> + Send;

    /// Clear and fill a form field.
    fn fill(&mut self, selector: &str, value: &str) -> impl Future<Output = Result<()>> + Send;

    /// Click the element matching a CSS selector.
    fn click(&mut self, selector: &str) -> impl Future<Output = Result<()>> + Send;

    /// Click the element whose visible text equals `text`.
    fn click_text(&mut self, text: &str) -> impl Future<Output = Result<()>> + Send;

    /// Text content of the first matching element, or `None` if absent.
    fn element_text(
        &mut self,
        selector: &str,
    ) -> impl Future<Output = Result<Option<String>>> + Send;

    /// Whether the page currently renders the given text anywhere.
    fn has_text(&mut self, text: &str) -> impl Future<Output = Result<bool>> + Send;

    /// Wait until an element matches the selector; `Ok(false)` on timeout.
    fn wait_for_selector(
        &mut self,
        selector: &str,
        timeout: Duration,
    ) -> impl Future<Output = Result<bool>> + Send;

    /// Materialize the single table matching `selector` into rows of cell
    /// text. Errors unless exactly one table matches.
    fn read_table(
        &mut self,
        selector: &str,
    ) -> impl Future<Output = Result<Vec<Vec<String>>>> + Send;

    /// Hand a local file path to the file input matching `selector`.
    fn select_file(
        &mut self,
        selector: &str,
        path: &Path,
    ) -> impl Future<Output = Result<()>> + Send;

    /// URL the page is currently on.
    fn current_url(&mut self) -> impl Future<Output = Result<String>> + Send;

    /// Current page title.
    fn page_title(&mut self) -> impl Future<Output = Result<String>> + Send;

    /// Current page markup.
    fn page_source(&mut self) -> impl Future<Output = Result<String>> + Send;

    /// Release the browser context. Reached from every exit path of a
    /// pipeline run, success or failure.
    fn close(&mut self) -> impl Future<Output = Result<()>> + Send;
}

// ---------------------------------------------------------------------------
// DriverFactory
// ---------------------------------------------------------------------------

/// Creates one driver per site session. The pipeline opens a fresh browser
/// context per authenticated boundary and tears it down when the stage ends.
pub trait DriverFactory: Send + Sync {
    type Driver: PageDriver;

    fn create(&self) -> impl Future<Output = Result<Self::Driver>> + Send;
}

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

/// Poll until the page renders `text`, up to `timeout`. Returns `Ok(false)`
/// when the text never appeared.
pub async fn wait_for_text<D: PageDriver>(
    driver: &mut D,
    text: &str,
    timeout: Duration,
) -> Result<bool> {
    let deadline = tokio::time::Instant::now() + timeout;
    let tick = poll_tick(timeout);

    loop {
        if driver.has_text(text).await? {
            return Ok(true);
        }
        if tokio::time::Instant::now() >= deadline {
            return Ok(false);
        }
        tokio::time::sleep(tick).await;
    }
}

/// Capture the last-observed page state for operator diagnostics.
///
/// Best-effort: unreadable fields degrade to placeholders instead of masking
/// the original failure with a driver error.
pub async fn capture_snapshot<D: PageDriver>(driver: &mut D) -> DiagnosticSnapshot {
    let url = driver
        .current_url()
        .await
        .unwrap_or_else(|_| "<unavailable>".into());
    let title = driver
        .page_title()
        .await
        .unwrap_or_else(|_| "<unavailable>".into());
    let markup = driver.page_source().await.unwrap_or_default();
    DiagnosticSnapshot::new(url, title, &markup)
}

/// Polling interval for bounded waits: a tenth of the timeout, clamped so
/// short test timeouts stay fast and long production waits stay gentle.
pub fn poll_tick(timeout: Duration) -> Duration {
    (timeout / 10).clamp(Duration::from_millis(10), Duration::from_millis(500))
}
