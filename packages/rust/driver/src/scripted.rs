//! Deterministic in-memory page driver for tests.
//!
//! A [`ScriptedDriver`] replays a fixed map of pages keyed by URL. Clicks can
//! move the driver between pages (`on_click`), navigations can land somewhere
//! else than requested (`redirect`), and a page can display a URL different
//! from its key (`url`) to model a post-submit bounce back to a login page.
//! Everything the driver was asked to do is recorded for assertions.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use rankpipe_shared::{PipelineError, Result};

use crate::{DriverFactory, PageDriver};

// ---------------------------------------------------------------------------
// ScriptedPage
// ---------------------------------------------------------------------------

/// One scripted page state.
#[derive(Debug, Clone, Default)]
pub struct ScriptedPage {
    /// Displayed URL when it differs from the page key.
    url: Option<String>,
    title: String,
    source: String,
    element_text: HashMap<String, String>,
    tables: HashMap<String, Vec<Vec<String>>>,
    on_click: HashMap<String, String>,
    redirect: Option<String>,
}

impl ScriptedPage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the URL this page reports (defaults to its key).
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    /// Register an element with text content.
    pub fn element(mut self, selector: impl Into<String>, text: impl Into<String>) -> Self {
        self.element_text.insert(selector.into(), text.into());
        self
    }

    /// Register a table as rows of cell text.
    pub fn table(mut self, selector: impl Into<String>, rows: Vec<Vec<&str>>) -> Self {
        let rows = rows
            .into_iter()
            .map(|row| row.into_iter().map(String::from).collect())
            .collect();
        self.tables.insert(selector.into(), rows);
        self
    }

    /// Clicking `control` (selector or visible text) lands on page `target`.
    pub fn on_click(mut self, control: impl Into<String>, target: impl Into<String>) -> Self {
        self.on_click.insert(control.into(), target.into());
        self
    }

    /// Navigating to this page lands on `target` instead (auth redirect).
    pub fn redirect(mut self, target: impl Into<String>) -> Self {
        self.redirect = Some(target.into());
        self
    }
}

// ---------------------------------------------------------------------------
// ScriptedDriver
// ---------------------------------------------------------------------------

/// In-memory [`PageDriver`] replaying scripted pages.
#[derive(Debug, Default)]
pub struct ScriptedDriver {
    pages: HashMap<String, ScriptedPage>,
    location: String,
    /// `(selector, value)` pairs passed to `fill`, in order.
    pub fills: Vec<(String, String)>,
    /// Controls clicked, in order.
    pub clicks: Vec<String>,
    /// File paths handed to file inputs.
    pub files: Vec<PathBuf>,
    /// URLs navigated to, in order.
    pub navigations: Vec<String>,
    /// Whether the browser context was released.
    pub closed: bool,
}

impl ScriptedDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, key: impl Into<String>, page: ScriptedPage) -> Self {
        self.pages.insert(key.into(), page);
        self
    }

    /// Page key the driver is currently on.
    pub fn location(&self) -> &str {
        &self.location
    }

    fn page(&self) -> ScriptedPage {
        self.pages.get(&self.location).cloned().unwrap_or_default()
    }

    fn follow_click(&mut self, control: &str) {
        if let Some(target) = self.page().on_click.get(control) {
            self.location = target.clone();
        }
    }
}

impl PageDriver for ScriptedDriver {
    async fn navigate(&mut self, url: &str) -> Result<()> {
        self.navigations.push(url.to_string());
        self.location = match self.pages.get(url).and_then(|p| p.redirect.clone()) {
            Some(target) => target,
            None => url.to_string(),
        };
        Ok(())
    }

    async fn fill(&mut self, selector: &str, value: &str) -> Result<()> {
        self.fills.push((selector.to_string(), value.to_string()));
        Ok(())
    }

    async fn click(&mut self, selector: &str) -> Result<()> {
        self.clicks.push(selector.to_string());
        self.follow_click(selector);
        Ok(())
    }

    async fn click_text(&mut self, text: &str) -> Result<()> {
        self.clicks.push(text.to_string());
        self.follow_click(text);
        Ok(())
    }

    async fn element_text(&mut self, selector: &str) -> Result<Option<String>> {
        Ok(self.page().element_text.get(selector).cloned())
    }

    async fn has_text(&mut self, text: &str) -> Result<bool> {
        Ok(self.page().source.contains(text))
    }

    async fn wait_for_selector(&mut self, selector: &str, _timeout: Duration) -> Result<bool> {
        let page = self.page();
        Ok(page.tables.contains_key(selector) || page.element_text.contains_key(selector))
    }

    async fn read_table(&mut self, selector: &str) -> Result<Vec<Vec<String>>> {
        self.page()
            .tables
            .get(selector)
            .cloned()
            .ok_or_else(|| PipelineError::driver(format!("no table matched selector {selector:?}")))
    }

    async fn select_file(&mut self, _selector: &str, path: &Path) -> Result<()> {
        self.files.push(path.to_path_buf());
        Ok(())
    }

    async fn current_url(&mut self) -> Result<String> {
        Ok(self.page().url.unwrap_or_else(|| self.location.clone()))
    }

    async fn page_title(&mut self) -> Result<String> {
        Ok(self.page().title)
    }

    async fn page_source(&mut self) -> Result<String> {
        Ok(self.page().source)
    }

    async fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// ScriptedFactory
// ---------------------------------------------------------------------------

/// Hands out pre-built scripted drivers in order, one per `create` call.
#[derive(Debug, Default)]
pub struct ScriptedFactory {
    drivers: Mutex<VecDeque<ScriptedDriver>>,
}

impl ScriptedFactory {
    pub fn new(drivers: Vec<ScriptedDriver>) -> Self {
        Self {
            drivers: Mutex::new(drivers.into()),
        }
    }
}

impl DriverFactory for ScriptedFactory {
    type Driver = ScriptedDriver;

    async fn create(&self) -> Result<Self::Driver> {
        self.drivers
            .lock()
            .expect("scripted factory poisoned")
            .pop_front()
            .ok_or_else(|| PipelineError::driver("scripted factory ran out of drivers"))
    }
}
