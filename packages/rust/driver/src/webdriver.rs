//! WebDriver-backed page driver (`fantoccini`).
//!
//! Talks to a chromedriver/geckodriver endpoint. Table materialization runs
//! the element markup through `scraper` so the row/cell handling stays in one
//! well-tested place instead of a per-cell WebDriver round trip.

use std::path::Path;
use std::time::Duration;

use fantoccini::{Client, ClientBuilder, Locator};
use scraper::{Html, Selector};
use tracing::debug;

use rankpipe_shared::{PipelineError, Result};

use crate::{DriverFactory, PageDriver, poll_tick};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Connection settings for a WebDriver session.
#[derive(Debug, Clone)]
pub struct WebDriverConfig {
    /// WebDriver endpoint, e.g. `http://localhost:4444`.
    pub webdriver_url: String,
    /// Run the browser without a visible window.
    pub headless: bool,
}

/// Creates one fresh WebDriver session per call.
#[derive(Debug, Clone)]
pub struct WebDriverFactory {
    config: WebDriverConfig,
}

impl WebDriverFactory {
    pub fn new(config: WebDriverConfig) -> Self {
        Self { config }
    }
}

impl DriverFactory for WebDriverFactory {
    type Driver = WebDriverPage;

    async fn create(&self) -> Result<Self::Driver> {
        WebDriverPage::connect(&self.config).await
    }
}

// ---------------------------------------------------------------------------
// WebDriverPage
// ---------------------------------------------------------------------------

/// A live browser page behind a WebDriver session.
pub struct WebDriverPage {
    client: Client,
}

impl WebDriverPage {
    /// Open a new browser session against the configured endpoint.
    pub async fn connect(config: &WebDriverConfig) -> Result<Self> {
        let mut caps = serde_json::map::Map::new();
        if config.headless {
            caps.insert(
                "goog:chromeOptions".to_string(),
                serde_json::json!({
                    "args": ["--headless=new", "--disable-gpu", "--window-size=1920,1080"]
                }),
            );
        }

        let client = ClientBuilder::rustls()
            .map_err(|e| PipelineError::driver(format!("failed to initialize tls: {e}")))?
            .capabilities(caps)
            .connect(&config.webdriver_url)
            .await
            .map_err(|e| {
                PipelineError::driver(format!(
                    "failed to connect to webdriver at {}: {e}",
                    config.webdriver_url
                ))
            })?;

        debug!(url = %config.webdriver_url, headless = config.headless, "webdriver session created");

        Ok(Self { client })
    }

    async fn find_one(&self, selector: &str) -> Result<fantoccini::elements::Element> {
        let mut matches = self
            .client
            .find_all(Locator::Css(selector))
            .await
            .map_err(cmd_err)?;

        if matches.is_empty() {
            return Err(PipelineError::driver(format!(
                "no element matched selector {selector:?}"
            )));
        }
        Ok(matches.remove(0))
    }
}

fn cmd_err(e: fantoccini::error::CmdError) -> PipelineError {
    PipelineError::driver(e.to_string())
}

impl PageDriver for WebDriverPage {
    async fn navigate(&mut self, url: &str) -> Result<()> {
        debug!(%url, "navigating");
        self.client.goto(url).await.map_err(cmd_err)
    }

    async fn fill(&mut self, selector: &str, value: &str) -> Result<()> {
        let field = self.find_one(selector).await?;
        field.clear().await.map_err(cmd_err)?;
        field.send_keys(value).await.map_err(cmd_err)
    }

    async fn click(&mut self, selector: &str) -> Result<()> {
        let element = self.find_one(selector).await?;
        element.click().await.map_err(cmd_err)?;
        Ok(())
    }

    async fn click_text(&mut self, text: &str) -> Result<()> {
        let xpath = format!("//*[normalize-space(text())={}]", xpath_literal(text));
        let mut matches = self
            .client
            .find_all(Locator::XPath(&xpath))
            .await
            .map_err(cmd_err)?;

        if matches.is_empty() {
            return Err(PipelineError::driver(format!(
                "no element with text {text:?}"
            )));
        }
        matches.remove(0).click().await.map_err(cmd_err)?;
        Ok(())
    }

    async fn element_text(&mut self, selector: &str) -> Result<Option<String>> {
        let matches = self
            .client
            .find_all(Locator::Css(selector))
            .await
            .map_err(cmd_err)?;

        match matches.first() {
            Some(el) => Ok(Some(el.text().await.map_err(cmd_err)?.trim().to_string())),
            None => Ok(None),
        }
    }

    async fn has_text(&mut self, text: &str) -> Result<bool> {
        let source = self.client.source().await.map_err(cmd_err)?;
        Ok(source.contains(text))
    }

    async fn wait_for_selector(&mut self, selector: &str, timeout: Duration) -> Result<bool> {
        let deadline = tokio::time::Instant::now() + timeout;
        let tick = poll_tick(timeout);

        loop {
            let matches = self
                .client
                .find_all(Locator::Css(selector))
                .await
                .map_err(cmd_err)?;
            if !matches.is_empty() {
                return Ok(true);
            }
            if tokio::time::Instant::now() >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(tick).await;
        }
    }

    async fn read_table(&mut self, selector: &str) -> Result<Vec<Vec<String>>> {
        let tables = self
            .client
            .find_all(Locator::Css(selector))
            .await
            .map_err(cmd_err)?;

        let table = match tables.as_slice() {
            [] => {
                return Err(PipelineError::driver(format!(
                    "no table matched selector {selector:?}"
                )));
            }
            [one] => one,
            many => {
                return Err(PipelineError::driver(format!(
                    "selector {selector:?} matched {} tables, expected exactly one",
                    many.len()
                )));
            }
        };

        let html = table.html(false).await.map_err(cmd_err)?;
        Ok(parse_table_rows(&html))
    }

    async fn select_file(&mut self, selector: &str, path: &Path) -> Result<()> {
        // WebDriver file inputs need an absolute path.
        let absolute = std::fs::canonicalize(path).map_err(|e| PipelineError::io(path, e))?;
        let input = self.find_one(selector).await?;
        input
            .send_keys(&absolute.to_string_lossy())
            .await
            .map_err(cmd_err)
    }

    async fn current_url(&mut self) -> Result<String> {
        Ok(self.client.current_url().await.map_err(cmd_err)?.to_string())
    }

    async fn page_title(&mut self) -> Result<String> {
        self.client.title().await.map_err(cmd_err)
    }

    async fn page_source(&mut self) -> Result<String> {
        self.client.source().await.map_err(cmd_err)
    }

    async fn close(&mut self) -> Result<()> {
        self.client.clone().close().await.map_err(cmd_err)
    }
}

// ---------------------------------------------------------------------------
// Table parsing
// ---------------------------------------------------------------------------

/// Materialize `<tbody>` rows (or header-less `<tr>`s) into trimmed cell text.
fn parse_table_rows(table_html: &str) -> Vec<Vec<String>> {
    let fragment = Html::parse_fragment(table_html);
    let body_rows = Selector::parse("tbody tr").unwrap();
    let any_rows = Selector::parse("tr").unwrap();
    let cells = Selector::parse("td").unwrap();

    let mut rows: Vec<scraper::ElementRef<'_>> = fragment.select(&body_rows).collect();
    if rows.is_empty() {
        rows = fragment.select(&any_rows).collect();
    }

    rows.iter()
        .map(|row| {
            row.select(&cells)
                .map(|cell| cell.text().collect::<String>().trim().to_string())
                .collect::<Vec<String>>()
        })
        // Header rows carry <th> cells only; they materialize empty and are
        // not data.
        .filter(|cells: &Vec<String>| !cells.is_empty())
        .collect()
}

/// Quote a string for use as an XPath literal.
fn xpath_literal(text: &str) -> String {
    if !text.contains('\'') {
        format!("'{text}'")
    } else if !text.contains('"') {
        format!("\"{text}\"")
    } else {
        // Mixed quotes: stitch with concat().
        let parts: Vec<String> = text.split('\'').map(|p| format!("'{p}'")).collect();
        format!("concat({})", parts.join(", \"'\", "))
    }
}
