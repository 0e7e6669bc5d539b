//! CLI command definitions, routing, and tracing setup.
//!
//! The app layer is the only place the environment is read: credential env
//! var names from the config file are resolved here and handed to the
//! pipeline as materialized values.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use rankpipe_core::{
    ProgressReporter, RunSummary, fetch_rankings, run_pipeline, upload_existing,
};
use rankpipe_driver::{WebDriverConfig, WebDriverFactory};
use rankpipe_shared::{
    AppConfig, ArchiveTarget, Credentials, PipelineConfig, init_config, load_config,
    resolve_env_credentials,
};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// rankpipe — authenticated scrape-transform-upload for draft rankings.
#[derive(Parser)]
#[command(
    name = "rankpipe",
    version,
    about = "Scrape draft rankings, reshape them, and upload them to the destination site.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Run the full pipeline: scrape, normalize, upload, save.
    Run {
        /// Output CSV path (defaults to the configured path).
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Show the browser window instead of running headless.
        #[arg(long)]
        visible: bool,

        /// WebDriver endpoint override.
        #[arg(long)]
        webdriver_url: Option<String>,
    },

    /// Scrape and normalize only; write the destination CSV without uploading.
    Fetch {
        /// Output CSV path (defaults to the configured path).
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Show the browser window instead of running headless.
        #[arg(long)]
        visible: bool,

        /// WebDriver endpoint override.
        #[arg(long)]
        webdriver_url: Option<String>,
    },

    /// Upload an existing destination-shaped CSV and save it.
    Upload {
        /// Path to the CSV file to upload.
        #[arg(long)]
        csv: PathBuf,

        /// Show the browser window instead of running headless.
        #[arg(long)]
        visible: bool,

        /// WebDriver endpoint override.
        #[arg(long)]
        webdriver_url: Option<String>,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "rankpipe=info",
        1 => "rankpipe=debug",
        _ => "rankpipe=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt().json().with_env_filter(env_filter).init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Run {
            out,
            visible,
            webdriver_url,
        } => cmd_run(out, visible, webdriver_url).await,
        Command::Fetch {
            out,
            visible,
            webdriver_url,
        } => cmd_fetch(out, visible, webdriver_url).await,
        Command::Upload {
            csv,
            visible,
            webdriver_url,
        } => cmd_upload(csv, visible, webdriver_url).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

// ---------------------------------------------------------------------------
// Pipeline config assembly
// ---------------------------------------------------------------------------

/// Which credential pairs a command actually needs resolved.
struct CredentialNeeds {
    source: bool,
    destination: bool,
}

fn build_pipeline_config(
    app: &AppConfig,
    out: Option<PathBuf>,
    visible: bool,
    webdriver_url: Option<String>,
    needs: CredentialNeeds,
) -> Result<PipelineConfig> {
    let login_timeout = Duration::from_secs(app.defaults.login_timeout_secs);
    let wait_timeout = Duration::from_secs(app.defaults.wait_timeout_secs);

    let source_credentials = if needs.source {
        resolve_env_credentials(&app.source.username_env, &app.source.password_env)?
    } else {
        Credentials::new("", "")
    };

    let destination_credentials = if needs.destination {
        resolve_env_credentials(&app.destination.username_env, &app.destination.password_env)?
    } else {
        Credentials::new("", "")
    };

    let archive = if app.archive.enabled {
        Some(resolve_archive_target(app)?)
    } else {
        None
    };

    Ok(PipelineConfig {
        source_site: app.source.site_config(login_timeout),
        source_credentials,
        rankings_url: app.source.rankings_url.clone(),
        table_selector: app.source.table_selector.clone(),
        source_columns: app.source.columns.clone(),
        destination_site: app.destination.site_config(login_timeout),
        destination_credentials,
        upload: app.destination.upload_config(wait_timeout),
        identifier_csv: PathBuf::from(&app.defaults.identifier_csv),
        output_path: out.unwrap_or_else(|| PathBuf::from(&app.defaults.output_path)),
        wait_timeout,
        webdriver_url: webdriver_url.unwrap_or_else(|| app.defaults.webdriver_url.clone()),
        headless: app.defaults.headless && !visible,
        archive,
    })
}

fn resolve_archive_target(app: &AppConfig) -> Result<ArchiveTarget> {
    let read = |name: &str| -> Result<String> {
        std::env::var(name)
            .ok()
            .filter(|v| !v.is_empty())
            .ok_or_else(|| eyre!("archive is enabled but env var {name} is not set"))
    };

    Ok(ArchiveTarget {
        base_url: read(&app.archive.base_url_env)?,
        api_key: read(&app.archive.api_key_env)?,
        raw_table: app.archive.raw_table.clone(),
        processed_table: app.archive.processed_table.clone(),
    })
}

fn webdriver_factory(config: &PipelineConfig) -> WebDriverFactory {
    WebDriverFactory::new(WebDriverConfig {
        webdriver_url: config.webdriver_url.clone(),
        headless: config.headless,
    })
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_run(
    out: Option<PathBuf>,
    visible: bool,
    webdriver_url: Option<String>,
) -> Result<()> {
    let app = load_config()?;
    let config = build_pipeline_config(
        &app,
        out,
        visible,
        webdriver_url,
        CredentialNeeds {
            source: true,
            destination: true,
        },
    )?;
    let factory = webdriver_factory(&config);

    info!(
        rankings_url = %config.rankings_url,
        out = %config.output_path.display(),
        "running full pipeline"
    );

    let reporter = CliProgress::new();
    let summary = run_pipeline(&config, &factory, &reporter).await?;
    reporter.finish();

    print_summary("Rankings uploaded and saved!", &summary);
    Ok(())
}

async fn cmd_fetch(
    out: Option<PathBuf>,
    visible: bool,
    webdriver_url: Option<String>,
) -> Result<()> {
    let app = load_config()?;
    let config = build_pipeline_config(
        &app,
        out,
        visible,
        webdriver_url,
        CredentialNeeds {
            source: true,
            destination: false,
        },
    )?;
    let factory = webdriver_factory(&config);

    info!(rankings_url = %config.rankings_url, "fetching rankings");

    let reporter = CliProgress::new();
    let summary = fetch_rankings(&config, &factory, &reporter).await?;
    reporter.finish();

    print_summary("Rankings fetched!", &summary);
    Ok(())
}

async fn cmd_upload(csv: PathBuf, visible: bool, webdriver_url: Option<String>) -> Result<()> {
    let app = load_config()?;
    let config = build_pipeline_config(
        &app,
        None,
        visible,
        webdriver_url,
        CredentialNeeds {
            source: false,
            destination: true,
        },
    )?;
    let factory = webdriver_factory(&config);

    info!(csv = %csv.display(), "uploading existing rankings file");

    let reporter = CliProgress::new();
    let summary = upload_existing(&config, &factory, &csv, &reporter).await?;
    reporter.finish();

    print_summary("Rankings uploaded and saved!", &summary);
    Ok(())
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config file written to {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config = load_config()?;
    println!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}

fn print_summary(headline: &str, summary: &RunSummary) {
    println!();
    println!("  {headline}");
    println!("  Run:        {}", summary.run_id);
    println!(
        "  Records:    {} ({} without destination ID)",
        summary.records_extracted, summary.unresolved
    );
    println!("  CSV:        {}", summary.csv_path.display());
    println!("  Upload:     {}", summary.report.upload);
    println!("  Save:       {}", summary.report.save);
    if summary.archived {
        println!("  Archive:    stored");
    }
    println!("  Time:       {:.1}s", summary.elapsed.as_secs_f64());
    println!();
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap()
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }

    fn finish(&self) {
        self.spinner.finish_and_clear();
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }
}
