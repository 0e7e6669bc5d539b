//! Application configuration for rankpipe.
//!
//! User config lives at `~/.rankpipe/rankpipe.toml`. CLI flags override
//! config file values, which override defaults. Credentials are never stored
//! in the file — only the *names* of the environment variables holding them;
//! the app layer resolves those names once and hands the pipeline a
//! fully-materialized [`PipelineConfig`]. The pipeline itself never touches
//! the environment.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "rankpipe.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".rankpipe";

// ---------------------------------------------------------------------------
// Config structs (matching rankpipe.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Source site (rankings origin).
    #[serde(default)]
    pub source: SourceConfig,

    /// Destination site (upload target).
    #[serde(default)]
    pub destination: DestinationConfig,

    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Remote dataset archive.
    #[serde(default)]
    pub archive: ArchiveConfig,
}

/// `[source]` section — the site the rankings are scraped from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Login page URL.
    #[serde(default = "default_source_login_url")]
    pub login_url: String,

    /// Rankings page URL (the page carrying the table).
    #[serde(default = "default_source_rankings_url")]
    pub rankings_url: String,

    /// Name of the env var holding the username (never the value itself).
    #[serde(default = "default_source_username_env")]
    pub username_env: String,

    /// Name of the env var holding the password.
    #[serde(default = "default_source_password_env")]
    pub password_env: String,

    /// Username field selector on the login page.
    #[serde(default = "default_source_username_selector")]
    pub username_selector: String,

    /// Password field selector on the login page.
    #[serde(default = "default_source_password_selector")]
    pub password_selector: String,

    /// Submit control selector on the login page.
    #[serde(default = "default_source_submit_selector")]
    pub submit_selector: String,

    /// Login-page-scoped error element selector.
    #[serde(default = "default_source_error_selector")]
    pub error_selector: String,

    /// Substring identifying the login page URL.
    #[serde(default = "default_source_login_marker")]
    pub login_url_marker: String,

    /// URL prefixes accepted as the authenticated landing area.
    #[serde(default = "default_source_landing_prefixes")]
    pub landing_url_prefixes: Vec<String>,

    /// Protected resource probed after login to verify the session stuck.
    #[serde(default = "default_source_probe_url")]
    pub protected_probe_url: String,

    /// Selector of the rankings table on the rankings page.
    #[serde(default = "default_source_table_selector")]
    pub table_selector: String,

    /// Ordered column names of the rankings table, left to right.
    #[serde(default = "default_source_columns")]
    pub columns: Vec<String>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            login_url: default_source_login_url(),
            rankings_url: default_source_rankings_url(),
            username_env: default_source_username_env(),
            password_env: default_source_password_env(),
            username_selector: default_source_username_selector(),
            password_selector: default_source_password_selector(),
            submit_selector: default_source_submit_selector(),
            error_selector: default_source_error_selector(),
            login_url_marker: default_source_login_marker(),
            landing_url_prefixes: default_source_landing_prefixes(),
            protected_probe_url: default_source_probe_url(),
            table_selector: default_source_table_selector(),
            columns: default_source_columns(),
        }
    }
}

fn default_source_login_url() -> String {
    "https://establishtherun.com/wp-login.php".into()
}
fn default_source_rankings_url() -> String {
    "https://establishtherun.com/etrs-top-300-for-draftkings-best-ball-rankings-updates-9am-daily/"
        .into()
}
fn default_source_username_env() -> String {
    "ETR_USERNAME".into()
}
fn default_source_password_env() -> String {
    "ETR_PASSWORD".into()
}
fn default_source_username_selector() -> String {
    r#"input[name="log"]"#.into()
}
fn default_source_password_selector() -> String {
    r#"input[name="pwd"]"#.into()
}
fn default_source_submit_selector() -> String {
    r#"input[name="wp-submit"]"#.into()
}
fn default_source_error_selector() -> String {
    ".login .message".into()
}
fn default_source_login_marker() -> String {
    "wp-login.php".into()
}
fn default_source_landing_prefixes() -> Vec<String> {
    vec![
        "https://establishtherun.com/wp-admin".into(),
        "https://establishtherun.com/".into(),
    ]
}
fn default_source_probe_url() -> String {
    "https://establishtherun.com/wp-admin/".into()
}
fn default_source_table_selector() -> String {
    r#"table[data-ninja_table_instance="ninja_table_instance_0"]"#.into()
}
fn default_source_columns() -> Vec<String> {
    [
        "name",
        "team",
        "position",
        "etr_rank",
        "etr_pos_rank",
        "adp",
        "adp_pos_rank",
        "adp_diff",
    ]
    .map(String::from)
    .to_vec()
}

/// `[destination]` section — the site the rankings are uploaded to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DestinationConfig {
    /// Login page URL.
    #[serde(default = "default_dest_login_url")]
    pub login_url: String,

    /// Rankings upload page URL (also the protected probe).
    #[serde(default = "default_dest_rankings_url")]
    pub rankings_url: String,

    /// Name of the env var holding the username.
    #[serde(default = "default_dest_username_env")]
    pub username_env: String,

    /// Name of the env var holding the password.
    #[serde(default = "default_dest_password_env")]
    pub password_env: String,

    /// Username field selector on the login page.
    #[serde(default = "default_dest_username_selector")]
    pub username_selector: String,

    /// Password field selector on the login page.
    #[serde(default = "default_dest_password_selector")]
    pub password_selector: String,

    /// Submit control selector on the login page.
    #[serde(default = "default_dest_submit_selector")]
    pub submit_selector: String,

    /// Login-page-scoped error element selector.
    #[serde(default = "default_dest_error_selector")]
    pub error_selector: String,

    /// Substring identifying the login page URL.
    #[serde(default = "default_dest_login_marker")]
    pub login_url_marker: String,

    /// URL prefixes accepted as the authenticated landing area.
    #[serde(default = "default_dest_landing_prefixes")]
    pub landing_url_prefixes: Vec<String>,

    /// Control that opens the upload/download dialog.
    #[serde(default = "default_dest_open_dialog_selector")]
    pub open_dialog_selector: String,

    /// Menu entry that starts the CSV upload flow.
    #[serde(default = "default_dest_upload_menu_text")]
    pub upload_menu_text: String,

    /// File input receiving the local CSV path.
    #[serde(default = "default_dest_file_input_selector")]
    pub file_input_selector: String,

    /// Control that submits the chosen file.
    #[serde(default = "default_dest_upload_submit_text")]
    pub upload_submit_text: String,

    /// Banner text that is the sole accepted evidence of upload success.
    #[serde(default = "default_dest_upload_banner")]
    pub upload_banner_text: String,

    /// Optional banner text identifying an explicit upload failure.
    #[serde(default)]
    pub upload_error_text: Option<String>,

    /// Control that saves the uploaded rankings.
    #[serde(default = "default_dest_save_text")]
    pub save_text: String,

    /// Banner text that is the sole accepted evidence of save success.
    #[serde(default = "default_dest_save_banner")]
    pub save_banner_text: String,
}

impl Default for DestinationConfig {
    fn default() -> Self {
        Self {
            login_url: default_dest_login_url(),
            rankings_url: default_dest_rankings_url(),
            username_env: default_dest_username_env(),
            password_env: default_dest_password_env(),
            username_selector: default_dest_username_selector(),
            password_selector: default_dest_password_selector(),
            submit_selector: default_dest_submit_selector(),
            error_selector: default_dest_error_selector(),
            login_url_marker: default_dest_login_marker(),
            landing_url_prefixes: default_dest_landing_prefixes(),
            open_dialog_selector: default_dest_open_dialog_selector(),
            upload_menu_text: default_dest_upload_menu_text(),
            file_input_selector: default_dest_file_input_selector(),
            upload_submit_text: default_dest_upload_submit_text(),
            upload_banner_text: default_dest_upload_banner(),
            upload_error_text: None,
            save_text: default_dest_save_text(),
            save_banner_text: default_dest_save_banner(),
        }
    }
}

fn default_dest_login_url() -> String {
    "https://myaccount.draftkings.com/login?returnPath=%2flobby".into()
}
fn default_dest_rankings_url() -> String {
    "https://www.draftkings.com/draft/rankings/nfl".into()
}
fn default_dest_username_env() -> String {
    "DRAFTKINGS_USERNAME".into()
}
fn default_dest_password_env() -> String {
    "DRAFTKINGS_PASSWORD".into()
}
fn default_dest_username_selector() -> String {
    r#"input[name="username"]"#.into()
}
fn default_dest_password_selector() -> String {
    r#"input[name="password"]"#.into()
}
fn default_dest_submit_selector() -> String {
    r#"button[type="submit"]"#.into()
}
fn default_dest_error_selector() -> String {
    r#"[data-testid="login-error"]"#.into()
}
fn default_dest_login_marker() -> String {
    "myaccount.draftkings.com/login".into()
}
fn default_dest_landing_prefixes() -> Vec<String> {
    vec!["https://www.draftkings.com/".into()]
}
fn default_dest_open_dialog_selector() -> String {
    r#"button[data-testid="csv-upload-download"]"#.into()
}
fn default_dest_upload_menu_text() -> String {
    "UPLOAD CSV".into()
}
fn default_dest_file_input_selector() -> String {
    r#"input[type="file"]"#.into()
}
fn default_dest_upload_submit_text() -> String {
    "Upload".into()
}
fn default_dest_upload_banner() -> String {
    "Pre-Draft Rankings CSV uploaded successfully! Please remember to save your rankings.".into()
}
fn default_dest_save_text() -> String {
    "SAVE RANKINGS".into()
}
fn default_dest_save_banner() -> String {
    "Your rankings have been saved successfully.".into()
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Path the destination-shaped CSV is written to.
    #[serde(default = "default_output_path")]
    pub output_path: String,

    /// Path of the identifier table CSV (`ID,Name,Position`).
    #[serde(default = "default_identifier_csv")]
    pub identifier_csv: String,

    /// Run the browser headless.
    #[serde(default = "default_true")]
    pub headless: bool,

    /// WebDriver endpoint the browser sessions are created against.
    #[serde(default = "default_webdriver_url")]
    pub webdriver_url: String,

    /// Bounded wait for page state (tables, banners), in seconds.
    #[serde(default = "default_wait_timeout_secs")]
    pub wait_timeout_secs: u64,

    /// Bounded wait for login outcome signals, in seconds.
    #[serde(default = "default_login_timeout_secs")]
    pub login_timeout_secs: u64,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            output_path: default_output_path(),
            identifier_csv: default_identifier_csv(),
            headless: true,
            webdriver_url: default_webdriver_url(),
            wait_timeout_secs: default_wait_timeout_secs(),
            login_timeout_secs: default_login_timeout_secs(),
        }
    }
}

fn default_output_path() -> String {
    "rankings.csv".into()
}
fn default_identifier_csv() -> String {
    "csv-templates/DkPreDraftRankings.csv".into()
}
fn default_true() -> bool {
    true
}
fn default_webdriver_url() -> String {
    "http://localhost:4444".into()
}
fn default_wait_timeout_secs() -> u64 {
    30
}
fn default_login_timeout_secs() -> u64 {
    60
}

/// `[archive]` section — remote store for raw and processed datasets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveConfig {
    /// Whether archiving is attempted at all.
    #[serde(default)]
    pub enabled: bool,

    /// Name of the env var holding the archive base URL.
    #[serde(default = "default_archive_url_env")]
    pub base_url_env: String,

    /// Name of the env var holding the archive API key.
    #[serde(default = "default_archive_key_env")]
    pub api_key_env: String,

    /// Table receiving raw CSV snapshots.
    #[serde(default = "default_raw_table")]
    pub raw_table: String,

    /// Table receiving processed ranking rows.
    #[serde(default = "default_processed_table")]
    pub processed_table: String,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url_env: default_archive_url_env(),
            api_key_env: default_archive_key_env(),
            raw_table: default_raw_table(),
            processed_table: default_processed_table(),
        }
    }
}

fn default_archive_url_env() -> String {
    "SUPABASE_URL".into()
}
fn default_archive_key_env() -> String {
    "SUPABASE_KEY".into()
}
fn default_raw_table() -> String {
    "raw_csv_data".into()
}
fn default_processed_table() -> String {
    "processed_rankings".into()
}

// ---------------------------------------------------------------------------
// Credentials
// ---------------------------------------------------------------------------

/// A username/password pair for one site.
///
/// `Debug` redacts the password so the pair can appear in structured logs
/// without leaking secrets.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Both halves present and non-empty.
    pub fn is_complete(&self) -> bool {
        !self.username.is_empty() && !self.password.is_empty()
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Runtime configs (merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// One site's login surface, as consumed by the session gate.
#[derive(Debug, Clone)]
pub struct SiteConfig {
    pub login_url: String,
    pub username_selector: String,
    pub password_selector: String,
    pub submit_selector: String,
    pub error_selector: String,
    pub login_url_marker: String,
    pub landing_url_prefixes: Vec<String>,
    pub protected_probe_url: String,
    /// Bounded wait for a conclusive login outcome signal.
    pub timeout: Duration,
}

/// The destination's upload surface, as consumed by the upload confirmer.
#[derive(Debug, Clone)]
pub struct UploadConfig {
    pub rankings_url: String,
    pub open_dialog_selector: String,
    pub upload_menu_text: String,
    pub file_input_selector: String,
    pub upload_submit_text: String,
    pub upload_banner_text: String,
    pub upload_error_text: Option<String>,
    pub save_text: String,
    pub save_banner_text: String,
    /// Bounded wait for each confirmation banner.
    pub timeout: Duration,
}

/// Fully-resolved archive endpoint (env names already dereferenced).
#[derive(Clone)]
pub struct ArchiveTarget {
    pub base_url: String,
    pub api_key: String,
    pub raw_table: String,
    pub processed_table: String,
}

impl std::fmt::Debug for ArchiveTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveTarget")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .field("raw_table", &self.raw_table)
            .field("processed_table", &self.processed_table)
            .finish()
    }
}

/// Everything one pipeline run needs, fully materialized by the app layer.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub source_site: SiteConfig,
    pub source_credentials: Credentials,
    pub rankings_url: String,
    pub table_selector: String,
    pub source_columns: Vec<String>,
    pub destination_site: SiteConfig,
    pub destination_credentials: Credentials,
    pub upload: UploadConfig,
    pub identifier_csv: PathBuf,
    pub output_path: PathBuf,
    /// Bounded wait for page state (table presence) during extraction.
    pub wait_timeout: Duration,
    pub webdriver_url: String,
    pub headless: bool,
    pub archive: Option<ArchiveTarget>,
}

impl SourceConfig {
    /// Build the gate-facing view of this site.
    pub fn site_config(&self, timeout: Duration) -> SiteConfig {
        SiteConfig {
            login_url: self.login_url.clone(),
            username_selector: self.username_selector.clone(),
            password_selector: self.password_selector.clone(),
            submit_selector: self.submit_selector.clone(),
            error_selector: self.error_selector.clone(),
            login_url_marker: self.login_url_marker.clone(),
            landing_url_prefixes: self.landing_url_prefixes.clone(),
            protected_probe_url: self.protected_probe_url.clone(),
            timeout,
        }
    }
}

impl DestinationConfig {
    /// Build the gate-facing view of this site. The rankings page doubles as
    /// the protected probe: the upload flow strictly requires a durable
    /// session there.
    pub fn site_config(&self, timeout: Duration) -> SiteConfig {
        SiteConfig {
            login_url: self.login_url.clone(),
            username_selector: self.username_selector.clone(),
            password_selector: self.password_selector.clone(),
            submit_selector: self.submit_selector.clone(),
            error_selector: self.error_selector.clone(),
            login_url_marker: self.login_url_marker.clone(),
            landing_url_prefixes: self.landing_url_prefixes.clone(),
            protected_probe_url: self.rankings_url.clone(),
            timeout,
        }
    }

    /// Build the uploader-facing view of this site.
    pub fn upload_config(&self, timeout: Duration) -> UploadConfig {
        UploadConfig {
            rankings_url: self.rankings_url.clone(),
            open_dialog_selector: self.open_dialog_selector.clone(),
            upload_menu_text: self.upload_menu_text.clone(),
            file_input_selector: self.file_input_selector.clone(),
            upload_submit_text: self.upload_submit_text.clone(),
            upload_banner_text: self.upload_banner_text.clone(),
            upload_error_text: self.upload_error_text.clone(),
            save_text: self.save_text.clone(),
            save_banner_text: self.save_banner_text.clone(),
            timeout,
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.rankpipe/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| PipelineError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.rankpipe/rankpipe.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| PipelineError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| PipelineError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| PipelineError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| PipelineError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| PipelineError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Resolve a credential pair from the environment by variable name.
///
/// App-layer helper: this is the only place besides the CLI that touches the
/// environment. Missing or empty variables fail fast before any network
/// action.
pub fn resolve_env_credentials(username_env: &str, password_env: &str) -> Result<Credentials> {
    let read = |name: &str| -> Result<String> {
        match std::env::var(name) {
            Ok(val) if !val.is_empty() => Ok(val),
            _ => Err(PipelineError::config(format!(
                "credential env var {name} is not set"
            ))),
        }
    };

    Ok(Credentials::new(read(username_env)?, read(password_env)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("login_url"));
        assert!(toml_str.contains("ETR_USERNAME"));
        assert!(toml_str.contains("DRAFTKINGS_USERNAME"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.defaults.wait_timeout_secs, 30);
        assert_eq!(parsed.source.login_url_marker, "wp-login.php");
        assert_eq!(parsed.source.columns.len(), 8);
        assert!(!parsed.archive.enabled);
    }

    #[test]
    fn partial_config_fills_defaults() {
        let toml_str = r#"
[defaults]
output_path = "/tmp/out.csv"
headless = false

[source]
login_url = "https://rankings.example.com/login"
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.defaults.output_path, "/tmp/out.csv");
        assert!(!config.defaults.headless);
        assert_eq!(config.source.login_url, "https://rankings.example.com/login");
        // Untouched fields come from defaults.
        assert_eq!(config.source.username_env, "ETR_USERNAME");
        assert_eq!(config.defaults.wait_timeout_secs, 30);
    }

    #[test]
    fn credentials_debug_redacts_password() {
        let creds = Credentials::new("alice", "hunter2");
        let debug = format!("{creds:?}");
        assert!(debug.contains("alice"));
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn archive_target_debug_redacts_key() {
        let target = ArchiveTarget {
            base_url: "https://archive.example.com".into(),
            api_key: "sb-secret".into(),
            raw_table: "raw_csv_data".into(),
            processed_table: "processed_rankings".into(),
        };
        let debug = format!("{target:?}");
        assert!(!debug.contains("sb-secret"));
    }

    #[test]
    fn destination_probe_is_the_rankings_page() {
        let dest = DestinationConfig::default();
        let site = dest.site_config(Duration::from_secs(30));
        assert_eq!(site.protected_probe_url, dest.rankings_url);
    }

    #[test]
    fn env_credentials_missing_var_fails() {
        let result =
            resolve_env_credentials("RANKPIPE_TEST_NO_SUCH_USER", "RANKPIPE_TEST_NO_SUCH_PASS");
        assert!(result.is_err());
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("RANKPIPE_TEST_NO_SUCH_USER")
        );
    }
}
