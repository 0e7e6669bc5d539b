//! End-to-end pipeline: source login → extract → normalize → destination
//! login → upload → save.
//!
//! Stages run strictly in sequence because each one's preconditions are the
//! previous one's confirmed postconditions. Every browser session is created
//! and torn down inside the stage that owns it; teardown is reached from
//! every exit path. The run is all-or-nothing: any stage error aborts it,
//! with the confirmation ledger logged for the operator.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tracing::{info, instrument, warn};

use rankpipe_archive::Archive;
use rankpipe_driver::{DriverFactory, PageDriver};
use rankpipe_extract::{RowShape, extract};
use rankpipe_normalize::{
    IdentifierTable, normalize, raw_csv_string, read_rankings_csv, write_rankings_csv,
};
use rankpipe_session::authenticate;
use rankpipe_shared::{
    AuthError, ConfirmationEvent, ExtractError, NormalizedRecord, PipelineConfig, PipelineError,
    PlayerRecord, Result, RunId, RunReport,
};
use rankpipe_upload::upload_and_save;

// ---------------------------------------------------------------------------
// RunSummary
// ---------------------------------------------------------------------------

/// Outcome of a completed run.
#[derive(Debug)]
pub struct RunSummary {
    /// Run identifier, also tagged onto archived rows.
    pub run_id: RunId,
    /// Number of player rows extracted from the source table.
    pub records_extracted: usize,
    /// Players that found no destination identifier.
    pub unresolved: usize,
    /// Where the destination-shaped CSV was written.
    pub csv_path: PathBuf,
    /// Confirmation ledger, one entry per confirmable action.
    pub report: RunReport,
    /// Whether both datasets reached the archive.
    pub archived: bool,
    /// Total elapsed time.
    pub elapsed: Duration,
}

// ---------------------------------------------------------------------------
// Progress reporting
// ---------------------------------------------------------------------------

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
}

// ---------------------------------------------------------------------------
// run_pipeline
// ---------------------------------------------------------------------------

/// Run the full scrape-transform-upload pipeline.
#[instrument(skip_all)]
pub async fn run_pipeline<F: DriverFactory>(
    config: &PipelineConfig,
    factory: &F,
    progress: &dyn ProgressReporter,
) -> Result<RunSummary> {
    let started = Instant::now();
    let run_id = RunId::new();
    let mut report = RunReport::default();

    info!(%run_id, "starting pipeline run");

    // Pre-flight: a broken identifier table or row shape should fail before
    // any login happens.
    progress.phase("Loading identifier table");
    let identifiers = IdentifierTable::from_csv_path(&config.identifier_csv)?;
    let shape = RowShape::from_names(&config.source_columns)?;

    // --- Source site ---
    progress.phase("Authenticating to source site");
    let mut source_driver = factory.create().await?;
    let extraction = source_stage(&mut source_driver, config, &shape, &mut report, progress).await;
    close_quietly(&mut source_driver).await;

    let players = match extraction {
        Ok(players) => players,
        Err(e) => {
            warn!(report = ?report, error = %e, "pipeline aborted during source stage");
            return Err(e);
        }
    };

    // --- Normalize + materialize ---
    progress.phase("Normalizing records");
    let normalized = normalize(&players, &identifiers);
    if !normalized.unresolved.is_empty() {
        warn!(
            unresolved = normalized.unresolved.len(),
            "some players have no destination identifier"
        );
    }

    write_rankings_csv(&config.output_path, &normalized.records)?;
    info!(
        path = %config.output_path.display(),
        rows = normalized.records.len(),
        "destination CSV written"
    );

    // --- Archive (best-effort) ---
    progress.phase("Archiving datasets");
    let archived = archive_datasets(config, &run_id, &players, &normalized.records).await;

    // --- Destination site ---
    progress.phase("Authenticating to destination site");
    let mut destination_driver = factory.create().await?;
    let upload_result = destination_stage(
        &mut destination_driver,
        config,
        &config.output_path,
        &mut report,
        progress,
    )
    .await;
    close_quietly(&mut destination_driver).await;

    if let Err(e) = upload_result {
        warn!(report = ?report, error = %e, "pipeline aborted during destination stage");
        return Err(e);
    }

    let summary = RunSummary {
        run_id,
        records_extracted: players.len(),
        unresolved: normalized.unresolved.len(),
        csv_path: config.output_path.clone(),
        report,
        archived,
        elapsed: started.elapsed(),
    };

    info!(
        run_id = %summary.run_id,
        records = summary.records_extracted,
        unresolved = summary.unresolved,
        archived = summary.archived,
        elapsed_ms = summary.elapsed.as_millis() as u64,
        "pipeline run complete"
    );

    Ok(summary)
}

// ---------------------------------------------------------------------------
// Partial runs
// ---------------------------------------------------------------------------

/// Scrape and normalize only: source login → extract → CSV (+ archive).
/// No destination interaction.
#[instrument(skip_all)]
pub async fn fetch_rankings<F: DriverFactory>(
    config: &PipelineConfig,
    factory: &F,
    progress: &dyn ProgressReporter,
) -> Result<RunSummary> {
    let started = Instant::now();
    let run_id = RunId::new();
    let mut report = RunReport::default();

    progress.phase("Loading identifier table");
    let identifiers = IdentifierTable::from_csv_path(&config.identifier_csv)?;
    let shape = RowShape::from_names(&config.source_columns)?;

    progress.phase("Authenticating to source site");
    let mut driver = factory.create().await?;
    let extraction = source_stage(&mut driver, config, &shape, &mut report, progress).await;
    close_quietly(&mut driver).await;

    let players = match extraction {
        Ok(players) => players,
        Err(e) => {
            warn!(report = ?report, error = %e, "fetch aborted");
            return Err(e);
        }
    };

    progress.phase("Normalizing records");
    let normalized = normalize(&players, &identifiers);
    write_rankings_csv(&config.output_path, &normalized.records)?;

    progress.phase("Archiving datasets");
    let archived = archive_datasets(config, &run_id, &players, &normalized.records).await;

    info!(rows = players.len(), path = %config.output_path.display(), "rankings fetched");

    Ok(RunSummary {
        run_id,
        records_extracted: players.len(),
        unresolved: normalized.unresolved.len(),
        csv_path: config.output_path.clone(),
        report,
        archived,
        elapsed: started.elapsed(),
    })
}

/// Upload an existing destination-shaped CSV: destination login → upload →
/// save. The file is parsed first so a malformed file fails before any
/// browser work.
#[instrument(skip_all, fields(file = %csv_path.display()))]
pub async fn upload_existing<F: DriverFactory>(
    config: &PipelineConfig,
    factory: &F,
    csv_path: &Path,
    progress: &dyn ProgressReporter,
) -> Result<RunSummary> {
    let started = Instant::now();
    let run_id = RunId::new();
    let mut report = RunReport::default();

    let records = read_rankings_csv(csv_path)?;

    progress.phase("Authenticating to destination site");
    let mut driver = factory.create().await?;
    let upload_result =
        destination_stage(&mut driver, config, csv_path, &mut report, progress).await;
    close_quietly(&mut driver).await;

    if let Err(e) = upload_result {
        warn!(report = ?report, error = %e, "upload aborted");
        return Err(e);
    }

    Ok(RunSummary {
        run_id,
        records_extracted: records.len(),
        unresolved: records.iter().filter(|r| r.id.is_none()).count(),
        csv_path: csv_path.to_path_buf(),
        report,
        archived: false,
        elapsed: started.elapsed(),
    })
}

// ---------------------------------------------------------------------------
// Stages
// ---------------------------------------------------------------------------

async fn source_stage<D: PageDriver>(
    driver: &mut D,
    config: &PipelineConfig,
    shape: &RowShape,
    report: &mut RunReport,
    progress: &dyn ProgressReporter,
) -> Result<Vec<PlayerRecord>> {
    report.source_login = ConfirmationEvent::Submitted;
    let mut session =
        match authenticate(driver, &config.source_site, &config.source_credentials).await {
            Ok(session) => session,
            Err(e) => {
                report.source_login = failure_event(&e);
                return Err(e);
            }
        };
    report.source_login = ConfirmationEvent::ConfirmedSuccess;

    progress.phase("Extracting ranking table");
    report.extraction = ConfirmationEvent::Submitted;
    match extract(
        session.driver_mut(),
        &config.rankings_url,
        &config.table_selector,
        shape,
        config.wait_timeout,
    )
    .await
    {
        Ok(records) => {
            report.extraction = ConfirmationEvent::ConfirmedSuccess;
            Ok(records)
        }
        Err(e) => {
            report.extraction = failure_event(&e);
            Err(e)
        }
    }
}

async fn destination_stage<D: PageDriver>(
    driver: &mut D,
    config: &PipelineConfig,
    file_path: &Path,
    report: &mut RunReport,
    progress: &dyn ProgressReporter,
) -> Result<()> {
    report.destination_login = ConfirmationEvent::Submitted;
    let mut session = match authenticate(
        driver,
        &config.destination_site,
        &config.destination_credentials,
    )
    .await
    {
        Ok(session) => session,
        Err(e) => {
            report.destination_login = failure_event(&e);
            return Err(e);
        }
    };
    report.destination_login = ConfirmationEvent::ConfirmedSuccess;

    progress.phase("Uploading rankings");
    upload_and_save(&mut session, &config.upload, file_path, report).await
}

/// Best-effort: failures are logged and the run continues.
async fn archive_datasets(
    config: &PipelineConfig,
    run_id: &RunId,
    players: &[PlayerRecord],
    records: &[NormalizedRecord],
) -> bool {
    let Some(target) = config.archive.clone() else {
        return false;
    };

    let result = async {
        let archive = Archive::new(target)?;
        let raw = raw_csv_string(players)?;
        archive.store_raw_dataset(run_id, &raw).await?;
        archive.store_processed_rankings(run_id, records).await
    }
    .await;

    match result {
        Ok(()) => {
            info!("raw and processed datasets archived");
            true
        }
        Err(e) => {
            warn!(error = %e, "archiving failed, continuing without it");
            false
        }
    }
}

/// Map a stage error to the terminal confirmation state for the ledger.
fn failure_event(err: &PipelineError) -> ConfirmationEvent {
    match err {
        PipelineError::Auth(AuthError::Timeout { .. })
        | PipelineError::Extract(ExtractError::Timeout { .. }) => ConfirmationEvent::TimedOut,
        _ => ConfirmationEvent::ConfirmedFailure,
    }
}

async fn close_quietly<D: PageDriver>(driver: &mut D) {
    if let Err(e) = driver.close().await {
        warn!(error = %e, "failed to close browser session");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rankpipe_driver::scripted::{ScriptedDriver, ScriptedFactory, ScriptedPage};
    use rankpipe_shared::{Credentials, SiteConfig, UploadConfig, UploadError};

    const SRC_LOGIN: &str = "https://rankings.test/wp-login.php";
    const SRC_ADMIN: &str = "https://rankings.test/wp-admin/";
    const SRC_RANKINGS: &str = "https://rankings.test/top-300/";
    const SRC_TABLE: &str = "table.rankings";

    const DST_LOGIN: &str = "https://draft.test/login";
    const DST_LOBBY: &str = "https://draft.test/lobby";
    const DST_RANKINGS: &str = "https://draft.test/rankings/nfl";
    const UPLOAD_BANNER: &str = "CSV uploaded successfully";
    const SAVE_BANNER: &str = "rankings have been saved";

    fn test_config(dir: &Path) -> PipelineConfig {
        PipelineConfig {
            source_site: SiteConfig {
                login_url: SRC_LOGIN.into(),
                username_selector: "#user".into(),
                password_selector: "#pass".into(),
                submit_selector: "#submit".into(),
                error_selector: ".login .message".into(),
                login_url_marker: "wp-login.php".into(),
                landing_url_prefixes: vec!["https://rankings.test/".into()],
                protected_probe_url: SRC_ADMIN.into(),
                timeout: Duration::from_millis(200),
            },
            source_credentials: Credentials::new("scraper", "pw"),
            rankings_url: SRC_RANKINGS.into(),
            table_selector: SRC_TABLE.into(),
            source_columns: [
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
            .to_vec(),
            destination_site: SiteConfig {
                login_url: DST_LOGIN.into(),
                username_selector: "#user".into(),
                password_selector: "#pass".into(),
                submit_selector: "#submit".into(),
                error_selector: ".error".into(),
                login_url_marker: "draft.test/login".into(),
                landing_url_prefixes: vec!["https://draft.test/".into()],
                protected_probe_url: DST_RANKINGS.into(),
                timeout: Duration::from_millis(200),
            },
            destination_credentials: Credentials::new("drafter", "pw"),
            upload: UploadConfig {
                rankings_url: DST_RANKINGS.into(),
                open_dialog_selector: "#csv-menu".into(),
                upload_menu_text: "UPLOAD CSV".into(),
                file_input_selector: "input[type=file]".into(),
                upload_submit_text: "Upload".into(),
                upload_banner_text: UPLOAD_BANNER.into(),
                upload_error_text: None,
                save_text: "SAVE RANKINGS".into(),
                save_banner_text: SAVE_BANNER.into(),
                timeout: Duration::from_millis(60),
            },
            identifier_csv: dir.join("identifiers.csv"),
            output_path: dir.join("rankings.csv"),
            wait_timeout: Duration::from_millis(60),
            webdriver_url: "http://localhost:4444".into(),
            headless: true,
            archive: None,
        }
    }

    fn temp_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "rankpipe-pipeline-{tag}-{}",
            std::process::id()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("identifiers.csv"),
            "ID,Name,Position\n123,Ja'Marr Chase,WR\n456,Bijan Robinson,RB\n",
        )
        .unwrap();
        dir
    }

    fn source_driver() -> ScriptedDriver {
        ScriptedDriver::new()
            .with_page(SRC_LOGIN, ScriptedPage::new().on_click("#submit", SRC_ADMIN))
            .with_page(SRC_ADMIN, ScriptedPage::new())
            .with_page(
                SRC_RANKINGS,
                ScriptedPage::new().table(
                    SRC_TABLE,
                    vec![
                        vec!["Ja'Marr Chase", "CIN", "WR", "1", "1", "1.2", "1", "-0.2"],
                        vec!["Bijan Robinson", "ATL", "RB", "2", "1", "2.8", "1", "-0.8"],
                    ],
                ),
            )
    }

    fn destination_driver() -> ScriptedDriver {
        ScriptedDriver::new()
            .with_page(DST_LOGIN, ScriptedPage::new().on_click("#submit", DST_LOBBY))
            .with_page(DST_LOBBY, ScriptedPage::new())
            .with_page(
                DST_RANKINGS,
                ScriptedPage::new().on_click("Upload", "uploaded"),
            )
            .with_page(
                "uploaded",
                ScriptedPage::new()
                    .url(DST_RANKINGS)
                    .source(UPLOAD_BANNER)
                    .on_click("SAVE RANKINGS", "saved"),
            )
            .with_page(
                "saved",
                ScriptedPage::new().url(DST_RANKINGS).source(SAVE_BANNER),
            )
    }

    #[tokio::test]
    async fn full_run_confirms_every_stage() {
        let dir = temp_dir("full");
        let config = test_config(&dir);
        let factory = ScriptedFactory::new(vec![source_driver(), destination_driver()]);

        let summary = run_pipeline(&config, &factory, &SilentProgress)
            .await
            .expect("pipeline run succeeds");

        assert_eq!(summary.records_extracted, 2);
        assert_eq!(summary.unresolved, 0);
        assert_eq!(summary.report.source_login, ConfirmationEvent::ConfirmedSuccess);
        assert_eq!(summary.report.extraction, ConfirmationEvent::ConfirmedSuccess);
        assert_eq!(
            summary.report.destination_login,
            ConfirmationEvent::ConfirmedSuccess
        );
        assert_eq!(summary.report.upload, ConfirmationEvent::ConfirmedSuccess);
        assert_eq!(summary.report.save, ConfirmationEvent::ConfirmedSuccess);
        assert!(!summary.archived);

        let written = std::fs::read_to_string(&summary.csv_path).unwrap();
        assert!(written.starts_with("ID,Name,Position,ADP,Team"));
        assert!(written.contains("123,Ja'Marr Chase,WR"));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn upload_timeout_aborts_the_run() {
        let dir = temp_dir("upload-timeout");
        let config = test_config(&dir);

        // Destination accepts the file but never shows the banner.
        let destination = ScriptedDriver::new()
            .with_page(DST_LOGIN, ScriptedPage::new().on_click("#submit", DST_LOBBY))
            .with_page(DST_LOBBY, ScriptedPage::new())
            .with_page(
                DST_RANKINGS,
                ScriptedPage::new().on_click("Upload", "pending"),
            )
            .with_page(
                "pending",
                ScriptedPage::new().url(DST_RANKINGS).source("<html>spinner</html>"),
            );

        let factory = ScriptedFactory::new(vec![source_driver(), destination]);
        let err = run_pipeline(&config, &factory, &SilentProgress)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            PipelineError::Upload(UploadError::UploadNotConfirmed { .. })
        ));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn empty_credentials_fail_before_the_source_site_is_touched() {
        let dir = temp_dir("no-creds");
        let mut config = test_config(&dir);
        config.source_credentials = Credentials::new("", "");

        let factory = ScriptedFactory::new(vec![source_driver()]);
        let err = run_pipeline(&config, &factory, &SilentProgress)
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::Config { .. }));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn malformed_table_stops_before_destination_login() {
        let dir = temp_dir("malformed");
        let config = test_config(&dir);

        let source = ScriptedDriver::new()
            .with_page(SRC_LOGIN, ScriptedPage::new().on_click("#submit", SRC_ADMIN))
            .with_page(SRC_ADMIN, ScriptedPage::new())
            .with_page(
                SRC_RANKINGS,
                ScriptedPage::new().table(
                    SRC_TABLE,
                    vec![
                        vec!["Ja'Marr Chase", "CIN", "WR", "1", "1", "1.2", "1", "-0.2"],
                        vec!["Bijan Robinson", "ATL"],
                    ],
                ),
            );

        // Only one driver: the destination must never be asked for.
        let factory = ScriptedFactory::new(vec![source]);
        let err = run_pipeline(&config, &factory, &SilentProgress)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            PipelineError::Extract(ExtractError::MalformedTable { .. })
        ));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn fetch_only_skips_the_destination() {
        let dir = temp_dir("fetch");
        let config = test_config(&dir);
        let factory = ScriptedFactory::new(vec![source_driver()]);

        let summary = fetch_rankings(&config, &factory, &SilentProgress)
            .await
            .expect("fetch succeeds");

        assert_eq!(summary.records_extracted, 2);
        assert_eq!(summary.report.upload, ConfirmationEvent::NotStarted);
        assert!(summary.csv_path.exists());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn upload_existing_drives_only_the_destination() {
        let dir = temp_dir("upload-existing");
        let config = test_config(&dir);

        std::fs::write(
            dir.join("rankings.csv"),
            "ID,Name,Position,ADP,Team,ETR Rank,ETR Pos Rank,ADP Pos Rank,ADP Diff\n\
             123,Ja'Marr Chase,WR,1.2,CIN,1,1,1,-0.2\n\
             ,Practice Squad Guy,TE,,FA,300,42,,\n",
        )
        .unwrap();

        let factory = ScriptedFactory::new(vec![destination_driver()]);
        let summary = upload_existing(
            &config,
            &factory,
            &dir.join("rankings.csv"),
            &SilentProgress,
        )
        .await
        .expect("upload succeeds");

        assert_eq!(summary.records_extracted, 2);
        assert_eq!(summary.unresolved, 1);
        assert_eq!(summary.report.save, ConfirmationEvent::ConfirmedSuccess);
        assert_eq!(summary.report.source_login, ConfirmationEvent::NotStarted);

        let _ = std::fs::remove_dir_all(&dir);
    }
}
