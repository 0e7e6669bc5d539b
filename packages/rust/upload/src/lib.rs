//! Upload confirmer: drive the destination site's upload workflow and treat
//! every confirmation as a distinct observable state transition.
//!
//! Two confirmable actions run strictly in sequence — "upload accepted", then
//! "rankings saved" — and each walks `NotStarted → Submitted → terminal`. The
//! save machine only starts once the upload machine reached
//! `ConfirmedSuccess`. Success is never assumed from the absence of an
//! error: the only accepted evidence is the site's confirmation banner.

use std::path::Path;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use rankpipe_driver::{PageDriver, capture_snapshot, poll_tick};
use rankpipe_session::AuthenticatedSession;
use rankpipe_shared::{ConfirmationEvent, Result, RunReport, UploadConfig, UploadError};

/// Outcome of one banner wait.
enum BannerOutcome {
    Success,
    Failure,
    TimedOut,
}

/// Upload the rankings file and save it, updating the run report's `upload`
/// and `save` slots at every state transition.
///
/// Neither stage retries; the first stage that fails to confirm aborts the
/// run with the last-observed UI state attached for diagnostics.
#[instrument(skip_all, fields(rankings_url = %config.rankings_url, file = %file_path.display()))]
pub async fn upload_and_save<D: PageDriver>(
    session: &mut AuthenticatedSession<'_, D>,
    config: &UploadConfig,
    file_path: &Path,
    report: &mut RunReport,
) -> Result<()> {
    let driver = session.driver_mut();

    // --- Upload stage ---
    driver.navigate(&config.rankings_url).await?;
    driver.click(&config.open_dialog_selector).await?;
    driver.click_text(&config.upload_menu_text).await?;
    driver
        .select_file(&config.file_input_selector, file_path)
        .await?;
    driver.click_text(&config.upload_submit_text).await?;
    transition(&mut report.upload, ConfirmationEvent::Submitted, "upload");

    match await_banner(
        driver,
        &config.upload_banner_text,
        config.upload_error_text.as_deref(),
        config.timeout,
    )
    .await?
    {
        BannerOutcome::Success => {
            transition(&mut report.upload, ConfirmationEvent::ConfirmedSuccess, "upload");
        }
        BannerOutcome::Failure => {
            transition(&mut report.upload, ConfirmationEvent::ConfirmedFailure, "upload");
            let snapshot = capture_snapshot(driver).await;
            warn!(url = %snapshot.url, "site reported the upload as failed");
            return Err(UploadError::UploadNotConfirmed { snapshot }.into());
        }
        BannerOutcome::TimedOut => {
            transition(&mut report.upload, ConfirmationEvent::TimedOut, "upload");
            let snapshot = capture_snapshot(driver).await;
            warn!(url = %snapshot.url, title = %snapshot.title, "upload banner never appeared");
            return Err(UploadError::UploadNotConfirmed { snapshot }.into());
        }
    }

    // --- Save stage (only reachable after a confirmed upload) ---
    driver.click_text(&config.save_text).await?;
    transition(&mut report.save, ConfirmationEvent::Submitted, "save");

    match await_banner(driver, &config.save_banner_text, None, config.timeout).await? {
        BannerOutcome::Success => {
            transition(&mut report.save, ConfirmationEvent::ConfirmedSuccess, "save");
        }
        BannerOutcome::Failure | BannerOutcome::TimedOut => {
            transition(&mut report.save, ConfirmationEvent::TimedOut, "save");
            let snapshot = capture_snapshot(driver).await;
            warn!(url = %snapshot.url, title = %snapshot.title, "save banner never appeared");
            return Err(UploadError::SaveNotConfirmed { snapshot }.into());
        }
    }

    info!("rankings uploaded and saved");
    Ok(())
}

/// Record one state transition, keeping the ledger observable in the logs.
fn transition(slot: &mut ConfirmationEvent, to: ConfirmationEvent, stage: &str) {
    debug!(stage, from = %slot, to = %to, "confirmation state transition");
    *slot = to;
}

/// Wait for the success banner, an optional explicit failure banner, or the
/// deadline — whichever comes first.
async fn await_banner<D: PageDriver>(
    driver: &mut D,
    success_text: &str,
    failure_text: Option<&str>,
    timeout: Duration,
) -> Result<BannerOutcome> {
    let deadline = Instant::now() + timeout;
    let tick = poll_tick(timeout);

    loop {
        if driver.has_text(success_text).await? {
            return Ok(BannerOutcome::Success);
        }
        if let Some(failure) = failure_text {
            if driver.has_text(failure).await? {
                return Ok(BannerOutcome::Failure);
            }
        }
        if Instant::now() >= deadline {
            return Ok(BannerOutcome::TimedOut);
        }
        tokio::time::sleep(tick).await;
    }
}
