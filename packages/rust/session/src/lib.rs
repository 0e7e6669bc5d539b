//! Session gate: authenticated login with multi-signal verification.
//!
//! A login outcome is never decided by a single check — the page may still be
//! navigating, the error banner may render late, and a "successful" redirect
//! can hide a rejected cookie. The gate evaluates an explicit ordered list of
//! signal checks until one is conclusive, then runs a stricter acceptance
//! check (a protected-resource probe) before handing out the session.

use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use rankpipe_driver::{PageDriver, capture_snapshot, poll_tick};
use rankpipe_shared::{AuthError, Credentials, PipelineError, Result, SiteConfig};

/// Inline error text identifying the credentials themselves as wrong.
static INVALID_CREDENTIAL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(incorrect|invalid|unknown\s+(username|email)|lost your password)")
        .expect("invalid-credential pattern compiles")
});

// ---------------------------------------------------------------------------
// AuthenticatedSession
// ---------------------------------------------------------------------------

/// An authenticated context scoped to one site.
///
/// Holds the driver for the duration of the authenticated work; any stage
/// that touches authenticated pages takes this handle rather than a bare
/// driver. Never persisted across runs.
#[derive(Debug)]
pub struct AuthenticatedSession<'a, D: PageDriver> {
    driver: &'a mut D,
    landing_url: String,
}

impl<'a, D: PageDriver> AuthenticatedSession<'a, D> {
    /// Wrap a driver that is already authenticated.
    ///
    /// The caller vouches for the session being live; the pipeline itself
    /// always goes through [`authenticate`].
    pub fn assume(driver: &'a mut D, landing_url: impl Into<String>) -> Self {
        Self {
            driver,
            landing_url: landing_url.into(),
        }
    }

    /// The driver, carrying the live session cookies.
    pub fn driver_mut(&mut self) -> &mut D {
        self.driver
    }

    /// URL the site landed on after login.
    pub fn landing_url(&self) -> &str {
        &self.landing_url
    }
}

// ---------------------------------------------------------------------------
// Signal checks
// ---------------------------------------------------------------------------

/// The ordered login-outcome signals, highest priority first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SignalCheck {
    /// An inline error matching the invalid-credentials pattern.
    InlineError,
    /// The URL still matches the login page after submission.
    StillOnLoginPage,
    /// The URL reached a known authenticated landing area.
    LandedAuthenticated,
}

const SIGNAL_ORDER: [SignalCheck; 3] = [
    SignalCheck::InlineError,
    SignalCheck::StillOnLoginPage,
    SignalCheck::LandedAuthenticated,
];

/// Outcome of evaluating one signal check.
enum Verdict {
    Conclusive(std::result::Result<(), AuthError>),
    Inconclusive,
}

// ---------------------------------------------------------------------------
// authenticate
// ---------------------------------------------------------------------------

/// Log in to a site and return the authenticated session handle.
///
/// Fails fast with a config error on empty credentials, before any network
/// action. `UnexpectedRedirect` (bounced to the login page with no error
/// banner) is retried exactly once; every other failure is surfaced as-is.
/// Credentials are never logged.
#[instrument(skip_all, fields(login_url = %site.login_url))]
pub async fn authenticate<'a, D: PageDriver>(
    driver: &'a mut D,
    site: &SiteConfig,
    credentials: &Credentials,
) -> Result<AuthenticatedSession<'a, D>> {
    if !credentials.is_complete() {
        return Err(PipelineError::config(
            "login credentials must be non-empty",
        ));
    }

    match attempt_login(driver, site, credentials).await {
        Ok(()) => {}
        Err(PipelineError::Auth(AuthError::UnexpectedRedirect { url })) => {
            warn!(%url, "login bounced back without an error banner, retrying once");
            attempt_login(driver, site, credentials).await?;
        }
        Err(e) => return Err(e),
    }

    verify_session_persisted(driver, site).await?;

    let landing_url = driver.current_url().await?;
    info!(%landing_url, "authenticated");

    Ok(AuthenticatedSession {
        driver,
        landing_url,
    })
}

/// One full login attempt: navigate, fill, submit, resolve the outcome.
async fn attempt_login<D: PageDriver>(
    driver: &mut D,
    site: &SiteConfig,
    credentials: &Credentials,
) -> Result<()> {
    driver.navigate(&site.login_url).await?;
    driver
        .fill(&site.username_selector, &credentials.username)
        .await?;
    driver
        .fill(&site.password_selector, &credentials.password)
        .await?;
    driver.click(&site.submit_selector).await?;

    resolve_outcome(driver, site).await
}

/// Evaluate the signal checks in priority order until one is conclusive, or
/// the bounded wait is exhausted.
async fn resolve_outcome<D: PageDriver>(driver: &mut D, site: &SiteConfig) -> Result<()> {
    let deadline = Instant::now() + site.timeout;
    // The form submission needs time to navigate before a login-page URL
    // counts as a bounce rather than an in-flight request.
    let bounce_deadline = Instant::now() + bounce_grace(site.timeout);
    let tick = poll_tick(site.timeout);

    loop {
        for check in SIGNAL_ORDER {
            match evaluate(check, driver, site, bounce_deadline).await? {
                Verdict::Conclusive(Ok(())) => return Ok(()),
                Verdict::Conclusive(Err(auth)) => return Err(auth.into()),
                Verdict::Inconclusive => {}
            }
        }

        if Instant::now() >= deadline {
            let snapshot = capture_snapshot(driver).await;
            warn!(
                url = %snapshot.url,
                title = %snapshot.title,
                "no conclusive login signal within the bounded wait"
            );
            return Err(AuthError::Timeout { snapshot }.into());
        }
        tokio::time::sleep(tick).await;
    }
}

async fn evaluate<D: PageDriver>(
    check: SignalCheck,
    driver: &mut D,
    site: &SiteConfig,
    bounce_deadline: Instant,
) -> Result<Verdict> {
    match check {
        SignalCheck::InlineError => {
            if let Some(text) = driver.element_text(&site.error_selector).await? {
                if INVALID_CREDENTIAL_PATTERN.is_match(&text) {
                    return Ok(Verdict::Conclusive(Err(AuthError::InvalidCredentials {
                        message: text,
                    })));
                }
            }
            Ok(Verdict::Inconclusive)
        }

        SignalCheck::StillOnLoginPage => {
            let url = driver.current_url().await?;
            if !url.contains(&site.login_url_marker) {
                return Ok(Verdict::Inconclusive);
            }

            match driver.element_text(&site.error_selector).await? {
                Some(text) if !text.is_empty() => {
                    Ok(Verdict::Conclusive(Err(AuthError::InvalidCredentials {
                        message: text,
                    })))
                }
                _ if Instant::now() >= bounce_deadline => {
                    Ok(Verdict::Conclusive(Err(AuthError::UnexpectedRedirect {
                        url,
                    })))
                }
                _ => Ok(Verdict::Inconclusive),
            }
        }

        SignalCheck::LandedAuthenticated => {
            let url = driver.current_url().await?;
            let landed = !url.contains(&site.login_url_marker)
                && site
                    .landing_url_prefixes
                    .iter()
                    .any(|prefix| url.starts_with(prefix));
            if landed {
                debug!(%url, "reached authenticated landing area");
                Ok(Verdict::Conclusive(Ok(())))
            } else {
                Ok(Verdict::Inconclusive)
            }
        }
    }
}

/// Visually succeeding is not enough: load a protected resource and make sure
/// it does not bounce back to the login page (a rejected session cookie
/// does exactly that). The destination's upload flow strictly requires a
/// durable session.
async fn verify_session_persisted<D: PageDriver>(driver: &mut D, site: &SiteConfig) -> Result<()> {
    driver.navigate(&site.protected_probe_url).await?;
    let url = driver.current_url().await?;

    if url.contains(&site.login_url_marker) {
        warn!(%url, "protected resource bounced back to the login page");
        return Err(AuthError::SessionNotPersisted.into());
    }

    debug!(probe = %site.protected_probe_url, "session persisted");
    Ok(())
}

fn bounce_grace(timeout: Duration) -> Duration {
    (timeout / 2).min(Duration::from_secs(10))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rankpipe_driver::scripted::{ScriptedDriver, ScriptedPage};

    const LOGIN: &str = "https://rankings.test/wp-login.php";
    const ADMIN: &str = "https://rankings.test/wp-admin/";

    fn site(timeout_ms: u64) -> SiteConfig {
        SiteConfig {
            login_url: LOGIN.into(),
            username_selector: r#"input[name="log"]"#.into(),
            password_selector: r#"input[name="pwd"]"#.into(),
            submit_selector: r#"input[name="wp-submit"]"#.into(),
            error_selector: ".login .message".into(),
            login_url_marker: "wp-login.php".into(),
            landing_url_prefixes: vec!["https://rankings.test/".into()],
            protected_probe_url: ADMIN.into(),
            timeout: Duration::from_millis(timeout_ms),
        }
    }

    fn creds() -> Credentials {
        Credentials::new("scraper@example.com", "pw")
    }

    #[tokio::test]
    async fn successful_login_returns_session() {
        let mut driver = ScriptedDriver::new()
            .with_page(
                LOGIN,
                ScriptedPage::new().on_click(r#"input[name="wp-submit"]"#, ADMIN),
            )
            .with_page(ADMIN, ScriptedPage::new().title("Dashboard"));

        let session = authenticate(&mut driver, &site(200), &creds())
            .await
            .expect("login succeeds");
        assert_eq!(session.landing_url(), ADMIN);
    }

    #[tokio::test]
    async fn empty_credentials_fail_before_any_network_action() {
        let mut driver = ScriptedDriver::new();
        let err = authenticate(&mut driver, &site(200), &Credentials::new("", ""))
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::Config { .. }));
        assert!(driver.navigations.is_empty());
    }

    #[tokio::test]
    async fn inline_error_is_invalid_credentials() {
        let mut driver = ScriptedDriver::new()
            .with_page(
                LOGIN,
                ScriptedPage::new().on_click(r#"input[name="wp-submit"]"#, "login-error"),
            )
            .with_page(
                "login-error",
                ScriptedPage::new().url(LOGIN).element(
                    ".login .message",
                    "Error: The password you entered for scraper@example.com is incorrect.",
                ),
            );

        let err = authenticate(&mut driver, &site(200), &creds())
            .await
            .unwrap_err();

        match err {
            PipelineError::Auth(AuthError::InvalidCredentials { message }) => {
                assert!(message.contains("incorrect"));
            }
            other => panic!("expected InvalidCredentials, got {other:?}"),
        }
        // Fatal: no second attempt.
        let submits = driver
            .clicks
            .iter()
            .filter(|c| c.contains("wp-submit"))
            .count();
        assert_eq!(submits, 1);
    }

    #[tokio::test]
    async fn login_scoped_error_text_is_surfaced() {
        // Error text that does not match the known pattern still counts when
        // the page stayed on the login URL.
        let mut driver = ScriptedDriver::new()
            .with_page(
                LOGIN,
                ScriptedPage::new().on_click(r#"input[name="wp-submit"]"#, "login-locked"),
            )
            .with_page(
                "login-locked",
                ScriptedPage::new()
                    .url(LOGIN)
                    .element(".login .message", "Too many attempts. Try again later."),
            );

        let err = authenticate(&mut driver, &site(200), &creds())
            .await
            .unwrap_err();

        match err {
            PipelineError::Auth(AuthError::InvalidCredentials { message }) => {
                assert!(message.contains("Too many attempts"));
            }
            other => panic!("expected InvalidCredentials, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn bounce_without_error_retries_once_then_surfaces() {
        let mut driver = ScriptedDriver::new()
            .with_page(
                LOGIN,
                ScriptedPage::new().on_click(r#"input[name="wp-submit"]"#, "bounced"),
            )
            .with_page("bounced", ScriptedPage::new().url(LOGIN));

        let err = authenticate(&mut driver, &site(60), &creds())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            PipelineError::Auth(AuthError::UnexpectedRedirect { .. })
        ));
        let submits = driver
            .clicks
            .iter()
            .filter(|c| c.contains("wp-submit"))
            .count();
        assert_eq!(submits, 2);
    }

    #[tokio::test]
    async fn unresolvable_outcome_times_out_with_snapshot() {
        let mut driver = ScriptedDriver::new()
            .with_page(
                LOGIN,
                ScriptedPage::new().on_click(r#"input[name="wp-submit"]"#, "limbo"),
            )
            .with_page(
                "limbo",
                ScriptedPage::new()
                    .url("https://cdn.rankings.test/challenge")
                    .title("Checking your browser")
                    .source("<html>interstitial</html>"),
            );

        let err = authenticate(&mut driver, &site(40), &creds())
            .await
            .unwrap_err();

        match err {
            PipelineError::Auth(AuthError::Timeout { snapshot }) => {
                assert_eq!(snapshot.url, "https://cdn.rankings.test/challenge");
                assert_eq!(snapshot.title, "Checking your browser");
            }
            other => panic!("expected Timeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn probe_bounce_downgrades_to_session_not_persisted() {
        let mut driver = ScriptedDriver::new()
            .with_page(
                LOGIN,
                ScriptedPage::new()
                    .on_click(r#"input[name="wp-submit"]"#, "https://rankings.test/welcome"),
            )
            .with_page("https://rankings.test/welcome", ScriptedPage::new())
            // The probe redirects straight back to the login page: the
            // session cookie did not stick.
            .with_page(ADMIN, ScriptedPage::new().redirect(LOGIN));

        let err = authenticate(&mut driver, &site(200), &creds())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            PipelineError::Auth(AuthError::SessionNotPersisted)
        ));
    }
}
