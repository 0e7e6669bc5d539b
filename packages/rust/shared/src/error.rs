//! Error types for rankpipe.
//!
//! Library crates use [`PipelineError`] via `thiserror`.
//! App crates (cli) wrap this with `color-eyre` for rich diagnostics.
//!
//! Every pipeline stage has its own taxonomy ([`AuthError`], [`ExtractError`],
//! [`UploadError`]); callers inspect the classified kind rather than pattern-
//! matching message strings, because "the site changed its markup",
//! "credentials are wrong" and "network/timeout" need different operator
//! responses.

use std::path::PathBuf;

use crate::types::DiagnosticSnapshot;

/// Top-level error type for all rankpipe operations.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Configuration loading or validation error (fatal, pre-flight).
    #[error("config error: {message}")]
    Config { message: String },

    /// Authentication failure at one of the two site boundaries.
    #[error("auth error: {0}")]
    Auth(#[from] AuthError),

    /// Table extraction failure on the source site.
    #[error("extract error: {0}")]
    Extract(#[from] ExtractError),

    /// Upload or save confirmation failure on the destination site.
    #[error("upload error: {0}")]
    Upload(#[from] UploadError),

    /// Browser driver command failure (WebDriver transport, missing element).
    #[error("driver error: {0}")]
    Driver(String),

    /// Archive (remote dataset store) error.
    #[error("archive error: {0}")]
    Archive(String),

    /// CSV read/write error.
    #[error("csv error: {0}")]
    Csv(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, PipelineError>;

impl PipelineError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a driver error from any displayable message.
    pub fn driver(msg: impl Into<String>) -> Self {
        Self::Driver(msg.into())
    }

    /// Create an archive error from any displayable message.
    pub fn archive(msg: impl Into<String>) -> Self {
        Self::Archive(msg.into())
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

// ---------------------------------------------------------------------------
// AuthError
// ---------------------------------------------------------------------------

/// Classified login failure. Only `UnexpectedRedirect` is retryable, and only
/// once; everything else is surfaced as-is.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The site showed an inline error identifying the credentials as wrong.
    #[error("invalid credentials: {message}")]
    InvalidCredentials { message: String },

    /// Submission bounced back to the login page with no error banner.
    #[error("unexpected redirect after login submission: {url}")]
    UnexpectedRedirect { url: String },

    /// Login appeared to succeed but a protected resource redirected back to
    /// the login page — the session cookie did not stick.
    #[error("login succeeded but the session did not persist")]
    SessionNotPersisted,

    /// No conclusive signal within the bounded wait.
    #[error("login timed out at {}", snapshot.url)]
    Timeout { snapshot: DiagnosticSnapshot },
}

// ---------------------------------------------------------------------------
// ExtractError
// ---------------------------------------------------------------------------

/// Classified extraction failure. Partial ranking data is unsafe to publish
/// downstream, so both variants abort the whole extraction.
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    /// A row had fewer cells than the shape expects, or the rank column is
    /// not strictly increasing.
    #[error("malformed table: {message}")]
    MalformedTable { message: String },

    /// The table never appeared within the bounded wait.
    #[error("timed out waiting for table {selector:?}")]
    Timeout { selector: String },
}

// ---------------------------------------------------------------------------
// UploadError
// ---------------------------------------------------------------------------

/// Classified destination-side confirmation failure. Success is only ever
/// evidenced by the confirmation banner; its absence is a failure.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    /// The upload success banner never appeared within the bounded wait.
    #[error("upload was not confirmed at {}", snapshot.url)]
    UploadNotConfirmed { snapshot: DiagnosticSnapshot },

    /// The save confirmation banner never appeared within the bounded wait.
    #[error("save was not confirmed at {}", snapshot.url)]
    SaveNotConfirmed { snapshot: DiagnosticSnapshot },
}
