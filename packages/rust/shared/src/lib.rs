//! Shared types, error model, and configuration for rankpipe.
//!
//! This crate is the foundation depended on by all other rankpipe crates.
//! It provides:
//! - [`PipelineError`] — the unified error type, with per-stage taxonomies
//! - Domain types ([`PlayerRecord`], [`NormalizedRecord`], [`RunReport`], [`RunId`])
//! - Configuration ([`AppConfig`], [`PipelineConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, ArchiveConfig, ArchiveTarget, Credentials, DefaultsConfig, DestinationConfig,
    PipelineConfig, SiteConfig, SourceConfig, UploadConfig, config_dir, config_file_path,
    init_config, load_config, load_config_from, resolve_env_credentials,
};
pub use error::{AuthError, ExtractError, PipelineError, Result, UploadError};
pub use types::{
    ConfirmationEvent, DiagnosticSnapshot, MARKUP_EXCERPT_BUDGET, NormalizedRecord, PlayerRecord,
    RunId, RunReport,
};
