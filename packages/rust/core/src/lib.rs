//! Pipeline orchestration for rankpipe.
//!
//! Wires the stages together in their fixed order — source login → extract →
//! normalize → destination login → upload → save — with guaranteed browser
//! teardown on every exit path.

pub mod pipeline;

pub use pipeline::{
    ProgressReporter, RunSummary, SilentProgress, fetch_rankings, run_pipeline, upload_existing,
};
