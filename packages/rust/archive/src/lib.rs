//! Best-effort archival of raw and processed datasets.
//!
//! Each run's raw CSV snapshot and processed ranking rows are inserted into a
//! PostgREST-style remote store (`POST {base}/rest/v1/{table}`). Archiving is
//! a collaborator, not a pipeline stage: the caller logs failures and moves
//! on rather than aborting the run.

use std::time::Duration;

use chrono::Utc;
use reqwest::Client;
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::{debug, instrument};

use rankpipe_shared::{ArchiveTarget, NormalizedRecord, PipelineError, Result, RunId};

/// User-Agent string for archive requests.
const USER_AGENT: &str = concat!("rankpipe/", env!("CARGO_PKG_VERSION"));

/// How much of an error response body is worth carrying in an error message.
const ERROR_BODY_BUDGET: usize = 300;

/// Client for the remote dataset store.
pub struct Archive {
    client: Client,
    target: ArchiveTarget,
}

impl Archive {
    /// Build a client against a resolved archive target.
    pub fn new(target: ArchiveTarget) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| PipelineError::archive(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client, target })
    }

    /// Store one run's raw CSV snapshot, tagged with its content hash.
    #[instrument(skip_all, fields(run_id = %run_id, table = %self.target.raw_table))]
    pub async fn store_raw_dataset(&self, run_id: &RunId, csv_text: &str) -> Result<()> {
        let rows = serde_json::json!([{
            "run_id": run_id.to_string(),
            "content_hash": compute_hash(csv_text),
            "data": csv_text,
            "archived_at": Utc::now().to_rfc3339(),
        }]);

        self.insert(&self.target.raw_table, &rows).await
    }

    /// Store one run's processed ranking rows.
    #[instrument(skip_all, fields(run_id = %run_id, table = %self.target.processed_table))]
    pub async fn store_processed_rankings(
        &self,
        run_id: &RunId,
        records: &[NormalizedRecord],
    ) -> Result<()> {
        let archived_at = Utc::now().to_rfc3339();
        let rows = records
            .iter()
            .map(|record| {
                let mut row = serde_json::to_value(record)
                    .map_err(|e| PipelineError::archive(e.to_string()))?;
                if let Some(object) = row.as_object_mut() {
                    object.insert("run_id".into(), Value::String(run_id.to_string()));
                    object.insert("archived_at".into(), Value::String(archived_at.clone()));
                }
                Ok(row)
            })
            .collect::<Result<Vec<Value>>>()?;

        self.insert(&self.target.processed_table, &Value::Array(rows))
            .await
    }

    async fn insert(&self, table: &str, rows: &Value) -> Result<()> {
        let url = format!(
            "{}/rest/v1/{table}",
            self.target.base_url.trim_end_matches('/')
        );

        let response = self
            .client
            .post(&url)
            .header("apikey", &self.target.api_key)
            .bearer_auth(&self.target.api_key)
            .header("Prefer", "return=minimal")
            .json(rows)
            .send()
            .await
            .map_err(|e| PipelineError::archive(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body: String = response
                .text()
                .await
                .unwrap_or_default()
                .chars()
                .take(ERROR_BODY_BUDGET)
                .collect();
            return Err(PipelineError::archive(format!(
                "{url}: HTTP {status}: {body}"
            )));
        }

        debug!(%url, "rows archived");
        Ok(())
    }
}

/// Compute SHA-256 hash of content.
fn compute_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}
