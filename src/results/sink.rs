//! JSON result document and the in-memory cache of the latest run.

use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::finder::Candidate;

/// Errors while writing or reading the result document.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("Failed to write results: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to encode results: {0}")]
    Json(#[from] serde_json::Error),
}

/// Everything a run produced, as written to disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultDocument {
    /// UTC timestamp identifying the run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,

    pub found_candidates: Vec<Candidate>,

    pub good_groups: Vec<Candidate>,
}

impl ResultDocument {
    /// Builds the document for a run, deriving the good groups from the
    /// candidate set.
    #[must_use]
    pub fn new(run_id: String, keywords: Vec<String>, candidates: Vec<Candidate>) -> Self {
        let good_groups = candidates.iter().filter(|c| c.is_clean()).cloned().collect();
        Self {
            run_id: Some(run_id),
            keywords,
            found_candidates: candidates,
            good_groups,
        }
    }

    /// Reads a document written by [`ResultSink::persist`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SinkError> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

/// Returns a fresh run identifier.
#[must_use]
pub fn new_run_id() -> String {
    Utc::now().format("%Y%m%dT%H%M%SZ").to_string()
}

/// Writes result documents and remembers the latest good groups.
///
/// Only the pipeline writes, once per run; any number of readers may call
/// [`ResultSink::latest`].
#[derive(Debug)]
pub struct ResultSink {
    path: PathBuf,
    latest: RwLock<Vec<Candidate>>,
}

impl ResultSink {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            latest: RwLock::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes `document` in one piece and publishes its good groups.
    ///
    /// The file is written to a sibling temp file and renamed over the
    /// target, so readers never see a half-written document.
    pub async fn persist(&self, document: &ResultDocument) -> Result<(), SinkError> {
        let json = serde_json::to_string_pretty(document)?;

        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        debug!("Renamed {} to {}", tmp.display(), self.path.display());

        *self.latest.write().await = document.good_groups.clone();

        info!(
            "Saved {} candidates ({} good) to {}",
            document.found_candidates.len(),
            document.good_groups.len(),
            self.path.display()
        );
        Ok(())
    }

    /// Good groups of the last completed run, empty before the first one.
    pub async fn latest(&self) -> Vec<Candidate> {
        self.latest.read().await.clone()
    }
}
