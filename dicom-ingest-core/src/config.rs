use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Tuning knobs for ingest and commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Global cap on simultaneous file transfers, across all series.
    pub transfer_concurrency: usize,
    /// Files read and parsed at once during ingest.
    pub read_concurrency: usize,
    /// Minimum gap between two progress callbacks for the same series while
    /// files are being merged.
    pub progress_debounce_ms: u64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            transfer_concurrency: 3,
            read_concurrency: 8,
            progress_debounce_ms: 250,
        }
    }
}

impl IngestConfig {
    pub fn progress_debounce(&self) -> Duration {
        Duration::from_millis(self.progress_debounce_ms)
    }

    pub fn trace_loaded(&self) {
        info!(
            transfer_concurrency = self.transfer_concurrency,
            read_concurrency = self.read_concurrency,
            progress_debounce_ms = self.progress_debounce_ms,
            "Loaded IngestConfig"
        );
        debug!(?self, "IngestConfig loaded (full debug)");
    }
}
