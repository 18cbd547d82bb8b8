//! Observer that turns batch callbacks into log lines.

use dicom_ingest_core::contract::IngestObserver;
use dicom_ingest_core::error::IgnoreReason;
use dicom_ingest_core::record::{SeriesProgress, SeriesStatus};
use dicom_ingest_core::series::SeriesKey;
use tracing::{info, warn};

#[derive(Debug, Default)]
pub struct TracingObserver;

impl IngestObserver for TracingObserver {
    fn on_file_ignored(&self, file: &str, reason: &IgnoreReason) {
        warn!(file, reason = %reason, "Ignored");
    }

    fn on_series_progress(&self, key: &SeriesKey, progress: SeriesProgress) {
        info!(
            key = %key,
            uploaded = progress.uploaded,
            failed = progress.failed,
            total = progress.total,
            expected = ?progress.expected,
            size_bytes = progress.size_bytes,
            "Series progress"
        );
    }

    fn on_series_status(&self, key: &SeriesKey, status: &SeriesStatus) {
        info!(key = %key, status = ?status, "Series status");
    }

    fn on_discovery_complete(&self, files: usize) {
        info!(files, "Discovery complete");
    }
}
