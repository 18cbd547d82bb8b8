//! # commit: three-phase upload of every included series
//!
//! ```text
//! start (one per included series, all settled first)
//!   → transfer (one global queue, at most N in flight, redact right before send)
//!   → end (one per started series, once all its transfers settled)
//! ```
//!
//! The transfer queue ignores series boundaries: files of every started
//! series are flattened into one lazy stream and `buffer_unordered` only
//! pulls the next file when a slot frees. End calls run alongside the
//! remaining transfers so a finished series does not wait for the others.
//!
//! Failures are terminal for the unit that hit them: a failed start skips
//! the series, a failed transfer marks one file, a failed end marks the
//! series but keeps the per-file results. Nothing is retried.
//!
//! Everything runs inside the caller's task. Dropping the commit future
//! abandons in-flight calls.

use std::collections::BTreeMap;

use futures::future::join_all;
use futures::stream::{self, FuturesUnordered, StreamExt};
use serde::Serialize;
use tracing::{debug, error, info};

use crate::contract::{
    transfer_names, NewSeriesUpload, SeriesSummary, SeriesUploader, SessionToken,
};
use crate::error::TransferError;
use crate::ingest::IngestOrchestrator;
use crate::record::{FileRecord, FileStatus, SeriesProgress, SeriesRecord, SeriesStatus};
use crate::redact;
use crate::series::SeriesKey;

/// Counters for one open upload session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadSession {
    pub series_key: SeriesKey,
    pub session_token: SessionToken,
    pub files_uploaded: usize,
    pub files_failed: usize,
    pub files_total: usize,
}

impl UploadSession {
    fn settled(&self) -> usize {
        self.files_uploaded + self.files_failed
    }

    fn summary(&self) -> SeriesSummary {
        SeriesSummary {
            series_key: self.series_key.clone(),
            files_uploaded: self.files_uploaded,
            files_failed: self.files_failed,
            files_total: self.files_total,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileReport {
    pub name: String,
    pub status: FileStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SeriesReport {
    pub key: SeriesKey,
    pub status: SeriesStatus,
    pub session_token: Option<SessionToken>,
    pub files: Vec<FileReport>,
}

impl SeriesReport {
    fn from_record(record: SeriesRecord, session_token: Option<SessionToken>) -> Self {
        Self {
            key: record.key,
            status: record.status,
            session_token,
            files: record
                .members
                .into_iter()
                .map(|f| FileReport {
                    name: f.name,
                    status: f.status,
                })
                .collect(),
        }
    }

    pub fn uploaded(&self) -> usize {
        self.files
            .iter()
            .filter(|f| f.status == FileStatus::Uploaded)
            .count()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CommitReport {
    pub series: Vec<SeriesReport>,
}

impl CommitReport {
    pub fn get(&self, key: &SeriesKey) -> Option<&SeriesReport> {
        self.series.iter().find(|s| &s.key == key)
    }
}

struct TransferTask {
    key: SeriesKey,
    token: SessionToken,
    index: usize,
    upload_name: String,
    file: FileRecord,
}

fn start_request(record: &SeriesRecord) -> NewSeriesUpload {
    let first = record.first().map(|f| &f.metadata);
    NewSeriesUpload {
        series_key: record.key.clone(),
        study_instance_uid: first.map(|m| m.study_instance_uid.clone()).unwrap_or_default(),
        series_instance_uid: first.map(|m| m.series_instance_uid.clone()).unwrap_or_default(),
        series_number: first.and_then(|m| m.series_number),
        series_description: first.and_then(|m| m.series_description.clone()),
        modality: first.and_then(|m| m.modality.clone()),
        manufacturer: first.and_then(|m| m.manufacturer.clone()),
        files_total: record.members.len(),
        size_bytes: record.accumulated_size,
        expected_count: record.expected_count,
        images_per_file: record.images_per_file,
    }
}

async fn transfer_one<U>(uploader: &U, mut task: TransferTask) -> TransferTask
where
    U: SeriesUploader + ?Sized,
{
    redact::redact(&mut task.file.content, &task.file.dataset);
    let result = uploader
        .transfer_file(
            &task.token,
            &task.upload_name,
            &task.file.content,
        )
        .await;
    task.file.status = match result {
        Ok(()) => {
            debug!(file = %task.file.name, key = %task.key, "[COMMIT] Transfer succeeded");
            FileStatus::Uploaded
        }
        Err(e) => {
            error!(file = %task.file.name, key = %task.key, error = %e, "[COMMIT] Transfer failed");
            FileStatus::Failed(e.to_string())
        }
    };
    task
}

async fn end_one<U>(
    uploader: &U,
    token: SessionToken,
    summary: SeriesSummary,
) -> (SeriesKey, Result<(), TransferError>)
where
    U: SeriesUploader + ?Sized,
{
    let key = summary.series_key.clone();
    let result = uploader.end_series(&token, summary).await;
    (key, result)
}

impl IngestOrchestrator {
    /// Uploads every included series and clears the batch.
    pub async fn commit<U>(&mut self, uploader: &U) -> CommitReport
    where
        U: SeriesUploader + ?Sized,
    {
        let batch = std::mem::take(&mut self.series);
        let observer = self.observer.clone();
        info!(series = batch.len(), "[COMMIT] Starting commit");

        let mut report = CommitReport::default();
        let mut included = Vec::new();
        for (key, mut record) in batch {
            if record.included {
                included.push(record);
            } else {
                info!(key = %key, "[COMMIT] Series excluded");
                record.status = SeriesStatus::Excluded;
                observer.on_series_status(&key, &record.status);
                report.series.push(SeriesReport::from_record(record, None));
            }
        }

        // --- Phase 1: start ---
        let starts = join_all(
            included
                .iter()
                .map(|record| uploader.start_series(start_request(record))),
        )
        .await;

        let mut started: BTreeMap<SeriesKey, (SeriesRecord, UploadSession)> = BTreeMap::new();
        for (mut record, result) in included.into_iter().zip(starts) {
            match result {
                Ok(token) => {
                    info!(key = %record.key, token = %token.0, "[COMMIT] Series started");
                    record.status = SeriesStatus::Started;
                    observer.on_series_status(&record.key, &record.status);
                    let session = UploadSession {
                        series_key: record.key.clone(),
                        session_token: token,
                        files_uploaded: 0,
                        files_failed: 0,
                        files_total: record.members.len(),
                    };
                    started.insert(record.key.clone(), (record, session));
                }
                Err(e) => {
                    error!(key = %record.key, error = %e, "[COMMIT] Start failed");
                    record.status = SeriesStatus::Failed(format!("start failed: {e}"));
                    observer.on_series_status(&record.key, &record.status);
                    report.series.push(SeriesReport::from_record(record, None));
                }
            }
        }

        // --- Phase 2: one global transfer queue ---
        let mut queue = Vec::new();
        let mut settled: BTreeMap<SeriesKey, Vec<(usize, FileRecord)>> = BTreeMap::new();
        for (record, session) in started.values_mut() {
            let names = transfer_names(record.members.iter().map(|f| f.name.as_str()));
            let members = std::mem::take(&mut record.members);
            for (index, (file, upload_name)) in members.into_iter().zip(names).enumerate() {
                queue.push(TransferTask {
                    key: record.key.clone(),
                    token: session.session_token.clone(),
                    index,
                    upload_name,
                    file,
                });
            }
            settled.insert(record.key.clone(), Vec::new());
            record.status = SeriesStatus::Transferring;
            observer.on_series_status(&record.key, &record.status);
        }

        let limit = self.config.transfer_concurrency.max(1);
        info!(files = queue.len(), limit, "[COMMIT] Draining transfer queue");

        let transfers = stream::iter(queue)
            .map(|task| transfer_one(uploader, task))
            .buffer_unordered(limit);
        tokio::pin!(transfers);
        let mut endings = FuturesUnordered::new();

        // --- Phase 3: end each series as soon as its last transfer settles ---
        loop {
            tokio::select! {
                Some(done) = transfers.next() => {
                    let Some((record, session)) = started.get_mut(&done.key) else {
                        continue;
                    };
                    match done.file.status {
                        FileStatus::Uploaded => session.files_uploaded += 1,
                        _ => session.files_failed += 1,
                    }
                    observer.on_series_progress(
                        &done.key,
                        SeriesProgress {
                            uploaded: session.files_uploaded,
                            failed: session.files_failed,
                            total: session.files_total,
                            expected: record.expected_count,
                            size_bytes: record.accumulated_size,
                        },
                    );
                    if session.settled() == session.files_total {
                        info!(
                            key = %done.key,
                            uploaded = session.files_uploaded,
                            failed = session.files_failed,
                            "[COMMIT] All transfers settled, ending series"
                        );
                        endings.push(end_one(
                            uploader,
                            session.session_token.clone(),
                            session.summary(),
                        ));
                    }
                    if let Some(files) = settled.get_mut(&done.key) {
                        files.push((done.index, done.file));
                    }
                }
                Some((key, result)) = endings.next(), if !endings.is_empty() => {
                    let Some((record, _)) = started.get_mut(&key) else {
                        continue;
                    };
                    record.status = match result {
                        Ok(()) => {
                            info!(key = %key, "[COMMIT] Series ended");
                            SeriesStatus::Ended
                        }
                        Err(e) => {
                            error!(key = %key, error = %e, "[COMMIT] End failed");
                            SeriesStatus::Failed(format!("end failed: {e}"))
                        }
                    };
                    observer.on_series_status(&key, &record.status);
                }
                else => break,
            }
        }

        for (key, (mut record, session)) in started {
            let mut files = settled.remove(&key).unwrap_or_default();
            files.sort_by_key(|(index, _)| *index);
            record.members = files.into_iter().map(|(_, file)| file).collect();
            report
                .series
                .push(SeriesReport::from_record(record, Some(session.session_token)));
        }
        report.series.sort_by(|a, b| a.key.cmp(&b.key));

        self.forget_progress();
        info!(series = report.series.len(), "[COMMIT] Commit complete");
        match serde_json::to_string_pretty(&report) {
            Ok(json) => debug!(report = %json, "[COMMIT] Commit report"),
            Err(e) => debug!(error = %e, "[COMMIT] Could not serialise commit report"),
        }
        report
    }
}
