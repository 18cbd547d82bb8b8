//! # ingest: discovery, validation, parse and merge
//!
//! [`IngestOrchestrator`] holds the batch between the user's selection and
//! the commit. One [`IngestOrchestrator::ingest`] call:
//!
//! 1. traverses the selection with a fresh [`DiscoverySession`],
//! 2. reads the first 132 bytes of every file and rejects those without the
//!    `DICM` marker at offset 128,
//! 3. reads and decodes the rest, resolves the series key and merges the file
//!    into its [`SeriesRecord`],
//! 4. reports progress per series, at most once per debounce window, and
//!    flushes the final counts when the pass ends.
//!
//! Every per-file failure turns into an ignored entry; nothing aborts the
//! batch. The upload half lives in [`crate::commit`].

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::IngestConfig;
use crate::contract::{EnvelopeDecoder, Entry, FileSource, IngestObserver};
use crate::discover::DiscoverySession;
use crate::error::IgnoreReason;
use crate::record::{FileRecord, SeriesRecord, SeriesStatus};
use crate::series::SeriesKey;

/// Byte offset of the Part 10 magic marker.
pub const MAGIC_OFFSET: usize = 128;
pub const MAGIC: &[u8; 4] = b"DICM";

pub fn has_magic(prefix: &[u8]) -> bool {
    prefix.get(MAGIC_OFFSET..MAGIC_OFFSET + MAGIC.len()) == Some(MAGIC.as_slice())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IgnoredFile {
    pub name: String,
    #[serde(serialize_with = "reason_text")]
    pub reason: IgnoreReason,
}

fn reason_text<S: serde::Serializer>(reason: &IgnoreReason, s: S) -> Result<S::Ok, S::Error> {
    s.collect_str(reason)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestSummary {
    pub files_accepted: usize,
    pub files_ignored: usize,
    pub series: usize,
}

pub struct IngestOrchestrator {
    pub(crate) config: IngestConfig,
    source: Arc<dyn FileSource>,
    decoder: Arc<dyn EnvelopeDecoder>,
    pub(crate) observer: Arc<dyn IngestObserver>,
    pub(crate) series: BTreeMap<SeriesKey, SeriesRecord>,
    ignored: Vec<IgnoredFile>,
    last_progress: HashMap<SeriesKey, Instant>,
    unreported: HashSet<SeriesKey>,
}

impl IngestOrchestrator {
    pub fn new(
        config: IngestConfig,
        source: Arc<dyn FileSource>,
        decoder: Arc<dyn EnvelopeDecoder>,
        observer: Arc<dyn IngestObserver>,
    ) -> Self {
        Self {
            config,
            source,
            decoder,
            observer,
            series: BTreeMap::new(),
            ignored: Vec::new(),
            last_progress: HashMap::new(),
            unreported: HashSet::new(),
        }
    }

    pub fn series(&self) -> impl Iterator<Item = &SeriesRecord> {
        self.series.values()
    }

    pub fn series_record(&self, key: &SeriesKey) -> Option<&SeriesRecord> {
        self.series.get(key)
    }

    pub fn ignored(&self) -> &[IgnoredFile] {
        &self.ignored
    }

    /// Marks a series for upload or leaves it out of the next commit.
    /// Returns false for an unknown key.
    pub fn set_included(&mut self, key: &SeriesKey, included: bool) -> bool {
        match self.series.get_mut(key) {
            Some(record) => {
                record.included = included;
                true
            }
            None => false,
        }
    }

    /// Drops every series and ignored entry.
    pub fn reset(&mut self) {
        info!(series = self.series.len(), "[INGEST] Resetting batch");
        self.series.clear();
        self.ignored.clear();
        self.last_progress.clear();
        self.unreported.clear();
    }

    pub(crate) fn forget_progress(&mut self) {
        self.last_progress.clear();
        self.unreported.clear();
    }

    pub async fn ingest(&mut self, selection: Vec<Entry>) -> IngestSummary {
        info!(entries = selection.len(), "[INGEST] Starting ingest pass");

        let discovered = {
            let session = DiscoverySession::new(self.source.as_ref(), self.observer.as_ref());
            session.run(selection).await
        };
        let mut summary = IngestSummary::default();
        for (name, reason) in discovered.unlistable {
            self.ignore(name, reason);
            summary.files_ignored += 1;
        }

        let source = self.source.clone();
        let decoder = self.decoder.clone();
        let mut loaded = stream::iter(discovered.files)
            .map(|entry| {
                let source = source.clone();
                let decoder = decoder.clone();
                async move {
                    let name = entry.display_name();
                    let outcome = load_file(source.as_ref(), decoder.as_ref(), &entry).await;
                    (name, outcome)
                }
            })
            .buffer_unordered(self.config.read_concurrency.max(1));

        while let Some((name, outcome)) = loaded.next().await {
            match outcome {
                Ok(file) => {
                    self.merge(file);
                    summary.files_accepted += 1;
                }
                Err(reason) => {
                    self.ignore(name, reason);
                    summary.files_ignored += 1;
                }
            }
        }

        self.flush_progress();
        for record in self.series.values_mut() {
            if record.status == SeriesStatus::Discovered {
                record.status = SeriesStatus::Validated;
                self.observer.on_series_status(&record.key, &record.status);
            }
        }

        summary.series = self.series.len();
        info!(
            accepted = summary.files_accepted,
            ignored = summary.files_ignored,
            series = summary.series,
            "[INGEST] Ingest pass complete"
        );
        summary
    }

    fn merge(&mut self, file: FileRecord) {
        let key = file.key.clone();
        debug!(file = %file.name, key = %key, "[INGEST] Merging file");
        match self.series.get_mut(&key) {
            Some(record) => record.merge(file),
            None => {
                let record = SeriesRecord::new(file);
                info!(key = %key, "[INGEST] New series");
                self.observer.on_series_status(&key, &record.status);
                self.series.insert(key.clone(), record);
            }
        }
        self.report_progress(&key);
    }

    fn report_progress(&mut self, key: &SeriesKey) {
        let now = Instant::now();
        let due = self
            .last_progress
            .get(key)
            .map_or(true, |last| now.duration_since(*last) >= self.config.progress_debounce());
        if !due {
            self.unreported.insert(key.clone());
            return;
        }
        if let Some(record) = self.series.get(key) {
            self.observer.on_series_progress(key, record.progress());
        }
        self.last_progress.insert(key.clone(), now);
        self.unreported.remove(key);
    }

    fn flush_progress(&mut self) {
        let now = Instant::now();
        for key in std::mem::take(&mut self.unreported) {
            if let Some(record) = self.series.get(&key) {
                self.observer.on_series_progress(&key, record.progress());
                self.last_progress.insert(key, now);
            }
        }
    }

    fn ignore(&mut self, name: String, reason: IgnoreReason) {
        warn!(file = %name, reason = %reason, "[INGEST] Ignoring file");
        self.observer.on_file_ignored(&name, &reason);
        self.ignored.push(IgnoredFile { name, reason });
    }
}

async fn load_file(
    source: &dyn FileSource,
    decoder: &dyn EnvelopeDecoder,
    entry: &Entry,
) -> Result<FileRecord, IgnoreReason> {
    let prefix = source
        .read_prefix(entry, MAGIC_OFFSET + MAGIC.len())
        .await
        .map_err(|e| IgnoreReason::Unreadable(e.to_string()))?;
    if !has_magic(&prefix) {
        return Err(IgnoreReason::UnrecognizedFormat);
    }

    let content = source
        .read_file(entry)
        .await
        .map_err(|e| IgnoreReason::Unreadable(e.to_string()))?;
    let dataset = decoder.decode(&content)?;
    FileRecord::parse(entry.display_name(), content, dataset)
}
