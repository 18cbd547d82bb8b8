#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use dicom_ingest_core::contract::{
    EnvelopeDecoder, Entry, FileSource, IngestObserver, NewSeriesUpload,
    SeriesSummary, SeriesUploader, SessionToken,
};
use dicom_ingest_core::dataset::{tags, Dataset, Element, Tag};
use dicom_ingest_core::error::{EnvelopeError, IgnoreReason, TransferError};
use dicom_ingest_core::record::{SeriesProgress, SeriesStatus};
use dicom_ingest_core::series::SeriesKey;
use dicom_ingest_core::{IngestConfig, IngestOrchestrator};

pub const INSTANCE_NUMBER: Tag = Tag(0x0020, 0x0013);

/// Writes a Part 10 preamble and explicit-VR little-endian elements, and
/// records where each element landed.
pub struct DicomBuilder {
    bytes: Vec<u8>,
    dataset: Dataset,
}

impl DicomBuilder {
    pub fn new() -> Self {
        let mut bytes = vec![0u8; 128];
        bytes.extend_from_slice(b"DICM");
        Self {
            bytes,
            dataset: Dataset::new(),
        }
    }

    pub fn text(self, tag: Tag, vr: &[u8; 2], value: &str) -> Self {
        let mut value = value.as_bytes().to_vec();
        if value.len() % 2 == 1 {
            value.push(b' ');
        }
        self.short(tag, vr, &value)
    }

    pub fn short(mut self, tag: Tag, vr: &[u8; 2], value: &[u8]) -> Self {
        let offset = self.bytes.len();
        self.bytes.extend_from_slice(&tag.0.to_le_bytes());
        self.bytes.extend_from_slice(&tag.1.to_le_bytes());
        self.bytes.extend_from_slice(vr);
        self.bytes
            .extend_from_slice(&(value.len() as u16).to_le_bytes());
        self.bytes.extend_from_slice(value);
        self.dataset.insert(tag, Element::new(offset, value.len()));
        self
    }

    pub fn blob(mut self, tag: Tag, value: &[u8]) -> Self {
        let offset = self.bytes.len();
        self.bytes.extend_from_slice(&tag.0.to_le_bytes());
        self.bytes.extend_from_slice(&tag.1.to_le_bytes());
        self.bytes.extend_from_slice(b"OB\0\0");
        self.bytes
            .extend_from_slice(&(value.len() as u32).to_le_bytes());
        self.bytes.extend_from_slice(value);
        self.dataset.insert(
            tag,
            Element {
                offset,
                header_len: 12,
                length: value.len(),
            },
        );
        self
    }

    pub fn build(self) -> (Vec<u8>, Dataset) {
        (self.bytes, self.dataset)
    }
}

/// Identifiers shared by every fixture file.
pub fn base_file(study: &str, series_uid: &str, series: i64, acquisition: i64, instance: i64) -> DicomBuilder {
    DicomBuilder::new()
        .text(tags::MODALITY, b"CS", "MR")
        .text(tags::PATIENT_NAME, b"PN", "DOE^JOHN")
        .text(tags::PATIENT_BIRTH_DATE, b"DA", "19990203")
        .text(tags::STUDY_INSTANCE_UID, b"UI", study)
        .text(tags::SERIES_INSTANCE_UID, b"UI", series_uid)
        .text(tags::SERIES_NUMBER, b"IS", &series.to_string())
        .text(tags::ACQUISITION_NUMBER, b"IS", &acquisition.to_string())
        .text(INSTANCE_NUMBER, b"IS", &instance.to_string())
}

/// Encodes a CSA `SV10` block. Each tag is `(name, vm, items)`.
pub fn csa(tags: &[(&str, u32, &[&str])]) -> Vec<u8> {
    let mut out = b"SV10".to_vec();
    out.extend_from_slice(&[4, 3, 2, 1]);
    out.extend_from_slice(&(tags.len() as u32).to_le_bytes());
    out.extend_from_slice(&77u32.to_le_bytes());
    for (name, vm, items) in tags {
        let mut field = [0u8; 64];
        field[..name.len()].copy_from_slice(name.as_bytes());
        out.extend_from_slice(&field);
        out.extend_from_slice(&vm.to_le_bytes());
        out.extend_from_slice(b"IS\0\0");
        out.extend_from_slice(&6u32.to_le_bytes());
        out.extend_from_slice(&(items.len() as u32).to_le_bytes());
        out.extend_from_slice(&77u32.to_le_bytes());
        for item in *items {
            let len = item.len() as u32;
            for word in [len, len, 77, len] {
                out.extend_from_slice(&word.to_le_bytes());
            }
            out.extend_from_slice(item.as_bytes());
            while out.len() % 4 != 0 {
                out.push(0);
            }
        }
    }
    out
}

pub fn ascconv(lines: &[&str]) -> String {
    format!(
        "<XProtocol> junk\n### ASCCONV BEGIN object=MrProtDataImpl@MrProtocolData ###\n{}\n### ASCCONV END ###\ntrailer = 1",
        lines.join("\n")
    )
}

/// Envelope decoder that hands back the index recorded by [`DicomBuilder`].
#[derive(Default)]
pub struct FixtureDecoder {
    datasets: Mutex<HashMap<Vec<u8>, Dataset>>,
}

impl FixtureDecoder {
    pub fn register(&self, bytes: &[u8], dataset: Dataset) {
        self.datasets
            .lock()
            .unwrap()
            .insert(bytes.to_vec(), dataset);
    }
}

impl EnvelopeDecoder for FixtureDecoder {
    fn decode(&self, bytes: &[u8]) -> Result<Dataset, EnvelopeError> {
        self.datasets
            .lock()
            .unwrap()
            .get(bytes)
            .cloned()
            .ok_or_else(|| EnvelopeError("no element index for these bytes".into()))
    }
}

/// In-memory tree with optional per-directory listing delays.
#[derive(Default)]
pub struct MemorySource {
    files: HashMap<PathBuf, Vec<u8>>,
    dirs: HashMap<PathBuf, Vec<Entry>>,
    delays: HashMap<PathBuf, Duration>,
    failing: HashSet<PathBuf>,
    listed: Mutex<Vec<PathBuf>>,
}

impl MemorySource {
    pub fn add_file(&mut self, path: &str, bytes: Vec<u8>) {
        let path = PathBuf::from(path);
        self.link(&path, Entry::file(&path));
        self.files.insert(path, bytes);
    }

    pub fn add_dir(&mut self, path: &str) {
        let path = PathBuf::from(path);
        self.dirs.entry(path.clone()).or_default();
        self.link(&path, Entry::directory(&path));
    }

    pub fn delay(&mut self, path: &str, delay: Duration) {
        self.delays.insert(PathBuf::from(path), delay);
    }

    pub fn fail_listing(&mut self, path: &str) {
        self.failing.insert(PathBuf::from(path));
    }

    /// Directories whose listing has resolved, in completion order.
    pub fn listed(&self) -> Vec<PathBuf> {
        self.listed.lock().unwrap().clone()
    }

    pub fn directory_count(&self) -> usize {
        self.dirs.len()
    }

    fn link(&mut self, path: &Path, entry: Entry) {
        let Some(parent) = path.parent() else {
            return;
        };
        if parent.as_os_str().is_empty() || parent == Path::new("/") {
            return;
        }
        let known = self.dirs.contains_key(parent);
        let children = self.dirs.entry(parent.to_path_buf()).or_default();
        if !children.contains(&entry) {
            children.push(entry);
        }
        if !known {
            let parent = parent.to_path_buf();
            self.link(&parent, Entry::directory(&parent));
        }
    }
}

#[async_trait]
impl FileSource for MemorySource {
    async fn list_directory(&self, entry: &Entry) -> Result<Vec<Entry>, TransferError> {
        if let Some(delay) = self.delays.get(&entry.path) {
            tokio::time::sleep(*delay).await;
        }
        if self.failing.contains(&entry.path) {
            return Err(format!("permission denied: {}", entry.path.display()).into());
        }
        let children = self
            .dirs
            .get(&entry.path)
            .cloned()
            .ok_or_else(|| -> TransferError { format!("not a directory: {}", entry.path.display()).into() })?;
        self.listed.lock().unwrap().push(entry.path.clone());
        Ok(children)
    }

    async fn read_file(&self, entry: &Entry) -> Result<Vec<u8>, TransferError> {
        self.files
            .get(&entry.path)
            .cloned()
            .ok_or_else(|| format!("no such file: {}", entry.path.display()).into())
    }
}

/// Source and decoder populated together.
#[derive(Default)]
pub struct Batch {
    pub source: MemorySource,
    pub decoder: FixtureDecoder,
}

impl Batch {
    pub fn add(&mut self, path: &str, builder: DicomBuilder) {
        let (bytes, dataset) = builder.build();
        self.decoder.register(&bytes, dataset);
        self.source.add_file(path, bytes);
    }

    pub fn orchestrator(
        self,
        config: IngestConfig,
        observer: Arc<RecordingObserver>,
    ) -> IngestOrchestrator {
        IngestOrchestrator::new(
            config,
            Arc::new(self.source),
            Arc::new(self.decoder),
            observer,
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Ignored(String, IgnoreReason),
    Progress(SeriesKey, SeriesProgress),
    Status(SeriesKey, SeriesStatus),
    DiscoveryComplete(usize),
}

#[derive(Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<Event>>,
}

impl RecordingObserver {
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    pub fn statuses(&self, key: &SeriesKey) -> Vec<SeriesStatus> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Status(k, s) if &k == key => Some(s),
                _ => None,
            })
            .collect()
    }

    pub fn progress(&self, key: &SeriesKey) -> Vec<SeriesProgress> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Progress(k, p) if &k == key => Some(p),
                _ => None,
            })
            .collect()
    }

    pub fn ignored(&self) -> Vec<(String, IgnoreReason)> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Ignored(name, reason) => Some((name, reason)),
                _ => None,
            })
            .collect()
    }

    fn push(&self, event: Event) {
        self.events.lock().unwrap().push(event);
    }
}

impl IngestObserver for RecordingObserver {
    fn on_file_ignored(&self, file: &str, reason: &IgnoreReason) {
        self.push(Event::Ignored(file.to_string(), reason.clone()));
    }

    fn on_series_progress(&self, key: &SeriesKey, progress: SeriesProgress) {
        self.push(Event::Progress(key.clone(), progress));
    }

    fn on_series_status(&self, key: &SeriesKey, status: &SeriesStatus) {
        self.push(Event::Status(key.clone(), status.clone()));
    }

    fn on_discovery_complete(&self, files: usize) {
        self.push(Event::DiscoveryComplete(files));
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Start(SeriesKey),
    TransferBegin(SessionToken, String),
    TransferSettled(SessionToken, String),
    End(SessionToken, SeriesSummary),
}

/// Uploader that sleeps on every call and records ordering and concurrency.
#[derive(Default)]
pub struct FakeUploader {
    pub transfer_delay: Duration,
    pub fail_start: HashSet<SeriesKey>,
    pub fail_transfer: HashSet<String>,
    pub fail_end: HashSet<SeriesKey>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    calls: Mutex<Vec<Call>>,
    received: Mutex<HashMap<String, Vec<u8>>>,
}

impl FakeUploader {
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            transfer_delay: delay,
            ..Default::default()
        }
    }

    pub fn token_for(key: &SeriesKey) -> SessionToken {
        SessionToken(format!("session-{key}"))
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn received(&self, file_name: &str) -> Option<Vec<u8>> {
        self.received.lock().unwrap().get(file_name).cloned()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl SeriesUploader for FakeUploader {
    async fn start_series(&self, req: NewSeriesUpload) -> Result<SessionToken, TransferError> {
        tokio::time::sleep(Duration::from_millis(5)).await;
        self.record(Call::Start(req.series_key.clone()));
        if self.fail_start.contains(&req.series_key) {
            return Err("start rejected".into());
        }
        Ok(Self::token_for(&req.series_key))
    }

    async fn transfer_file(
        &self,
        session: &SessionToken,
        file_name: &str,
        content: &[u8],
    ) -> Result<(), TransferError> {
        self.record(Call::TransferBegin(session.clone(), file_name.to_string()));
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        tokio::time::sleep(self.transfer_delay).await;
        self.received
            .lock()
            .unwrap()
            .insert(file_name.to_string(), content.to_vec());

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.record(Call::TransferSettled(session.clone(), file_name.to_string()));
        if self.fail_transfer.contains(file_name) {
            return Err("transfer rejected".into());
        }
        Ok(())
    }

    async fn end_series(
        &self,
        session: &SessionToken,
        summary: SeriesSummary,
    ) -> Result<(), TransferError> {
        tokio::time::sleep(Duration::from_millis(5)).await;
        let failing = self.fail_end.contains(&summary.series_key);
        self.record(Call::End(session.clone(), summary));
        if failing {
            return Err("end rejected".into());
        }
        Ok(())
    }
}
