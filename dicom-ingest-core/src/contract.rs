//! # contract: collaborator interfaces for the ingest pipeline
//!
//! The core never touches a UI, a transport or the outer DICOM decoder
//! directly. It talks to four collaborators:
//!
//! - [`FileSource`] lists directories and reads files (local disk, a browser
//!   bridge, a test fake).
//! - [`EnvelopeDecoder`] turns a file's bytes into a [`Dataset`] element index.
//! - [`SeriesUploader`] runs the three-phase start/transfer/end protocol
//!   against a remote endpoint.
//! - [`IngestObserver`] receives status and progress callbacks.
//!
//! ## Mocking & Testing
//! - The I/O traits are annotated for `mockall`; enable the
//!   `test-export-mocks` feature to use the generated mocks from other crates.
//! - Timing-sensitive tests implement the traits by hand with sleeps.
//!
//! ## Error handling
//! Collaborators return [`TransferError`] (a boxed error). The orchestrator
//! records these per file or per series and never propagates them further.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use mockall::automock;
use serde::{Deserialize, Serialize};

use crate::dataset::Dataset;
use crate::error::{EnvelopeError, IgnoreReason, TransferError};
use crate::record::{SeriesProgress, SeriesStatus};
use crate::series::SeriesKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
}

/// One node of a user selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub path: PathBuf,
    pub kind: EntryKind,
}

impl Entry {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            kind: EntryKind::File,
        }
    }

    pub fn directory(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            kind: EntryKind::Directory,
        }
    }

    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }

    pub fn display_name(&self) -> String {
        self.path.display().to_string()
    }
}

/// Directory listing and file reads.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait FileSource: Send + Sync {
    async fn list_directory(&self, entry: &Entry) -> Result<Vec<Entry>, TransferError>;

    async fn read_file(&self, entry: &Entry) -> Result<Vec<u8>, TransferError>;

    /// Reads at most `len` leading bytes. Sources that cannot read partially
    /// fall back to a full read.
    async fn read_prefix(&self, entry: &Entry, len: usize) -> Result<Vec<u8>, TransferError> {
        let mut bytes = self.read_file(entry).await?;
        bytes.truncate(len);
        Ok(bytes)
    }
}

/// Outer container decoder. Produces the element index the core reads
/// identifiers from and the redactor writes through.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
pub trait EnvelopeDecoder: Send + Sync {
    fn decode(&self, bytes: &[u8]) -> Result<Dataset, EnvelopeError>;
}

/// Token returned by the start phase and quoted by every later call.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionToken(pub String);

/// Series metadata sent with the start call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewSeriesUpload {
    pub series_key: SeriesKey,
    pub study_instance_uid: String,
    pub series_instance_uid: String,
    pub series_number: Option<i64>,
    pub series_description: Option<String>,
    pub modality: Option<String>,
    pub manufacturer: Option<String>,
    pub files_total: usize,
    pub size_bytes: u64,
    pub expected_count: Option<u32>,
    pub images_per_file: Option<u32>,
}

/// Final counts sent with the end call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SeriesSummary {
    pub series_key: SeriesKey,
    pub files_uploaded: usize,
    pub files_failed: usize,
    pub files_total: usize,
}

/// Three-phase upload protocol. Implemented by the HTTP client, a dry-run
/// client and test mocks.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait SeriesUploader: Send + Sync {
    /// Opens an upload session for one series.
    async fn start_series(&self, req: NewSeriesUpload) -> Result<SessionToken, TransferError>;

    /// Sends one file within an open session. `content` is already redacted.
    async fn transfer_file(
        &self,
        session: &SessionToken,
        file_name: &str,
        content: &[u8],
    ) -> Result<(), TransferError>;

    /// Closes the session with final counts.
    async fn end_series(
        &self,
        session: &SessionToken,
        summary: SeriesSummary,
    ) -> Result<(), TransferError>;
}

/// Callbacks towards whatever renders the batch. All methods default to
/// doing nothing.
pub trait IngestObserver: Send + Sync {
    fn on_file_ignored(&self, _file: &str, _reason: &IgnoreReason) {}

    fn on_series_progress(&self, _key: &SeriesKey, _progress: SeriesProgress) {}

    fn on_series_status(&self, _key: &SeriesKey, _status: &SeriesStatus) {}

    /// Fires once per discovery pass, after every directory listing settled.
    fn on_discovery_complete(&self, _files: usize) {}
}

/// Observer that ignores every callback.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl IngestObserver for NoopObserver {}

/// Upload names for the members of one series, in member order.
///
/// Each member is sent under its last path component. A basename already
/// taken within the series gets its 1-based member position as a prefix
/// (`2_IM0001`), so no two members share a name on the wire.
pub fn transfer_names<'a>(names: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let mut taken = HashSet::new();
    names
        .into_iter()
        .enumerate()
        .map(|(index, name)| {
            let base = Path::new(name)
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or(name);
            let mut candidate = base.to_string();
            let mut prefix = index + 1;
            while !taken.insert(candidate.clone()) {
                candidate = format!("{prefix}_{base}");
                prefix += 1;
            }
            candidate
        })
        .collect()
}
