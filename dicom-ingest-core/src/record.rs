//! Per-file and per-series state held between ingest and commit.

use serde::Serialize;

use crate::dataset::Dataset;
use crate::error::IgnoreReason;
use crate::series::{self, FileMetadata, SeriesKey};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum FileStatus {
    Pending,
    Uploaded,
    Failed(String),
}

/// Lifecycle of one series from first sighting to terminal upload outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum SeriesStatus {
    Discovered,
    Validated,
    Started,
    Transferring,
    Ended,
    Failed(String),
    /// Not selected for upload at commit time.
    Excluded,
}

impl SeriesStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SeriesStatus::Ended | SeriesStatus::Failed(_) | SeriesStatus::Excluded
        )
    }
}

/// One format-valid file and everything derived from it.
#[derive(Debug, Clone)]
pub struct FileRecord {
    pub name: String,
    pub metadata: FileMetadata,
    pub dataset: Dataset,
    pub content: Vec<u8>,
    pub key: SeriesKey,
    pub expected_count: Option<u32>,
    pub images_per_file: Option<u32>,
    pub status: FileStatus,
}

impl FileRecord {
    /// Reads identifiers from the envelope and resolves the series key.
    pub fn parse(name: String, content: Vec<u8>, dataset: Dataset) -> Result<Self, IgnoreReason> {
        let metadata = FileMetadata::from_dataset(&content, &dataset);
        if metadata.series_instance_uid.is_empty() {
            return Err(IgnoreReason::MissingElement("SeriesInstanceUID"));
        }
        let resolution = series::resolve(&metadata, &content, &dataset);
        Ok(Self {
            name,
            metadata,
            dataset,
            content,
            key: resolution.key,
            expected_count: resolution.expected_count,
            images_per_file: resolution.images_per_file,
            status: FileStatus::Pending,
        })
    }

    pub fn size(&self) -> u64 {
        self.content.len() as u64
    }
}

/// Counts shown next to a series while it is gathered and uploaded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SeriesProgress {
    pub uploaded: usize,
    pub failed: usize,
    pub total: usize,
    pub expected: Option<u32>,
    pub size_bytes: u64,
}

#[derive(Debug, Clone)]
pub struct SeriesRecord {
    pub key: SeriesKey,
    pub members: Vec<FileRecord>,
    pub expected_count: Option<u32>,
    pub images_per_file: Option<u32>,
    pub max_echo_number: Option<i64>,
    pub accumulated_size: u64,
    pub included: bool,
    pub status: SeriesStatus,
}

impl SeriesRecord {
    pub fn new(file: FileRecord) -> Self {
        let mut record = Self {
            key: file.key.clone(),
            members: Vec::new(),
            expected_count: None,
            images_per_file: None,
            max_echo_number: None,
            accumulated_size: 0,
            included: true,
            status: SeriesStatus::Discovered,
        };
        record.merge(file);
        record
    }

    /// Appends a file. A known estimate replaces the previous one; an
    /// unknown estimate never erases a known one.
    pub fn merge(&mut self, file: FileRecord) {
        debug_assert_eq!(file.key, self.key);
        if let Some(expected) = file.expected_count {
            self.expected_count = Some(expected);
        }
        if let Some(images) = file.images_per_file {
            self.images_per_file = Some(images);
        }
        if let Some(echo) = file.metadata.echo_number {
            self.max_echo_number = Some(self.max_echo_number.map_or(echo, |m| m.max(echo)));
        }
        self.accumulated_size += file.size();
        self.members.push(file);
    }

    pub fn first(&self) -> Option<&FileRecord> {
        self.members.first()
    }

    /// True once the running count reaches a known estimate.
    pub fn is_complete(&self) -> Option<bool> {
        self.expected_count
            .map(|expected| self.members.len() >= expected as usize)
    }

    pub fn progress(&self) -> SeriesProgress {
        SeriesProgress {
            uploaded: self
                .members
                .iter()
                .filter(|f| f.status == FileStatus::Uploaded)
                .count(),
            failed: self
                .members
                .iter()
                .filter(|f| matches!(f.status, FileStatus::Failed(_)))
                .count(),
            total: self.members.len(),
            expected: self.expected_count,
            size_bytes: self.accumulated_size,
        }
    }
}
