#![doc = "dicom-ingest-core: core logic library for dicom-ingest."]

//! This crate holds the decoding, grouping, de-identification and upload
//! orchestration logic. Transport, UI and the outer DICOM decoder are
//! collaborators described in [`contract`].
//!
//! # Pipeline
//! selection → [`discover`] → magic check → envelope decode → [`series`]
//! resolution → [`record::SeriesRecord`] merge → [`commit`]
//! (start → redact + transfer → end).

pub mod commit;
pub mod config;
pub mod contract;
pub mod cursor;
pub mod dataset;
pub mod discover;
pub mod error;
pub mod ingest;
pub mod record;
pub mod redact;
pub mod series;
pub mod source;
pub mod vendor_header;

pub use commit::{CommitReport, SeriesReport};
pub use config::IngestConfig;
pub use ingest::{IngestOrchestrator, IngestSummary};
