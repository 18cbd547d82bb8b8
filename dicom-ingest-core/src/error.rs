//! Error types shared across the ingest pipeline.
//!
//! Decode errors never escape a single file: the orchestrator converts them
//! into an [`IgnoreReason`] or an unknown completeness estimate. Collaborator
//! failures (listing, reading, uploading) use the boxed [`TransferError`] at
//! the trait seams so real clients and mocks can report anything.

use thiserror::Error;

/// Boxed error returned by collaborator traits (file source, uploader).
pub type TransferError = Box<dyn std::error::Error + Send + Sync>;

/// Failure while decoding a vendor binary block.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("read past end of buffer: needed {needed} bytes, {remaining} remaining")]
    OutOfBounds { needed: usize, remaining: usize },

    #[error("malformed vendor header: {0}")]
    MalformedHeader(String),
}

/// Failure reported by the outer envelope decoder.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("envelope decode failed: {0}")]
pub struct EnvelopeError(pub String);

/// Why a selected file was left out of the batch.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IgnoreReason {
    #[error("not a DICOM file (no DICM marker at offset 128)")]
    UnrecognizedFormat,

    #[error("could not read: {0}")]
    Unreadable(String),

    #[error("could not list directory: {0}")]
    Unlistable(String),

    #[error(transparent)]
    Envelope(#[from] EnvelopeError),

    #[error("missing required element: {0}")]
    MissingElement(&'static str),
}
