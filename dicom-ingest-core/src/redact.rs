//! In-place de-identification.
//!
//! Patient's Name is blanked with spaces and the day of Patient's Birth Date
//! is pinned to the 15th. Lengths never change, so every other element's
//! offset in the buffer stays valid. Missing elements are skipped.

use tracing::debug;

use crate::dataset::{tags, Dataset};

/// Day-of-month written into every eight-character birth date.
pub const BIRTH_DAY: &[u8; 2] = b"15";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RedactionSummary {
    pub name_bytes: usize,
    pub birth_date: bool,
}

pub fn redact(buffer: &mut [u8], lookup: &Dataset) -> RedactionSummary {
    let mut summary = RedactionSummary::default();

    if let Some(value) = value_span(buffer.len(), lookup, tags::PATIENT_NAME) {
        buffer[value.clone()].fill(b' ');
        summary.name_bytes = value.len();
    }

    if let Some(value) = value_span(buffer.len(), lookup, tags::PATIENT_BIRTH_DATE) {
        if value.len() == 8 {
            let day = value.start + 6..value.start + 8;
            buffer[day].copy_from_slice(BIRTH_DAY);
            summary.birth_date = true;
        }
    }

    debug!(
        name_bytes = summary.name_bytes,
        birth_date = summary.birth_date,
        "Redacted identifiers"
    );
    summary
}

fn value_span(
    buffer_len: usize,
    lookup: &Dataset,
    tag: crate::dataset::Tag,
) -> Option<std::ops::Range<usize>> {
    let element = lookup.element(tag)?;
    let start = element.value_offset();
    let end = start.checked_add(element.length)?;
    (end <= buffer_len).then_some(start..end)
}
