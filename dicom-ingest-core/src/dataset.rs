//! Tag → element lookup over a file's raw bytes.
//!
//! The outer DICOM envelope is decoded by an [`EnvelopeDecoder`] collaborator;
//! all this crate needs back is where each element sits in the buffer. A
//! [`Dataset`] is that index. Value accessors read straight from the buffer
//! the index was built for.
//!
//! [`EnvelopeDecoder`]: crate::contract::EnvelopeDecoder

use std::collections::BTreeMap;
use std::fmt;

/// Size of the short explicit-VR element header (tag, VR, 16-bit length).
pub const ELEMENT_HEADER_LEN: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Tag(pub u16, pub u16);

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:04X},{:04X})", self.0, self.1)
    }
}

pub mod tags {
    use super::Tag;

    pub const MANUFACTURER: Tag = Tag(0x0008, 0x0070);
    pub const MODALITY: Tag = Tag(0x0008, 0x0060);
    pub const SERIES_DESCRIPTION: Tag = Tag(0x0008, 0x103E);
    pub const PATIENT_NAME: Tag = Tag(0x0010, 0x0010);
    pub const PATIENT_BIRTH_DATE: Tag = Tag(0x0010, 0x0030);
    pub const SLICE_THICKNESS: Tag = Tag(0x0018, 0x0050);
    pub const ECHO_NUMBERS: Tag = Tag(0x0018, 0x0086);
    pub const STUDY_INSTANCE_UID: Tag = Tag(0x0020, 0x000D);
    pub const SERIES_INSTANCE_UID: Tag = Tag(0x0020, 0x000E);
    pub const SERIES_NUMBER: Tag = Tag(0x0020, 0x0011);
    pub const ACQUISITION_NUMBER: Tag = Tag(0x0020, 0x0012);
    pub const TEMPORAL_POSITIONS: Tag = Tag(0x0020, 0x0105);
    pub const IMAGES_IN_ACQUISITION: Tag = Tag(0x0020, 0x1002);
    /// GE private: locations in acquisition (slices per volume).
    pub const GE_LOCATIONS_IN_ACQUISITION: Tag = Tag(0x0021, 0x104F);
    /// Siemens private: CSA image header info.
    pub const SIEMENS_CSA_IMAGE_HEADER: Tag = Tag(0x0029, 0x1010);
    /// Siemens private: CSA series header info.
    pub const SIEMENS_CSA_SERIES_HEADER: Tag = Tag(0x0029, 0x1020);
}

/// Position of one element inside the file buffer.
///
/// `offset` points at the element header; the value starts `header_len`
/// bytes later and is `length` bytes long.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Element {
    pub offset: usize,
    pub header_len: usize,
    pub length: usize,
}

impl Element {
    /// Element with the short 8-byte header.
    pub fn new(offset: usize, length: usize) -> Self {
        Self {
            offset,
            header_len: ELEMENT_HEADER_LEN,
            length,
        }
    }

    pub fn value_offset(&self) -> usize {
        self.offset + self.header_len
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dataset {
    elements: BTreeMap<Tag, Element>,
}

impl Dataset {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, tag: Tag, element: Element) {
        self.elements.insert(tag, element);
    }

    pub fn element(&self, tag: Tag) -> Option<Element> {
        self.elements.get(&tag).copied()
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Raw value bytes, or `None` when the element is absent or its span
    /// does not fit in `buffer`.
    pub fn bytes<'b>(&self, buffer: &'b [u8], tag: Tag) -> Option<&'b [u8]> {
        let element = self.element(tag)?;
        let start = element.value_offset();
        buffer.get(start..start.checked_add(element.length)?)
    }

    /// Text value with DICOM padding (trailing spaces and NULs) removed.
    pub fn string(&self, buffer: &[u8], tag: Tag) -> Option<String> {
        let raw = self.bytes(buffer, tag)?;
        let text = String::from_utf8_lossy(raw);
        let trimmed = text.trim_matches(|c: char| c == '\0' || c.is_whitespace());
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    }

    /// Integer string (IS) value; multi-valued fields yield the first value.
    pub fn int(&self, buffer: &[u8], tag: Tag) -> Option<i64> {
        let text = self.string(buffer, tag)?;
        text.split('\\').next()?.trim().parse().ok()
    }

    /// Decimal string (DS) value.
    pub fn decimal(&self, buffer: &[u8], tag: Tag) -> Option<f64> {
        let text = self.string(buffer, tag)?;
        text.split('\\').next()?.trim().parse().ok()
    }
}
