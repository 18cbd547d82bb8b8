//! Minimal Part 10 element indexer.
//!
//! Walks the top level of a little-endian dataset and records where each
//! element sits, which is all the core needs to read identifiers and redact
//! in place. Sequences and encapsulated pixel data are stepped over, never
//! indexed. Big-endian and deflated transfer syntaxes are refused.

use dicom_ingest_core::contract::EnvelopeDecoder;
use dicom_ingest_core::dataset::{Dataset, Element, Tag};
use dicom_ingest_core::error::EnvelopeError;
use tracing::debug;

/// Preamble plus the `DICM` marker.
const DATASET_START: usize = 132;
const UNDEFINED_LENGTH: u32 = 0xFFFF_FFFF;

const ITEM: Tag = Tag(0xFFFE, 0xE000);
const ITEM_DELIMITER: Tag = Tag(0xFFFE, 0xE00D);
const SEQUENCE_DELIMITER: Tag = Tag(0xFFFE, 0xE0DD);
const TRANSFER_SYNTAX_UID: Tag = Tag(0x0002, 0x0010);
const PIXEL_DATA: Tag = Tag(0x7FE0, 0x0010);

const IMPLICIT_LITTLE: &str = "1.2.840.10008.1.2";
const EXPLICIT_BIG: &str = "1.2.840.10008.1.2.2";
const DEFLATED: &str = "1.2.840.10008.1.2.1.99";

/// VRs written with two reserved bytes and a 32-bit length.
const LONG_VRS: [&[u8; 2]; 12] = [
    b"OB", b"OD", b"OF", b"OL", b"OV", b"OW", b"SQ", b"SV", b"UC", b"UN", b"UR", b"UT",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Encoding {
    Explicit,
    Implicit,
}

struct Header {
    tag: Tag,
    header_len: usize,
    length: u32,
    sequence: bool,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ElementIndexer;

impl ElementIndexer {
    pub fn new() -> Self {
        Self
    }
}

impl EnvelopeDecoder for ElementIndexer {
    fn decode(&self, bytes: &[u8]) -> Result<Dataset, EnvelopeError> {
        if bytes.get(128..DATASET_START) != Some(b"DICM".as_slice()) {
            return Err(EnvelopeError("missing DICM marker".into()));
        }

        let mut dataset = Dataset::new();
        let mut pos = DATASET_START;
        let mut encoding = Encoding::Explicit;
        let mut in_meta = true;

        while pos < bytes.len() {
            if in_meta && read_u16(bytes, pos)? != 0x0002 {
                in_meta = false;
                encoding = body_encoding(bytes, &dataset)?;
            }
            let header = read_header(bytes, pos, encoding)?;
            let value_start = pos + header.header_len;

            if header.length == UNDEFINED_LENGTH {
                if !header.sequence && header.tag != PIXEL_DATA {
                    return Err(EnvelopeError(format!(
                        "undefined length on non-sequence element {}",
                        header.tag
                    )));
                }
                pos = skip_sequence(bytes, value_start, encoding)?;
                continue;
            }

            let length = header.length as usize;
            let end = value_start
                .checked_add(length)
                .filter(|&end| end <= bytes.len())
                .ok_or_else(|| {
                    EnvelopeError(format!(
                        "element {} at offset {pos} overruns the file",
                        header.tag
                    ))
                })?;
            if !header.sequence {
                dataset.insert(
                    header.tag,
                    Element {
                        offset: pos,
                        header_len: header.header_len,
                        length,
                    },
                );
            }
            pos = end;
        }

        debug!(elements = dataset.len(), ?encoding, "Indexed envelope");
        Ok(dataset)
    }
}

fn body_encoding(bytes: &[u8], meta: &Dataset) -> Result<Encoding, EnvelopeError> {
    let syntax = meta.string(bytes, TRANSFER_SYNTAX_UID).unwrap_or_default();
    match syntax.as_str() {
        IMPLICIT_LITTLE => Ok(Encoding::Implicit),
        EXPLICIT_BIG | DEFLATED => Err(EnvelopeError(format!(
            "unsupported transfer syntax {syntax}"
        ))),
        _ => Ok(Encoding::Explicit),
    }
}

fn read_header(bytes: &[u8], pos: usize, encoding: Encoding) -> Result<Header, EnvelopeError> {
    let tag = Tag(read_u16(bytes, pos)?, read_u16(bytes, pos + 2)?);
    if tag.0 == 0xFFFE {
        return Ok(Header {
            tag,
            header_len: 8,
            length: read_u32(bytes, pos + 4)?,
            sequence: false,
        });
    }
    match encoding {
        Encoding::Implicit => {
            let length = read_u32(bytes, pos + 4)?;
            Ok(Header {
                tag,
                header_len: 8,
                length,
                // Without a VR the only hint is the undefined length.
                sequence: length == UNDEFINED_LENGTH,
            })
        }
        Encoding::Explicit => {
            let vr: [u8; 2] = slice(bytes, pos + 4, 2)?
                .try_into()
                .map_err(|_| EnvelopeError("short VR".into()))?;
            if LONG_VRS.contains(&&vr) {
                Ok(Header {
                    tag,
                    header_len: 12,
                    length: read_u32(bytes, pos + 8)?,
                    sequence: &vr == b"SQ",
                })
            } else {
                Ok(Header {
                    tag,
                    header_len: 8,
                    length: read_u16(bytes, pos + 6)? as u32,
                    sequence: false,
                })
            }
        }
    }
}

/// Steps over the items of an undefined-length sequence (or encapsulated
/// pixel data) and returns the offset after its delimiter.
fn skip_sequence(bytes: &[u8], mut pos: usize, encoding: Encoding) -> Result<usize, EnvelopeError> {
    loop {
        let tag = Tag(read_u16(bytes, pos)?, read_u16(bytes, pos + 2)?);
        let length = read_u32(bytes, pos + 4)?;
        pos += 8;
        match tag {
            SEQUENCE_DELIMITER => return Ok(pos),
            ITEM if length == UNDEFINED_LENGTH => pos = skip_item(bytes, pos, encoding)?,
            ITEM => pos = advance(bytes, pos, length)?,
            other => {
                return Err(EnvelopeError(format!(
                    "unexpected {other} inside sequence at offset {pos}"
                )))
            }
        }
    }
}

fn skip_item(bytes: &[u8], mut pos: usize, encoding: Encoding) -> Result<usize, EnvelopeError> {
    loop {
        let header = read_header(bytes, pos, encoding)?;
        if header.tag == ITEM_DELIMITER {
            return Ok(pos + 8);
        }
        let value_start = pos + header.header_len;
        pos = if header.length == UNDEFINED_LENGTH {
            skip_sequence(bytes, value_start, encoding)?
        } else {
            advance(bytes, value_start, header.length)?
        };
    }
}

fn advance(bytes: &[u8], pos: usize, length: u32) -> Result<usize, EnvelopeError> {
    pos.checked_add(length as usize)
        .filter(|&end| end <= bytes.len())
        .ok_or_else(|| EnvelopeError(format!("item at offset {pos} overruns the file")))
}

fn slice(bytes: &[u8], pos: usize, len: usize) -> Result<&[u8], EnvelopeError> {
    bytes
        .get(pos..pos + len)
        .ok_or_else(|| EnvelopeError(format!("truncated element header at offset {pos}")))
}

fn read_u16(bytes: &[u8], pos: usize) -> Result<u16, EnvelopeError> {
    let raw = slice(bytes, pos, 2)?;
    Ok(u16::from_le_bytes([raw[0], raw[1]]))
}

fn read_u32(bytes: &[u8], pos: usize) -> Result<u32, EnvelopeError> {
    let raw = slice(bytes, pos, 4)?;
    Ok(u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use dicom_ingest_core::dataset::tags;

    fn file() -> Vec<u8> {
        let mut bytes = vec![0u8; 128];
        bytes.extend_from_slice(b"DICM");
        bytes
    }

    fn short(bytes: &mut Vec<u8>, tag: Tag, vr: &[u8; 2], value: &[u8]) {
        bytes.extend_from_slice(&tag.0.to_le_bytes());
        bytes.extend_from_slice(&tag.1.to_le_bytes());
        bytes.extend_from_slice(vr);
        bytes.extend_from_slice(&(value.len() as u16).to_le_bytes());
        bytes.extend_from_slice(value);
    }

    fn long(bytes: &mut Vec<u8>, tag: Tag, vr: &[u8; 2], length: u32) {
        bytes.extend_from_slice(&tag.0.to_le_bytes());
        bytes.extend_from_slice(&tag.1.to_le_bytes());
        bytes.extend_from_slice(vr);
        bytes.extend_from_slice(&[0, 0]);
        bytes.extend_from_slice(&length.to_le_bytes());
    }

    fn marker(bytes: &mut Vec<u8>, tag: Tag, length: u32) {
        bytes.extend_from_slice(&tag.0.to_le_bytes());
        bytes.extend_from_slice(&tag.1.to_le_bytes());
        bytes.extend_from_slice(&length.to_le_bytes());
    }

    #[test]
    fn indexes_short_and_long_elements() {
        let mut bytes = file();
        short(&mut bytes, TRANSFER_SYNTAX_UID, b"UI", b"1.2.840.10008.1.2.1\0");
        short(&mut bytes, tags::PATIENT_NAME, b"PN", b"DOE^JOHN");
        long(&mut bytes, tags::SIEMENS_CSA_IMAGE_HEADER, b"OB", 4);
        bytes.extend_from_slice(b"SV10");

        let dataset = ElementIndexer.decode(&bytes).unwrap();

        assert_eq!(dataset.string(&bytes, tags::PATIENT_NAME).as_deref(), Some("DOE^JOHN"));
        assert_eq!(dataset.bytes(&bytes, tags::SIEMENS_CSA_IMAGE_HEADER), Some(&b"SV10"[..]));
        assert_eq!(dataset.element(tags::SIEMENS_CSA_IMAGE_HEADER).unwrap().header_len, 12);
    }

    #[test]
    fn steps_over_undefined_length_sequences() {
        let mut bytes = file();
        long(&mut bytes, Tag(0x0008, 0x1140), b"SQ", UNDEFINED_LENGTH);
        marker(&mut bytes, ITEM, UNDEFINED_LENGTH);
        short(&mut bytes, Tag(0x0008, 0x1155), b"UI", b"1.2\0");
        marker(&mut bytes, ITEM_DELIMITER, 0);
        marker(&mut bytes, ITEM, 4);
        bytes.extend_from_slice(&[1, 2, 3, 4]);
        marker(&mut bytes, SEQUENCE_DELIMITER, 0);
        short(&mut bytes, tags::SERIES_NUMBER, b"IS", b"7 ");

        let dataset = ElementIndexer.decode(&bytes).unwrap();

        assert_eq!(dataset.int(&bytes, tags::SERIES_NUMBER), Some(7));
        assert!(dataset.element(Tag(0x0008, 0x1155)).is_none(), "nested elements stay unindexed");
    }

    #[test]
    fn implicit_body_after_explicit_meta() {
        let mut bytes = file();
        short(&mut bytes, TRANSFER_SYNTAX_UID, b"UI", b"1.2.840.10008.1.2\0");
        marker(&mut bytes, tags::MODALITY, 2);
        bytes.extend_from_slice(b"MR");

        let dataset = ElementIndexer.decode(&bytes).unwrap();
        assert_eq!(dataset.string(&bytes, tags::MODALITY).as_deref(), Some("MR"));
    }

    #[test]
    fn refuses_big_endian_and_overruns() {
        let mut big = file();
        short(&mut big, TRANSFER_SYNTAX_UID, b"UI", b"1.2.840.10008.1.2.2\0");
        short(&mut big, tags::MODALITY, b"CS", b"MR");
        assert!(ElementIndexer.decode(&big).is_err());

        let mut overrun = file();
        short(&mut overrun, tags::MODALITY, b"CS", b"MR");
        overrun.truncate(overrun.len() - 1);
        assert!(ElementIndexer.decode(&overrun).is_err());
    }
}
