//! # vendor_header: Siemens CSA header decoding
//!
//! Siemens scanners embed two private binary blocks in every image: a
//! series-level header (0029,1020) and an image-level header (0029,1010).
//! Both use the `SV10` tag-table layout decoded here:
//!
//! ```text
//! "SV10" | 4 reserved | tag_count u32 | unused u32
//! per tag:  name[64] | vm u32 | vr[4] | syngodt u32 | item_count u32 | marker u32
//! per item: 4 x u32 (second = payload length) | payload padded to 4 bytes
//! ```
//!
//! The `MrPhoenixProtocol` tag carries a plain-text protocol dump; the part
//! between the ASCCONV markers is parsed into a `key → value` table.

use std::collections::HashMap;

use serde::Serialize;
use tracing::debug;

use crate::cursor::ByteCursor;
use crate::error::DecodeError;

/// Hard cap on the number of tags in one header.
pub const MAX_TAG_COUNT: u32 = 128;

const NAME_LEN: usize = 64;
const ASCCONV_TAG: &str = "MrPhoenixProtocol";
const ASCCONV_BEGIN: &str = "### ASCCONV BEGIN";
const ASCCONV_END: &str = "### ASCCONV END ###";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeaderTag {
    pub name: String,
    pub value_multiplicity: u32,
    pub value_repr: String,
    pub syngodt: u32,
    pub item_count: u32,
    pub marker: u32,
    /// Meaningful items only; trailing padding items are decoded and dropped.
    pub items: Vec<String>,
}

impl HeaderTag {
    pub fn first_item(&self) -> Option<&str> {
        self.items
            .first()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
    }

    /// First item parsed as an integer. CSA stores numbers as text and
    /// sometimes writes integral values with a fractional part.
    pub fn first_int(&self) -> Option<i64> {
        let raw = self.first_item()?;
        raw.parse::<i64>()
            .ok()
            .or_else(|| raw.parse::<f64>().ok().map(|f| f.round() as i64))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VendorHeader {
    pub id: String,
    pub tag_count: u32,
    pub tags: Vec<HeaderTag>,
    pub ascconv: Option<HashMap<String, String>>,
}

impl VendorHeader {
    pub fn tag(&self, name: &str) -> Option<&HeaderTag> {
        self.tags.iter().find(|t| t.name == name)
    }

    pub fn ascconv_value(&self, key: &str) -> Option<&str> {
        self.ascconv
            .as_ref()
            .and_then(|table| table.get(key))
            .map(String::as_str)
    }
}

/// Decodes a complete CSA block.
pub fn decode(bytes: &[u8]) -> Result<VendorHeader, DecodeError> {
    let mut cursor = ByteCursor::new(bytes);
    decode_with(&mut cursor).map_err(|e| match e {
        DecodeError::OutOfBounds { .. } => DecodeError::MalformedHeader(e.to_string()),
        other => other,
    })
}

fn decode_with(cursor: &mut ByteCursor<'_>) -> Result<VendorHeader, DecodeError> {
    let id = cursor.read_fixed_string(4)?;
    cursor.skip(4)?;
    let tag_count = cursor.read_u32_le()?;
    let _unverified = cursor.read_u32_le()?;

    if tag_count > MAX_TAG_COUNT {
        return Err(DecodeError::MalformedHeader(format!(
            "tag count {tag_count} exceeds {MAX_TAG_COUNT}"
        )));
    }

    let mut tags = Vec::with_capacity(tag_count as usize);
    let mut ascconv = None;

    for _ in 0..tag_count {
        let tag = decode_tag(cursor)?;
        if tag.name == ASCCONV_TAG {
            if let Some(text) = tag.items.first() {
                ascconv = extract_ascconv(text).map(parse_ascconv);
            }
        }
        tags.push(tag);
    }

    debug!(id = %id, tag_count, has_ascconv = ascconv.is_some(), "Decoded vendor header");

    Ok(VendorHeader {
        id,
        tag_count,
        tags,
        ascconv,
    })
}

fn decode_tag(cursor: &mut ByteCursor<'_>) -> Result<HeaderTag, DecodeError> {
    let name = cursor.read_fixed_string(NAME_LEN)?;
    let value_multiplicity = cursor.read_u32_le()?;
    let value_repr = cursor.read_fixed_string(4)?;
    let syngodt = cursor.read_u32_le()?;
    let item_count = cursor.read_u32_le()?;
    let marker = cursor.read_u32_le()?;

    let keep = if value_multiplicity == 0 {
        item_count
    } else {
        value_multiplicity.min(item_count)
    } as usize;

    let mut items = Vec::with_capacity(keep);
    for index in 0..item_count as usize {
        cursor.skip(4)?;
        let len = cursor.read_u32_le()? as usize;
        cursor.skip(8)?;
        if len > cursor.remaining() {
            return Err(DecodeError::MalformedHeader(format!(
                "item {index} of tag {name:?} declares {len} bytes, {} remaining",
                cursor.remaining()
            )));
        }
        let payload = cursor.read_fixed_string(len)?;
        if index < keep {
            items.push(payload);
        }
    }

    Ok(HeaderTag {
        name,
        value_multiplicity,
        value_repr,
        syngodt,
        item_count,
        marker,
        items,
    })
}

fn extract_ascconv(text: &str) -> Option<&str> {
    let start = text.find(ASCCONV_BEGIN)? + ASCCONV_BEGIN.len();
    let end = text[start..].find(ASCCONV_END)? + start;
    Some(&text[start..end])
}

/// Parses `key = value` lines. Lines that do not split into exactly two
/// parts on `" = "` are skipped.
pub fn parse_ascconv(text: &str) -> HashMap<String, String> {
    let mut table = HashMap::new();
    for line in text.split('\n') {
        let parts: Vec<&str> = line.split(" = ").collect();
        if let [key, value] = parts.as_slice() {
            table.insert(key.trim().to_string(), value.trim().to_string());
        }
    }
    table
}
