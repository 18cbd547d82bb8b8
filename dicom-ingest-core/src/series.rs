//! # series: grouping key and completeness estimate per file
//!
//! Each manufacturer groups and counts its images differently, so the
//! resolver is a closed set of [`Vendor`] variants selected by the
//! Manufacturer element. Every variant answers the same question: which
//! series does this file belong to, and how many files should that series
//! have?
//!
//! - [`Vendor::Ge`] reads the private "locations in acquisition" element and
//!   multiplies by the number of temporal positions.
//! - [`Vendor::Siemens`] decodes both CSA headers. Mosaics report how many
//!   images each file packs; everything else reads the slice layout from
//!   the series ASCCONV table.
//! - [`Vendor::Other`] groups by identifiers only and never estimates.
//!
//! Resolution is pure: merging into series state happens in the
//! orchestrator.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::dataset::{tags, Dataset};
use crate::vendor_header::{self, VendorHeader};

/// Opaque grouping key; equal keys mean the same acquisition.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SeriesKey(pub String);

impl fmt::Display for SeriesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity and geometry fields read from the outer envelope.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FileMetadata {
    pub study_instance_uid: String,
    pub series_instance_uid: String,
    pub series_number: Option<i64>,
    pub acquisition_number: Option<i64>,
    pub echo_number: Option<i64>,
    pub manufacturer: Option<String>,
    pub modality: Option<String>,
    pub series_description: Option<String>,
    pub images_in_acquisition: Option<i64>,
    pub temporal_positions: Option<i64>,
    pub slice_thickness: Option<f64>,
}

impl FileMetadata {
    pub fn from_dataset(content: &[u8], dataset: &Dataset) -> Self {
        Self {
            study_instance_uid: dataset
                .string(content, tags::STUDY_INSTANCE_UID)
                .unwrap_or_default(),
            series_instance_uid: dataset
                .string(content, tags::SERIES_INSTANCE_UID)
                .unwrap_or_default(),
            series_number: dataset.int(content, tags::SERIES_NUMBER),
            acquisition_number: dataset.int(content, tags::ACQUISITION_NUMBER),
            echo_number: dataset.int(content, tags::ECHO_NUMBERS),
            manufacturer: dataset.string(content, tags::MANUFACTURER),
            modality: dataset.string(content, tags::MODALITY),
            series_description: dataset.string(content, tags::SERIES_DESCRIPTION),
            images_in_acquisition: dataset.int(content, tags::IMAGES_IN_ACQUISITION),
            temporal_positions: dataset.int(content, tags::TEMPORAL_POSITIONS),
            slice_thickness: dataset.decimal(content, tags::SLICE_THICKNESS),
        }
    }

    fn key(&self, with_acquisition: bool) -> SeriesKey {
        let number = |n: Option<i64>| n.map(|v| v.to_string()).unwrap_or_default();
        let parts = if with_acquisition {
            vec![
                self.study_instance_uid.clone(),
                number(self.series_number),
                number(self.acquisition_number),
                self.series_instance_uid.clone(),
            ]
        } else {
            vec![
                self.study_instance_uid.clone(),
                number(self.series_number),
                self.series_instance_uid.clone(),
            ]
        };
        SeriesKey(parts.join("_"))
    }
}

/// Resolver output for one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub key: SeriesKey,
    /// Expected number of files in the series, when derivable.
    pub expected_count: Option<u32>,
    /// Images packed into each file (Siemens mosaics only).
    pub images_per_file: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Vendor {
    Ge,
    Siemens,
    Other,
}

impl Vendor {
    pub fn from_manufacturer(manufacturer: Option<&str>) -> Self {
        let Some(name) = manufacturer else {
            return Vendor::Other;
        };
        let upper = name.trim().to_ascii_uppercase();
        if upper.contains("SIEMENS") {
            Vendor::Siemens
        } else if upper == "GE"
            || upper.starts_with("GE ")
            || upper.contains("GE MEDICAL")
            || upper.contains("GE HEALTHCARE")
        {
            Vendor::Ge
        } else {
            Vendor::Other
        }
    }

    pub fn resolve(&self, meta: &FileMetadata, content: &[u8], dataset: &Dataset) -> Resolution {
        match self {
            Vendor::Ge => resolve_ge(meta, content, dataset),
            Vendor::Siemens => resolve_siemens(meta, content, dataset),
            Vendor::Other => Resolution {
                key: meta.key(true),
                expected_count: None,
                images_per_file: None,
            },
        }
    }
}

/// Picks the vendor from the Manufacturer element and resolves.
pub fn resolve(meta: &FileMetadata, content: &[u8], dataset: &Dataset) -> Resolution {
    let vendor = Vendor::from_manufacturer(meta.manufacturer.as_deref());
    let resolution = vendor.resolve(meta, content, dataset);
    debug!(
        ?vendor,
        key = %resolution.key,
        expected = ?resolution.expected_count,
        images_per_file = ?resolution.images_per_file,
        "Resolved series key"
    );
    resolution
}

fn resolve_ge(meta: &FileMetadata, content: &[u8], dataset: &Dataset) -> Resolution {
    let slices_per_volume = dataset
        .bytes(content, tags::GE_LOCATIONS_IN_ACQUISITION)
        .filter(|b| b.len() >= 2)
        .map(|b| b[0] as u32 + 256 * b[1] as u32);

    Resolution {
        key: meta.key(true),
        expected_count: slices_per_volume.and_then(|slices| {
            ge_expected_count(slices, meta.temporal_positions, meta.images_in_acquisition)
        }),
        images_per_file: None,
    }
}

/// `slices × temporal positions`. Unknown temporal positions fall back to
/// `images_in_acquisition / slices` using integer division, which silently
/// truncates when the acquisition is not a whole number of volumes. Counts
/// too large for `u32` leave the estimate unknown.
pub fn ge_expected_count(
    slices_per_volume: u32,
    temporal_positions: Option<i64>,
    images_in_acquisition: Option<i64>,
) -> Option<u32> {
    if slices_per_volume == 0 {
        return None;
    }
    let temporal = match temporal_positions.filter(|&t| t > 0) {
        Some(t) => u32::try_from(t).ok()?,
        None => {
            let images = u32::try_from(images_in_acquisition.unwrap_or(0).max(0)).ok()?;
            match images / slices_per_volume {
                0 => 1,
                t => t,
            }
        }
    };
    slices_per_volume.checked_mul(temporal)
}

const MOSAIC_TAG: &str = "NumberOfImagesInMosaic";

fn resolve_siemens(meta: &FileMetadata, content: &[u8], dataset: &Dataset) -> Resolution {
    let image_header = decode_csa(content, dataset, tags::SIEMENS_CSA_IMAGE_HEADER, "image");
    let series_header = decode_csa(content, dataset, tags::SIEMENS_CSA_SERIES_HEADER, "series");

    let mosaic_images = image_header
        .as_ref()
        .and_then(|h| h.tag(MOSAIC_TAG))
        .and_then(|t| t.first_int())
        .filter(|&n| n > 0);

    if let Some(images) = mosaic_images {
        return Resolution {
            key: meta.key(false),
            expected_count: None,
            images_per_file: u32::try_from(images).ok(),
        };
    }

    Resolution {
        key: meta.key(true),
        expected_count: series_header
            .as_ref()
            .and_then(|h| siemens_slice_count(h, meta.slice_thickness)),
        images_per_file: None,
    }
}

fn decode_csa(
    content: &[u8],
    dataset: &Dataset,
    tag: crate::dataset::Tag,
    header_level: &'static str,
) -> Option<VendorHeader> {
    let bytes = dataset.bytes(content, tag)?;
    match vendor_header::decode(bytes) {
        Ok(header) => Some(header),
        Err(e) => {
            warn!(header_level, %tag, error = %e, "Vendor header unusable, completeness unknown");
            None
        }
    }
}

/// Slice count for a non-mosaic Siemens acquisition.
///
/// 2-D acquisitions list their slices in `sSliceArray.lSize`. Anything
/// else, including a protocol without `sKSpace.ucDimension`, is treated as
/// a slab divided into partitions of the outer slice thickness.
pub fn siemens_slice_count(series: &VendorHeader, slice_thickness: Option<f64>) -> Option<u32> {
    let two_d = series
        .ascconv_value("sKSpace.ucDimension")
        .and_then(parse_ascconv_int)
        == Some(2);

    let count = if two_d {
        series
            .ascconv_value("sSliceArray.lSize")
            .and_then(parse_ascconv_int)?
    } else {
        let total: f64 = series
            .ascconv_value("sSliceArray.asSlice[0].dThickness")?
            .parse()
            .ok()?;
        let single = slice_thickness.filter(|&t| t > 0.0)?;
        (total / single).round() as i64
    };

    u32::try_from(count).ok().filter(|&n| n > 0)
}

fn parse_ascconv_int(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    match raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        Some(hex) => i64::from_str_radix(hex, 16).ok(),
        None => raw.parse().ok(),
    }
}
