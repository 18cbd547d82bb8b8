#![allow(dead_code)]

use std::path::Path;

/// Explicit-VR little-endian Part 10 file with a transfer syntax meta
/// element and the identifiers the grouping reads.
pub fn dicom_file(study: &str, series_uid: &str, series: u32, instance: u32) -> Vec<u8> {
    let mut bytes = vec![0u8; 128];
    bytes.extend_from_slice(b"DICM");
    element(&mut bytes, (0x0002, 0x0010), b"UI", "1.2.840.10008.1.2.1");
    element(&mut bytes, (0x0008, 0x0060), b"CS", "MR");
    element(&mut bytes, (0x0008, 0x103E), b"LO", "t1_mprage");
    element(&mut bytes, (0x0010, 0x0010), b"PN", "DOE^JOHN");
    element(&mut bytes, (0x0010, 0x0030), b"DA", "19990203");
    element(&mut bytes, (0x0020, 0x000D), b"UI", study);
    element(&mut bytes, (0x0020, 0x000E), b"UI", series_uid);
    element(&mut bytes, (0x0020, 0x0011), b"IS", &series.to_string());
    element(&mut bytes, (0x0020, 0x0012), b"IS", "1");
    element(&mut bytes, (0x0020, 0x0013), b"IS", &instance.to_string());
    bytes
}

fn element(bytes: &mut Vec<u8>, tag: (u16, u16), vr: &[u8; 2], value: &str) {
    let mut value = value.as_bytes().to_vec();
    if value.len() % 2 == 1 {
        value.push(if vr == b"UI" { 0 } else { b' ' });
    }
    bytes.extend_from_slice(&tag.0.to_le_bytes());
    bytes.extend_from_slice(&tag.1.to_le_bytes());
    bytes.extend_from_slice(vr);
    bytes.extend_from_slice(&(value.len() as u16).to_le_bytes());
    bytes.extend_from_slice(&value);
}

/// Two series (3 + 2 files) plus one stray text file under `root`.
pub fn write_study(root: &Path) {
    let a = root.join("series-a");
    let b = root.join("nested").join("series-b");
    std::fs::create_dir_all(&a).unwrap();
    std::fs::create_dir_all(&b).unwrap();
    for i in 1..=3 {
        std::fs::write(a.join(format!("a{i}.dcm")), dicom_file("1.2.9", "1.2.9.1", 1, i)).unwrap();
    }
    for i in 1..=2 {
        std::fs::write(b.join(format!("b{i}.dcm")), dicom_file("1.2.9", "1.2.9.2", 2, i)).unwrap();
    }
    std::fs::write(root.join("README.txt"), b"not an image").unwrap();
}

pub const SERIES_A: &str = "1.2.9_1_1_1.2.9.1";
pub const SERIES_B: &str = "1.2.9_2_1_1.2.9.2";
