//
// syntax.rs
// dicom-components
//
// Maps transfer syntax UIDs to data set encodings and classifies them as compressed or not.
//
// Thales Matheus Mendonça Santos - November 2025

use dicom::encoding::TransferSyntaxIndex;
use dicom::transfer_syntax::entries::{
    EXPLICIT_VR_BIG_ENDIAN, EXPLICIT_VR_LITTLE_ENDIAN, IMPLICIT_VR_LITTLE_ENDIAN,
};
use dicom::transfer_syntax::TransferSyntaxRegistry;

use crate::dataset::ByteOrder;

pub const DEFLATED_EXPLICIT_VR_LITTLE_ENDIAN_UID: &str = "1.2.840.10008.1.2.1.99";

/// The only syntaxes whose Pixel Data is stored natively.
pub fn uncompressed_uids() -> [&'static str; 3] {
    [
        IMPLICIT_VR_LITTLE_ENDIAN.uid(),
        EXPLICIT_VR_LITTLE_ENDIAN.uid(),
        EXPLICIT_VR_BIG_ENDIAN.uid(),
    ]
}

const KNOWN_NAMES: &[(&str, &str)] = &[
    ("1.2.840.10008.1.2", "Implicit VR Little Endian (Uncompressed)"),
    ("1.2.840.10008.1.2.1", "Explicit VR Little Endian (Uncompressed)"),
    ("1.2.840.10008.1.2.2", "Explicit VR Big Endian (Uncompressed)"),
    ("1.2.840.10008.1.2.4.50", "JPEG Baseline (Process 1)"),
    ("1.2.840.10008.1.2.4.51", "JPEG Extended (Process 2 & 4)"),
    ("1.2.840.10008.1.2.4.57", "JPEG Lossless, Non-Hierarchical (Process 14)"),
    (
        "1.2.840.10008.1.2.4.70",
        "JPEG Lossless, Non-Hierarchical, First-Order Prediction",
    ),
    ("1.2.840.10008.1.2.4.80", "JPEG-LS Lossless"),
    ("1.2.840.10008.1.2.4.81", "JPEG-LS Lossy (Near-Lossless)"),
    ("1.2.840.10008.1.2.4.90", "JPEG 2000 Lossless"),
    ("1.2.840.10008.1.2.4.91", "JPEG 2000 Lossy"),
    ("1.2.840.10008.1.2.5", "RLE Lossless"),
];

/// UIDs are stored NUL padded; comparisons use the bare form.
pub fn normalize_uid(uid: &str) -> &str {
    uid.trim_matches(|c: char| c == '\0' || c.is_whitespace())
}

pub fn is_compressed(uid: &str) -> bool {
    !uncompressed_uids().contains(&normalize_uid(uid))
}

pub fn compression_type(uid: &str) -> String {
    let uid = normalize_uid(uid);
    if let Some((_, name)) = KNOWN_NAMES.iter().find(|(known, _)| *known == uid) {
        return name.to_string();
    }
    TransferSyntaxRegistry
        .get(uid)
        .map(|ts| ts.name().to_string())
        .unwrap_or_else(|| format!("Unknown ({})", uid))
}

/// How the data set following the File Meta group is encoded.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Encoding {
    pub explicit_vr: bool,
    pub byte_order: ByteOrder,
}

impl Encoding {
    /// Always used for the File Meta group.
    pub const EXPLICIT_LE: Encoding = Encoding {
        explicit_vr: true,
        byte_order: ByteOrder::Little,
    };
    pub const IMPLICIT_LE: Encoding = Encoding {
        explicit_vr: false,
        byte_order: ByteOrder::Little,
    };
    pub const EXPLICIT_BE: Encoding = Encoding {
        explicit_vr: true,
        byte_order: ByteOrder::Big,
    };

    /// `None` for deflated data sets, which are not walked.
    pub fn for_transfer_syntax(uid: &str) -> Option<Encoding> {
        let uid = normalize_uid(uid);
        if uid == IMPLICIT_VR_LITTLE_ENDIAN.uid() {
            Some(Encoding::IMPLICIT_LE)
        } else if uid == EXPLICIT_VR_BIG_ENDIAN.uid() {
            Some(Encoding::EXPLICIT_BE)
        } else if uid == DEFLATED_EXPLICIT_VR_LITTLE_ENDIAN_UID {
            None
        } else {
            // Every encapsulated syntax uses explicit VR little endian.
            Some(Encoding::EXPLICIT_LE)
        }
    }

    pub fn is_little_endian(&self) -> bool {
        self.byte_order == ByteOrder::Little
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_uses_the_three_native_syntaxes() {
        assert!(!is_compressed("1.2.840.10008.1.2"));
        assert!(!is_compressed("1.2.840.10008.1.2.1\0"));
        assert!(!is_compressed("1.2.840.10008.1.2.2"));
        assert!(is_compressed("1.2.840.10008.1.2.4.50"));
        assert!(is_compressed("1.2.840.10008.1.2.5"));
    }

    #[test]
    fn names_fall_back_to_unknown() {
        assert_eq!(compression_type("1.2.840.10008.1.2.4.90"), "JPEG 2000 Lossless");
        assert_eq!(compression_type("1.2.3.4"), "Unknown (1.2.3.4)");
    }

    #[test]
    fn encodings() {
        assert_eq!(
            Encoding::for_transfer_syntax("1.2.840.10008.1.2"),
            Some(Encoding::IMPLICIT_LE)
        );
        assert_eq!(
            Encoding::for_transfer_syntax("1.2.840.10008.1.2.2"),
            Some(Encoding::EXPLICIT_BE)
        );
        assert_eq!(
            Encoding::for_transfer_syntax("1.2.840.10008.1.2.4.70"),
            Some(Encoding::EXPLICIT_LE)
        );
        assert_eq!(
            Encoding::for_transfer_syntax(DEFLATED_EXPLICIT_VR_LITTLE_ENDIAN_UID),
            None
        );
    }
}
