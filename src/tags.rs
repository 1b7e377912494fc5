//
// tags.rs
// dicom-components
//
// Well-known tags, tag formatting, and standard dictionary lookups (keywords, implicit VRs).
//
// Thales Matheus Mendonça Santos - November 2025

use dicom::core::dictionary::DataDictionary;
use dicom::core::{Tag, VR};
use dicom::dictionary_std::StandardDataDictionary;

// File Meta group
pub const FILE_META_GROUP_LENGTH: Tag = Tag(0x0002, 0x0000);
pub const FILE_META_INFORMATION_VERSION: Tag = Tag(0x0002, 0x0001);
pub const MEDIA_STORAGE_SOP_CLASS_UID: Tag = Tag(0x0002, 0x0002);
pub const MEDIA_STORAGE_SOP_INSTANCE_UID: Tag = Tag(0x0002, 0x0003);
pub const TRANSFER_SYNTAX_UID: Tag = Tag(0x0002, 0x0010);
pub const IMPLEMENTATION_CLASS_UID: Tag = Tag(0x0002, 0x0012);

pub const SPECIFIC_CHARACTER_SET: Tag = Tag(0x0008, 0x0005);
pub const SOP_CLASS_UID: Tag = Tag(0x0008, 0x0016);
pub const SOP_INSTANCE_UID: Tag = Tag(0x0008, 0x0018);
pub const STUDY_INSTANCE_UID: Tag = Tag(0x0020, 0x000D);
pub const SERIES_INSTANCE_UID: Tag = Tag(0x0020, 0x000E);
pub const FRAME_OF_REFERENCE_UID: Tag = Tag(0x0020, 0x0052);

// Image Pixel module
pub const SAMPLES_PER_PIXEL: Tag = Tag(0x0028, 0x0002);
pub const PHOTOMETRIC_INTERPRETATION: Tag = Tag(0x0028, 0x0004);
pub const PLANAR_CONFIGURATION: Tag = Tag(0x0028, 0x0006);
pub const NUMBER_OF_FRAMES: Tag = Tag(0x0028, 0x0008);
pub const ROWS: Tag = Tag(0x0028, 0x0010);
pub const COLUMNS: Tag = Tag(0x0028, 0x0011);
pub const BITS_ALLOCATED: Tag = Tag(0x0028, 0x0100);
pub const BITS_STORED: Tag = Tag(0x0028, 0x0101);
pub const HIGH_BIT: Tag = Tag(0x0028, 0x0102);
pub const PIXEL_REPRESENTATION: Tag = Tag(0x0028, 0x0103);
pub const RESCALE_INTERCEPT: Tag = Tag(0x0028, 0x1052);
pub const RESCALE_SLOPE: Tag = Tag(0x0028, 0x1053);
pub const RESCALE_TYPE: Tag = Tag(0x0028, 0x1054);

pub const ICON_IMAGE_SEQUENCE: Tag = Tag(0x0088, 0x0200);
pub const PIXEL_DATA: Tag = Tag(0x7FE0, 0x0010);

// Item and delimitation tags used inside sequences and encapsulated pixel data.
pub const ITEM: Tag = Tag(0xFFFE, 0xE000);
pub const ITEM_DELIMITATION: Tag = Tag(0xFFFE, 0xE00D);
pub const SEQUENCE_DELIMITATION: Tag = Tag(0xFFFE, 0xE0DD);

/// `(GGGG,EEEE)`, the form used in logs and error messages.
pub fn format_tag(tag: Tag) -> String {
    format!("({:04X},{:04X})", tag.group(), tag.element())
}

/// `GGGGEEEE`, the key form used in the metadata document.
pub fn tag_key(tag: Tag) -> String {
    format!("{:04X}{:04X}", tag.group(), tag.element())
}

/// Parse a `GGGGEEEE` key back into a tag.
pub fn parse_tag_key(key: &str) -> Option<Tag> {
    if key.len() != 8 || !key.is_ascii() {
        return None;
    }
    let group = u16::from_str_radix(&key[..4], 16).ok()?;
    let element = u16::from_str_radix(&key[4..], 16).ok()?;
    Some(Tag(group, element))
}

pub fn is_private(tag: Tag) -> bool {
    tag.group() % 2 == 1
}

/// Dictionary keyword, if the standard dictionary knows the tag.
pub fn keyword(tag: Tag) -> Option<String> {
    StandardDataDictionary
        .by_tag(tag)
        .map(|e| e.alias.to_string())
}

pub fn tag_name(tag: Tag) -> String {
    keyword(tag).unwrap_or_else(|| {
        if is_private(tag) {
            "PrivateTag".to_string()
        } else {
            "UnknownTag".to_string()
        }
    })
}

/// VR of an element read from an implicit VR stream.
pub fn implicit_vr(tag: Tag) -> VR {
    if tag.element() == 0x0000 {
        return VR::UL;
    }
    if tag == PIXEL_DATA {
        return VR::OW;
    }
    if is_private(tag) {
        // Private creator elements are always LO.
        return if (0x0010..=0x00FF).contains(&tag.element()) {
            VR::LO
        } else {
            VR::UN
        };
    }
    StandardDataDictionary
        .by_tag(tag)
        .map(|entry| entry.vr.relaxed())
        .unwrap_or(VR::UN)
}
