//
// analyze.rs
// dicom-components
//
// Read-only inspection of DICOM files: compression classification, per-element byte sizes, and
// strict file-to-file comparison used to verify round trips.
//
// Thales Matheus Mendonça Santos - November 2025

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use dicom::core::{Tag, VR};
use tracing::debug;

use crate::codec::{self, Part10File};
use crate::dataset::{vr_code, DataElement};
use crate::error::Result;
use crate::models::{
    CompressionInfo, ComparisonResult, SizeCategory, TagSize, TagSizeReport, ValueDifference,
};
use crate::syntax;
use crate::tags::{self, format_tag, tag_name};

const PREVIEW_LEN: usize = 64;

pub fn analyze_compression(path: &Path) -> Result<CompressionInfo> {
    let file = codec::read_file(path)?;
    Ok(compression_info(&file))
}

/// Compression figures for an already parsed file.
pub fn compression_info(file: &Part10File) -> CompressionInfo {
    let ds = &file.dataset;
    let rows = ds.uint(tags::ROWS).unwrap_or(0);
    let columns = ds.uint(tags::COLUMNS).unwrap_or(0);
    let samples_per_pixel = ds.uint(tags::SAMPLES_PER_PIXEL).unwrap_or(1);
    let bits_allocated = ds.uint(tags::BITS_ALLOCATED).unwrap_or(0);
    let number_of_frames = ds.uint(tags::NUMBER_OF_FRAMES).unwrap_or(1).max(1);

    let uid = &file.transfer_syntax_uid;
    let is_compressed = syntax::is_compressed(uid);
    let compressed_size = file.pixel.as_ref().map(|p| p.bytes.len() as u64).unwrap_or(0);
    let theoretical_uncompressed_size = theoretical_size(
        rows,
        columns,
        samples_per_pixel,
        bits_allocated,
        number_of_frames,
    );
    let compression_ratio = if is_compressed && compressed_size > 0 {
        theoretical_uncompressed_size as f64 / compressed_size as f64
    } else {
        1.0
    };

    CompressionInfo {
        transfer_syntax_uid: syntax::normalize_uid(uid).to_string(),
        compression_type: syntax::compression_type(uid),
        is_compressed,
        compressed_size,
        theoretical_uncompressed_size,
        compression_ratio,
        rows,
        columns,
        samples_per_pixel,
        bits_allocated,
        number_of_frames,
        file_size: file.file_size,
    }
}

/// Native pixel byte count before even-length padding. Bit-packed (1-bit) data rounds up.
pub fn theoretical_size(
    rows: u64,
    columns: u64,
    samples_per_pixel: u64,
    bits_allocated: u64,
    frames: u64,
) -> u64 {
    let bits = rows
        .saturating_mul(columns)
        .saturating_mul(samples_per_pixel)
        .saturating_mul(frames)
        .saturating_mul(bits_allocated);
    bits.div_ceil(8)
}

fn size_category(tag: Tag, vr: VR) -> SizeCategory {
    if tag == tags::PIXEL_DATA {
        SizeCategory::PixelData
    } else if tags::is_private(tag) {
        SizeCategory::Private
    } else if vr == VR::SQ {
        SizeCategory::Sequence
    } else if matches!(
        vr,
        VR::OB | VR::OD | VR::OF | VR::OL | VR::OV | VR::OW | VR::UN
    ) {
        SizeCategory::Binary
    } else {
        SizeCategory::Standard
    }
}

pub fn analyze_tag_sizes(path: &Path) -> Result<TagSizeReport> {
    let file = codec::read_file(path)?;
    let mut category_sizes: BTreeMap<SizeCategory, u64> = BTreeMap::new();
    let entries: Vec<TagSize> = file
        .layout
        .iter()
        .map(|span| {
            let category = size_category(span.tag, span.vr);
            let byte_size = span.encoded_len() as u64;
            *category_sizes.entry(category).or_default() += byte_size;
            TagSize {
                tag: format_tag(span.tag),
                name: tag_name(span.tag),
                vr: vr_code(span.vr),
                category,
                byte_size,
            }
        })
        .collect();
    let attributed: u64 = entries.iter().map(|e| e.byte_size).sum();

    Ok(TagSizeReport {
        file_path: path.to_path_buf(),
        file_size: file.file_size,
        entries,
        category_sizes,
        overhead: file.file_size.saturating_sub(attributed),
    })
}

/// Every element of a file except Pixel Data: File Meta group first, then the data set.
fn all_elements(file: &Part10File) -> BTreeMap<Tag, &DataElement> {
    file.meta
        .elements()
        .iter()
        .chain(file.dataset.iter())
        .map(|e| (e.tag, e))
        .collect()
}

fn tag_set(file: &Part10File, elements: &BTreeMap<Tag, &DataElement>) -> BTreeSet<Tag> {
    let mut set: BTreeSet<Tag> = elements.keys().copied().collect();
    if file.pixel.is_some() {
        set.insert(tags::PIXEL_DATA);
    }
    set
}

fn render(element: &DataElement) -> String {
    format!("{} {}", element.vr, element.value.preview(PREVIEW_LEN))
}

fn values_match(a: &DataElement, b: &DataElement) -> bool {
    a.vr == b.vr && a.undefined_length == b.undefined_length && a.value.strict_eq(&b.value)
}

/// Strict comparison of two files. Values compare exactly; only trailing text padding is ignored.
pub fn compare(original: &Path, other: &Path) -> Result<ComparisonResult> {
    let a = codec::read_file(original)?;
    let b = codec::read_file(other)?;
    let a_elements = all_elements(&a);
    let b_elements = all_elements(&b);
    let a_tags = tag_set(&a, &a_elements);
    let b_tags = tag_set(&b, &b_elements);

    let missing_tags: Vec<String> = a_tags.difference(&b_tags).map(|t| format_tag(*t)).collect();
    let extra_tags: Vec<String> = b_tags.difference(&a_tags).map(|t| format_tag(*t)).collect();

    let value_differences: Vec<ValueDifference> = a_elements
        .iter()
        .filter_map(|(tag, ea)| {
            let eb = b_elements.get(tag)?;
            if values_match(ea, eb) {
                return None;
            }
            Some(ValueDifference {
                tag: format_tag(*tag),
                name: tag_name(*tag),
                original: render(ea),
                other: render(eb),
            })
        })
        .collect();

    let pixel_data_identical = match (&a.pixel, &b.pixel) {
        (Some(pa), Some(pb)) => pa.bytes == pb.bytes && pa.undefined_length == pb.undefined_length,
        (None, None) => true,
        _ => false,
    };
    let is_identical = missing_tags.is_empty()
        && extra_tags.is_empty()
        && value_differences.is_empty()
        && pixel_data_identical;

    debug!(
        original = %original.display(),
        other = %other.display(),
        missing = missing_tags.len(),
        extra = extra_tags.len(),
        differences = value_differences.len(),
        pixel_data_identical,
        "compared files"
    );

    Ok(ComparisonResult {
        original_file: original.to_path_buf(),
        other_file: other.to_path_buf(),
        original_size: a.file_size,
        other_size: b.file_size,
        missing_tags,
        extra_tags,
        value_differences,
        pixel_data_identical,
        is_identical,
    })
}
