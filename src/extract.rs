//
// extract.rs
// dicom-components
//
// Splits a DICOM file into a JSON metadata document and a separately stored Pixel Data artifact.
// The extraction mode decides which data set elements the document keeps.
//
// Thales Matheus Mendonça Santos - November 2025

use std::collections::BTreeMap;
use std::path::Path;

use dicom::core::{Tag, VR};
use tracing::{debug, info, warn};

use crate::analyze;
use crate::batch;
use crate::codec::{self, Part10File, PixelElement};
use crate::dataset::{vr_code, DataElement, DataSet, ElementValue};
use crate::error::{Error, Result};
use crate::models::{
    CompressionInfo, ElementRecord, EncodingInfo, ExtractedFile, ExtractionMode, ExtractionSummary,
    FileInfo, MetadataDocument, PixelDataInfo, PixelFormat, PrivateTag, SequenceEntry,
    SequenceItem,
};
use crate::pixels::{self, PixelEnvelope};
use crate::storage::{self, OutputDir};
use crate::syntax::{self, Encoding};
use crate::tags::{self, format_tag, tag_key};

/// Groups of data set elements that extraction modes select from.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum TagCategory {
    /// Identity and image geometry; enough to rebuild a readable image.
    Structural,
    /// Any other non-bulk element.
    Descriptive,
    /// Binary payloads and icon images.
    Bulk,
}

const STRUCTURAL_TAGS: &[Tag] = &[
    tags::SPECIFIC_CHARACTER_SET,
    tags::SOP_CLASS_UID,
    tags::SOP_INSTANCE_UID,
    tags::STUDY_INSTANCE_UID,
    tags::SERIES_INSTANCE_UID,
    tags::FRAME_OF_REFERENCE_UID,
    tags::SAMPLES_PER_PIXEL,
    tags::PHOTOMETRIC_INTERPRETATION,
    tags::PLANAR_CONFIGURATION,
    tags::NUMBER_OF_FRAMES,
    tags::ROWS,
    tags::COLUMNS,
    tags::BITS_ALLOCATED,
    tags::BITS_STORED,
    tags::HIGH_BIT,
    tags::PIXEL_REPRESENTATION,
    tags::RESCALE_INTERCEPT,
    tags::RESCALE_SLOPE,
    tags::RESCALE_TYPE,
];

impl ExtractionMode {
    /// Categories retained by this mode. Each mode's list extends the previous one.
    pub fn categories(self) -> &'static [TagCategory] {
        match self {
            ExtractionMode::Minimal => &[TagCategory::Structural],
            ExtractionMode::Standard => &[TagCategory::Structural, TagCategory::Descriptive],
            ExtractionMode::Full => &[
                TagCategory::Structural,
                TagCategory::Descriptive,
                TagCategory::Bulk,
            ],
        }
    }

    pub fn retains(self, element: &DataElement) -> bool {
        self.categories().contains(&classify(element))
    }
}

pub fn classify(element: &DataElement) -> TagCategory {
    if STRUCTURAL_TAGS.contains(&element.tag) {
        TagCategory::Structural
    } else if element.tag == tags::ICON_IMAGE_SEQUENCE
        || matches!(
            element.vr,
            VR::OB | VR::OD | VR::OF | VR::OL | VR::OV | VR::OW | VR::UN
        )
    {
        TagCategory::Bulk
    } else {
        TagCategory::Descriptive
    }
}

/// Extract one file, or every `*.dcm` file directly inside a directory.
///
/// A single file propagates its error; a directory sweep records per-file failures instead.
pub fn extract(
    source: &Path,
    output_dir: &Path,
    mode: ExtractionMode,
    format: PixelFormat,
) -> Result<ExtractionSummary> {
    if source.is_dir() {
        return batch::extract_directory(source, output_dir, mode, format);
    }
    let extracted = extract_file(source, output_dir, mode, format)?;
    Ok(ExtractionSummary {
        extracted: vec![extracted],
        failures: Vec::new(),
    })
}

pub fn extract_file(
    source: &Path,
    output_dir: &Path,
    mode: ExtractionMode,
    format: PixelFormat,
) -> Result<ExtractedFile> {
    let file = codec::read_file(source)?;
    let pixel = file.pixel.as_ref().ok_or_else(|| Error::NoPixelData {
        path: source.to_path_buf(),
    })?;
    let out = OutputDir::new(output_dir)?;
    let metadata_path = out.derived_path(source, "metadata", "json");
    let pixel_path = out.derived_path(source, "pixels", format.extension());

    let compression = analyze::compression_info(&file);
    let mut retained = file.dataset.clone();
    retained.retain(|e| mode.retains(e));
    let dropped_tags = file.dataset.len() - retained.len();
    debug!(
        file = %source.display(),
        %mode,
        retained = retained.len(),
        dropped = dropped_tags,
        "applied extraction mode"
    );

    let artifact = match format {
        PixelFormat::Raw => pixel.bytes.clone(),
        PixelFormat::Pickle => {
            pixels::encode_envelope(&envelope_for(pixel, &compression), &pixel_path)?
        }
    };
    let document = MetadataDocument {
        file_meta: records(file.meta.elements()),
        data_elements: records(&retained),
        sequences: sequence_data(&file, &retained),
        private_tags: private_tags(&file, &retained),
        pixel_data: pixel_info(&file, pixel),
        compression: compression.clone(),
        encoding: encoding_info(&file, mode),
        file: FileInfo {
            file_name: file_name(source),
            file_size: file.file_size,
            extraction_mode: mode,
            pixel_format: format,
            pixel_file: file_name(&pixel_path),
        },
    };
    let mut json = serde_json::to_vec_pretty(&document).map_err(|e| Error::Json {
        path: metadata_path.clone(),
        source: e,
    })?;
    json.push(b'\n');

    storage::write_atomic(&pixel_path, &artifact)?;
    storage::write_atomic(&metadata_path, &json)?;

    info!(
        file = %source.display(),
        metadata = %metadata_path.display(),
        pixels = %pixel_path.display(),
        bytes = pixel.bytes.len(),
        "extracted"
    );

    Ok(ExtractedFile {
        source: source.to_path_buf(),
        metadata_path,
        pixel_path,
        retained_tags: retained.len(),
        dropped_tags,
        compression,
    })
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn record(element: &DataElement) -> ElementRecord {
    ElementRecord {
        tag: [element.tag.group(), element.tag.element()],
        vr: vr_code(element.vr),
        keyword: tags::keyword(element.tag),
        value: element.value.clone(),
        undefined_length: element.undefined_length,
    }
}

fn records(set: &DataSet) -> BTreeMap<String, ElementRecord> {
    set.iter().map(|e| (tag_key(e.tag), record(e))).collect()
}

fn holds_items(element: &DataElement) -> bool {
    element.vr == VR::SQ || (element.vr == VR::UN && element.undefined_length)
}

/// Structured view of every retained sequence. A sequence whose items cannot be walked is
/// left out; its raw bytes in `DataElements` are what recombination uses.
fn sequence_data(file: &Part10File, set: &DataSet) -> BTreeMap<String, Vec<SequenceItem>> {
    let mut sequences = BTreeMap::new();
    for element in set.iter().filter(|e| holds_items(e)) {
        match render_items(element, file.encoding, &file.path) {
            Ok(items) => {
                sequences.insert(tag_key(element.tag), items);
            }
            Err(err) => warn!(
                file = %file.path.display(),
                tag = %format_tag(element.tag),
                error = %err,
                "sequence items left out of SequenceData"
            ),
        }
    }
    sequences
}

fn render_items(element: &DataElement, enc: Encoding, path: &Path) -> Result<Vec<SequenceItem>> {
    let enc = if element.vr == VR::UN {
        Encoding::IMPLICIT_LE
    } else {
        enc
    };
    let ElementValue::Bytes(bytes) = &element.value else {
        return Ok(Vec::new());
    };
    codec::sequence_items(bytes, enc, element.tag, path)?
        .iter()
        .map(|item| {
            item.iter()
                .map(|e| Ok((tag_key(e.tag), sequence_entry(e, enc, path)?)))
                .collect::<Result<SequenceItem>>()
        })
        .collect()
}

fn sequence_entry(element: &DataElement, enc: Encoding, path: &Path) -> Result<SequenceEntry> {
    let mut entry = SequenceEntry {
        tag: [element.tag.group(), element.tag.element()],
        vr: vr_code(element.vr),
        keyword: tags::keyword(element.tag),
        value: None,
        binary_length: None,
        items: Vec::new(),
    };
    if holds_items(element) {
        entry.items = render_items(element, enc, path)?;
    } else if let ElementValue::Bytes(bytes) = &element.value {
        entry.binary_length = Some(bytes.len() as u64);
    } else {
        entry.value = Some(element.value.clone());
    }
    Ok(entry)
}

/// Retained private elements with their creator and encoded value length.
fn private_tags(file: &Part10File, set: &DataSet) -> BTreeMap<String, PrivateTag> {
    let lengths: BTreeMap<Tag, usize> = file
        .layout
        .iter()
        .map(|span| (span.tag, span.value_len))
        .collect();
    set.iter()
        .filter(|e| tags::is_private(e.tag))
        .map(|e| {
            let entry = PrivateTag {
                tag: [e.tag.group(), e.tag.element()],
                vr: vr_code(e.vr),
                creator: private_creator(&file.dataset, e.tag),
                byte_length: lengths.get(&e.tag).copied().unwrap_or(0) as u64,
            };
            (tag_key(e.tag), entry)
        })
        .collect()
}

/// Creator of the private block `tag` sits in; `None` for the creator elements themselves.
fn private_creator(set: &DataSet, tag: Tag) -> Option<String> {
    let block = tag.element() >> 8;
    if block < 0x10 {
        return None;
    }
    set.text(Tag(tag.group(), block)).map(str::to_string)
}

fn pixel_info(file: &Part10File, pixel: &PixelElement) -> PixelDataInfo {
    let head = &pixel.bytes[..pixel.bytes.len().min(16)];
    PixelDataInfo {
        offset: file.pixel_offset.unwrap_or(0),
        length: pixel.bytes.len() as u64,
        vr: vr_code(pixel.vr),
        undefined_length: pixel.undefined_length,
        first_16_bytes_hex: hex::encode(head),
        sha256: pixels::sha256_hex(&pixel.bytes),
        is_compressed: syntax::is_compressed(&file.transfer_syntax_uid),
    }
}

fn encoding_info(file: &Part10File, mode: ExtractionMode) -> EncodingInfo {
    let has_preamble = file.preamble.iter().any(|b| *b != 0);
    EncodingInfo {
        is_little_endian: file.encoding.is_little_endian(),
        is_implicit_vr: !file.encoding.explicit_vr,
        has_preamble,
        preamble: (has_preamble && mode == ExtractionMode::Full)
            .then(|| hex::encode(file.preamble)),
    }
}

fn envelope_for(pixel: &PixelElement, compression: &CompressionInfo) -> PixelEnvelope {
    PixelEnvelope {
        bytes: pixel.bytes.clone(),
        rows: compression.rows,
        columns: compression.columns,
        samples_per_pixel: compression.samples_per_pixel,
        bits_allocated: compression.bits_allocated,
        frame_count: compression.number_of_frames,
        transfer_syntax_uid: compression.transfer_syntax_uid.clone(),
        is_compressed: compression.is_compressed,
    }
}
