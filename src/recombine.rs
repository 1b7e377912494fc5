//
// recombine.rs
// dicom-components
//
// Rebuilds a DICOM Part 10 file from a metadata document and its pixel artifact.
//
// Thales Matheus Mendonça Santos - November 2025

use std::fs;
use std::path::Path;

use dicom::core::{Tag, VR};
use tracing::{info, warn};

use crate::analyze;
use crate::codec::{self, PixelElement, PREAMBLE_LEN};
use crate::dataset::{parse_vr, DataElement, DataSet, ElementValue, FileMetaInfo};
use crate::error::{Error, Result};
use crate::models::{
    ElementRecord, ExtractionMode, MetadataDocument, PixelLengthMismatch, RecombineReport,
};
use crate::pixels::{self, PixelArtifact, PixelEnvelope};
use crate::storage;
use crate::syntax::{self, Encoding};
use crate::tags::{self, format_tag, parse_tag_key};

/// Implementation Class UID written when the metadata does not carry one.
pub const IMPLEMENTATION_CLASS_UID: &str = "2.25.302791855204136893521727315786462049871";

pub fn load_metadata(path: &Path) -> Result<MetadataDocument> {
    let bytes = fs::read(path).map_err(|e| Error::io(path, e))?;
    serde_json::from_slice(&bytes).map_err(|e| Error::Json {
        path: path.to_path_buf(),
        source: e,
    })
}

pub fn recombine(
    metadata_path: &Path,
    pixel_path: &Path,
    output_path: &Path,
) -> Result<RecombineReport> {
    let doc = load_metadata(metadata_path)?;

    let mut dataset = DataSet::new();
    for (key, record) in &doc.data_elements {
        let element = element_from_record(key, record, metadata_path)?;
        if matches!(element.tag.group(), 0x0002 | 0xFFFE) || element.tag == tags::PIXEL_DATA {
            return Err(invalid(metadata_path, element.tag, "not allowed in DataElements"));
        }
        dataset.insert(element);
    }
    let meta = file_meta(&doc, &dataset, metadata_path)?;

    let ts = meta
        .transfer_syntax_uid()
        .map(str::to_string)
        .ok_or_else(|| missing(metadata_path, tags::TRANSFER_SYNTAX_UID, "TransferSyntaxUID"))?;
    let rows = required_uint(&dataset, tags::ROWS, "Rows", metadata_path)?;
    let columns = required_uint(&dataset, tags::COLUMNS, "Columns", metadata_path)?;
    let bits_allocated =
        required_uint(&dataset, tags::BITS_ALLOCATED, "BitsAllocated", metadata_path)?;
    let samples_per_pixel = dataset.uint(tags::SAMPLES_PER_PIXEL).unwrap_or(1);
    let frames = dataset.uint(tags::NUMBER_OF_FRAMES).unwrap_or(1).max(1);
    let encoding =
        Encoding::for_transfer_syntax(&ts).ok_or_else(|| Error::UnsupportedTransferSyntax {
            path: metadata_path.to_path_buf(),
            uid: ts.clone(),
        })?;
    let is_compressed = syntax::is_compressed(&ts);

    let artifact = pixels::read_artifact(pixel_path)?;
    if let PixelArtifact::Pickle(envelope) = &artifact {
        let declared = Geometry {
            rows,
            columns,
            samples_per_pixel,
            bits_allocated,
            frames,
        };
        check_envelope(envelope, &declared, &ts, pixel_path)?;
    }
    let mut bytes = artifact.into_bytes();

    let info = &doc.pixel_data;
    let checksum_matches = !info.sha256.is_empty() && info.sha256 == pixels::sha256_hex(&bytes);
    if !info.sha256.is_empty() && !checksum_matches {
        return Err(Error::PixelFormatMismatch {
            path: pixel_path.to_path_buf(),
            reason: "SHA-256 of the artifact differs from PixelDataInfo.sha256".into(),
        });
    }
    // Payloads matching the extraction record skip the geometry check.
    let recorded_payload = checksum_matches && bytes.len() as u64 == info.length;

    let mut pixel_fixup = None;
    if !info.undefined_length {
        if !is_compressed && !recorded_payload {
            let expected =
                analyze::theoretical_size(rows, columns, samples_per_pixel, bits_allocated, frames);
            let len = bytes.len() as u64;
            if len != expected && len != expected + expected % 2 {
                return Err(Error::PixelFormatMismatch {
                    path: pixel_path.to_path_buf(),
                    reason: format!(
                        "{} bytes, expected {} for {}x{}x{} at {} bits, {} frame(s)",
                        len, expected, rows, columns, samples_per_pixel, bits_allocated, frames
                    ),
                });
            }
        }
        if bytes.len() % 2 == 1 {
            pixel_fixup = Some(PixelLengthMismatch {
                artifact_length: bytes.len() as u64,
                written_length: bytes.len() as u64 + 1,
            });
            bytes.push(0);
            warn!(
                artifact = %pixel_path.display(),
                length = bytes.len() - 1,
                "odd-length pixel payload padded with one NUL byte"
            );
        }
    }

    let pixel_vr = if info.vr.is_empty() {
        if bits_allocated > 8 && !is_compressed {
            VR::OW
        } else {
            VR::OB
        }
    } else {
        parse_vr(&info.vr).ok_or_else(|| {
            invalid(
                metadata_path,
                tags::PIXEL_DATA,
                format!("unknown VR {:?}", info.vr),
            )
        })?
    };
    let pixel = PixelElement {
        vr: pixel_vr,
        bytes,
        undefined_length: info.undefined_length,
    };

    let preamble = preamble(&doc, metadata_path)?;
    let encoded = codec::encode_part10(&preamble, &meta, &dataset, Some(&pixel), encoding)
        .map_err(|e| invalid(metadata_path, e.tag, e.reason))?;

    if let Some(parent) = output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
    }
    storage::write_atomic(output_path, &encoded)?;

    info!(
        output = %output_path.display(),
        size = encoded.len(),
        transfer_syntax = %syntax::normalize_uid(&ts),
        "recombined"
    );

    Ok(RecombineReport {
        output: output_path.to_path_buf(),
        original_size: doc.file.file_size,
        new_size: encoded.len() as u64,
        is_compressed,
        compression_type: syntax::compression_type(&ts),
        pixel_fixup,
    })
}

fn invalid(path: &Path, tag: Tag, reason: impl Into<String>) -> Error {
    Error::InvalidMetadata {
        path: path.to_path_buf(),
        element: format_tag(tag),
        reason: reason.into(),
    }
}

fn missing(path: &Path, tag: Tag, name: &'static str) -> Error {
    Error::MissingRequiredTag {
        path: path.to_path_buf(),
        tag: format_tag(tag),
        name,
    }
}

fn required_uint(set: &DataSet, tag: Tag, name: &'static str, path: &Path) -> Result<u64> {
    match set.get(tag) {
        None => Err(missing(path, tag, name)),
        Some(element) => element
            .value
            .as_uint()
            .ok_or_else(|| invalid(path, tag, format!("{} is not an unsigned integer", name))),
    }
}

fn element_from_record(key: &str, record: &ElementRecord, path: &Path) -> Result<DataElement> {
    let tag = parse_tag_key(key).ok_or_else(|| Error::InvalidMetadata {
        path: path.to_path_buf(),
        element: key.to_string(),
        reason: "key is not an 8-digit hexadecimal tag".into(),
    })?;
    if record.tag != [tag.group(), tag.element()] {
        return Err(invalid(
            path,
            tag,
            format!("record tag {:04X?} disagrees with its key", record.tag),
        ));
    }
    let vr = parse_vr(&record.vr)
        .ok_or_else(|| invalid(path, tag, format!("unknown VR {:?}", record.vr)))?;
    Ok(DataElement {
        tag,
        vr,
        value: record.value.clone(),
        undefined_length: record.undefined_length,
    })
}

/// File Meta group from the document. Outside full mode, absent mandatory elements are filled in.
fn file_meta(doc: &MetadataDocument, dataset: &DataSet, path: &Path) -> Result<FileMetaInfo> {
    let mut meta = FileMetaInfo::default();
    for (key, record) in &doc.file_meta {
        let element = element_from_record(key, record, path)?;
        if element.tag.group() != 0x0002 {
            return Err(invalid(path, element.tag, "not a File Meta element"));
        }
        meta.insert(element);
    }
    if doc.file.extraction_mode == ExtractionMode::Full {
        return Ok(meta);
    }

    let present = |meta: &FileMetaInfo, tag| meta.elements().contains(tag);
    if !present(&meta, tags::FILE_META_INFORMATION_VERSION) {
        meta.insert(DataElement::new(
            tags::FILE_META_INFORMATION_VERSION,
            VR::OB,
            ElementValue::Bytes(vec![0x00, 0x01]),
        ));
    }
    for (target, source) in [
        (tags::MEDIA_STORAGE_SOP_CLASS_UID, tags::SOP_CLASS_UID),
        (tags::MEDIA_STORAGE_SOP_INSTANCE_UID, tags::SOP_INSTANCE_UID),
    ] {
        if !present(&meta, target) {
            if let Some(uid) = dataset.get(source) {
                meta.insert(DataElement::new(target, VR::UI, uid.value.clone()));
            }
        }
    }
    if !present(&meta, tags::IMPLEMENTATION_CLASS_UID) {
        meta.insert(DataElement::text(
            tags::IMPLEMENTATION_CLASS_UID,
            VR::UI,
            IMPLEMENTATION_CLASS_UID,
        ));
    }
    Ok(meta)
}

fn preamble(doc: &MetadataDocument, path: &Path) -> Result<[u8; PREAMBLE_LEN]> {
    let mut preamble = [0u8; PREAMBLE_LEN];
    if let Some(text) = &doc.encoding.preamble {
        let bytes = hex::decode(text).ok().filter(|b| b.len() == PREAMBLE_LEN).ok_or_else(|| {
            Error::InvalidMetadata {
                path: path.to_path_buf(),
                element: "EncodingInfo.preamble".into(),
                reason: "expected 256 hexadecimal digits".into(),
            }
        })?;
        preamble.copy_from_slice(&bytes);
    }
    Ok(preamble)
}

struct Geometry {
    rows: u64,
    columns: u64,
    samples_per_pixel: u64,
    bits_allocated: u64,
    frames: u64,
}

fn check_envelope(envelope: &PixelEnvelope, declared: &Geometry, ts: &str, path: &Path) -> Result<()> {
    let fields = [
        ("rows", envelope.rows, declared.rows),
        ("columns", envelope.columns, declared.columns),
        ("samples_per_pixel", envelope.samples_per_pixel, declared.samples_per_pixel),
        ("bits_allocated", envelope.bits_allocated, declared.bits_allocated),
        ("frame_count", envelope.frame_count.max(1), declared.frames),
    ];
    for (name, found, expected) in fields {
        if found != expected {
            return Err(Error::PixelFormatMismatch {
                path: path.to_path_buf(),
                reason: format!("envelope {} is {}, metadata says {}", name, found, expected),
            });
        }
    }
    if syntax::normalize_uid(&envelope.transfer_syntax_uid) != syntax::normalize_uid(ts) {
        return Err(Error::PixelFormatMismatch {
            path: path.to_path_buf(),
            reason: format!(
                "envelope transfer syntax {} differs from {}",
                envelope.transfer_syntax_uid,
                syntax::normalize_uid(ts)
            ),
        });
    }
    Ok(())
}
