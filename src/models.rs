//
// models.rs
// dicom-components
//
// Serializable documents and reports: the metadata document, compression info, comparison and
// tag size reports, and batch summaries.
//
// Thales Matheus Mendonça Santos - November 2025

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::dataset::ElementValue;

/// How much of the data set an extraction keeps.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionMode {
    Minimal,
    Standard,
    Full,
}

impl fmt::Display for ExtractionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ExtractionMode::Minimal => "minimal",
            ExtractionMode::Standard => "standard",
            ExtractionMode::Full => "full",
        })
    }
}

/// On-disk form of the pixel artifact.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    Raw,
    Pickle,
}

impl PixelFormat {
    pub fn extension(self) -> &'static str {
        match self {
            PixelFormat::Raw => "raw",
            PixelFormat::Pickle => "p",
        }
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PixelFormat::Raw => "raw",
            PixelFormat::Pickle => "pickle",
        })
    }
}

/// One data element as stored in the metadata document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementRecord {
    pub tag: [u16; 2],
    #[serde(rename = "VR")]
    pub vr: String,
    /// Informational only; ignored when recombining.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keyword: Option<String>,
    pub value: ElementValue,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub undefined_length: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PixelDataInfo {
    /// Offset of the Pixel Data value in the source file.
    pub offset: u64,
    pub length: u64,
    #[serde(rename = "VR")]
    pub vr: String,
    pub undefined_length: bool,
    pub first_16_bytes_hex: String,
    /// Checked against the artifact on recombination when non-empty.
    pub sha256: String,
    pub is_compressed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompressionInfo {
    pub transfer_syntax_uid: String,
    pub compression_type: String,
    pub is_compressed: bool,
    pub compressed_size: u64,
    pub theoretical_uncompressed_size: u64,
    pub compression_ratio: f64,
    pub rows: u64,
    pub columns: u64,
    pub samples_per_pixel: u64,
    pub bits_allocated: u64,
    pub number_of_frames: u64,
    pub file_size: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncodingInfo {
    pub is_little_endian: bool,
    pub is_implicit_vr: bool,
    pub has_preamble: bool,
    /// Hex of the 128-byte preamble; recorded in full mode when not all zero.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preamble: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileInfo {
    pub file_name: String,
    pub file_size: u64,
    pub extraction_mode: ExtractionMode,
    pub pixel_format: PixelFormat,
    pub pixel_file: String,
}

/// Readable rendering of an element inside a sequence item. Not used when recombining.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceEntry {
    pub tag: [u16; 2],
    #[serde(rename = "VR")]
    pub vr: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keyword: Option<String>,
    /// Decoded text and numbers; binary values only report `binary_length`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<ElementValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub binary_length: Option<u64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub items: Vec<SequenceItem>,
}

/// One sequence item, keyed like `DataElements`.
pub type SequenceItem = BTreeMap<String, SequenceEntry>;

/// A private element of the data set, with the creator that reserved its block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrivateTag {
    pub tag: [u16; 2],
    #[serde(rename = "VR")]
    pub vr: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creator: Option<String>,
    pub byte_length: u64,
}

/// The JSON document written next to each pixel artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataDocument {
    #[serde(rename = "FileMetaInfo")]
    pub file_meta: BTreeMap<String, ElementRecord>,
    #[serde(rename = "DataElements")]
    pub data_elements: BTreeMap<String, ElementRecord>,
    /// Item-by-item view of the retained sequences.
    #[serde(rename = "SequenceData", default, skip_serializing_if = "BTreeMap::is_empty")]
    pub sequences: BTreeMap<String, Vec<SequenceItem>>,
    #[serde(rename = "PrivateTags", default, skip_serializing_if = "BTreeMap::is_empty")]
    pub private_tags: BTreeMap<String, PrivateTag>,
    #[serde(rename = "PixelDataInfo")]
    pub pixel_data: PixelDataInfo,
    #[serde(rename = "CompressionInfo")]
    pub compression: CompressionInfo,
    #[serde(rename = "EncodingInfo")]
    pub encoding: EncodingInfo,
    #[serde(rename = "FileInfo")]
    pub file: FileInfo,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueDifference {
    pub tag: String,
    pub name: String,
    pub original: String,
    pub other: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonResult {
    pub original_file: PathBuf,
    pub other_file: PathBuf,
    pub original_size: u64,
    pub other_size: u64,
    pub missing_tags: Vec<String>,
    pub extra_tags: Vec<String>,
    pub value_differences: Vec<ValueDifference>,
    pub pixel_data_identical: bool,
    pub is_identical: bool,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SizeCategory {
    Standard,
    Private,
    Sequence,
    Binary,
    PixelData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagSize {
    pub tag: String,
    pub name: String,
    #[serde(rename = "VR")]
    pub vr: String,
    pub category: SizeCategory,
    pub byte_size: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagSizeReport {
    pub file_path: PathBuf,
    pub file_size: u64,
    /// In file order.
    pub entries: Vec<TagSize>,
    pub category_sizes: BTreeMap<SizeCategory, u64>,
    /// Bytes not attributed to any element (preamble and magic).
    pub overhead: u64,
}

impl TagSizeReport {
    /// Largest elements first.
    pub fn largest(&self, n: usize) -> Vec<&TagSize> {
        let mut sorted: Vec<&TagSize> = self.entries.iter().collect();
        sorted.sort_by(|a, b| b.byte_size.cmp(&a.byte_size));
        sorted.truncate(n);
        sorted
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedFile {
    pub source: PathBuf,
    pub metadata_path: PathBuf,
    pub pixel_path: PathBuf,
    pub retained_tags: usize,
    pub dropped_tags: usize,
    pub compression: CompressionInfo,
}

/// A file a batch sweep skipped, with the reason.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileFailure {
    pub path: PathBuf,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractionSummary {
    pub extracted: Vec<ExtractedFile>,
    pub failures: Vec<FileFailure>,
}

/// An odd-length payload that was padded to even length during recombination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PixelLengthMismatch {
    pub artifact_length: u64,
    pub written_length: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecombineReport {
    pub output: PathBuf,
    pub original_size: u64,
    pub new_size: u64,
    pub is_compressed: bool,
    pub compression_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pixel_fixup: Option<PixelLengthMismatch>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundTrip {
    pub source: PathBuf,
    pub recombined: PathBuf,
    pub is_identical: bool,
    pub byte_identical: bool,
    pub comparison: ComparisonResult,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoundTripSummary {
    pub round_trips: Vec<RoundTrip>,
    pub failures: Vec<FileFailure>,
}

impl RoundTripSummary {
    pub fn all_identical(&self) -> bool {
        self.failures.is_empty() && self.round_trips.iter().all(|r| r.is_identical)
    }
}
