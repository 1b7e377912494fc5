//
// pixels.rs
// dicom-components
//
// Reads and writes the Pixel Data artifact, either as the raw payload or as a pickled envelope
// that also carries the image geometry.
//
// Thales Matheus Mendonça Santos - November 2025

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_pickle::{DeOptions, SerOptions};
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};
use crate::models::PixelFormat;

/// Pickled form of the artifact. Key names `data` and `number_of_frames` are accepted on read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PixelEnvelope {
    #[serde(with = "serde_bytes", alias = "data")]
    pub bytes: Vec<u8>,
    pub rows: u64,
    pub columns: u64,
    pub samples_per_pixel: u64,
    pub bits_allocated: u64,
    #[serde(alias = "number_of_frames")]
    pub frame_count: u64,
    pub transfer_syntax_uid: String,
    pub is_compressed: bool,
}

/// Selected by extension: `.raw` or `.p`.
pub fn format_for_path(path: &Path) -> Result<PixelFormat> {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("raw") => Ok(PixelFormat::Raw),
        Some(ext) if ext.eq_ignore_ascii_case("p") => Ok(PixelFormat::Pickle),
        _ => Err(Error::UnknownPixelFormat {
            path: path.to_path_buf(),
        }),
    }
}

pub fn encode_envelope(envelope: &PixelEnvelope, path: &Path) -> Result<Vec<u8>> {
    serde_pickle::to_vec(envelope, SerOptions::new()).map_err(|e| Error::PixelFormatMismatch {
        path: path.to_path_buf(),
        reason: format!("cannot pickle envelope: {}", e),
    })
}

pub fn decode_envelope(bytes: &[u8], path: &Path) -> Result<PixelEnvelope> {
    serde_pickle::from_slice(bytes, DeOptions::new()).map_err(|e| Error::PixelFormatMismatch {
        path: path.to_path_buf(),
        reason: format!("not a pickled pixel envelope: {}", e),
    })
}

/// What was read from an artifact file.
#[derive(Debug, Clone, PartialEq)]
pub enum PixelArtifact {
    Raw(Vec<u8>),
    Pickle(PixelEnvelope),
}

impl PixelArtifact {
    pub fn bytes(&self) -> &[u8] {
        match self {
            PixelArtifact::Raw(bytes) => bytes,
            PixelArtifact::Pickle(envelope) => &envelope.bytes,
        }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            PixelArtifact::Raw(bytes) => bytes,
            PixelArtifact::Pickle(envelope) => envelope.bytes,
        }
    }
}

pub fn read_artifact(path: &Path) -> Result<PixelArtifact> {
    let format = format_for_path(path)?;
    let bytes = fs::read(path).map_err(|e| Error::io(path, e))?;
    match format {
        PixelFormat::Raw => Ok(PixelArtifact::Raw(bytes)),
        PixelFormat::Pickle => decode_envelope(&bytes, path).map(PixelArtifact::Pickle),
    }
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope() -> PixelEnvelope {
        PixelEnvelope {
            bytes: vec![0, 1, 2, 3],
            rows: 2,
            columns: 1,
            samples_per_pixel: 1,
            bits_allocated: 16,
            frame_count: 1,
            transfer_syntax_uid: "1.2.840.10008.1.2.1".into(),
            is_compressed: false,
        }
    }

    #[test]
    fn extension_selects_format() {
        assert_eq!(format_for_path(Path::new("a_pixels.raw")).unwrap(), PixelFormat::Raw);
        assert_eq!(format_for_path(Path::new("a_pixels.p")).unwrap(), PixelFormat::Pickle);
        assert!(matches!(
            format_for_path(Path::new("a_pixels.bin")),
            Err(Error::UnknownPixelFormat { .. })
        ));
    }

    #[test]
    fn envelope_pickles_deterministically() {
        let path = Path::new("a_pixels.p");
        let first = encode_envelope(&envelope(), path).unwrap();
        let second = encode_envelope(&envelope(), path).unwrap();
        assert_eq!(first, second);
        assert_eq!(decode_envelope(&first, path).unwrap(), envelope());
    }

    #[test]
    fn garbage_is_a_format_mismatch() {
        let err = decode_envelope(b"\x00\x01not a pickle", Path::new("x.p")).unwrap_err();
        assert!(matches!(err, Error::PixelFormatMismatch { .. }));
    }

    #[test]
    fn artifacts_are_read_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let raw = dir.path().join("ct_pixels.raw");
        fs::write(&raw, [7u8, 8]).unwrap();
        assert_eq!(read_artifact(&raw).unwrap().bytes(), &[7, 8]);

        let pickle = dir.path().join("ct_pixels.p");
        fs::write(&pickle, encode_envelope(&envelope(), &pickle).unwrap()).unwrap();
        assert_eq!(read_artifact(&pickle).unwrap().into_bytes(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn envelopes_with_legacy_key_names_are_read() {
        use serde_pickle::{HashableValue, Value};
        use std::collections::BTreeMap;

        let key = |k: &str| HashableValue::String(k.to_string());
        let mut dict = BTreeMap::new();
        dict.insert(key("data"), Value::Bytes(vec![9, 8, 7, 6]));
        dict.insert(key("rows"), Value::I64(2));
        dict.insert(key("columns"), Value::I64(1));
        dict.insert(key("samples_per_pixel"), Value::I64(1));
        dict.insert(key("bits_allocated"), Value::I64(16));
        dict.insert(key("number_of_frames"), Value::I64(1));
        dict.insert(key("transfer_syntax_uid"), Value::String("1.2.840.10008.1.2.1".into()));
        dict.insert(key("is_compressed"), Value::Bool(false));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("legacy_pixels.p");
        fs::write(&path, serde_pickle::value_to_vec(&Value::Dict(dict), SerOptions::new()).unwrap())
            .unwrap();

        match read_artifact(&path).unwrap() {
            PixelArtifact::Pickle(envelope) => {
                assert_eq!(envelope.bytes, vec![9, 8, 7, 6]);
                assert_eq!(envelope.frame_count, 1);
                assert_eq!(envelope.bits_allocated, 16);
            }
            other => panic!("expected a pickle envelope, got {:?}", other),
        }
    }

    #[test]
    fn checksum_is_hex_sha256() {
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
