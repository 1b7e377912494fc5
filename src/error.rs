//
// error.rs
// dicom-components
//
// Library error type. Every variant carries the path of the file it concerns.
//
// Thales Matheus Mendonça Santos - November 2025

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Crate-wide result type.
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    /// Missing preamble/"DICM" magic or File Meta group.
    #[error("{}: not a DICOM file: {reason}", .path.display())]
    NotADicomFile { path: PathBuf, reason: String },

    /// An element header or length that cannot be walked.
    #[error("{}: corrupt header at {element}: {reason}", .path.display())]
    CorruptHeader {
        path: PathBuf,
        element: String,
        reason: String,
    },

    #[error("{}: unsupported transfer syntax {uid}", .path.display())]
    UnsupportedTransferSyntax { path: PathBuf, uid: String },

    #[error("{}: no Pixel Data element (7FE0,0010) in data set", .path.display())]
    NoPixelData { path: PathBuf },

    #[error("{}: missing required tag {tag} {name}", .path.display())]
    MissingRequiredTag {
        path: PathBuf,
        tag: String,
        name: &'static str,
    },

    /// The metadata document is readable JSON but describes something unusable.
    #[error("{}: invalid metadata at {element}: {reason}", .path.display())]
    InvalidMetadata {
        path: PathBuf,
        element: String,
        reason: String,
    },

    /// The pixel artifact disagrees with the metadata it is paired with.
    #[error("{}: pixel artifact does not match metadata: {reason}", .path.display())]
    PixelFormatMismatch { path: PathBuf, reason: String },

    #[error("{}: unknown pixel artifact format, expected a .raw or .p extension", .path.display())]
    UnknownPixelFormat { path: PathBuf },

    #[error("{}: malformed JSON metadata", .path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("{}: I/O error", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }

    /// The file this error is about.
    pub fn path(&self) -> &Path {
        match self {
            Error::NotADicomFile { path, .. }
            | Error::CorruptHeader { path, .. }
            | Error::UnsupportedTransferSyntax { path, .. }
            | Error::NoPixelData { path }
            | Error::MissingRequiredTag { path, .. }
            | Error::InvalidMetadata { path, .. }
            | Error::PixelFormatMismatch { path, .. }
            | Error::UnknownPixelFormat { path }
            | Error::Json { path, .. }
            | Error::Io { path, .. } => path,
        }
    }

    /// Input errors concern one source file and can be skipped in a sweep.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            Error::NotADicomFile { .. }
                | Error::CorruptHeader { .. }
                | Error::UnsupportedTransferSyntax { .. }
                | Error::NoPixelData { .. }
                | Error::MissingRequiredTag { .. }
                | Error::InvalidMetadata { .. }
                | Error::Json { .. }
        )
    }
}
