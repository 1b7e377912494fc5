//
// lib.rs
// dicom-components
//
// Exposes the crate's modules and re-exports the operations for both binary and library consumers.
//
// Thales Matheus Mendonça Santos - November 2025

// Leaf modules first: tag model, encodings, the Part 10 codec and artifact I/O.
pub mod codec;
pub mod dataset;
pub mod error;
pub mod models;
pub mod pixels;
pub mod storage;
pub mod syntax;
pub mod tags;

// Operations, each mirrored by a CLI verb.
pub mod analyze;
pub mod batch;
pub mod cli;
pub mod extract;
pub mod recombine;

pub use analyze::{analyze_compression, analyze_tag_sizes, compare};
pub use batch::{extract_directory, process_directory};
pub use cli::{run as run_cli, Cli, Commands};
pub use error::{Error, Result};
pub use extract::{extract, extract_file};
pub use models::{ExtractionMode, PixelFormat};
pub use recombine::recombine;
