use rayon::prelude::*;
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::analyze;
use crate::error::{Error, Result};
use crate::extract::extract_file;
use crate::models::{
    ExtractionMode, ExtractionSummary, FileFailure, PixelFormat, RoundTrip, RoundTripSummary,
};
use crate::recombine::recombine;
use crate::storage::{source_stem, OutputDir};

/// `*.dcm` files directly inside `dir`, sorted by name. Earlier `_recombined` outputs are skipped.
pub fn dicom_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(Error::io(
            dir,
            io::Error::new(io::ErrorKind::NotFound, "not a directory"),
        ));
    }
    let files = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| {
            p.extension()
                .map_or(false, |ext| ext.eq_ignore_ascii_case("dcm"))
        })
        .filter(|p| {
            p.file_stem()
                .and_then(|s| s.to_str())
                .map_or(true, |s| !s.ends_with("_recombined"))
        })
        .collect();
    Ok(files)
}

/// Split off files whose output names would clash with another file's, ignoring case.
fn claim_output_names(files: Vec<PathBuf>) -> (Vec<PathBuf>, Vec<FileFailure>) {
    let mut by_stem: BTreeMap<String, Vec<PathBuf>> = BTreeMap::new();
    for path in files {
        by_stem
            .entry(source_stem(&path).to_lowercase())
            .or_default()
            .push(path);
    }
    let mut unique = Vec::new();
    let mut clashes = Vec::new();
    for (stem, paths) in by_stem {
        if paths.len() == 1 {
            unique.extend(paths);
            continue;
        }
        for path in &paths {
            let others: Vec<String> = paths
                .iter()
                .filter(|p| *p != path)
                .map(|p| p.display().to_string())
                .collect();
            warn!(file = %path.display(), %stem, "output names collide, skipping file");
            clashes.push(FileFailure {
                path: path.clone(),
                error: format!(
                    "{}: output name {:?} collides with {}",
                    path.display(),
                    stem,
                    others.join(", ")
                ),
            });
        }
    }
    unique.sort();
    clashes.sort_by(|a, b| a.path.cmp(&b.path));
    (unique, clashes)
}

/// Record an error against its source file. Only I/O failures on the output directory stop
/// the sweep.
fn failure(source: &Path, err: Error, output_root: &Path) -> Result<FileFailure> {
    let output_write = matches!(err, Error::Io { .. })
        && err.path() != source
        && err.path().starts_with(output_root);
    if output_write {
        return Err(err);
    }
    warn!(file = %source.display(), error = %err, "skipping file");
    Ok(FileFailure {
        path: source.to_path_buf(),
        error: err.to_string(),
    })
}

pub fn extract_directory(
    dir: &Path,
    output_dir: &Path,
    mode: ExtractionMode,
    format: PixelFormat,
) -> Result<ExtractionSummary> {
    let (files, clashes) = claim_output_names(dicom_files(dir)?);
    OutputDir::new(output_dir)?;
    info!(directory = %dir.display(), files = files.len(), %mode, %format, "extracting directory");

    let outcomes: Vec<_> = files
        .par_iter()
        .map(|path| (path, extract_file(path, output_dir, mode, format)))
        .collect();

    let mut summary = ExtractionSummary {
        failures: clashes,
        ..Default::default()
    };
    for (path, outcome) in outcomes {
        match outcome {
            Ok(extracted) => summary.extracted.push(extracted),
            Err(err) => summary.failures.push(failure(path, err, output_dir)?),
        }
    }
    Ok(summary)
}

fn round_trip(
    source: &Path,
    out: &OutputDir,
    mode: ExtractionMode,
    format: PixelFormat,
) -> Result<RoundTrip> {
    let extracted = extract_file(source, out.root(), mode, format)?;
    let recombined = out.derived_path(source, "recombined", "dcm");
    recombine(&extracted.metadata_path, &extracted.pixel_path, &recombined)?;
    let comparison = analyze::compare(source, &recombined)?;
    let original = fs::read(source).map_err(|e| Error::io(source, e))?;
    let rebuilt = fs::read(&recombined).map_err(|e| Error::io(&recombined, e))?;
    Ok(RoundTrip {
        source: source.to_path_buf(),
        recombined,
        is_identical: comparison.is_identical,
        byte_identical: original == rebuilt,
        comparison,
    })
}

/// Extract, recombine and compare every `*.dcm` file in `dir`.
pub fn process_directory(
    dir: &Path,
    output_dir: &Path,
    mode: ExtractionMode,
    format: PixelFormat,
) -> Result<RoundTripSummary> {
    let (files, clashes) = claim_output_names(dicom_files(dir)?);
    let out = OutputDir::new(output_dir)?;
    info!(directory = %dir.display(), files = files.len(), %mode, %format, "verifying round trips");

    let outcomes: Vec<_> = files
        .par_iter()
        .map(|path| (path, round_trip(path, &out, mode, format)))
        .collect();

    let mut summary = RoundTripSummary {
        failures: clashes,
        ..Default::default()
    };
    for (path, outcome) in outcomes {
        match outcome {
            Ok(trip) => {
                if !trip.is_identical {
                    warn!(file = %path.display(), "round trip is not identical");
                }
                summary.round_trips.push(trip);
            }
            Err(err) => summary.failures.push(failure(path, err, out.root())?),
        }
    }
    info!(
        identical = summary.round_trips.iter().filter(|t| t.is_identical).count(),
        failures = summary.failures.len(),
        "round trips verified"
    );
    Ok(summary)
}
