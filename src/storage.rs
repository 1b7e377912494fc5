//
// storage.rs
// dicom-components
//
// Output directory handling: per-source unique artifact names and atomic writes, so a failed
// write never leaves a partial file behind.
//
// Thales Matheus Mendonça Santos - November 2025

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::error::{Error, Result};

#[derive(Clone, Debug)]
pub struct OutputDir {
    root: PathBuf,
}

impl OutputDir {
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).map_err(|e| Error::io(&root, e))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `<root>/<stem>_<suffix>.<extension>` for a given source file.
    pub fn derived_path(&self, source: &Path, suffix: &str, extension: &str) -> PathBuf {
        self.root
            .join(format!("{}_{}.{}", source_stem(source), suffix, extension))
    }
}

/// File stem of `source` made safe for output names, `dicom` when it is empty.
///
/// Distinct stems give distinct results: characters outside `[A-Za-z0-9._-]` become `%XX`
/// escapes of their UTF-8 bytes, and `%` itself is escaped.
pub fn source_stem(source: &Path) -> String {
    source
        .file_stem()
        .map(|s| escape_filename(&s.to_string_lossy()))
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "dicom".to_string())
}

fn escape_filename(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
            out.push(c);
        } else {
            let mut buf = [0u8; 4];
            for byte in c.encode_utf8(&mut buf).bytes() {
                out.push_str(&format!("%{:02X}", byte));
            }
        }
    }
    out
}

/// Write through a temporary file in the target directory, then rename over `path`.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| Error::io(path, e))?;
    tmp.write_all(bytes).map_err(|e| Error::io(path, e))?;
    tmp.as_file().sync_all().map_err(|e| Error::io(path, e))?;
    tmp.persist(path).map_err(|e| Error::io(path, e.error))?;
    Ok(())
}
