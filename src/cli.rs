//
// cli.rs
// dicom-components
//
// Defines the CLI surface with Clap and dispatches each command to the library, printing reports as JSON.
//
// Thales Matheus Mendonça Santos - November 2025

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::{ArgAction, Parser, Subcommand};
use serde::Serialize;
use tracing::Level;

use crate::models::{ExtractionMode, PixelFormat};
use crate::{analyze, batch, extract, recombine};

#[derive(Parser)]
#[command(name = "dicom-components")]
#[command(
    about = "Split DICOM files into metadata and pixel data, rebuild them, and verify the round trip",
    long_about = None
)]
pub struct Cli {
    /// Increase log output (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Extract metadata JSON and a pixel artifact from a file or a directory of *.dcm files
    Extract {
        source: PathBuf,
        #[arg(short, long, default_value = "output")]
        output_dir: PathBuf,
        #[arg(short, long, value_enum, default_value_t = ExtractionMode::Full)]
        mode: ExtractionMode,
        #[arg(short, long, value_enum, default_value_t = PixelFormat::Raw)]
        format: PixelFormat,
    },
    /// Rebuild a DICOM file from metadata JSON and its pixel artifact (.raw or .p)
    Recombine {
        metadata: PathBuf,
        pixels: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Report transfer syntax and compression ratio
    Compression { file: PathBuf },
    /// Report the encoded size of every top-level element
    TagSizes {
        file: PathBuf,
        /// Only list the N largest elements
        #[arg(long)]
        top: Option<usize>,
    },
    /// Compare two files tag by tag and their pixel data byte by byte
    Compare { original: PathBuf, other: PathBuf },
    /// Extract, recombine and compare every *.dcm file in a directory
    Process {
        directory: PathBuf,
        #[arg(short, long, default_value = "output")]
        output_dir: PathBuf,
        #[arg(short, long, value_enum, default_value_t = ExtractionMode::Full)]
        mode: ExtractionMode,
        #[arg(short, long, value_enum, default_value_t = PixelFormat::Raw)]
        format: PixelFormat,
    },
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        _ => Level::DEBUG,
    };
    // Logs go to stderr so stdout stays valid JSON.
    let _ = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .try_init();
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialize report")?;
    println!("{json}");
    Ok(())
}

fn describe(path: &Path) -> String {
    path.display().to_string()
}

pub fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Extract {
            source,
            output_dir,
            mode,
            format,
        } => {
            let summary = extract::extract(&source, &output_dir, mode, format)
                .with_context(|| format!("Failed to extract {}", describe(&source)))?;
            print_json(&summary)?;
        }
        Commands::Recombine {
            metadata,
            pixels,
            output,
        } => {
            let report = recombine::recombine(&metadata, &pixels, &output)
                .with_context(|| format!("Failed to recombine {}", describe(&metadata)))?;
            print_json(&report)?;
        }
        Commands::Compression { file } => {
            let info = analyze::analyze_compression(&file)
                .with_context(|| format!("Failed to analyze {}", describe(&file)))?;
            print_json(&info)?;
        }
        Commands::TagSizes { file, top } => {
            let mut report = analyze::analyze_tag_sizes(&file)
                .with_context(|| format!("Failed to analyze {}", describe(&file)))?;
            if let Some(n) = top {
                report.entries = report.largest(n).into_iter().cloned().collect();
            }
            print_json(&report)?;
        }
        Commands::Compare { original, other } => {
            let result = analyze::compare(&original, &other).with_context(|| {
                format!("Failed to compare {} with {}", describe(&original), describe(&other))
            })?;
            print_json(&result)?;
        }
        Commands::Process {
            directory,
            output_dir,
            mode,
            format,
        } => {
            let summary = batch::process_directory(&directory, &output_dir, mode, format)
                .with_context(|| format!("Failed to process {}", describe(&directory)))?;
            print_json(&summary)?;
            if !summary.all_identical() {
                bail!(
                    "{} of {} file(s) did not round-trip identically, {} failed",
                    summary.round_trips.iter().filter(|t| !t.is_identical).count(),
                    summary.round_trips.len() + summary.failures.len(),
                    summary.failures.len()
                );
            }
        }
    }

    Ok(())
}
