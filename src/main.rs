//
// main.rs
// dicom-components
//
// Binary entry point; argument parsing, logging setup and dispatch live in the CLI module.
//
// Thales Matheus Mendonça Santos - November 2025

fn main() -> anyhow::Result<()> {
    dicom_components::run_cli()
}
