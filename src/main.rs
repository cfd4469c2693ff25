//! CLI entry point for pfm_waveform
//!
//! Scans the soundings of a point cloud that fall inside an area file and
//! writes the ones whose waveforms show a qualifying edge to `<area>.pts`.
//!
//! # Usage
//!
//! ```bash
//! pfm_waveform survey.json harbor.ARE
//! pfm_waveform --config config/default.toml --diagnostics runs.csv survey.json harbor.are
//! ```
//!
//! The area file extension selects its dialect: `.ARE` for ISS-60 area files,
//! `.are` for generic area files, `.afs` for Army Corps area files.

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use pfm_waveform::area::load_area;
use pfm_waveform::config::AppConfig;
use pfm_waveform::records::binary::FileRecordStore;
use pfm_waveform::records::point_cloud::PointCloudIndex;
use pfm_waveform::report::output_path;
use pfm_waveform::selection::SelectionDriver;
use pfm_waveform::telemetry;
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::error;

#[derive(Parser)]
#[command(name = "pfm_waveform", version)]
#[command(about = "Extracts and analyzes waveforms for HOF soundings in an area of a point cloud", long_about = None)]
struct Cli {
    /// Point-cloud index file
    pfm_file: PathBuf,

    /// Area file (.ARE, .are or .afs)
    area_file: PathBuf,

    /// Configuration file (TOML)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log level override (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// Only run the detector on this sequence number (repeatable)
    #[arg(long = "sequence", value_name = "N")]
    sequences: Vec<u32>,

    /// Write every qualifying run and its difference series to this CSV
    #[arg(long, value_name = "FILE")]
    diagnostics: Option<PathBuf>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            eprintln!("\n\n{e:#}\n");
            // The byte value of -1
            ExitCode::from(255)
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let mut config =
        AppConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    config.selection.sequence_filter.extend(cli.sequences);
    if cli.diagnostics.is_some() {
        config.output.diagnostics = cli.diagnostics;
    }
    config
        .validate()
        .map_err(|e| anyhow!("Invalid configuration: {e}"))?;
    telemetry::init_from_config(&config).map_err(|e| anyhow!("Failed to initialize logging: {e}"))?;

    eprintln!("\n\n pfm_waveform {} \n\n", env!("CARGO_PKG_VERSION"));

    let polygon = load_area(&cli.area_file)
        .with_context(|| format!("Failed to read area file {}", cli.area_file.display()))?;
    let cloud = PointCloudIndex::open(&cli.pfm_file)
        .with_context(|| format!("Failed to open point cloud {}", cli.pfm_file.display()))?;

    let report_path = output_path(&cli.area_file, &config.output.extension);
    let store = FileRecordStore;
    let driver = SelectionDriver::new(&cloud, &store, &config, &polygon);
    let mut progress = io::stderr();
    let summary = driver
        .run_to_file(&report_path, &mut progress)
        .with_context(|| format!("Failed to scan area into {}", report_path.display()))?;

    eprintln!("{summary}\n");
    Ok(())
}
