//! # PFM Waveform Library
//!
//! This crate scans a bathymetric point cloud for LIDAR soundings inside an
//! area and runs an edge detector over each eligible sounding's digitizer
//! waveform. The detector flags weak secondary returns that the automated
//! bottom pick may have missed. The binary (`main.rs`) is a thin CLI over
//! this library.
//!
//! ## Crate Structure
//!
//! - **`area`**: Area-file dialects, `Polygon`, `BoundingBox` and the
//!   point-in-polygon test.
//! - **`config`**: `AppConfig`, layered through figment from defaults, a TOML
//!   file and `PFM_WAVEFORM_` environment variables.
//! - **`error`**: The `WaveformError` enum shared by every module.
//! - **`records`**: Traits for the point cloud and the sounding, waveform and
//!   attitude files, with memory-mapped and in-memory implementations.
//! - **`report`**: The `.pts` detection report, the diagnostics CSV and
//!   terminal progress.
//! - **`selection`**: The selection driver: bin pass, per-file sounding pass,
//!   eligibility and the attitude slot.
//! - **`telemetry`**: tracing-subscriber setup.
//! - **`validation`**: Small validators used by configuration and area parsing.
//! - **`waveform`**: Waveform data model and the edge detector.

pub mod area;
pub mod config;
pub mod error;
pub mod records;
pub mod report;
pub mod selection;
pub mod telemetry;
pub mod validation;
pub mod waveform;
