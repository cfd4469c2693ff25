//! Custom error types for the application.
//!
//! This module defines the primary error type, `WaveformError`, for the whole crate.
//! Using the `thiserror` crate, it provides a centralized and consistent way to handle
//! the things that can stop a run, from I/O and configuration issues to malformed
//! record files and systemic attitude-file mismatches.
//!
//! ## Error Hierarchy
//!
//! - **`Config`**: Wraps errors from `figment`, typically parse or type errors in the
//!   TOML file or environment overrides.
//! - **`Configuration`**: Semantic errors in an otherwise well-formed configuration
//!   (e.g. a zero run length). These are caught by `AppConfig::validate`.
//! - **`Io`**, **`Json`**, **`Csv`**: Wrapped library errors.
//! - **`Area`**: The area file could not be turned into a usable polygon.
//! - **`AreaOutsideBounds`**: The area does not overlap the point cloud at all.
//! - **`PointCloud`**: The point-cloud index is unreadable or inconsistent.
//! - **`RecordFormat`**: A sounding, waveform or attitude file has a bad header or
//!   is truncated.
//! - **`SoundingSource`** / **`OutputFile`**: Files that must open for the run to
//!   continue.
//! - **`AttitudeCorrespondence`**: Too many soundings had no matching attitude
//!   sample, which points at mismatched files rather than a bad record.
//!
//! Problems with a single sounding are never surfaced through this type. The
//! selection driver counts and logs them and moves on.

use std::path::PathBuf;
use thiserror::Error;

/// Convenience alias for results using the application error type.
pub type AppResult<T> = std::result::Result<T, WaveformError>;

#[allow(missing_docs)]
#[derive(Error, Debug)]
pub enum WaveformError {
    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    #[error("Configuration validation error: {0}")]
    Configuration(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Area file error: {0}")]
    Area(String),

    #[error("Specified area is completely outside of the point cloud bounds")]
    AreaOutsideBounds,

    #[error("Point cloud error: {0}")]
    PointCloud(String),

    #[error("Malformed record file {}: {reason}", path.display())]
    RecordFormat { path: PathBuf, reason: String },

    #[error("Unable to open sounding file {}: {source}", path.display())]
    SoundingSource {
        path: PathBuf,
        #[source]
        source: Box<WaveformError>,
    },

    #[error("Unable to open output file {}: {source}", path.display())]
    OutputFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(
        "Attitude lookup failed for {failures} soundings; the pos/sbet files probably do not match the sounding files"
    )]
    AttitudeCorrespondence { failures: u32 },
}

impl From<figment::Error> for WaveformError {
    fn from(value: figment::Error) -> Self {
        WaveformError::Config(Box::new(value))
    }
}

impl WaveformError {
    /// Builds a `RecordFormat` error for `path`.
    pub fn record_format(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        WaveformError::RecordFormat {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Whether this error ends the whole run.
    ///
    /// Record-level read problems are recoverable when they come back from a
    /// per-sounding lookup; everything describing the run's inputs is not.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, WaveformError::RecordFormat { .. } | WaveformError::Io(_))
    }
}
