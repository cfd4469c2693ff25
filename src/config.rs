//! Configuration System using Figment
//!
//! This module provides strongly-typed configuration for a waveform scan.
//! Configuration is layered, later sources overriding earlier ones:
//! 1. Built-in defaults (the values the detector has always used)
//! 2. An optional TOML file (`--config`)
//! 3. Environment variables prefixed with `PFM_WAVEFORM_`, nested keys split on `__`
//!
//! # Example
//! ```no_run
//! use pfm_waveform::config::AppConfig;
//!
//! let config = AppConfig::load(Some("config/default.toml".as_ref()))?;
//! println!("run length: {}", config.detector.run_required);
//! # Ok::<(), pfm_waveform::error::WaveformError>(())
//! ```

use crate::error::{AppResult, WaveformError};
use crate::validation::{is_in_range, is_not_empty, is_valid_path};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration, passed explicitly into the selection driver.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Waveform edge detector parameters
    #[serde(default)]
    pub detector: DetectorConfig,
    /// Sounding eligibility rules
    #[serde(default)]
    pub eligibility: EligibilityConfig,
    /// Selection driver settings
    #[serde(default)]
    pub selection: SelectionConfig,
    /// Report output settings
    #[serde(default)]
    pub output: OutputConfig,
    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Edge detector parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectorConfig {
    /// A rise must exceed this many increasing samples before it becomes a run
    #[serde(default = "default_run_required")]
    pub run_required: u32,
    /// Consecutive non-increasing samples that make a sustained drop
    #[serde(default = "default_drop_required")]
    pub drop_required: u32,
    /// First sample index examined; earlier samples precede the surface return
    #[serde(default = "default_scan_start")]
    pub scan_start: usize,
    /// Qualifying runs kept per channel
    #[serde(default = "default_max_runs")]
    pub max_runs: usize,
    /// Confidence codes marking shoreline, depth-swapped or shallow-water records
    #[serde(default = "default_reserved_codes")]
    pub reserved_codes: Vec<i16>,
    /// PMT noise-floor thresholds
    #[serde(default = "default_pmt_noise")]
    pub pmt: NoiseFloor,
    /// APD noise-floor thresholds
    #[serde(default = "default_apd_noise")]
    pub apd: NoiseFloor,
}

/// Noise-floor early exit for one channel.
///
/// A sample counts towards the exit when `sample - baseline < noise_band`;
/// scanning stops once more than `noise_limit` samples have counted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoiseFloor {
    /// Band above the AC zero offset treated as noise
    pub noise_band: i32,
    /// Number of noise samples tolerated before the scan stops
    pub noise_limit: u32,
}

/// Sounding eligibility rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EligibilityConfig {
    /// Bottom-detection confidence a return must exceed
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: i16,
}

/// Selection driver settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionConfig {
    /// Only run the detector on these sequence numbers (empty = all eligible soundings)
    #[serde(default)]
    pub sequence_filter: Vec<u32>,
    /// Attitude lookup failures tolerated before the run is aborted
    #[serde(default = "default_max_attitude_failures")]
    pub max_attitude_failures: u32,
    /// Extension of the waveform file that sits next to each sounding file
    #[serde(default = "default_waveform_extension")]
    pub waveform_extension: String,
}

/// Report output settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Extension replacing the area file's extension for the detection report
    #[serde(default = "default_output_extension")]
    pub extension: String,
    /// Tag offset for detections found on the PMT channel
    #[serde(default = "default_pmt_tag_base")]
    pub pmt_tag_base: f64,
    /// Tag offset for detections found on the APD channel
    #[serde(default = "default_apd_tag_base")]
    pub apd_tag_base: f64,
    /// Optional CSV receiving every qualifying run and its difference series
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnostics: Option<PathBuf>,
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Output format (pretty, compact, json)
    #[serde(default = "default_log_format")]
    pub format: String,
}

// Default value functions
fn default_run_required() -> u32 {
    6
}

fn default_drop_required() -> u32 {
    5
}

fn default_scan_start() -> usize {
    20
}

fn default_max_runs() -> usize {
    2
}

fn default_reserved_codes() -> Vec<i16> {
    vec![72, 74]
}

fn default_pmt_noise() -> NoiseFloor {
    NoiseFloor {
        noise_band: 15,
        noise_limit: 10,
    }
}

fn default_apd_noise() -> NoiseFloor {
    NoiseFloor {
        noise_band: 0,
        noise_limit: 20,
    }
}

fn default_confidence_threshold() -> i16 {
    70
}

fn default_max_attitude_failures() -> u32 {
    100
}

fn default_waveform_extension() -> String {
    "inh".to_string()
}

fn default_output_extension() -> String {
    "pts".to_string()
}

fn default_pmt_tag_base() -> f64 {
    10_000_000.0
}

fn default_apd_tag_base() -> f64 {
    20_000_000.0
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "compact".to_string()
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            run_required: default_run_required(),
            drop_required: default_drop_required(),
            scan_start: default_scan_start(),
            max_runs: default_max_runs(),
            reserved_codes: default_reserved_codes(),
            pmt: default_pmt_noise(),
            apd: default_apd_noise(),
        }
    }
}

impl Default for EligibilityConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: default_confidence_threshold(),
        }
    }
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            sequence_filter: Vec::new(),
            max_attitude_failures: default_max_attitude_failures(),
            waveform_extension: default_waveform_extension(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            extension: default_output_extension(),
            pmt_tag_base: default_pmt_tag_base(),
            apd_tag_base: default_apd_tag_base(),
            diagnostics: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl AppConfig {
    /// Environment variable prefix for overrides.
    pub const ENV_PREFIX: &'static str = "PFM_WAVEFORM_";

    /// Build the figment used by [`AppConfig::load`].
    ///
    /// Environment variables override the file, e.g.
    /// `PFM_WAVEFORM_DETECTOR__RUN_REQUIRED=8`.
    pub fn figment(path: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(AppConfig::default()));
        if let Some(path) = path {
            figment = figment.merge(Toml::file(path));
        }
        figment.merge(Env::prefixed(Self::ENV_PREFIX).split("__"))
    }

    /// Load and validate configuration.
    pub fn load(path: Option<&Path>) -> AppResult<Self> {
        if let Some(path) = path {
            if !path.exists() {
                return Err(WaveformError::Configuration(format!(
                    "Configuration file {} does not exist",
                    path.display()
                )));
            }
        }
        let config: AppConfig = Self::figment(path).extract()?;
        config.validate().map_err(WaveformError::Configuration)?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), String> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.logging.level,
                valid_levels.join(", ")
            ));
        }

        let valid_formats = ["pretty", "compact", "json"];
        if !valid_formats.contains(&self.logging.format.to_lowercase().as_str()) {
            return Err(format!(
                "Invalid log format '{}'. Must be one of: {}",
                self.logging.format,
                valid_formats.join(", ")
            ));
        }

        let detector = &self.detector;
        if detector.run_required == 0 {
            return Err("detector.run_required must be at least 1".to_string());
        }
        if detector.drop_required == 0 {
            return Err("detector.drop_required must be at least 1".to_string());
        }
        // Index 0 has no predecessor to difference against.
        if detector.scan_start == 0 {
            return Err("detector.scan_start must be at least 1".to_string());
        }
        is_in_range(detector.max_runs, 1..=2)
            .map_err(|e| format!("detector.max_runs {}: {}", detector.max_runs, e))?;

        is_not_empty(&self.selection.waveform_extension)
            .map_err(|e| format!("selection.waveform_extension: {}", e))?;
        is_not_empty(&self.output.extension).map_err(|e| format!("output.extension: {}", e))?;
        if let Some(path) = &self.output.diagnostics {
            is_valid_path(&path.to_string_lossy())
                .map_err(|e| format!("output.diagnostics: {}", e))?;
        }

        Ok(())
    }
}
