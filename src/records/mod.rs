//! Record Access Layer
//!
//! The scan reads four kinds of data, each behind a small trait so the
//! selection driver never sees a file format:
//!
//! - [`PointCloud`]: the binned point cloud (bin index, per-bin depth records,
//!   source file list)
//! - [`SoundingSource`]: sounding records of one source file, by sequence number
//! - [`WaveformSource`]: waveform records of the matching waveform file
//! - [`AttitudeSource`]: attitude samples, by nearest timestamp
//!
//! [`RecordStore`] opens the per-file sources. Two implementations exist:
//! [`binary::FileRecordStore`] over memory-mapped record files and
//! [`mock::MemoryRecordStore`] for tests.
//!
//! Sequence numbers are 1-based record numbers. A sequence number outside a
//! file reads as absent rather than as an error.

pub mod attitude;
pub mod binary;
pub mod mock;
pub mod point_cloud;

use crate::area::BoundingBox;
use crate::error::AppResult;
use crate::waveform::{WaveformHeader, WaveformSample};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Depth value meaning "not computed". Never a real depth.
pub const DEPTH_NOT_COMPUTED: f32 = -998.0;

/// Validity bit marking a depth record as deleted in the point cloud.
pub const VALIDITY_DELETED: u32 = 0x0000_0200;

/// One LIDAR shot with its automated bottom solution.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SoundingRecord {
    /// Shot time in microseconds
    pub timestamp: i64,
    /// Latitude in decimal degrees
    pub latitude: f64,
    /// Longitude in decimal degrees
    pub longitude: f64,
    /// Primary corrected depth
    pub correct_depth: f32,
    /// Secondary corrected depth
    pub correct_sec_depth: f32,
    /// Primary elevation estimate
    pub kgps_res_elev: f32,
    /// Secondary elevation estimate
    pub kgps_sec_elev: f32,
    /// Primary bottom-detection confidence
    pub abdc: i16,
    /// Secondary bottom-detection confidence
    pub sec_abdc: i16,
    /// Bin of the first bottom return
    pub bot_bin_first: i16,
    /// Bin of the second bottom return
    pub bot_bin_second: i16,
    /// PMT bin the bottom pick used
    pub bot_bin_used_pmt: i16,
}

impl Default for SoundingRecord {
    fn default() -> Self {
        Self {
            timestamp: 0,
            latitude: 0.0,
            longitude: 0.0,
            correct_depth: DEPTH_NOT_COMPUTED,
            correct_sec_depth: DEPTH_NOT_COMPUTED,
            kgps_res_elev: DEPTH_NOT_COMPUTED,
            kgps_sec_elev: DEPTH_NOT_COMPUTED,
            abdc: 0,
            sec_abdc: 0,
            bot_bin_first: 0,
            bot_bin_second: 0,
            bot_bin_used_pmt: 0,
        }
    }
}

impl SoundingRecord {
    /// Whether the primary depth was computed.
    #[allow(clippy::float_cmp)]
    pub fn has_primary_depth(&self) -> bool {
        self.correct_depth != DEPTH_NOT_COMPUTED
    }

    /// Whether the secondary depth was computed.
    #[allow(clippy::float_cmp)]
    pub fn has_secondary_depth(&self) -> bool {
        self.correct_sec_depth != DEPTH_NOT_COMPUTED
    }
}

/// Platform position and attitude at one instant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AttitudeSample {
    /// Sample time in microseconds
    pub timestamp: i64,
    /// Latitude in decimal degrees
    pub latitude: f64,
    /// Longitude in decimal degrees
    pub longitude: f64,
    /// Ellipsoid height in meters
    pub altitude: f64,
    /// Roll in degrees
    pub roll: f64,
    /// Pitch in degrees
    pub pitch: f64,
    /// Heading in degrees
    pub heading: f64,
}

/// Column/row of a point-cloud bin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BinCoord {
    /// Column
    pub x: usize,
    /// Row
    pub y: usize,
}

/// A sounding reference stored in a bin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepthRecord {
    /// Source file identifier
    pub file_number: u16,
    /// Sequence number of the sounding in that file
    pub ping_number: u32,
    /// Validity bit flags
    #[serde(default)]
    pub validity: u32,
}

impl DepthRecord {
    /// Whether this record was deleted from the point cloud.
    pub fn is_deleted(&self) -> bool {
        self.validity & VALIDITY_DELETED != 0
    }
}

/// Kind of data held by a source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceDataType {
    /// CHARTS hydrographic output (soundings with waveforms)
    ChartsHof,
    /// CHARTS topographic output
    ChartsTof,
    /// Anything else
    Other,
}

/// A source file referenced by the point cloud.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    /// Resolved path
    pub path: PathBuf,
    /// Data type
    pub data_type: SourceDataType,
}

/// Point-cloud geometry.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PointCloudHeader {
    /// Geographic bounds (x = longitude, y = latitude)
    pub bounds: BoundingBox,
    /// Bin width in degrees of longitude
    pub x_bin_size_degrees: f64,
    /// Bin height in degrees of latitude
    pub y_bin_size_degrees: f64,
    /// Number of bin columns
    pub bin_width: usize,
    /// Number of bin rows
    pub bin_height: usize,
}

/// Bin-indexed point-cloud access.
pub trait PointCloud {
    /// Geometry of the point cloud
    fn header(&self) -> &PointCloudHeader;

    /// Number of soundings stored in a bin
    fn bin_sounding_count(&self, coord: BinCoord) -> AppResult<usize>;

    /// Depth records stored in a bin
    fn depth_records(&self, coord: BinCoord) -> AppResult<Vec<DepthRecord>>;

    /// Path and type of a source file
    fn source_file(&self, file_id: u16) -> AppResult<SourceFile>;
}

/// Sounding records of one source file.
pub trait SoundingSource {
    /// Number of records in the file
    fn record_count(&self) -> u32;

    /// Record at `sequence`, or `None` if absent
    fn read_sounding(&self, sequence: u32) -> Option<SoundingRecord>;
}

/// Waveform records of one waveform file.
pub trait WaveformSource {
    /// Per-file channel sizes and baselines
    fn header(&self) -> &WaveformHeader;

    /// Record at `sequence`, or `None` if absent
    fn read_waveform(&self, sequence: u32) -> Option<WaveformSample>;
}

/// Attitude samples of one pos/sbet file.
pub trait AttitudeSource {
    /// Sample closest to `timestamp`, or `None` if the file does not cover it
    fn nearest(&self, timestamp: i64) -> Option<AttitudeSample>;
}

/// Opens the per-file record sources.
pub trait RecordStore {
    /// Sounding source type
    type Soundings: SoundingSource;
    /// Waveform source type
    type Waveforms: WaveformSource;
    /// Attitude source type
    type Attitude: AttitudeSource;

    /// Open the sounding file at `path`
    fn open_soundings(&self, path: &Path) -> AppResult<Self::Soundings>;

    /// Open the waveform file at `path`
    fn open_waveforms(&self, path: &Path) -> AppResult<Self::Waveforms>;

    /// Locate the attitude file that belongs to a sounding file
    fn find_attitude_file(&self, sounding_path: &Path) -> Option<PathBuf>;

    /// Open the attitude file at `path`
    fn open_attitude(&self, path: &Path) -> AppResult<Self::Attitude>;
}
