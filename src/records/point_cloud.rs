//! JSON point-cloud bin index.
//!
//! The index holds the point-cloud geometry, the list of source files, and
//! the depth records of every populated bin:
//!
//! ```json
//! {
//!   "header": {
//!     "bounds": { "min_x": -88.0, "min_y": 30.0, "max_x": -87.0, "max_y": 31.0 },
//!     "x_bin_size_degrees": 0.01, "y_bin_size_degrees": 0.01,
//!     "bin_width": 100, "bin_height": 100
//!   },
//!   "files": [{ "id": 0, "path": "hof/ML_100115_0101.hof", "data_type": "charts_hof" }],
//!   "bins": [{ "x": 10, "y": 12, "depths": [{ "file_number": 0, "ping_number": 42 }] }]
//! }
//! ```
//!
//! Relative file paths resolve against the directory holding the index.

use super::{BinCoord, DepthRecord, PointCloud, PointCloudHeader, SourceDataType, SourceFile};
use crate::error::{AppResult, WaveformError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tracing::info;

/// Source file entry of the index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedFile {
    /// File identifier referenced by depth records
    pub id: u16,
    /// Path, absolute or relative to the index
    pub path: PathBuf,
    /// Kind of data in the file
    pub data_type: SourceDataType,
}

/// One populated bin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedBin {
    /// Column
    pub x: usize,
    /// Row
    pub y: usize,
    /// Depth records stored in the bin
    #[serde(default)]
    pub depths: Vec<DepthRecord>,
}

/// Point cloud backed by a JSON index document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointCloudIndex {
    /// Geometry
    pub header: PointCloudHeader,
    /// Source files
    pub files: Vec<IndexedFile>,
    /// Populated bins
    #[serde(default)]
    pub bins: Vec<IndexedBin>,
    #[serde(skip)]
    root: PathBuf,
    #[serde(skip)]
    lookup: HashMap<BinCoord, usize>,
}

impl PointCloudIndex {
    /// Build an index in memory. Relative paths resolve against the current directory.
    pub fn new(
        header: PointCloudHeader,
        files: Vec<IndexedFile>,
        bins: Vec<IndexedBin>,
    ) -> AppResult<Self> {
        let mut index = Self {
            header,
            files,
            bins,
            root: PathBuf::new(),
            lookup: HashMap::new(),
        };
        index.prepare()?;
        Ok(index)
    }

    /// Resolve relative file paths against `root`.
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = root.into();
        self
    }

    /// Open and validate an index document.
    pub fn open(path: &Path) -> AppResult<Self> {
        let file = File::open(path).map_err(|e| {
            WaveformError::PointCloud(format!("unable to open {}: {e}", path.display()))
        })?;
        let mut index: PointCloudIndex = serde_json::from_reader(BufReader::new(file))
            .map_err(|e| {
                WaveformError::PointCloud(format!("unable to read {}: {e}", path.display()))
            })?;
        index.prepare()?;
        index.root = path.parent().map(Path::to_path_buf).unwrap_or_default();
        info!(
            path = %path.display(),
            files = index.files.len(),
            bins = index.bins.len(),
            "point cloud opened"
        );
        Ok(index)
    }

    /// Save the index as pretty-printed JSON.
    pub fn save(&self, path: &Path) -> AppResult<()> {
        let file = File::create(path)?;
        serde_json::to_writer_pretty(file, self)?;
        Ok(())
    }

    fn prepare(&mut self) -> AppResult<()> {
        let header = &self.header;
        if !(header.x_bin_size_degrees > 0.0 && header.y_bin_size_degrees > 0.0) {
            return Err(WaveformError::PointCloud(
                "bin sizes must be positive".to_string(),
            ));
        }
        if header.bounds.min_x > header.bounds.max_x || header.bounds.min_y > header.bounds.max_y {
            return Err(WaveformError::PointCloud(
                "bounds are inverted".to_string(),
            ));
        }

        self.lookup.clear();
        for (position, bin) in self.bins.iter().enumerate() {
            if bin.x >= header.bin_width || bin.y >= header.bin_height {
                return Err(WaveformError::PointCloud(format!(
                    "bin ({}, {}) lies outside the {}x{} grid",
                    bin.x, bin.y, header.bin_width, header.bin_height
                )));
            }
            let coord = BinCoord { x: bin.x, y: bin.y };
            if self.lookup.insert(coord, position).is_some() {
                return Err(WaveformError::PointCloud(format!(
                    "bin ({}, {}) listed twice",
                    bin.x, bin.y
                )));
            }
        }
        Ok(())
    }

    fn bin(&self, coord: BinCoord) -> AppResult<Option<&IndexedBin>> {
        if coord.x >= self.header.bin_width || coord.y >= self.header.bin_height {
            return Err(WaveformError::PointCloud(format!(
                "bin ({}, {}) requested outside the grid",
                coord.x, coord.y
            )));
        }
        Ok(self.lookup.get(&coord).map(|&position| &self.bins[position]))
    }
}

impl PointCloud for PointCloudIndex {
    fn header(&self) -> &PointCloudHeader {
        &self.header
    }

    fn bin_sounding_count(&self, coord: BinCoord) -> AppResult<usize> {
        Ok(self.bin(coord)?.map_or(0, |bin| bin.depths.len()))
    }

    fn depth_records(&self, coord: BinCoord) -> AppResult<Vec<DepthRecord>> {
        Ok(self
            .bin(coord)?
            .map(|bin| bin.depths.clone())
            .unwrap_or_default())
    }

    fn source_file(&self, file_id: u16) -> AppResult<SourceFile> {
        let file = self
            .files
            .iter()
            .find(|file| file.id == file_id)
            .ok_or_else(|| WaveformError::PointCloud(format!("unknown file id {file_id}")))?;
        let path = if file.path.is_absolute() {
            file.path.clone()
        } else {
            self.root.join(&file.path)
        };
        Ok(SourceFile {
            path,
            data_type: file.data_type,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::area::BoundingBox;

    fn header() -> PointCloudHeader {
        PointCloudHeader {
            bounds: BoundingBox {
                min_x: -88.0,
                min_y: 30.0,
                max_x: -87.0,
                max_y: 31.0,
            },
            x_bin_size_degrees: 0.1,
            y_bin_size_degrees: 0.1,
            bin_width: 10,
            bin_height: 10,
        }
    }

    fn depth(ping_number: u32) -> DepthRecord {
        DepthRecord {
            file_number: 0,
            ping_number,
            validity: 0,
        }
    }

    #[test]
    fn bins_and_files_resolve() {
        let index = PointCloudIndex::new(
            header(),
            vec![IndexedFile {
                id: 0,
                path: PathBuf::from("hof/ML_100115_0101.hof"),
                data_type: SourceDataType::ChartsHof,
            }],
            vec![IndexedBin {
                x: 2,
                y: 3,
                depths: vec![depth(5), depth(9)],
            }],
        )
        .unwrap()
        .with_root("/survey");

        assert_eq!(index.bin_sounding_count(BinCoord { x: 2, y: 3 }).unwrap(), 2);
        assert_eq!(index.bin_sounding_count(BinCoord { x: 0, y: 0 }).unwrap(), 0);
        assert!(index.depth_records(BinCoord { x: 10, y: 0 }).is_err());

        let file = index.source_file(0).unwrap();
        assert_eq!(file.path, PathBuf::from("/survey/hof/ML_100115_0101.hof"));
        assert!(index.source_file(7).is_err());
    }

    #[test]
    fn duplicate_and_out_of_grid_bins_are_rejected() {
        let twice = vec![
            IndexedBin {
                x: 1,
                y: 1,
                depths: vec![],
            },
            IndexedBin {
                x: 1,
                y: 1,
                depths: vec![],
            },
        ];
        assert!(PointCloudIndex::new(header(), vec![], twice).is_err());

        let outside = vec![IndexedBin {
            x: 10,
            y: 1,
            depths: vec![],
        }];
        assert!(PointCloudIndex::new(header(), vec![], outside).is_err());
    }

    #[test]
    fn open_reads_json_relative_to_index() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("survey.json");
        let index = PointCloudIndex::new(
            header(),
            vec![IndexedFile {
                id: 4,
                path: PathBuf::from("ML_100115_0101.hof"),
                data_type: SourceDataType::ChartsHof,
            }],
            vec![IndexedBin {
                x: 0,
                y: 0,
                depths: vec![depth(1)],
            }],
        )
        .unwrap();
        index.save(&path).unwrap();

        let reopened = PointCloudIndex::open(&path).unwrap();
        assert_eq!(
            reopened.source_file(4).unwrap().path,
            dir.path().join("ML_100115_0101.hof")
        );
        assert_eq!(
            reopened.depth_records(BinCoord { x: 0, y: 0 }).unwrap(),
            vec![depth(1)]
        );
    }

    #[test]
    fn unreadable_document_is_a_point_cloud_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            PointCloudIndex::open(&path),
            Err(WaveformError::PointCloud(_))
        ));
        assert!(matches!(
            PointCloudIndex::open(&dir.path().join("missing.json")),
            Err(WaveformError::PointCloud(_))
        ));
    }
}
