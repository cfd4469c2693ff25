//! In-memory record store.
//!
//! Stands in for record files in tests and simulations. Paths are only used
//! as keys; nothing touches the filesystem.
//!
//! # Example
//!
//! ```
//! use pfm_waveform::records::mock::MemoryRecordStore;
//! use pfm_waveform::records::{RecordStore, SoundingRecord, SoundingSource};
//! use std::path::Path;
//!
//! let store = MemoryRecordStore::new()
//!     .with_soundings("line_100115_0101.hof", vec![SoundingRecord::default()]);
//! let soundings = store.open_soundings(Path::new("line_100115_0101.hof")).unwrap();
//! assert_eq!(soundings.record_count(), 1);
//! ```

use super::attitude::nearest_index;
use super::{
    AttitudeSample, AttitudeSource, RecordStore, SoundingRecord, SoundingSource, WaveformSource,
};
use crate::error::{AppResult, WaveformError};
use crate::waveform::{WaveformHeader, WaveformSample};
use std::cell::RefCell;
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// In-memory sounding file.
#[derive(Debug, Clone)]
pub struct MemorySoundings(Arc<Vec<SoundingRecord>>);

impl SoundingSource for MemorySoundings {
    fn record_count(&self) -> u32 {
        u32::try_from(self.0.len()).unwrap_or(u32::MAX)
    }

    fn read_sounding(&self, sequence: u32) -> Option<SoundingRecord> {
        let index = (sequence as usize).checked_sub(1)?;
        self.0.get(index).copied()
    }
}

/// In-memory waveform file. `None` entries read as absent records.
#[derive(Debug, Clone)]
pub struct MemoryWaveforms {
    header: WaveformHeader,
    samples: Arc<Vec<Option<WaveformSample>>>,
}

impl WaveformSource for MemoryWaveforms {
    fn header(&self) -> &WaveformHeader {
        &self.header
    }

    fn read_waveform(&self, sequence: u32) -> Option<WaveformSample> {
        let index = (sequence as usize).checked_sub(1)?;
        self.samples.get(index).cloned().flatten()
    }
}

/// In-memory attitude file, sorted by timestamp.
#[derive(Debug, Clone)]
pub struct MemoryAttitude(Arc<Vec<AttitudeSample>>);

impl AttitudeSource for MemoryAttitude {
    fn nearest(&self, timestamp: i64) -> Option<AttitudeSample> {
        let index = nearest_index(self.0.len(), |i| self.0[i].timestamp, timestamp)?;
        self.0.get(index).copied()
    }
}

/// [`RecordStore`] backed by maps keyed on path.
#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    soundings: HashMap<PathBuf, Arc<Vec<SoundingRecord>>>,
    waveforms: HashMap<PathBuf, (WaveformHeader, Arc<Vec<Option<WaveformSample>>>)>,
    attitude_links: HashMap<PathBuf, PathBuf>,
    attitude: HashMap<PathBuf, Arc<Vec<AttitudeSample>>>,
    attitude_opens: RefCell<HashMap<PathBuf, usize>>,
}

impl MemoryRecordStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a sounding file.
    pub fn with_soundings(mut self, path: impl Into<PathBuf>, records: Vec<SoundingRecord>) -> Self {
        self.soundings.insert(path.into(), Arc::new(records));
        self
    }

    /// Register a waveform file; `None` samples read as absent.
    pub fn with_waveforms(
        mut self,
        path: impl Into<PathBuf>,
        header: WaveformHeader,
        samples: Vec<Option<WaveformSample>>,
    ) -> Self {
        self.waveforms
            .insert(path.into(), (header, Arc::new(samples)));
        self
    }

    /// Register an attitude file and link it to a sounding file.
    pub fn with_attitude(
        mut self,
        sounding_path: impl Into<PathBuf>,
        attitude_path: impl Into<PathBuf>,
        mut samples: Vec<AttitudeSample>,
    ) -> Self {
        let attitude_path = attitude_path.into();
        samples.sort_by_key(|sample| sample.timestamp);
        self.attitude_links
            .insert(sounding_path.into(), attitude_path.clone());
        self.attitude.insert(attitude_path, Arc::new(samples));
        self
    }

    /// How many times the attitude file at `path` was opened.
    pub fn attitude_opens(&self, path: &Path) -> usize {
        self.attitude_opens
            .borrow()
            .get(path)
            .copied()
            .unwrap_or(0)
    }
}

fn not_found(path: &Path) -> WaveformError {
    WaveformError::Io(io::Error::new(
        io::ErrorKind::NotFound,
        format!("{} is not in the memory store", path.display()),
    ))
}

impl RecordStore for MemoryRecordStore {
    type Soundings = MemorySoundings;
    type Waveforms = MemoryWaveforms;
    type Attitude = MemoryAttitude;

    fn open_soundings(&self, path: &Path) -> AppResult<Self::Soundings> {
        self.soundings
            .get(path)
            .map(|records| MemorySoundings(Arc::clone(records)))
            .ok_or_else(|| not_found(path))
    }

    fn open_waveforms(&self, path: &Path) -> AppResult<Self::Waveforms> {
        self.waveforms
            .get(path)
            .map(|(header, samples)| MemoryWaveforms {
                header: *header,
                samples: Arc::clone(samples),
            })
            .ok_or_else(|| not_found(path))
    }

    fn find_attitude_file(&self, sounding_path: &Path) -> Option<PathBuf> {
        self.attitude_links.get(sounding_path).cloned()
    }

    fn open_attitude(&self, path: &Path) -> AppResult<Self::Attitude> {
        let samples = self.attitude.get(path).ok_or_else(|| not_found(path))?;
        *self
            .attitude_opens
            .borrow_mut()
            .entry(path.to_path_buf())
            .or_insert(0) += 1;
        Ok(MemoryAttitude(Arc::clone(samples)))
    }
}
