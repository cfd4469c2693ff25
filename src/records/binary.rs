//! Memory-mapped record files.
//!
//! Sounding, waveform and attitude files share one layout: a 64-byte
//! header followed by fixed-size little-endian records.
//!
//! # Memory Layout
//! ```text
//! [64-byte header] [record 1] [record 2] ...
//!
//! Header:
//!   magic: [u8; 8]          ("PFMWHOF1" | "PFMWINH1" | "PFMWPOS1")
//!   record_count: u32
//!   sounding:  record_size: u32 (64)
//!   waveform:  pmt_size: u16, apd_size: u16,
//!              pmt_ac_zero_offset: u16, apd_ac_zero_offset: u16
//!   attitude:  (nothing further)
//!   zero padding to 64 bytes
//!
//! Sounding record (64 bytes):
//!   timestamp i64, latitude f64, longitude f64,
//!   correct_depth f32, correct_sec_depth f32, kgps_res_elev f32, kgps_sec_elev f32,
//!   abdc i16, sec_abdc i16, bot_bin_first i16, bot_bin_second i16, bot_bin_used_pmt i16,
//!   zero padding
//!
//! Waveform record (8 + 2 * (pmt_size + apd_size) bytes):
//!   timestamp i64, pmt [u16; pmt_size], apd [u16; apd_size]
//!
//! Attitude record (56 bytes):
//!   timestamp i64, latitude f64, longitude f64, altitude f64,
//!   roll f64, pitch f64, heading f64
//! ```
//!
//! Files are mapped read-only and decoded on demand; nothing is copied
//! until a record is requested.

use super::attitude::{find_attitude_file, nearest_index};
use super::{
    AttitudeSample, AttitudeSource, RecordStore, SoundingRecord, SoundingSource, WaveformSource,
};
use crate::error::{AppResult, WaveformError};
use crate::waveform::{WaveformHeader, WaveformSample};
use bytes::{Buf, BufMut};
use memmap2::Mmap;
use std::fs::File;
use std::path::{Path, PathBuf};

/// Size of every record file header in bytes
pub const HEADER_SIZE: usize = 64;

/// Size of a sounding record in bytes
pub const SOUNDING_RECORD_SIZE: usize = 64;

/// Size of an attitude record in bytes
pub const ATTITUDE_RECORD_SIZE: usize = 56;

const SOUNDING_MAGIC: &[u8; 8] = b"PFMWHOF1";
const WAVEFORM_MAGIC: &[u8; 8] = b"PFMWINH1";
const ATTITUDE_MAGIC: &[u8; 8] = b"PFMWPOS1";

/// Map `path` read-only after checking that it can hold a header.
#[allow(unsafe_code)]
fn map_file(path: &Path) -> AppResult<Mmap> {
    let file = File::open(path)?;
    let len = file.metadata()?.len();
    if len < HEADER_SIZE as u64 {
        return Err(WaveformError::record_format(
            path,
            format!("file is {} bytes, shorter than the {}-byte header", len, HEADER_SIZE),
        ));
    }

    // SAFETY: The map is read-only and record files are not rewritten while a scan runs.
    let mmap = unsafe { Mmap::map(&file)? };
    Ok(mmap)
}

/// Check the magic and return a buffer positioned after it.
fn read_magic<'a>(path: &Path, mmap: &'a Mmap, expected: &[u8; 8]) -> AppResult<&'a [u8]> {
    let mut header = &mmap[..HEADER_SIZE];
    let mut magic = [0u8; 8];
    header.copy_to_slice(&mut magic);
    if &magic != expected {
        return Err(WaveformError::record_format(
            path,
            format!(
                "expected magic {:?}, found {:?}",
                String::from_utf8_lossy(expected),
                String::from_utf8_lossy(&magic)
            ),
        ));
    }
    Ok(header)
}

fn check_length(path: &Path, mmap: &Mmap, record_count: u32, record_size: usize) -> AppResult<()> {
    let needed = HEADER_SIZE as u64 + u64::from(record_count) * record_size as u64;
    if (mmap.len() as u64) < needed {
        return Err(WaveformError::record_format(
            path,
            format!(
                "truncated: {} records of {} bytes need {} bytes, file has {}",
                record_count,
                record_size,
                needed,
                mmap.len()
            ),
        ));
    }
    Ok(())
}

/// Byte offset of 1-based `sequence`, or `None` when it is out of range.
fn record_offset(sequence: u32, record_count: u32, record_size: usize) -> Option<usize> {
    if sequence == 0 || sequence > record_count {
        return None;
    }
    Some(HEADER_SIZE + (sequence as usize - 1) * record_size)
}

// =============================================================================
// Sounding files
// =============================================================================

/// A memory-mapped sounding file.
pub struct MappedSoundingFile {
    path: PathBuf,
    mmap: Mmap,
    record_count: u32,
    record_size: usize,
}

impl MappedSoundingFile {
    /// Open and validate a sounding file.
    pub fn open(path: &Path) -> AppResult<Self> {
        let mmap = map_file(path)?;
        let mut header = read_magic(path, &mmap, SOUNDING_MAGIC)?;
        let record_count = header.get_u32_le();
        let record_size = header.get_u32_le() as usize;
        if record_size < SOUNDING_RECORD_SIZE {
            return Err(WaveformError::record_format(
                path,
                format!("record size {} is smaller than {}", record_size, SOUNDING_RECORD_SIZE),
            ));
        }
        check_length(path, &mmap, record_count, record_size)?;

        Ok(Self {
            path: path.to_path_buf(),
            mmap,
            record_count,
            record_size,
        })
    }

    /// Path the file was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SoundingSource for MappedSoundingFile {
    fn record_count(&self) -> u32 {
        self.record_count
    }

    fn read_sounding(&self, sequence: u32) -> Option<SoundingRecord> {
        let offset = record_offset(sequence, self.record_count, self.record_size)?;
        let mut buf = &self.mmap[offset..offset + SOUNDING_RECORD_SIZE];
        Some(SoundingRecord {
            timestamp: buf.get_i64_le(),
            latitude: buf.get_f64_le(),
            longitude: buf.get_f64_le(),
            correct_depth: buf.get_f32_le(),
            correct_sec_depth: buf.get_f32_le(),
            kgps_res_elev: buf.get_f32_le(),
            kgps_sec_elev: buf.get_f32_le(),
            abdc: buf.get_i16_le(),
            sec_abdc: buf.get_i16_le(),
            bot_bin_first: buf.get_i16_le(),
            bot_bin_second: buf.get_i16_le(),
            bot_bin_used_pmt: buf.get_i16_le(),
        })
    }
}

/// Write `records` as a sounding file.
pub fn write_sounding_file(path: &Path, records: &[SoundingRecord]) -> AppResult<()> {
    let mut out = Vec::with_capacity(HEADER_SIZE + records.len() * SOUNDING_RECORD_SIZE);
    out.put_slice(SOUNDING_MAGIC);
    out.put_u32_le(record_count(path, records.len())?);
    out.put_u32_le(SOUNDING_RECORD_SIZE as u32);
    out.put_bytes(0, HEADER_SIZE - out.len());

    for record in records {
        let start = out.len();
        out.put_i64_le(record.timestamp);
        out.put_f64_le(record.latitude);
        out.put_f64_le(record.longitude);
        out.put_f32_le(record.correct_depth);
        out.put_f32_le(record.correct_sec_depth);
        out.put_f32_le(record.kgps_res_elev);
        out.put_f32_le(record.kgps_sec_elev);
        out.put_i16_le(record.abdc);
        out.put_i16_le(record.sec_abdc);
        out.put_i16_le(record.bot_bin_first);
        out.put_i16_le(record.bot_bin_second);
        out.put_i16_le(record.bot_bin_used_pmt);
        out.put_bytes(0, SOUNDING_RECORD_SIZE - (out.len() - start));
    }

    std::fs::write(path, out)?;
    Ok(())
}

// =============================================================================
// Waveform files
// =============================================================================

/// A memory-mapped waveform file.
pub struct MappedWaveformFile {
    mmap: Mmap,
    header: WaveformHeader,
    record_count: u32,
    record_size: usize,
}

impl MappedWaveformFile {
    /// Open and validate a waveform file.
    pub fn open(path: &Path) -> AppResult<Self> {
        let mmap = map_file(path)?;
        let mut buf = read_magic(path, &mmap, WAVEFORM_MAGIC)?;
        let record_count = buf.get_u32_le();
        let header = WaveformHeader {
            pmt_size: usize::from(buf.get_u16_le()),
            apd_size: usize::from(buf.get_u16_le()),
            pmt_ac_zero_offset: i32::from(buf.get_u16_le()),
            apd_ac_zero_offset: i32::from(buf.get_u16_le()),
        };
        let record_size = waveform_record_size(&header);
        check_length(path, &mmap, record_count, record_size)?;

        Ok(Self {
            mmap,
            header,
            record_count,
            record_size,
        })
    }

    /// Number of records in the file.
    pub fn record_count(&self) -> u32 {
        self.record_count
    }
}

fn waveform_record_size(header: &WaveformHeader) -> usize {
    8 + 2 * (header.pmt_size + header.apd_size)
}

impl WaveformSource for MappedWaveformFile {
    fn header(&self) -> &WaveformHeader {
        &self.header
    }

    fn read_waveform(&self, sequence: u32) -> Option<WaveformSample> {
        let offset = record_offset(sequence, self.record_count, self.record_size)?;
        let mut buf = &self.mmap[offset..offset + self.record_size];
        let timestamp = buf.get_i64_le();
        let pmt = (0..self.header.pmt_size)
            .map(|_| i32::from(buf.get_u16_le()))
            .collect();
        let apd = (0..self.header.apd_size)
            .map(|_| i32::from(buf.get_u16_le()))
            .collect();
        Some(WaveformSample {
            timestamp,
            pmt,
            apd,
        })
    }
}

/// Write `samples` as a waveform file.
///
/// Every sample must match the header's channel sizes and fit in 16 bits.
pub fn write_waveform_file(
    path: &Path,
    header: &WaveformHeader,
    samples: &[WaveformSample],
) -> AppResult<()> {
    let to_u16 = |value: i32, what: &str| {
        u16::try_from(value).map_err(|_| {
            WaveformError::record_format(path, format!("{} {} does not fit in 16 bits", what, value))
        })
    };
    let to_size = |value: usize, what: &str| {
        u16::try_from(value).map_err(|_| {
            WaveformError::record_format(path, format!("{} {} does not fit in 16 bits", what, value))
        })
    };

    let record_size = waveform_record_size(header);
    let mut out = Vec::with_capacity(HEADER_SIZE + samples.len() * record_size);
    out.put_slice(WAVEFORM_MAGIC);
    out.put_u32_le(record_count(path, samples.len())?);
    out.put_u16_le(to_size(header.pmt_size, "pmt_size")?);
    out.put_u16_le(to_size(header.apd_size, "apd_size")?);
    out.put_u16_le(to_u16(header.pmt_ac_zero_offset, "pmt_ac_zero_offset")?);
    out.put_u16_le(to_u16(header.apd_ac_zero_offset, "apd_ac_zero_offset")?);
    out.put_bytes(0, HEADER_SIZE - out.len());

    for (index, sample) in samples.iter().enumerate() {
        if sample.pmt.len() != header.pmt_size || sample.apd.len() != header.apd_size {
            return Err(WaveformError::record_format(
                path,
                format!(
                    "record {} has {}/{} samples, header declares {}/{}",
                    index + 1,
                    sample.pmt.len(),
                    sample.apd.len(),
                    header.pmt_size,
                    header.apd_size
                ),
            ));
        }
        out.put_i64_le(sample.timestamp);
        for &value in sample.pmt.iter().chain(&sample.apd) {
            out.put_u16_le(to_u16(value, "sample")?);
        }
    }

    std::fs::write(path, out)?;
    Ok(())
}

// =============================================================================
// Attitude files
// =============================================================================

/// A memory-mapped pos/sbet attitude file, sorted by timestamp.
pub struct MappedAttitudeFile {
    mmap: Mmap,
    record_count: u32,
}

impl MappedAttitudeFile {
    /// Open and validate an attitude file.
    pub fn open(path: &Path) -> AppResult<Self> {
        let mmap = map_file(path)?;
        let mut header = read_magic(path, &mmap, ATTITUDE_MAGIC)?;
        let record_count = header.get_u32_le();
        check_length(path, &mmap, record_count, ATTITUDE_RECORD_SIZE)?;
        Ok(Self { mmap, record_count })
    }

    fn record(&self, index: usize) -> &[u8] {
        let offset = HEADER_SIZE + index * ATTITUDE_RECORD_SIZE;
        &self.mmap[offset..offset + ATTITUDE_RECORD_SIZE]
    }

    fn timestamp_at(&self, index: usize) -> i64 {
        self.record(index).get_i64_le()
    }
}

impl AttitudeSource for MappedAttitudeFile {
    fn nearest(&self, timestamp: i64) -> Option<AttitudeSample> {
        let index = nearest_index(self.record_count as usize, |i| self.timestamp_at(i), timestamp)?;
        let mut buf = self.record(index);
        Some(AttitudeSample {
            timestamp: buf.get_i64_le(),
            latitude: buf.get_f64_le(),
            longitude: buf.get_f64_le(),
            altitude: buf.get_f64_le(),
            roll: buf.get_f64_le(),
            pitch: buf.get_f64_le(),
            heading: buf.get_f64_le(),
        })
    }
}

/// Write `samples` as an attitude file. Samples must already be sorted by time.
pub fn write_attitude_file(path: &Path, samples: &[AttitudeSample]) -> AppResult<()> {
    if samples.windows(2).any(|pair| pair[1].timestamp < pair[0].timestamp) {
        return Err(WaveformError::record_format(path, "attitude samples are not sorted by time"));
    }

    let mut out = Vec::with_capacity(HEADER_SIZE + samples.len() * ATTITUDE_RECORD_SIZE);
    out.put_slice(ATTITUDE_MAGIC);
    out.put_u32_le(record_count(path, samples.len())?);
    out.put_bytes(0, HEADER_SIZE - out.len());

    for sample in samples {
        out.put_i64_le(sample.timestamp);
        out.put_f64_le(sample.latitude);
        out.put_f64_le(sample.longitude);
        out.put_f64_le(sample.altitude);
        out.put_f64_le(sample.roll);
        out.put_f64_le(sample.pitch);
        out.put_f64_le(sample.heading);
    }

    std::fs::write(path, out)?;
    Ok(())
}

fn record_count(path: &Path, len: usize) -> AppResult<u32> {
    u32::try_from(len)
        .map_err(|_| WaveformError::record_format(path, format!("{} records exceed u32", len)))
}

// =============================================================================
// Store
// =============================================================================

/// [`RecordStore`] over record files on disk.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileRecordStore;

impl RecordStore for FileRecordStore {
    type Soundings = MappedSoundingFile;
    type Waveforms = MappedWaveformFile;
    type Attitude = MappedAttitudeFile;

    fn open_soundings(&self, path: &Path) -> AppResult<Self::Soundings> {
        MappedSoundingFile::open(path)
    }

    fn open_waveforms(&self, path: &Path) -> AppResult<Self::Waveforms> {
        MappedWaveformFile::open(path)
    }

    fn find_attitude_file(&self, sounding_path: &Path) -> Option<PathBuf> {
        find_attitude_file(sounding_path)
    }

    fn open_attitude(&self, path: &Path) -> AppResult<Self::Attitude> {
        MappedAttitudeFile::open(path)
    }
}
