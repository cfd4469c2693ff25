//! Selection driver.
//!
//! A scan runs in two passes:
//!
//! 1. **Bin pass**: every bin under the area's bounding rectangle is visited
//!    and, per source file, the lowest and highest sequence number referenced
//!    by a live depth record is kept. The result over-covers the area; the
//!    exact polygon test happens per sounding.
//! 2. **Sounding pass**: for each sounding file, in file-id order, every
//!    sequence number in its range is read, paired with its waveform and
//!    attitude sample, tested for eligibility, and handed to the edge
//!    detector.
//!
//! Per-sounding problems are counted in [`SelectionSummary`] and logged. The
//! only errors returned are those that end the run.

use crate::area::{BoundingBox, Polygon};
use crate::config::AppConfig;
use crate::error::{AppResult, WaveformError};
use crate::records::{
    AttitudeSource, BinCoord, PointCloud, PointCloudHeader, RecordStore, SoundingRecord,
    SoundingSource, SourceDataType, WaveformSource,
};
use crate::report::{DetectionReport, Progress};
use crate::waveform::{EdgeDetector, WaveformAnalysis};
use chrono::DateTime;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::io::Write;
use std::ops::{Range, RangeInclusive};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Inclusive range of sequence numbers touched in one source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SequenceRange {
    /// Lowest sequence number
    pub start: u32,
    /// Highest sequence number
    pub end: u32,
}

impl SequenceRange {
    /// Range holding a single sequence number.
    pub fn new(sequence: u32) -> Self {
        Self {
            start: sequence,
            end: sequence,
        }
    }

    /// Widen the range to cover `sequence`.
    pub fn include(&mut self, sequence: u32) {
        self.start = self.start.min(sequence);
        self.end = self.end.max(sequence);
    }

    /// Number of sequence numbers covered.
    pub fn len(&self) -> u64 {
        u64::from(self.end - self.start) + 1
    }

    /// Always false; a range holds at least one sequence number.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// The sequence numbers in order.
    pub fn iter(&self) -> RangeInclusive<u32> {
        self.start..=self.end
    }
}

/// Rectangle of bins covering an area, clamped to the point-cloud grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BinWindow {
    /// First column
    pub x_start: usize,
    /// First row
    pub y_start: usize,
    /// Columns
    pub width: usize,
    /// Rows
    pub height: usize,
}

impl BinWindow {
    /// Bins under `area`, matched to the nearest cell.
    ///
    /// Fails with [`WaveformError::AreaOutsideBounds`] when the area does not
    /// overlap the point cloud at all.
    pub fn for_area(header: &PointCloudHeader, area: &BoundingBox) -> AppResult<Self> {
        if !area.intersects(&header.bounds) {
            return Err(WaveformError::AreaOutsideBounds);
        }

        let x_bin = header.x_bin_size_degrees;
        let y_bin = header.y_bin_size_degrees;
        let x_start = ((area.min_x - header.bounds.min_x) / x_bin).round() as i64;
        let y_start = ((area.min_y - header.bounds.min_y) / y_bin).round() as i64;
        let width = (area.width() / x_bin).round() as i64;
        let height = (area.height() / y_bin).round() as i64;

        let x_start = x_start.max(0);
        let y_start = y_start.max(0);
        let width = width.min(header.bin_width as i64 - x_start).max(0);
        let height = height.min(header.bin_height as i64 - y_start).max(0);

        Ok(Self {
            x_start: x_start as usize,
            y_start: y_start as usize,
            width: width as usize,
            height: height as usize,
        })
    }

    /// Column indices
    pub fn columns(&self) -> Range<usize> {
        self.x_start..self.x_start + self.width
    }

    /// Row indices
    pub fn rows(&self) -> Range<usize> {
        self.y_start..self.y_start + self.height
    }

    /// Rounded percentage of rows done once `row` has been read.
    pub fn row_percent(&self, row: usize) -> u32 {
        if self.height == 0 {
            return 100;
        }
        let done = row.saturating_sub(self.y_start) as f64;
        (done / self.height as f64 * 100.0).round() as u32
    }
}

/// Per-file sequence ranges referenced by live depth records inside `window`.
pub fn collect_file_ranges<P: PointCloud, W: Write>(
    cloud: &P,
    window: &BinWindow,
    progress: &mut Progress<W>,
) -> AppResult<BTreeMap<u16, SequenceRange>> {
    let mut ranges: BTreeMap<u16, SequenceRange> = BTreeMap::new();

    for y in window.rows() {
        for x in window.columns() {
            let coord = BinCoord { x, y };
            if cloud.bin_sounding_count(coord)? == 0 {
                continue;
            }
            for depth in cloud.depth_records(coord)? {
                if depth.is_deleted() {
                    continue;
                }
                ranges
                    .entry(depth.file_number)
                    .and_modify(|range| range.include(depth.ping_number))
                    .or_insert_with(|| SequenceRange::new(depth.ping_number));
            }
        }
        progress.update(window.row_percent(y))?;
    }

    Ok(ranges)
}

/// Outcome of the eligibility test for one sounding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eligibility {
    /// Worth handing to the detector
    Eligible,
    /// Neither return is confident enough
    LowConfidence,
    /// Both depths were computed, so the bottom pick already found two returns
    TwoReturns,
    /// The position lies outside the area polygon
    OutsideArea,
}

/// Decide whether `sounding` should be analyzed.
///
/// A sounding qualifies when its primary confidence, or its secondary
/// confidence with a computed secondary depth, exceeds `threshold`; when only
/// one of the two depths was computed; and when it lies inside `polygon`.
pub fn check_eligibility(sounding: &SoundingRecord, polygon: &Polygon, threshold: i16) -> Eligibility {
    let confident = sounding.abdc > threshold
        || (sounding.has_secondary_depth() && sounding.sec_abdc > threshold);
    if !confident {
        return Eligibility::LowConfidence;
    }
    if sounding.has_primary_depth() && sounding.has_secondary_depth() {
        return Eligibility::TwoReturns;
    }
    if !polygon.contains(sounding.longitude, sounding.latitude) {
        return Eligibility::OutsideArea;
    }
    Eligibility::Eligible
}

/// Holds at most one open attitude source.
///
/// The source is kept while requests name the same file. A request for a
/// different file releases the current source before the next one opens.
#[derive(Debug)]
pub struct AttitudeSlot<A> {
    current: Option<(PathBuf, A)>,
    opens: usize,
}

impl<A> Default for AttitudeSlot<A> {
    fn default() -> Self {
        Self {
            current: None,
            opens: 0,
        }
    }
}

impl<A: AttitudeSource> AttitudeSlot<A> {
    /// Empty slot.
    pub fn new() -> Self {
        Self::default()
    }

    /// The source for `path`, opening it through `store` if it is not the held one.
    pub fn acquire<S>(&mut self, store: &S, path: &Path) -> AppResult<&A>
    where
        S: RecordStore<Attitude = A>,
    {
        let current = match self.current.take() {
            Some(held) if held.0.as_path() == path => held,
            previous => {
                drop(previous);
                let source = store.open_attitude(path)?;
                self.opens += 1;
                debug!(path = %path.display(), "attitude file opened");
                (path.to_path_buf(), source)
            }
        };
        Ok(&self.current.insert(current).1)
    }

    /// Close the held source, if any.
    pub fn release(&mut self) {
        if let Some((path, _)) = self.current.take() {
            debug!(path = %path.display(), "attitude file released");
        }
    }

    /// Path of the held source
    pub fn path(&self) -> Option<&Path> {
        self.current.as_ref().map(|(path, _)| path.as_path())
    }

    /// Sources opened over the slot's lifetime
    pub fn opens(&self) -> usize {
        self.opens
    }
}

/// Counters for one scan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SelectionSummary {
    /// Sounding files scanned
    pub files_processed: u64,
    /// Files skipped (not sounding data, or no waveform file)
    pub files_skipped: u64,
    /// Sequence numbers visited
    pub soundings_scanned: u64,
    /// Sequence numbers with no readable sounding
    pub unreadable: u64,
    /// Soundings whose primary depth was not computed
    pub no_depth: u64,
    /// Soundings with no waveform record
    pub no_waveform: u64,
    /// Soundings with no usable attitude file
    pub no_attitude_file: u64,
    /// Soundings whose timestamp was not covered by the attitude file
    pub attitude_failures: u32,
    /// Soundings that passed the eligibility test
    pub eligible: u64,
    /// Soundings that failed the eligibility test
    pub ineligible: u64,
    /// Eligible soundings left out by the sequence filter
    pub filtered: u64,
    /// Soundings the detector scanned
    pub analyzed: u64,
    /// Soundings carrying a reserved confidence code
    pub not_applicable: u64,
    /// Soundings written to the report
    pub detections: u64,
}

impl fmt::Display for SelectionSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Extracted {} waveforms", self.eligible)?;
        writeln!(
            f,
            "{} detections, {} analyzed, {} not applicable, {} filtered",
            self.detections, self.analyzed, self.not_applicable, self.filtered
        )?;
        write!(
            f,
            "{} ineligible, {} skipped (no depth {}, no waveform {}, no attitude file {}, unreadable {}), {} attitude failures",
            self.ineligible,
            self.no_depth + self.no_waveform + self.no_attitude_file + self.unreadable,
            self.no_depth,
            self.no_waveform,
            self.no_attitude_file,
            self.unreadable,
            self.attitude_failures
        )
    }
}

/// Sounding time formatted for messages, falling back to the raw value.
fn format_timestamp(micros: i64) -> String {
    DateTime::from_timestamp_micros(micros)
        .map(|time| time.format("%Y-%m-%d %H:%M:%S%.6f UTC").to_string())
        .unwrap_or_else(|| micros.to_string())
}

struct FileScan<'a, W, V> {
    file_id: u16,
    path: &'a Path,
    soundings: &'a V,
    waveforms: &'a W,
    attitude_path: Option<&'a Path>,
}

/// Runs a scan of one area against one point cloud.
pub struct SelectionDriver<'a, P, S>
where
    P: PointCloud,
    S: RecordStore,
{
    cloud: &'a P,
    store: &'a S,
    config: &'a AppConfig,
    polygon: &'a Polygon,
    detector: EdgeDetector,
}

impl<'a, P, S> SelectionDriver<'a, P, S>
where
    P: PointCloud,
    S: RecordStore,
{
    /// Driver over `cloud` and `store` for the area `polygon`.
    pub fn new(cloud: &'a P, store: &'a S, config: &'a AppConfig, polygon: &'a Polygon) -> Self {
        Self {
            cloud,
            store,
            config,
            polygon,
            detector: EdgeDetector::new(config.detector.clone()),
        }
    }

    /// Bin window under the polygon's bounding box.
    pub fn window(&self) -> AppResult<BinWindow> {
        BinWindow::for_area(self.cloud.header(), self.polygon.bounds())
    }

    /// Scan the area, writing detections to `report` and progress to `progress`.
    pub fn run<R: Write, E: Write>(
        &self,
        report: &mut DetectionReport<R>,
        progress: &mut E,
    ) -> AppResult<SelectionSummary> {
        let window = self.window()?;
        self.scan_window(&window, report, progress)
    }

    /// Scan the area into a new report file at `path`.
    ///
    /// The area is checked against the point-cloud bounds first; nothing is
    /// created at `path` when it lies outside them.
    pub fn run_to_file<E: Write>(&self, path: &Path, progress: &mut E) -> AppResult<SelectionSummary> {
        let window = self.window()?;
        let mut report = DetectionReport::create(path, &self.config.output)?;
        info!(path = %path.display(), "writing detections");
        let summary = self.scan_window(&window, &mut report, progress)?;
        report.finish()?;
        Ok(summary)
    }

    fn scan_window<R: Write, E: Write>(
        &self,
        window: &BinWindow,
        report: &mut DetectionReport<R>,
        progress: &mut E,
    ) -> AppResult<SelectionSummary> {
        debug!(?window, "bin window");

        let mut read = Progress::new(&mut *progress, "read");
        let ranges = collect_file_ranges(self.cloud, window, &mut read)?;
        read.finish()?;

        let total: u64 = ranges.values().map(SequenceRange::len).sum();
        info!(files = ranges.len(), soundings = total, "bin pass complete");

        let mut summary = SelectionSummary::default();
        let mut slot = AttitudeSlot::new();
        let mut processed = Progress::new(&mut *progress, "processed");
        let mut visited = 0u64;

        for (&file_id, range) in &ranges {
            let source = self.cloud.source_file(file_id)?;
            if source.data_type != SourceDataType::ChartsHof {
                debug!(file_id, path = %source.path.display(), "not sounding data, skipped");
                summary.files_skipped += 1;
                continue;
            }
            self.scan_file(
                file_id,
                &source.path,
                *range,
                report,
                &mut slot,
                &mut processed,
                &mut visited,
                total,
                &mut summary,
            )?;
        }

        slot.release();
        processed.finish()?;
        info!(
            eligible = summary.eligible,
            detections = summary.detections,
            attitude_failures = summary.attitude_failures,
            "scan complete"
        );
        Ok(summary)
    }

    #[allow(clippy::too_many_arguments)]
    fn scan_file<R: Write, E: Write>(
        &self,
        file_id: u16,
        path: &Path,
        range: SequenceRange,
        report: &mut DetectionReport<R>,
        slot: &mut AttitudeSlot<S::Attitude>,
        progress: &mut Progress<E>,
        visited: &mut u64,
        total: u64,
        summary: &mut SelectionSummary,
    ) -> AppResult<()> {
        let waveform_path = path.with_extension(&self.config.selection.waveform_extension);
        let waveforms = match self.store.open_waveforms(&waveform_path) {
            Ok(waveforms) => waveforms,
            Err(e) => {
                warn!(file_id, path = %waveform_path.display(), error = %e, "waveform file unavailable, file skipped");
                summary.files_skipped += 1;
                return Ok(());
            }
        };
        let soundings =
            self.store
                .open_soundings(path)
                .map_err(|e| WaveformError::SoundingSource {
                    path: path.to_path_buf(),
                    source: Box::new(e),
                })?;

        let attitude_path = self.store.find_attitude_file(path);
        if attitude_path.is_none() {
            warn!(file_id, path = %path.display(), "unable to find pos/sbet file");
        }

        info!(
            file_id,
            path = %path.display(),
            start = range.start,
            end = range.end,
            "scanning sounding file"
        );
        summary.files_processed += 1;

        let file = FileScan {
            file_id,
            path,
            soundings: &soundings,
            waveforms: &waveforms,
            attitude_path: attitude_path.as_deref(),
        };
        for sequence in range.iter() {
            self.scan_sounding(&file, sequence, report, slot, summary)?;
            *visited += 1;
            progress.update_count(*visited, total)?;
        }
        Ok(())
    }

    fn scan_sounding<R: Write>(
        &self,
        file: &FileScan<'_, S::Waveforms, S::Soundings>,
        sequence: u32,
        report: &mut DetectionReport<R>,
        slot: &mut AttitudeSlot<S::Attitude>,
        summary: &mut SelectionSummary,
    ) -> AppResult<()> {
        summary.soundings_scanned += 1;

        let Some(sounding) = file.soundings.read_sounding(sequence) else {
            debug!(file_id = file.file_id, sequence, "sounding record unreadable");
            summary.unreadable += 1;
            return Ok(());
        };
        if !sounding.has_primary_depth() {
            summary.no_depth += 1;
            return Ok(());
        }
        let Some(sample) = file.waveforms.read_waveform(sequence) else {
            summary.no_waveform += 1;
            return Ok(());
        };
        let Some(attitude_path) = file.attitude_path else {
            summary.no_attitude_file += 1;
            return Ok(());
        };
        let attitude = match slot.acquire(self.store, attitude_path) {
            Ok(attitude) => attitude,
            Err(e) => {
                warn!(
                    file_id = file.file_id,
                    path = %attitude_path.display(),
                    error = %e,
                    "unable to open pos/sbet file for {}",
                    file.path.display()
                );
                summary.no_attitude_file += 1;
                return Ok(());
            }
        };

        if attitude.nearest(sounding.timestamp).is_none() {
            summary.attitude_failures += 1;
            warn!(
                file_id = file.file_id,
                sequence,
                timestamp = %format_timestamp(sounding.timestamp),
                path = %attitude_path.display(),
                "unable to get timestamp from pos/sbet file; check the file name (_YYMMDD_NNNN.out or .pos) and its time span"
            );
            if summary.attitude_failures > self.config.selection.max_attitude_failures {
                return Err(WaveformError::AttitudeCorrespondence {
                    failures: summary.attitude_failures,
                });
            }
            return Ok(());
        }

        let eligibility = check_eligibility(
            &sounding,
            self.polygon,
            self.config.eligibility.confidence_threshold,
        );
        if eligibility != Eligibility::Eligible {
            summary.ineligible += 1;
            return Ok(());
        }
        summary.eligible += 1;

        let filter = &self.config.selection.sequence_filter;
        if !filter.is_empty() && !filter.contains(&sequence) {
            summary.filtered += 1;
            return Ok(());
        }

        let analysis = self
            .detector
            .detect(file.waveforms.header(), &sample, &sounding);
        match analysis {
            WaveformAnalysis::NotApplicable { .. } => summary.not_applicable += 1,
            WaveformAnalysis::Analyzed { .. } => summary.analyzed += 1,
        }
        if report.record(file.file_id, sequence, &sounding, &analysis)? {
            summary.detections += 1;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::mock::MemoryRecordStore;
    use crate::records::AttitudeSample;

    fn header() -> PointCloudHeader {
        PointCloudHeader {
            bounds: BoundingBox {
                min_x: 0.0,
                min_y: 0.0,
                max_x: 1.0,
                max_y: 1.0,
            },
            x_bin_size_degrees: 0.1,
            y_bin_size_degrees: 0.1,
            bin_width: 10,
            bin_height: 10,
        }
    }

    fn square(min: f64, max: f64) -> Polygon {
        Polygon::new(vec![(min, min), (max, min), (max, max), (min, max)]).unwrap()
    }

    #[test]
    fn sequence_range_widens() {
        let mut range = SequenceRange::new(40);
        range.include(12);
        range.include(30);
        range.include(55);
        assert_eq!(range, SequenceRange { start: 12, end: 55 });
        assert_eq!(range.len(), 44);
    }

    #[test]
    fn window_matches_nearest_cell() {
        let area = BoundingBox {
            min_x: 0.21,
            min_y: 0.3,
            max_x: 0.49,
            max_y: 0.4,
        };
        let window = BinWindow::for_area(&header(), &area).unwrap();
        assert_eq!(
            window,
            BinWindow {
                x_start: 2,
                y_start: 3,
                width: 3,
                height: 1
            }
        );
        assert_eq!(window.row_percent(3), 0);
    }

    #[test]
    fn window_is_clamped_to_grid() {
        let area = BoundingBox {
            min_x: -0.5,
            min_y: 0.76,
            max_x: 0.3,
            max_y: 1.5,
        };
        let window = BinWindow::for_area(&header(), &area).unwrap();
        assert_eq!(window.x_start, 0);
        assert_eq!(window.width, 8);
        assert_eq!(window.y_start, 8);
        assert_eq!(window.height, 2);
    }

    #[test]
    fn area_outside_bounds_is_fatal() {
        let area = BoundingBox {
            min_x: 2.0,
            min_y: 2.0,
            max_x: 3.0,
            max_y: 3.0,
        };
        let err = BinWindow::for_area(&header(), &area).unwrap_err();
        assert!(matches!(err, WaveformError::AreaOutsideBounds));
        assert!(err.is_fatal());
    }

    #[test]
    fn eligibility_rules() {
        let polygon = square(0.0, 1.0);
        let base = SoundingRecord {
            latitude: 0.5,
            longitude: 0.5,
            correct_depth: 4.0,
            abdc: 80,
            ..SoundingRecord::default()
        };
        assert_eq!(check_eligibility(&base, &polygon, 70), Eligibility::Eligible);

        let weak = SoundingRecord { abdc: 70, ..base };
        assert_eq!(check_eligibility(&weak, &polygon, 70), Eligibility::LowConfidence);

        // Secondary confidence only counts with a computed secondary depth
        let secondary = SoundingRecord {
            abdc: 10,
            sec_abdc: 90,
            ..base
        };
        assert_eq!(
            check_eligibility(&secondary, &polygon, 70),
            Eligibility::LowConfidence
        );
        let secondary = SoundingRecord {
            correct_depth: crate::records::DEPTH_NOT_COMPUTED,
            correct_sec_depth: 6.0,
            ..secondary
        };
        assert_eq!(check_eligibility(&secondary, &polygon, 70), Eligibility::Eligible);

        let both = SoundingRecord {
            correct_sec_depth: 6.0,
            ..base
        };
        assert_eq!(check_eligibility(&both, &polygon, 70), Eligibility::TwoReturns);

        let outside = SoundingRecord {
            longitude: 1.5,
            ..base
        };
        assert_eq!(check_eligibility(&outside, &polygon, 70), Eligibility::OutsideArea);
    }

    #[test]
    fn slot_reuses_until_path_changes() {
        let sample = AttitudeSample {
            timestamp: 100,
            ..AttitudeSample::default()
        };
        let store = MemoryRecordStore::new()
            .with_attitude("a.hof", "a.out", vec![sample])
            .with_attitude("b.hof", "b.out", vec![sample]);
        let mut slot = AttitudeSlot::new();

        slot.acquire(&store, Path::new("a.out")).unwrap();
        slot.acquire(&store, Path::new("a.out")).unwrap();
        assert_eq!(slot.opens(), 1);
        slot.acquire(&store, Path::new("b.out")).unwrap();
        assert_eq!(slot.path(), Some(Path::new("b.out")));
        assert_eq!(slot.opens(), 2);

        assert!(slot.acquire(&store, Path::new("c.out")).is_err());
        assert_eq!(slot.path(), None);

        slot.acquire(&store, Path::new("a.out")).unwrap();
        slot.release();
        assert_eq!(slot.path(), None);
        assert_eq!(store.attitude_opens(Path::new("a.out")), 2);
    }

    #[test]
    fn timestamps_format_as_utc() {
        assert_eq!(format_timestamp(0), "1970-01-01 00:00:00.000000 UTC");
        assert_eq!(format_timestamp(i64::MAX), i64::MAX.to_string());
    }
}
