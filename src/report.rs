//! Detection report, run diagnostics and progress output.
//!
//! The report is a headerless CSV: one `lat,lon,tag` line per sounding in
//! which the detector found a qualifying run. The tag is the sequence number
//! offset by a per-channel base so the viewer can tell PMT from APD hits.
//!
//! The diagnostics CSV, when configured, receives every qualifying run with
//! its first and second difference series.

use crate::config::OutputConfig;
use crate::error::{AppResult, WaveformError};
use crate::records::SoundingRecord;
use crate::waveform::{Channel, DifferenceSeries, WaveformAnalysis};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Column names of the diagnostics CSV.
pub const DIAGNOSTICS_HEADER: [&str; 10] = [
    "file_id",
    "sequence",
    "channel",
    "run",
    "start",
    "end",
    "run_length",
    "rise",
    "first_diff",
    "second_diff",
];

/// Report path for an area file: its stem with `extension`, in the current directory.
pub fn output_path(area_path: &Path, extension: &str) -> PathBuf {
    let stem = area_path
        .file_stem()
        .map(|stem| stem.to_os_string())
        .unwrap_or_else(|| "area".into());
    PathBuf::from(stem).with_extension(extension)
}

/// Writes detections, and optionally run diagnostics.
pub struct DetectionReport<W: Write> {
    points: csv::Writer<W>,
    diagnostics: Option<csv::Writer<Box<dyn Write>>>,
    output: OutputConfig,
    detections: u64,
}

impl DetectionReport<BufWriter<File>> {
    /// Create the report file at `path`, and the diagnostics file if configured.
    pub fn create(path: &Path, output: &OutputConfig) -> AppResult<Self> {
        let file = File::create(path).map_err(|source| WaveformError::OutputFile {
            path: path.to_path_buf(),
            source,
        })?;
        let mut report = Self::new(BufWriter::new(file), output.clone());
        if let Some(diagnostics) = &output.diagnostics {
            let file = File::create(diagnostics).map_err(|source| WaveformError::OutputFile {
                path: diagnostics.clone(),
                source,
            })?;
            report = report.with_diagnostics(Box::new(BufWriter::new(file)))?;
        }
        Ok(report)
    }
}

impl<W: Write> DetectionReport<W> {
    /// Report writing to `writer`.
    pub fn new(writer: W, output: OutputConfig) -> Self {
        let points = csv::WriterBuilder::new()
            .has_headers(false)
            .terminator(csv::Terminator::Any(b'\n'))
            .from_writer(writer);
        Self {
            points,
            diagnostics: None,
            output,
            detections: 0,
        }
    }

    /// Also write run diagnostics to `writer`.
    pub fn with_diagnostics(mut self, writer: Box<dyn Write>) -> AppResult<Self> {
        let mut diagnostics = csv::WriterBuilder::new()
            .terminator(csv::Terminator::Any(b'\n'))
            .from_writer(writer);
        diagnostics.write_record(DIAGNOSTICS_HEADER)?;
        self.diagnostics = Some(diagnostics);
        Ok(self)
    }

    /// Record one analyzed sounding. Returns whether it was a detection.
    pub fn record(
        &mut self,
        file_id: u16,
        sequence: u32,
        sounding: &SoundingRecord,
        analysis: &WaveformAnalysis,
    ) -> AppResult<bool> {
        if let Some(diagnostics) = self.diagnostics.as_mut() {
            for channel in Channel::ALL {
                let Some(result) = analysis.channel(channel) else {
                    continue;
                };
                for (index, analyzed) in result.runs.iter().enumerate() {
                    let run = &analyzed.run;
                    diagnostics.write_record([
                        file_id.to_string(),
                        sequence.to_string(),
                        channel.to_string(),
                        (index + 1).to_string(),
                        run.start.to_string(),
                        run.end.to_string(),
                        run.run_length.to_string(),
                        run.rise.to_string(),
                        DifferenceSeries::join(&analyzed.differences.first),
                        DifferenceSeries::join(&analyzed.differences.second),
                    ])?;
                }
            }
        }

        let Some(channel) = analysis.detecting_channel() else {
            return Ok(false);
        };
        let base = match channel {
            Channel::Pmt => self.output.pmt_tag_base,
            Channel::Apd => self.output.apd_tag_base,
        };
        let tag = base + f64::from(sequence);
        self.points.write_record([
            format!("{:.11}", sounding.latitude),
            format!("{:.11}", sounding.longitude),
            format!("{tag:.6}"),
        ])?;
        self.detections += 1;
        Ok(true)
    }

    /// Detections written so far.
    pub fn detections(&self) -> u64 {
        self.detections
    }

    /// Flush both outputs and hand back the report writer.
    pub fn finish(self) -> AppResult<W> {
        if let Some(mut diagnostics) = self.diagnostics {
            diagnostics.flush()?;
        }
        self.points
            .into_inner()
            .map_err(|e| WaveformError::Io(e.into_error()))
    }
}

/// Percentage progress on a terminal line, rewritten only when it changes.
#[derive(Debug)]
pub struct Progress<W: Write> {
    out: W,
    label: &'static str,
    last: Option<u32>,
}

impl<W: Write> Progress<W> {
    /// Progress written to `out` as `NNN% <label>`.
    pub fn new(out: W, label: &'static str) -> Self {
        Self {
            out,
            label,
            last: None,
        }
    }

    /// Show `percent`, if it differs from the last value shown.
    pub fn update(&mut self, percent: u32) -> AppResult<()> {
        let percent = percent.min(100);
        if self.last != Some(percent) {
            write!(self.out, "{percent:03}% {}                     \r", self.label)?;
            self.out.flush()?;
            self.last = Some(percent);
        }
        Ok(())
    }

    /// Show `done` of `total` as a truncated percentage.
    pub fn update_count(&mut self, done: u64, total: u64) -> AppResult<()> {
        if total == 0 {
            return Ok(());
        }
        let percent = u32::try_from(done.saturating_mul(100) / total).unwrap_or(100);
        self.update(percent)
    }

    /// Show 100% and end the line.
    pub fn finish(&mut self) -> AppResult<()> {
        writeln!(self.out, "100% {}                     ", self.label)?;
        self.out.flush()?;
        self.last = Some(100);
        Ok(())
    }

    /// Last percentage shown
    pub fn last(&self) -> Option<u32> {
        self.last
    }

    /// Give back the underlying stream.
    pub fn into_inner(self) -> W {
        self.out
    }
}
