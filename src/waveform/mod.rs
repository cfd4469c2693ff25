//! Waveform data model and the edge detector.
//!
//! A waveform record carries two digitizer channels sampled over the same
//! time window: the photomultiplier tube (PMT) and the avalanche photodiode
//! (APD). Each channel has its own length and AC zero offset, fixed per file
//! by the [`WaveformHeader`].

pub mod detector;
pub mod differences;

pub use detector::{scan_channel, ChannelScan, EdgeDetector};
pub use differences::DifferenceSeries;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Digitizer channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Channel {
    /// Photomultiplier tube
    Pmt,
    /// Avalanche photodiode
    Apd,
}

impl Channel {
    /// Both channels in the order they are analyzed.
    pub const ALL: [Channel; 2] = [Channel::Pmt, Channel::Apd];

    /// Short lowercase name used in reports.
    pub fn as_str(self) -> &'static str {
        match self {
            Channel::Pmt => "pmt",
            Channel::Apd => "apd",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-file waveform constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaveformHeader {
    /// Samples per PMT series
    pub pmt_size: usize,
    /// Samples per APD series
    pub apd_size: usize,
    /// PMT baseline
    pub pmt_ac_zero_offset: i32,
    /// APD baseline
    pub apd_ac_zero_offset: i32,
}

impl WaveformHeader {
    /// Declared sample count for `channel`.
    pub fn size(&self, channel: Channel) -> usize {
        match channel {
            Channel::Pmt => self.pmt_size,
            Channel::Apd => self.apd_size,
        }
    }

    /// AC zero offset for `channel`.
    pub fn baseline(&self, channel: Channel) -> i32 {
        match channel {
            Channel::Pmt => self.pmt_ac_zero_offset,
            Channel::Apd => self.apd_ac_zero_offset,
        }
    }
}

/// One sounding's digitized intensity series.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WaveformSample {
    /// Record timestamp in microseconds
    pub timestamp: i64,
    /// PMT samples
    pub pmt: Vec<i32>,
    /// APD samples
    pub apd: Vec<i32>,
}

impl WaveformSample {
    /// Samples for `channel`.
    pub fn channel(&self, channel: Channel) -> &[i32] {
        match channel {
            Channel::Pmt => &self.pmt,
            Channel::Apd => &self.apd,
        }
    }
}

/// A contiguous rising segment closed by a sustained drop.
///
/// `start` is the index where the run was promoted from, `end` the first
/// non-increasing sample after it. `rise` is `sample[end] - sample[start]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualifyingRun {
    /// Index the run started at
    pub start: usize,
    /// Index of the first non-increasing sample that ended the run
    pub end: usize,
    /// `end - start_loc + 1`, with `start_loc` as left by the closing drop (0 once any drop cleared it)
    pub run_length: usize,
    /// Intensity gained between `start` and `end`
    pub rise: i32,
}

/// A qualifying run together with its difference series.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalyzedRun {
    /// The run bounds
    pub run: QualifyingRun,
    /// First and second differences over the run's samples
    pub differences: DifferenceSeries,
}

/// Detector output for one channel.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelAnalysis {
    /// Channel analyzed
    pub channel: Channel,
    /// Qualifying runs in scan order, at most two
    pub runs: Vec<AnalyzedRun>,
}

impl ChannelAnalysis {
    /// Whether any qualifying run was found.
    pub fn has_runs(&self) -> bool {
        !self.runs.is_empty()
    }
}

/// Detector output for one sounding.
#[derive(Debug, Clone, PartialEq)]
pub enum WaveformAnalysis {
    /// The sounding carries a reserved confidence code and was not examined.
    NotApplicable {
        /// The reserved code that caused the skip
        code: i16,
    },
    /// Both channels were scanned.
    Analyzed {
        /// PMT result
        pmt: ChannelAnalysis,
        /// APD result
        apd: ChannelAnalysis,
    },
}

impl WaveformAnalysis {
    /// Result for `channel`, if the sounding was analyzed.
    pub fn channel(&self, channel: Channel) -> Option<&ChannelAnalysis> {
        match self {
            WaveformAnalysis::NotApplicable { .. } => None,
            WaveformAnalysis::Analyzed { pmt, apd } => Some(match channel {
                Channel::Pmt => pmt,
                Channel::Apd => apd,
            }),
        }
    }

    /// First channel, in analysis order, that produced a run.
    pub fn detecting_channel(&self) -> Option<Channel> {
        Channel::ALL
            .into_iter()
            .find(|&channel| self.channel(channel).is_some_and(ChannelAnalysis::has_runs))
    }

    /// Total qualifying runs across both channels.
    pub fn run_count(&self) -> usize {
        Channel::ALL
            .into_iter()
            .filter_map(|channel| self.channel(channel))
            .map(|analysis| analysis.runs.len())
            .sum()
    }
}
