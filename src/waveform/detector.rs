//! Waveform edge detector.
//!
//! Walks each digitizer channel looking for rising runs that follow a
//! sustained drop, the signature of a weak secondary return (a small object
//! above the bottom, for instance) that the bottom-detection pass may have
//! ignored.
//!
//! Per channel the scan keeps a handful of counters:
//!
//! - `rise`: increasing samples seen since the last sustained drop. Short
//!   dips do not reset it.
//! - `drop`: non-increasing samples since the last increase.
//! - `first_drop`: set by the first sustained drop, which marks the tail of
//!   the surface return. Nothing before it can start a run.
//! - `start_loc` / `end_loc`: bounds of the ascending segment being tracked.
//! - `start_run`: where the current run was promoted, once `rise` exceeds
//!   `run_required`.
//!
//! Each later sustained drop closes the promoted run, if there is one, and
//! re-arms the search. The scan also stops early once the channel has decayed
//! into its noise floor, or once `max_runs` runs have closed.
//!
//! The detector is a pure function of its inputs and holds no state between
//! calls, so soundings can be analyzed in any order or in parallel.

use super::{
    AnalyzedRun, Channel, ChannelAnalysis, DifferenceSeries, QualifyingRun, WaveformAnalysis,
    WaveformHeader, WaveformSample,
};
use crate::config::{DetectorConfig, NoiseFloor};
use crate::records::SoundingRecord;
use tracing::{debug, trace};

/// Why a channel scan ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanStop {
    /// Every sample was examined.
    Exhausted,
    /// Too many samples sat in the noise band; `index` is where the scan stopped.
    NoiseFloor {
        /// Sample index that exceeded the noise limit
        index: usize,
    },
    /// The run cap was reached.
    RunCap,
}

/// Raw result of scanning one channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelScan {
    /// Qualifying runs in scan order
    pub runs: Vec<QualifyingRun>,
    /// Index of the sustained drop that ended the surface return, if any
    pub first_drop: Option<usize>,
    /// How the scan ended
    pub stop: ScanStop,
}

/// Scan one channel for qualifying runs.
///
/// `len` is the channel size declared by the file header; samples past the
/// end of `samples` are never read.
pub fn scan_channel(
    samples: &[i32],
    len: usize,
    baseline: i32,
    noise: NoiseFloor,
    config: &DetectorConfig,
) -> ChannelScan {
    let len = len.min(samples.len());
    let start = config.scan_start.max(1);

    let mut rise = 0u32;
    let mut drop = 0u32;
    let mut noise_count = 0u32;
    let mut start_run: Option<usize> = None;
    let mut start_loc: Option<usize> = None;
    let mut end_loc = 0usize;
    let mut first_drop: Option<usize> = None;
    let mut runs = Vec::with_capacity(config.max_runs);
    let mut stop = ScanStop::Exhausted;

    for i in start..len {
        if samples[i] - baseline < noise.noise_band {
            noise_count += 1;
            if noise_count > noise.noise_limit {
                stop = ScanStop::NoiseFloor { index: i };
                break;
            }
        }

        let delta = samples[i] - samples[i - 1];

        if first_drop.is_some() && delta > 0 {
            let loc = *start_loc.get_or_insert(i);
            rise += 1;
            if start_run.is_none() && rise > config.run_required {
                start_run = Some(loc);
            }
            drop = 0;
        } else if delta <= 0 {
            if drop == 0 {
                end_loc = i;
            }
            drop += 1;

            if drop >= config.drop_required {
                if first_drop.is_none() {
                    first_drop = Some(i);
                } else {
                    if let Some(run_start) = start_run {
                        // start_loc is cleared by every non-increasing sample
                        let segment = start_loc.unwrap_or(0);
                        runs.push(QualifyingRun {
                            start: run_start,
                            end: end_loc,
                            run_length: end_loc - segment + 1,
                            rise: samples[end_loc] - samples[run_start],
                        });
                        if runs.len() >= config.max_runs {
                            stop = ScanStop::RunCap;
                            break;
                        }
                    }
                    rise = 0;
                    start_run = None;
                }
            }
            start_loc = None;
        }
    }

    // A second run counted without a run open afterwards is spurious.
    if runs.len() == 2 && start_run.is_none() {
        runs.pop();
    }

    ChannelScan {
        runs,
        first_drop,
        stop,
    }
}

/// Edge detector configured once and applied to every eligible sounding.
#[derive(Debug, Clone, Default)]
pub struct EdgeDetector {
    config: DetectorConfig,
}

impl EdgeDetector {
    /// Create a detector with the given parameters.
    pub fn new(config: DetectorConfig) -> Self {
        Self { config }
    }

    /// Detector parameters.
    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// The reserved confidence code carried by `sounding`, if any.
    ///
    /// Shoreline depth-swapped and shallow-water algorithm records are left alone.
    pub fn reserved_code(&self, sounding: &SoundingRecord) -> Option<i16> {
        [sounding.abdc, sounding.sec_abdc]
            .into_iter()
            .find(|code| self.config.reserved_codes.contains(code))
    }

    /// Analyze both channels of one sounding's waveform.
    pub fn detect(
        &self,
        header: &WaveformHeader,
        sample: &WaveformSample,
        sounding: &SoundingRecord,
    ) -> WaveformAnalysis {
        if let Some(code) = self.reserved_code(sounding) {
            trace!(code, "reserved confidence code, waveform not analyzed");
            return WaveformAnalysis::NotApplicable { code };
        }

        WaveformAnalysis::Analyzed {
            pmt: self.analyze_channel(Channel::Pmt, header, sample),
            apd: self.analyze_channel(Channel::Apd, header, sample),
        }
    }

    /// Scan one channel and attach difference series to its runs.
    pub fn analyze_channel(
        &self,
        channel: Channel,
        header: &WaveformHeader,
        sample: &WaveformSample,
    ) -> ChannelAnalysis {
        let samples = sample.channel(channel);
        let noise = match channel {
            Channel::Pmt => self.config.pmt,
            Channel::Apd => self.config.apd,
        };
        let scan = scan_channel(
            samples,
            header.size(channel),
            header.baseline(channel),
            noise,
            &self.config,
        );
        trace!(%channel, runs = scan.runs.len(), stop = ?scan.stop, "channel scanned");

        let runs = scan
            .runs
            .into_iter()
            .map(|run| {
                let differences = DifferenceSeries::for_run(samples, &run);
                debug!(
                    %channel,
                    start = run.start,
                    end = run.end,
                    run_length = run.run_length,
                    rise = run.rise,
                    first = ?differences.first,
                    second = ?differences.second,
                    "qualifying run"
                );
                AnalyzedRun { run, differences }
            })
            .collect();

        ChannelAnalysis { channel, runs }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Noise-free series: flat pedestal, a surface drop, then whatever `tail` adds.
    fn series(tail: &[i32]) -> Vec<i32> {
        let mut samples = vec![200; 20];
        // Surface return decaying over six samples
        samples.extend([190, 180, 170, 160, 150, 140]);
        samples.extend_from_slice(tail);
        samples
    }

    fn rising(from: i32, steps: usize) -> Vec<i32> {
        (1..=steps as i32).map(|k| from + 5 * k).collect()
    }

    fn falling(from: i32, steps: usize) -> Vec<i32> {
        (1..=steps as i32).map(|k| from - 3 * k).collect()
    }

    fn scan(samples: &[i32]) -> ChannelScan {
        let config = DetectorConfig::default();
        scan_channel(samples, samples.len(), 0, config.pmt, &config)
    }

    #[test]
    fn surface_drop_sets_first_drop() {
        let samples = series(&[]);
        let result = scan(&samples);
        // Five non-increasing steps from index 20 complete at index 24
        assert_eq!(result.first_drop, Some(24));
        assert!(result.runs.is_empty());
        assert_eq!(result.stop, ScanStop::Exhausted);
    }

    #[test]
    fn single_run_after_surface_drop() {
        let mut tail = rising(140, 10);
        tail.extend(falling(190, 6));
        let samples = series(&tail);
        let result = scan(&samples);

        assert_eq!(result.runs.len(), 1);
        let run = result.runs[0];
        assert_eq!(run.start, 26);
        assert_eq!(run.end, 36);
        assert_eq!(run.run_length, 37);
        assert_eq!(run.rise, samples[36] - samples[26]);
    }

    #[test]
    fn short_dip_keeps_rise_count() {
        // Four rising steps, a one-sample dip, four more rising steps
        let mut tail = rising(140, 4);
        tail.push(155);
        tail.extend(rising(155, 4));
        tail.extend(falling(175, 6));
        let samples = series(&tail);
        let result = scan(&samples);

        assert_eq!(result.runs.len(), 1);
        // Promoted from the second segment, where the seventh rise landed
        assert_eq!(result.runs[0].start, 31);
        assert_eq!(result.runs[0].run_length, 36);
    }

    #[test]
    fn run_length_counts_from_cleared_segment_start() {
        let mut tail = rising(140, 10);
        tail.extend(falling(190, 6));
        let samples = series(&tail);

        // Sustained drops clear the segment start before the run closes
        let result = scan(&samples);
        assert_eq!(result.runs[0].end, 36);
        assert_eq!(result.runs[0].run_length, result.runs[0].end + 1);

        // A single-sample drop closes while the segment start is still held
        let config = DetectorConfig {
            drop_required: 1,
            ..DetectorConfig::default()
        };
        let result = scan_channel(&samples, samples.len(), 0, config.pmt, &config);
        assert_eq!(result.first_drop, Some(20));
        let run = result.runs[0];
        assert_eq!((run.start, run.end), (26, 36));
        assert_eq!(run.run_length, 11);
    }

    #[test]
    fn rollback_guard_leaves_single_run() {
        let mut tail = rising(140, 8);
        tail.extend(falling(180, 5));
        tail.extend(rising(165, 8));
        // Second run never sees a sustained drop
        tail.extend([200, 199, 198]);
        let samples = series(&tail);
        let result = scan(&samples);
        assert_eq!(result.runs.len(), 1);
    }

    #[test]
    fn apd_noise_limit_applies() {
        let config = DetectorConfig::default();
        // Everything below the baseline: 21 samples exhaust the APD limit
        let samples = vec![10; 60];
        let result = scan_channel(&samples, samples.len(), 50, config.apd, &config);
        assert_eq!(result.stop, ScanStop::NoiseFloor { index: 40 });
    }

    #[test]
    fn header_size_caps_scan() {
        let mut tail = rising(140, 10);
        tail.extend(falling(190, 6));
        let samples = series(&tail);
        let config = DetectorConfig::default();
        let result = scan_channel(&samples, 30, 0, config.pmt, &config);
        assert!(result.runs.is_empty());
    }

    #[test]
    fn reserved_codes_skip_analysis() {
        let detector = EdgeDetector::default();
        let header = WaveformHeader {
            pmt_size: 10,
            apd_size: 10,
            pmt_ac_zero_offset: 0,
            apd_ac_zero_offset: 0,
        };
        let sample = WaveformSample::default();
        let sounding = SoundingRecord {
            sec_abdc: 74,
            ..SoundingRecord::default()
        };
        assert_eq!(
            detector.detect(&header, &sample, &sounding),
            WaveformAnalysis::NotApplicable { code: 74 }
        );
    }
}
