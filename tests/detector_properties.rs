//! Behavioural properties of the waveform edge detector.

use pfm_waveform::config::DetectorConfig;
use pfm_waveform::records::SoundingRecord;
use pfm_waveform::waveform::{
    scan_channel, Channel, DifferenceSeries, EdgeDetector, WaveformAnalysis, WaveformHeader,
    WaveformSample,
};

const PMT_BASELINE: i32 = 100;

/// Flat pedestal up to the scan start, then a six-sample surface decay.
fn surface_then(tail: &[i32]) -> Vec<i32> {
    let mut samples = vec![300; 20];
    samples.extend([290, 280, 270, 260, 250, 240]);
    samples.extend_from_slice(tail);
    samples
}

fn rising(from: i32, steps: usize) -> Vec<i32> {
    (1..=steps as i32).map(|k| from + 5 * k).collect()
}

fn falling(from: i32, steps: usize) -> Vec<i32> {
    (1..=steps as i32).map(|k| from - 3 * k).collect()
}

fn detect_pmt(pmt: Vec<i32>) -> WaveformAnalysis {
    let header = WaveformHeader {
        pmt_size: pmt.len(),
        apd_size: 40,
        pmt_ac_zero_offset: PMT_BASELINE,
        apd_ac_zero_offset: 0,
    };
    let sample = WaveformSample {
        timestamp: 0,
        pmt,
        apd: vec![50; 40],
    };
    let sounding = SoundingRecord {
        abdc: 80,
        ..SoundingRecord::default()
    };
    EdgeDetector::default().detect(&header, &sample, &sounding)
}

fn pmt_runs(analysis: &WaveformAnalysis) -> Vec<(usize, usize)> {
    analysis
        .channel(Channel::Pmt)
        .map(|pmt| pmt.runs.iter().map(|r| (r.run.start, r.run.end)).collect())
        .unwrap_or_default()
}

#[test]
fn test_noise_band_series_yields_no_runs() {
    // A drop then a long climb, all within 15 counts of the baseline
    let mut samples = vec![300; 20];
    samples.extend([114, 113, 112, 111, 110, 109]);
    samples.extend(100..=114);
    samples.extend([110, 108, 106, 104, 102, 100]);

    let analysis = detect_pmt(samples);
    assert!(pmt_runs(&analysis).is_empty());

    let config = DetectorConfig::default();
    let samples = [vec![300; 20], vec![PMT_BASELINE + 3; 80]].concat();
    let scan = scan_channel(&samples, samples.len(), PMT_BASELINE, config.pmt, &config);
    assert!(scan.runs.is_empty());
}

#[test]
fn test_six_rises_do_not_promote_but_seven_do() {
    let mut six = rising(240, 6);
    six.extend(falling(270, 6));
    assert!(pmt_runs(&detect_pmt(surface_then(&six))).is_empty());

    let mut seven = rising(240, 7);
    seven.extend(falling(275, 6));
    assert_eq!(pmt_runs(&detect_pmt(surface_then(&seven))), vec![(26, 33)]);
}

#[test]
fn test_at_most_two_runs_in_scan_order() {
    let mut tail = rising(240, 8);
    tail.extend(falling(280, 6));
    tail.extend(rising(262, 8));
    tail.extend(falling(302, 6));
    tail.extend(rising(284, 8));
    tail.extend(falling(324, 6));

    let analysis = detect_pmt(surface_then(&tail));
    assert_eq!(pmt_runs(&analysis), vec![(26, 34), (40, 48)]);
}

#[test]
fn test_unclosed_second_run_is_not_counted() {
    let mut tail = rising(240, 8);
    tail.extend(falling(280, 5));
    tail.extend(rising(265, 8));
    // Only three falling samples before the record ends
    tail.extend([300, 299, 298]);

    let analysis = detect_pmt(surface_then(&tail));
    assert_eq!(pmt_runs(&analysis).len(), 1);
}

#[test]
fn test_rise_before_first_drop_is_never_promoted() {
    let mut samples = vec![300; 20];
    // Long climb straight after the pedestal, no sustained drop before it
    samples.extend(rising(300, 15));
    samples.extend(falling(375, 6));
    samples.extend(rising(357, 3));
    samples.extend(falling(372, 6));

    assert!(pmt_runs(&detect_pmt(samples)).is_empty());
}

#[test]
fn test_difference_series_shape() {
    let mut tail = rising(240, 10);
    tail.push(291);
    tail.push(300);
    tail.extend(falling(300, 6));
    let samples = surface_then(&tail);

    let analysis = detect_pmt(samples.clone());
    let pmt = analysis.channel(Channel::Pmt).unwrap();
    assert_eq!(pmt.runs.len(), 1);

    let run = &pmt.runs[0];
    let (s, e) = (run.run.start, run.run.end);
    assert_eq!(run.differences.first.len(), e - s);
    assert_eq!(run.differences.second.len(), e - s - 1);
    for (k, diff) in run.differences.first.iter().enumerate() {
        assert_eq!(*diff, samples[s + 1 + k] - samples[s + k]);
    }
    assert_eq!(run.differences, DifferenceSeries::for_run(&samples, &run.run));
}

#[test]
fn test_reserved_codes_are_not_applicable() {
    let mut tail = rising(240, 10);
    tail.extend(falling(290, 6));
    let header = WaveformHeader {
        pmt_size: 42,
        apd_size: 42,
        pmt_ac_zero_offset: PMT_BASELINE,
        apd_ac_zero_offset: 0,
    };
    let sample = WaveformSample {
        timestamp: 0,
        pmt: surface_then(&tail),
        apd: surface_then(&tail),
    };
    let detector = EdgeDetector::default();

    for (abdc, sec_abdc) in [(72, 0), (74, 0), (80, 72), (0, 74)] {
        let sounding = SoundingRecord {
            abdc,
            sec_abdc,
            ..SoundingRecord::default()
        };
        let analysis = detector.detect(&header, &sample, &sounding);
        assert!(matches!(analysis, WaveformAnalysis::NotApplicable { .. }));
        assert_eq!(analysis.run_count(), 0);
    }

    let sounding = SoundingRecord {
        abdc: 80,
        ..SoundingRecord::default()
    };
    assert_eq!(detector.detect(&header, &sample, &sounding).run_count(), 2);
}

#[test]
fn test_detector_is_deterministic() {
    let mut tail = rising(240, 9);
    tail.extend(falling(285, 7));
    let samples = surface_then(&tail);
    assert_eq!(detect_pmt(samples.clone()), detect_pmt(samples));
}
