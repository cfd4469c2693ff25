//! First and second differences over a qualifying run.

use super::QualifyingRun;

/// Difference series over the raw samples of one run.
///
/// For a run spanning `[s, e]`, `first[k] = sample[s + 1 + k] - sample[s + k]`
/// (length `e - s`) and `second[k] = first[k + 1] - first[k]` (length `e - s - 1`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DifferenceSeries {
    /// First differences
    pub first: Vec<i32>,
    /// Second differences
    pub second: Vec<i32>,
}

impl DifferenceSeries {
    /// Compute both series for `run` over `samples`.
    ///
    /// Returns empty series if the run does not fit inside `samples`.
    pub fn for_run(samples: &[i32], run: &QualifyingRun) -> Self {
        if run.end <= run.start || run.end >= samples.len() {
            return Self::default();
        }
        let first: Vec<i32> = samples[run.start..=run.end]
            .windows(2)
            .map(|pair| pair[1] - pair[0])
            .collect();
        let second = first.windows(2).map(|pair| pair[1] - pair[0]).collect();
        Self { first, second }
    }

    /// `;`-joined rendering used by the diagnostics report.
    pub fn join(values: &[i32]) -> String {
        values
            .iter()
            .map(i32::to_string)
            .collect::<Vec<_>>()
            .join(";")
    }
}
