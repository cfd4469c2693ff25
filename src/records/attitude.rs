//! Attitude file resolution and timestamp lookup.
//!
//! Sounding files and their pos/sbet files are paired by the flight token
//! embedded in the file name, `_YYMMDD_NNNN` (date and flight number). The
//! attitude file is looked for next to the sounding file first, then in the
//! sibling `sbet` and `pos` directories. Smoothed best-estimate files (`.out`)
//! win over raw pos files (`.pos`).

use once_cell::sync::Lazy;
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::trace;

static FLIGHT_TOKEN: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"_(\d{6})_(\d{4})").ok());

/// Attitude file extensions in order of preference.
const ATTITUDE_EXTENSIONS: [&str; 2] = ["out", "pos"];

/// Flight token (`_YYMMDD_NNNN`) of a sounding file, if its name carries one.
///
/// The last match in the file stem is used.
pub fn flight_token(path: &Path) -> Option<String> {
    let stem = path.file_stem()?.to_str()?;
    let regex = FLIGHT_TOKEN.as_ref()?;
    regex
        .find_iter(stem)
        .last()
        .map(|found| found.as_str().to_string())
}

/// Locate the attitude file that belongs to `sounding_path`.
pub fn find_attitude_file(sounding_path: &Path) -> Option<PathBuf> {
    let token = flight_token(sounding_path)?;
    let dir = sounding_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let search_dirs = [dir.to_path_buf(), dir.join("../sbet"), dir.join("../pos")];

    for extension in ATTITUDE_EXTENSIONS {
        for search_dir in &search_dirs {
            if let Some(found) = find_in_dir(search_dir, &token, extension) {
                trace!(sounding = %sounding_path.display(), attitude = %found.display(), "attitude file resolved");
                return Some(found);
            }
        }
    }
    None
}

fn find_in_dir(dir: &Path, token: &str, extension: &str) -> Option<PathBuf> {
    let entries = fs::read_dir(dir).ok()?;
    let mut matches: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .filter(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case(extension))
        })
        .filter(|path| {
            path.file_stem()
                .and_then(|stem| stem.to_str())
                .is_some_and(|stem| stem.contains(token))
        })
        .collect();
    matches.sort();
    matches.into_iter().next()
}

/// Index of the sample closest to `target` in a time-sorted series.
///
/// `timestamp_at(i)` returns the timestamp of sample `i`. Returns `None` when
/// the series is empty or `target` lies outside its first..=last range. Ties
/// go to the earlier sample.
pub fn nearest_index(
    count: usize,
    timestamp_at: impl Fn(usize) -> i64,
    target: i64,
) -> Option<usize> {
    if count == 0 {
        return None;
    }
    if target < timestamp_at(0) || target > timestamp_at(count - 1) {
        return None;
    }

    // First sample at or after target
    let (mut lo, mut hi) = (0, count);
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        if timestamp_at(mid) < target {
            lo = mid + 1;
        } else {
            hi = mid;
        }
    }

    if lo == 0 {
        return Some(0);
    }
    let before = lo - 1;
    if target - timestamp_at(before) <= timestamp_at(lo) - target {
        Some(before)
    } else {
        Some(lo)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_is_extracted_from_stem() {
        assert_eq!(
            flight_token(Path::new("/data/hof/ML_100115_0101.hof")).as_deref(),
            Some("_100115_0101")
        );
        assert_eq!(flight_token(Path::new("/data/hof/line7.hof")), None);
    }

    #[test]
    fn sbet_preferred_over_pos() {
        let root = tempfile::tempdir().unwrap();
        let hof_dir = root.path().join("hof");
        let pos_dir = root.path().join("pos");
        fs::create_dir_all(&hof_dir).unwrap();
        fs::create_dir_all(&pos_dir).unwrap();
        fs::write(pos_dir.join("pos_100115_0101.pos"), b"").unwrap();
        fs::write(pos_dir.join("sbet_100115_0101.out"), b"").unwrap();
        fs::write(pos_dir.join("sbet_100116_0101.out"), b"").unwrap();

        let hof = hof_dir.join("ML_100115_0101.hof");
        let found = find_attitude_file(&hof).unwrap();
        assert_eq!(found.file_name().unwrap(), "sbet_100115_0101.out");
    }

    #[test]
    fn missing_attitude_file_is_none() {
        let root = tempfile::tempdir().unwrap();
        let hof = root.path().join("ML_100115_0101.hof");
        assert_eq!(find_attitude_file(&hof), None);
    }

    #[test]
    fn nearest_index_bounds() {
        let stamps = [10i64, 20, 30];
        let at = |i: usize| stamps[i];
        assert_eq!(nearest_index(3, at, 10), Some(0));
        assert_eq!(nearest_index(3, at, 15), Some(0));
        assert_eq!(nearest_index(3, at, 16), Some(1));
        assert_eq!(nearest_index(3, at, 30), Some(2));
        assert_eq!(nearest_index(3, at, 31), None);
        assert_eq!(nearest_index(3, at, 9), None);
        assert_eq!(nearest_index(0, at, 10), None);
    }
}
