//! Area files read from disk.

use pfm_waveform::area::{load_area, AreaDialect};
use pfm_waveform::error::WaveformError;
use std::fs;
use std::path::Path;

#[test]
fn test_each_dialect_loads_the_same_triangle() {
    let dir = tempfile::tempdir().unwrap();
    let files = [
        (
            "harbor.ARE",
            "AREA=harbor\nPOINT=30.0;-88.0\nPOINT=30.0;-87.5\nPOINT=30.5;-87.5\n",
        ),
        ("harbor.are", "30.0, -88.0\n30.0, -87.5\n30.5, -87.5\n"),
        ("harbor.afs", "-88.0, 30.0\n-87.5, 30.0\n-87.5, 30.5\n"),
    ];

    for (name, text) in files {
        let path = dir.path().join(name);
        fs::write(&path, text).unwrap();
        let polygon = load_area(&path).unwrap();
        assert_eq!(
            polygon.vertices(),
            &[(-88.0, 30.0), (-87.5, 30.0), (-87.5, 30.5)],
            "{name}"
        );
        assert!(polygon.contains(-87.6, 30.1), "{name}");
        assert!(!polygon.contains(-87.9, 30.4), "{name}");
    }
}

#[test]
fn test_hemisphere_suffixes() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("south.are");
    fs::write(&path, "12.5S, 45.0E\n12.5S, 45.5E\n13.0 S, 45.5 E\n").unwrap();
    let polygon = load_area(&path).unwrap();
    assert_eq!(polygon.vertices()[2], (45.5, -13.0));
    assert_eq!(polygon.bounds().min_y, -13.0);
}

#[test]
fn test_unusable_area_files_are_area_errors() {
    let dir = tempfile::tempdir().unwrap();

    let path = dir.path().join("line.are");
    fs::write(&path, "30.0, -88.0\n30.0, -87.5\n").unwrap();
    assert!(matches!(load_area(&path), Err(WaveformError::Area(_))));

    let path = dir.path().join("area.txt");
    fs::write(&path, "30.0, -88.0\n30.0, -87.5\n30.5, -87.5\n").unwrap();
    assert!(matches!(load_area(&path), Err(WaveformError::Area(_))));

    assert!(matches!(
        load_area(&dir.path().join("missing.are")),
        Err(WaveformError::Area(_))
    ));
    assert_eq!(
        AreaDialect::from_path(Path::new("x.AFS")).unwrap(),
        AreaDialect::ArmyCorps
    );
}
