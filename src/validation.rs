//! Small reusable validators shared by configuration loading and area parsing.

use std::ops::RangeInclusive;

/// Rejects empty paths and paths with interior NULs.
pub fn is_valid_path(path: &str) -> Result<(), &'static str> {
    if path.is_empty() {
        return Err("File path cannot be empty");
    }
    if path.contains('\0') {
        return Err("File path cannot contain null bytes");
    }
    Ok(())
}

/// `value` within the inclusive `range`.
pub fn is_in_range<T: PartialOrd>(value: T, range: RangeInclusive<T>) -> Result<(), &'static str> {
    if range.contains(&value) {
        Ok(())
    } else {
        Err("Value is out of range")
    }
}

/// Non-empty string.
pub fn is_not_empty(value: &str) -> Result<(), &'static str> {
    if value.is_empty() {
        return Err("Value cannot be empty");
    }
    Ok(())
}

/// Validates a geographic coordinate pair in decimal degrees.
pub fn is_valid_lat_lon(lat: f64, lon: f64) -> Result<(), &'static str> {
    if !lat.is_finite() || !lon.is_finite() {
        return Err("Coordinates must be finite");
    }
    is_in_range(lat, -90.0..=90.0).map_err(|_| "Latitude must be within -90..=90 degrees")?;
    is_in_range(lon, -180.0..=360.0).map_err(|_| "Longitude must be within -180..=360 degrees")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths() {
        assert!(is_valid_path("survey.pfm").is_ok());
        assert!(is_valid_path("").is_err());
        assert!(is_valid_path("bad\0path").is_err());
    }

    #[test]
    fn test_ranges() {
        assert!(is_in_range(2usize, 1..=2).is_ok());
        assert!(is_in_range(3usize, 1..=2).is_err());
        assert!(is_not_empty("inh").is_ok());
        assert!(is_not_empty("").is_err());
    }

    #[test]
    fn test_lat_lon() {
        assert!(is_valid_lat_lon(30.25, -88.5).is_ok());
        assert!(is_valid_lat_lon(91.0, 0.0).is_err());
        assert!(is_valid_lat_lon(f64::NAN, 0.0).is_err());
    }
}
