//! Area files and polygon geometry.
//!
//! Three area-file dialects are recognised by extension:
//!
//! | Extension | Dialect | Vertex line |
//! |---|---|---|
//! | `.ARE` | ISS-60 | `POINT=lat;lon` |
//! | `.are` | generic | `lat, lon` (hemisphere suffixes allowed) |
//! | `.afs` | Army Corps | `lon, lat` |
//!
//! Vertices are stored as x = longitude, y = latitude. The polygon is closed
//! implicitly; a repeated first vertex at the end is dropped.

use crate::error::{AppResult, WaveformError};
use crate::validation::is_valid_lat_lon;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::debug;

/// Axis-aligned rectangle in degrees (x = longitude, y = latitude).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Western edge
    pub min_x: f64,
    /// Southern edge
    pub min_y: f64,
    /// Eastern edge
    pub max_x: f64,
    /// Northern edge
    pub max_y: f64,
}

impl BoundingBox {
    /// Smallest box holding every point, or `None` for no points.
    pub fn from_points(points: impl IntoIterator<Item = (f64, f64)>) -> Option<Self> {
        let mut points = points.into_iter();
        let (x, y) = points.next()?;
        let mut bounds = Self {
            min_x: x,
            min_y: y,
            max_x: x,
            max_y: y,
        };
        for (x, y) in points {
            bounds.min_x = bounds.min_x.min(x);
            bounds.min_y = bounds.min_y.min(y);
            bounds.max_x = bounds.max_x.max(x);
            bounds.max_y = bounds.max_y.max(y);
        }
        Some(bounds)
    }

    /// Whether the two boxes share any point (touching edges count).
    pub fn intersects(&self, other: &BoundingBox) -> bool {
        !(self.min_y > other.max_y
            || self.max_y < other.min_y
            || self.min_x > other.max_x
            || self.max_x < other.min_x)
    }

    /// Width in degrees
    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    /// Height in degrees
    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }
}

/// Area-file dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AreaDialect {
    /// ISS-60 `.ARE` files
    Iss60,
    /// Generic `.are` files
    Generic,
    /// Army Corps `.afs` files
    ArmyCorps,
}

impl AreaDialect {
    /// Dialect selected by the file extension.
    pub fn from_path(path: &Path) -> AppResult<Self> {
        let extension = path.extension().and_then(|ext| ext.to_str()).unwrap_or("");
        match extension {
            "ARE" => Ok(AreaDialect::Iss60),
            "are" => Ok(AreaDialect::Generic),
            ext if ext.eq_ignore_ascii_case("afs") => Ok(AreaDialect::ArmyCorps),
            _ => Err(WaveformError::Area(format!(
                "{}: area files must have a .ARE, .are or .afs extension",
                path.display()
            ))),
        }
    }
}

/// Closed polygon with its bounding box.
#[derive(Debug, Clone, PartialEq)]
pub struct Polygon {
    vertices: Vec<(f64, f64)>,
    bounds: BoundingBox,
}

impl Polygon {
    /// Build a polygon from `(x, y)` vertices. At least three are required.
    pub fn new(mut vertices: Vec<(f64, f64)>) -> AppResult<Self> {
        if vertices.len() > 3 && vertices.first() == vertices.last() {
            vertices.pop();
        }
        if vertices.len() < 3 {
            return Err(WaveformError::Area(format!(
                "a polygon needs at least 3 vertices, got {}",
                vertices.len()
            )));
        }
        let bounds = BoundingBox::from_points(vertices.iter().copied())
            .ok_or_else(|| WaveformError::Area("empty polygon".to_string()))?;
        Ok(Self { vertices, bounds })
    }

    /// Vertices as `(x, y)` = `(lon, lat)`
    pub fn vertices(&self) -> &[(f64, f64)] {
        &self.vertices
    }

    /// Bounding rectangle
    pub fn bounds(&self) -> &BoundingBox {
        &self.bounds
    }

    /// Crossing-number point-in-polygon test.
    pub fn contains(&self, x: f64, y: f64) -> bool {
        let mut inside = false;
        let mut j = self.vertices.len() - 1;
        for (i, &(xi, yi)) in self.vertices.iter().enumerate() {
            let (xj, yj) = self.vertices[j];
            if (yi > y) != (yj > y) && x < (xj - xi) * (y - yi) / (yj - yi) + xi {
                inside = !inside;
            }
            j = i;
        }
        inside
    }
}

/// Read and parse an area file, picking the dialect from its extension.
pub fn load_area(path: &Path) -> AppResult<Polygon> {
    let dialect = AreaDialect::from_path(path)?;
    let text = fs::read_to_string(path)
        .map_err(|e| WaveformError::Area(format!("{}: {e}", path.display())))?;
    let polygon = parse_area(&text, dialect)
        .map_err(|e| WaveformError::Area(format!("{}: {e}", path.display())))?;
    debug!(path = %path.display(), vertices = polygon.vertices().len(), ?dialect, "area loaded");
    Ok(polygon)
}

/// Parse area-file text in the given dialect.
pub fn parse_area(text: &str, dialect: AreaDialect) -> Result<Polygon, String> {
    let mut vertices = Vec::new();
    for (number, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let fields = match dialect {
            AreaDialect::Iss60 => match strip_point_prefix(line) {
                Some(rest) => split_fields(rest, ';'),
                None => continue,
            },
            AreaDialect::Generic | AreaDialect::ArmyCorps => split_fields(line, ','),
        };
        let [first, second] = fields.as_slice() else {
            return Err(format!("line {}: expected two coordinates", number + 1));
        };
        let first = parse_coordinate(first).map_err(|e| format!("line {}: {e}", number + 1))?;
        let second = parse_coordinate(second).map_err(|e| format!("line {}: {e}", number + 1))?;
        let (lat, lon) = match dialect {
            AreaDialect::ArmyCorps => (second, first),
            AreaDialect::Iss60 | AreaDialect::Generic => (first, second),
        };
        is_valid_lat_lon(lat, lon).map_err(|e| format!("line {}: {e}", number + 1))?;
        vertices.push((lon, lat));
    }
    Polygon::new(vertices).map_err(|e| match e {
        WaveformError::Area(message) => message,
        other => other.to_string(),
    })
}

fn strip_point_prefix(line: &str) -> Option<&str> {
    let (key, rest) = line.split_once('=')?;
    key.trim().eq_ignore_ascii_case("POINT").then_some(rest)
}

fn split_fields(line: &str, separator: char) -> Vec<String> {
    let pieces: Vec<&str> = if line.contains(separator) {
        line.split(separator).collect()
    } else {
        line.split_whitespace().collect()
    };
    pieces
        .into_iter()
        .map(|piece| piece.chars().filter(|c| !c.is_whitespace()).collect::<String>())
        .filter(|piece| !piece.is_empty())
        .collect()
}

/// Decimal degrees with an optional trailing hemisphere letter.
fn parse_coordinate(token: &str) -> Result<f64, String> {
    let (number, sign) = match token.chars().last() {
        Some('N' | 'n' | 'E' | 'e') => (&token[..token.len() - 1], 1.0),
        Some('S' | 's' | 'W' | 'w') => (&token[..token.len() - 1], -1.0),
        _ => (token, 1.0),
    };
    let value: f64 = number
        .parse()
        .map_err(|_| format!("'{token}' is not a coordinate"))?;
    Ok(value * sign)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square() -> Polygon {
        Polygon::new(vec![(0.0, 0.0), (10.0, 0.0), (10.0, 10.0), (0.0, 10.0)]).unwrap()
    }

    #[test]
    fn polygon_contains() {
        let polygon = square();
        assert!(polygon.contains(5.0, 5.0));
        assert!(!polygon.contains(15.0, 5.0));
        assert!(!polygon.contains(-0.1, 5.0));
        assert_eq!(polygon.bounds().max_x, 10.0);
    }

    #[test]
    fn concave_polygon() {
        // U shape open to the north
        let polygon = Polygon::new(vec![
            (0.0, 0.0),
            (9.0, 0.0),
            (9.0, 9.0),
            (6.0, 9.0),
            (6.0, 3.0),
            (3.0, 3.0),
            (3.0, 9.0),
            (0.0, 9.0),
        ])
        .unwrap();
        assert!(polygon.contains(1.5, 6.0));
        assert!(!polygon.contains(4.5, 6.0));
        assert!(polygon.contains(4.5, 1.5));
    }

    #[test]
    fn too_few_vertices() {
        assert!(Polygon::new(vec![(0.0, 0.0), (1.0, 1.0)]).is_err());
        assert!(Polygon::new(vec![(0.0, 0.0), (1.0, 1.0), (0.0, 0.0)]).is_ok());
        let closed =
            Polygon::new(vec![(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 0.0)]).unwrap();
        assert_eq!(closed.vertices().len(), 3);
    }

    #[test]
    fn generic_dialect_is_lat_lon() {
        let text = "30.0, -88.0\n30.0 N, 87.5 W\n\n30.5,-87.5\n";
        let polygon = parse_area(text, AreaDialect::Generic).unwrap();
        assert_eq!(polygon.vertices()[0], (-88.0, 30.0));
        assert_eq!(polygon.vertices()[1], (-87.5, 30.0));
    }

    #[test]
    fn iss60_dialect_reads_point_lines() {
        let text = "NAME=test\nPOINT=30.0;-88.0\nPOINT=30.0;-87.5\nPOINT=30.5;-87.5\nEND\n";
        let polygon = parse_area(text, AreaDialect::Iss60).unwrap();
        assert_eq!(polygon.vertices().len(), 3);
        assert_eq!(polygon.vertices()[2], (-87.5, 30.5));
    }

    #[test]
    fn army_corps_dialect_is_lon_lat() {
        let text = "-88.0, 30.0\n-87.5, 30.0\n-87.5, 30.5\n";
        let polygon = parse_area(text, AreaDialect::ArmyCorps).unwrap();
        assert_eq!(polygon.vertices()[0], (-88.0, 30.0));
    }

    #[test]
    fn bad_lines_are_rejected() {
        assert!(parse_area("30.0\n1,2\n3,4\n", AreaDialect::Generic).is_err());
        assert!(parse_area("abc, 1\n1,2\n3,4\n", AreaDialect::Generic).is_err());
        assert!(parse_area("95, 1\n1,2\n3,4\n", AreaDialect::Generic).is_err());
    }

    #[test]
    fn dialect_by_extension() {
        assert_eq!(
            AreaDialect::from_path(Path::new("a.ARE")).unwrap(),
            AreaDialect::Iss60
        );
        assert_eq!(
            AreaDialect::from_path(Path::new("a.are")).unwrap(),
            AreaDialect::Generic
        );
        assert_eq!(
            AreaDialect::from_path(Path::new("a.afs")).unwrap(),
            AreaDialect::ArmyCorps
        );
        assert!(AreaDialect::from_path(Path::new("a.txt")).is_err());
    }

    #[test]
    fn intersects() {
        let a = BoundingBox {
            min_x: 0.0,
            min_y: 0.0,
            max_x: 1.0,
            max_y: 1.0,
        };
        let b = BoundingBox {
            min_x: 1.0,
            min_y: 1.0,
            max_x: 2.0,
            max_y: 2.0,
        };
        let c = BoundingBox {
            min_x: 3.0,
            max_x: 4.0,
            ..b
        };
        assert!(a.intersects(&b));
        assert!(!a.intersects(&c));
    }
}
