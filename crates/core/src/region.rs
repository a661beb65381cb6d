//! Study-area regions
//!
//! A [`Region`] restricts aggregation to pixels whose centers fall inside a
//! polygon (in the raster's CRS), or covers the whole raster extent.

use geo::{BoundingRect, Contains};
use geo_types::{coord, Coord, MultiPolygon, Point, Polygon, Rect};

/// Region of interest for zonal aggregation
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Region {
    /// Every pixel of the raster
    #[default]
    Extent,
    /// Pixels whose centers lie inside the polygons
    Polygons(MultiPolygon<f64>),
}

impl Region {
    /// Axis-aligned rectangle `[min_x, min_y, max_x, max_y]`
    pub fn rectangle(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        let rect = Rect::new(coord! { x: min_x, y: min_y }, coord! { x: max_x, y: max_y });
        Region::Polygons(MultiPolygon::new(vec![rect.to_polygon()]))
    }

    /// Region from a single polygon
    pub fn polygon(polygon: Polygon<f64>) -> Self {
        Region::Polygons(MultiPolygon::new(vec![polygon]))
    }

    /// Whether the map point (x, y) belongs to the region.
    ///
    /// Points exactly on a polygon boundary are outside.
    pub fn contains_point(&self, x: f64, y: f64) -> bool {
        match self {
            Region::Extent => true,
            Region::Polygons(mp) => mp.contains(&Point::new(x, y)),
        }
    }

    /// Bounding box `(min_x, min_y, max_x, max_y)`; `None` for [`Region::Extent`]
    /// or an empty polygon set
    pub fn bounding_box(&self) -> Option<(f64, f64, f64, f64)> {
        match self {
            Region::Extent => None,
            Region::Polygons(mp) => mp.bounding_rect().map(|r| {
                let (min, max): (Coord<f64>, Coord<f64>) = (r.min(), r.max());
                (min.x, min.y, max.x, max.y)
            }),
        }
    }

    /// Whether the region's bounding box overlaps `bounds`
    pub fn intersects_bounds(&self, bounds: (f64, f64, f64, f64)) -> bool {
        match self {
            Region::Extent => true,
            Region::Polygons(_) => match self.bounding_box() {
                Some((min_x, min_y, max_x, max_y)) => {
                    min_x <= bounds.2 && max_x >= bounds.0 && min_y <= bounds.3 && max_y >= bounds.1
                }
                None => false,
            },
        }
    }

    /// Short human-readable description used to tag area results
    pub fn describe(&self) -> String {
        match self {
            Region::Extent => "raster extent".to_string(),
            Region::Polygons(mp) => match self.bounding_box() {
                Some((a, b, c, d)) => format!(
                    "{} polygon(s) within [{:.6}, {:.6}, {:.6}, {:.6}]",
                    mp.0.len(),
                    a,
                    b,
                    c,
                    d
                ),
                None => "empty polygon set".to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rectangle_contains() {
        let r = Region::rectangle(0.0, 0.0, 10.0, 5.0);
        assert!(r.contains_point(1.0, 1.0));
        assert!(!r.contains_point(11.0, 1.0));
        assert_eq!(r.bounding_box(), Some((0.0, 0.0, 10.0, 5.0)));
    }

    #[test]
    fn test_extent_contains_everything() {
        assert!(Region::Extent.contains_point(1e9, -1e9));
        assert!(Region::Extent.intersects_bounds((0.0, 0.0, 1.0, 1.0)));
    }

    #[test]
    fn test_intersects_bounds() {
        let r = Region::rectangle(118.5, 9.5, 119.5, 10.5);
        assert!(r.intersects_bounds((119.0, 10.0, 120.0, 11.0)));
        assert!(!r.intersects_bounds((120.0, 10.0, 121.0, 11.0)));
    }
}
