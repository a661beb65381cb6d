//! Focal hotspot intensity
//!
//! Local mean of a boolean raster over a circular neighborhood whose radius
//! is given in meters, producing a continuous 0-1 density surface.

use ndarray::Array2;
use surtland_core::raster::{Neighborhood, Raster};
use surtland_core::{Error, Result};
use surtland_parallel::ExecutionContext;
use tracing::debug;

use super::area::{geographic_cell_dimensions, single_band};

/// Output band name of [`focal_intensity`]
pub const INTENSITY_BAND: &str = "intensity";

/// Neighborhood of a ground radius in pixel space.
///
/// Geographic grids use the ground pixel size at the raster's central
/// latitude, so the circle becomes an ellipse in pixels.
pub fn metric_neighborhood(raster: &Raster, radius_m: f64) -> Result<Neighborhood> {
    if !radius_m.is_finite() || radius_m <= 0.0 {
        return Err(Error::invalid_parameter("radius_m", radius_m, "must be finite and > 0"));
    }
    let gt = raster.transform();
    let (dx, dy) = if raster.is_geographic() {
        let (_, lat) = raster.pixel_to_geo(raster.cols() / 2, raster.rows() / 2);
        geographic_cell_dimensions(lat, gt.pixel_width, gt.pixel_height)
    } else {
        (gt.pixel_width.abs(), gt.pixel_height.abs())
    };
    if dx <= 0.0 || dy <= 0.0 {
        return Err(Error::GeometryMismatch(format!("degenerate pixel size {}x{}", dx, dy)));
    }
    Ok(Neighborhood::Ellipse {
        rx: radius_m / dx,
        ry: radius_m / dy,
    })
}

/// Fraction of valid neighbors that are set, for each pixel.
///
/// Invalid samples are excluded from both numerator and denominator; a pixel
/// whose own sample is invalid is NaN. Pixels on the border use the part of
/// the circle inside the raster.
///
/// # Errors
/// `InvalidParameter` for a non-positive radius or a multi-band input.
pub fn focal_intensity(mask: &Raster, radius_m: f64, ctx: &ExecutionContext) -> Result<Raster> {
    let band = single_band(mask)?;
    let offsets = metric_neighborhood(mask, radius_m)?.offsets();
    let (rows, cols) = mask.shape();
    debug!(radius_m, kernel = offsets.len(), "computing focal intensity");

    let data = ctx.map_rows(rows, |row| {
        let mut row_data = vec![f64::NAN; cols];
        for (col, out) in row_data.iter_mut().enumerate() {
            if mask.sample(band, row, col).is_none() {
                continue;
            }
            let mut set = 0usize;
            let mut valid = 0usize;
            for &(dr, dc) in &offsets {
                let nr = row as isize + dr;
                let nc = col as isize + dc;
                if nr < 0 || nc < 0 || nr as usize >= rows || nc as usize >= cols {
                    continue;
                }
                if let Some(v) = mask.sample(band, nr as usize, nc as usize) {
                    valid += 1;
                    if v != 0.0 {
                        set += 1;
                    }
                }
            }
            *out = set as f64 / valid as f64;
        }
        row_data
    })?;

    let mut out = mask.with_same_meta();
    out.push_band(
        INTENSITY_BAND,
        Array2::from_shape_vec((rows, cols), data).map_err(|e| Error::Other(e.to_string()))?,
    )?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use surtland_core::GeoTransform;

    fn ctx() -> ExecutionContext {
        ExecutionContext::sequential()
    }

    fn mask(values: Array2<f64>) -> Raster {
        Raster::from_band("loss", values).with_transform(GeoTransform::new(0.0, 100.0, 10.0, -10.0))
    }

    #[test]
    fn test_intensity_bounds() {
        let m = mask(Array2::from_shape_fn((7, 7), |(r, c)| ((r + c) % 3 == 0) as u8 as f64));
        let out = focal_intensity(&m, 15.0, &ctx()).unwrap();
        for v in out.band(INTENSITY_BAND).unwrap().iter() {
            assert!((0.0..=1.0).contains(v));
        }
    }

    #[test]
    fn test_single_hotspot() {
        let mut values = Array2::zeros((5, 5));
        values[(2, 2)] = 1.0;
        // 10 m radius on 10 m pixels: center + 4 neighbors
        let out = focal_intensity(&mask(values), 10.0, &ctx()).unwrap();
        let band = out.band(INTENSITY_BAND).unwrap();
        assert_relative_eq!(band[(2, 2)], 0.2);
        assert_relative_eq!(band[(1, 2)], 0.2);
        assert_relative_eq!(band[(1, 1)], 0.0);
    }

    #[test]
    fn test_uniform_mask() {
        let out = focal_intensity(&mask(Array2::ones((4, 4))), 25.0, &ctx()).unwrap();
        assert!(out.band(INTENSITY_BAND).unwrap().iter().all(|&v| v == 1.0));
    }

    #[test]
    fn test_invalid_radius() {
        let m = mask(Array2::ones((2, 2)));
        assert!(focal_intensity(&m, 0.0, &ctx()).is_err());
    }
}
