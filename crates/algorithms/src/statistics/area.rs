//! Zonal area aggregation
//!
//! Sums ground area over the pixels of a boolean raster that are set and
//! whose centers fall inside a region. Pixel area comes from the
//! geotransform: planar `|det|` for projected grids, and a latitude-dependent
//! area on the WGS84 spheroid for geographic grids.

use ndarray::Array2;
use serde::Serialize;
use surtland_core::raster::Raster;
use surtland_core::{Error, Region, Result};
use surtland_parallel::ExecutionContext;
use tracing::debug;

/// WGS84 ellipsoid parameters
const WGS84_A: f64 = 6_378_137.0; // semi-major axis (m)
const WGS84_F: f64 = 1.0 / 298.257_223_563; // flattening

const M2_PER_HECTARE: f64 = 10_000.0;

/// Area of a set of pixels, tagged with how it was computed
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AreaResult {
    pub hectares: f64,
    /// Number of pixels counted
    pub pixel_count: usize,
    /// Pixel size in CRS units, (x, y)
    pub pixel_size: (f64, f64),
    /// Whether a latitude-dependent geographic pixel area was used
    pub geographic: bool,
    /// Description of the region aggregated over
    pub region: String,
}

impl AreaResult {
    pub fn square_meters(&self) -> f64 {
        self.hectares * M2_PER_HECTARE
    }
}

/// Ground dimensions `(dx, dy)` in meters of a geographic cell spanning
/// `d_lon` x `d_lat` degrees, centered at `latitude_deg`.
///
/// Uses the radii of curvature in the prime vertical and the meridian.
pub fn geographic_cell_dimensions(latitude_deg: f64, d_lon: f64, d_lat: f64) -> (f64, f64) {
    let lat = latitude_deg.to_radians();
    let e2 = 2.0 * WGS84_F - WGS84_F * WGS84_F; // first eccentricity squared
    let sin_lat = lat.sin();
    let w = 1.0 - e2 * sin_lat * sin_lat;

    let n = WGS84_A / w.sqrt();
    let m = WGS84_A * (1.0 - e2) / w.powf(1.5);

    let dx = n * lat.cos() * d_lon.to_radians();
    let dy = m * d_lat.to_radians();
    (dx.abs(), dy.abs())
}

/// Ground area in m² of the pixel at (row, col)
pub(crate) fn pixel_area_at(raster: &Raster, geographic: bool, row: usize, col: usize) -> f64 {
    let gt = raster.transform();
    if geographic {
        let (_, lat) = raster.pixel_to_geo(col, row);
        let (dx, dy) = geographic_cell_dimensions(lat, gt.pixel_width, gt.pixel_height);
        dx * dy
    } else {
        gt.pixel_area()
    }
}

/// Single-band raster (`area_m2`) of per-pixel ground area in m²
pub fn pixel_area(raster: &Raster) -> Result<Raster> {
    let geographic = raster.is_geographic();
    let data = Array2::from_shape_fn(raster.shape(), |(r, c)| pixel_area_at(raster, geographic, r, c));
    let mut out = raster.with_same_meta();
    out.set_mask(None)?;
    out.push_band("area_m2", data)?;
    Ok(out)
}

/// Area in hectares of the set pixels of a single-band boolean raster
/// inside `region`.
///
/// A pixel counts when its sample is valid and non-zero and its center lies
/// inside the region. Partial sums are accumulated per tile and combined.
///
/// # Errors
/// `InvalidParameter` unless `mask` has exactly one band.
pub fn area_hectares(mask: &Raster, region: &Region, ctx: &ExecutionContext) -> Result<AreaResult> {
    let band = single_band(mask)?;
    let geographic = mask.is_geographic();
    let cols = mask.cols();

    let (m2, count) = ctx.reduce_rows(
        mask.rows(),
        || (0.0, 0usize),
        |row| {
            let mut sum = 0.0;
            let mut n = 0;
            for col in 0..cols {
                if mask.sample(band, row, col).is_none_or(|v| v == 0.0) {
                    continue;
                }
                let (x, y) = mask.pixel_to_geo(col, row);
                if !region.contains_point(x, y) {
                    continue;
                }
                sum += pixel_area_at(mask, geographic, row, col);
                n += 1;
            }
            (sum, n)
        },
        |a, b| (a.0 + b.0, a.1 + b.1),
    )?;

    debug!(pixels = count, hectares = m2 / M2_PER_HECTARE, "aggregated area");

    let gt = mask.transform();
    Ok(AreaResult {
        hectares: m2 / M2_PER_HECTARE,
        pixel_count: count,
        pixel_size: (gt.pixel_width.abs(), gt.pixel_height.abs()),
        geographic,
        region: region.describe(),
    })
}

/// Ground area in hectares of every pixel of `raster` inside `region`,
/// regardless of validity
pub fn region_area_hectares(raster: &Raster, region: &Region, ctx: &ExecutionContext) -> Result<f64> {
    let geographic = raster.is_geographic();
    let cols = raster.cols();
    let m2 = ctx.reduce_rows(
        raster.rows(),
        || 0.0,
        |row| {
            (0..cols)
                .filter(|&col| {
                    let (x, y) = raster.pixel_to_geo(col, row);
                    region.contains_point(x, y)
                })
                .map(|col| pixel_area_at(raster, geographic, row, col))
                .sum()
        },
        |a, b| a + b,
    )?;
    Ok(m2 / M2_PER_HECTARE)
}

pub(crate) fn single_band(raster: &Raster) -> Result<&Array2<f64>> {
    if raster.band_count() != 1 {
        return Err(Error::invalid_parameter(
            "mask",
            format!("{} bands", raster.band_count()),
            "expected a single-band boolean raster",
        ));
    }
    Ok(raster.band_at(0).data())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;
    use surtland_core::{GeoTransform, CRS};

    fn utm_mask(values: Vec<f64>, rows: usize, cols: usize) -> Raster {
        Raster::from_vec("mask", values, rows, cols)
            .unwrap()
            .with_transform(GeoTransform::new(500_000.0, 1_000_000.0, 10.0, -10.0))
            .with_crs(CRS::utm(16, true))
    }

    fn ctx() -> ExecutionContext {
        ExecutionContext::sequential().with_tile_rows(2)
    }

    #[test]
    fn test_projected_area() {
        let mask = utm_mask(vec![1.0, 1.0, 0.0, 1.0, 0.0, 0.0], 2, 3);
        let area = area_hectares(&mask, &Region::Extent, &ctx()).unwrap();
        assert_eq!(area.pixel_count, 3);
        assert_relative_eq!(area.hectares, 3.0 * 100.0 / 10_000.0);
        assert!(!area.geographic);
    }

    #[test]
    fn test_region_restricts_pixels() {
        let mask = utm_mask(vec![1.0; 4], 2, 2);
        // covers only the top-left pixel center (500005, 999995)
        let region = Region::rectangle(500_000.0, 999_990.0, 500_010.0, 1_000_000.0);
        let area = area_hectares(&mask, &region, &ctx()).unwrap();
        assert_eq!(area.pixel_count, 1);
        assert_relative_eq!(region_area_hectares(&mask, &region, &ctx()).unwrap(), 0.01);
    }

    #[test]
    fn test_masked_pixels_do_not_count() {
        let mask = utm_mask(vec![1.0, 1.0, f64::NAN, 1.0], 2, 2)
            .with_mask(Array2::from_shape_vec((2, 2), vec![true, false, true, true]).unwrap())
            .unwrap();
        assert_eq!(area_hectares(&mask, &Region::Extent, &ctx()).unwrap().pixel_count, 2);
    }

    #[test]
    fn test_geographic_area_shrinks_with_latitude() {
        let equator = geographic_cell_dimensions(0.0, 1.0, 1.0);
        let north = geographic_cell_dimensions(60.0, 1.0, 1.0);
        assert_relative_eq!(equator.0, 111_319.49, epsilon = 1.0);
        assert!(north.0 < equator.0 / 1.9);

        let raster = Raster::filled(2, 1, "mask", 1.0)
            .with_transform(GeoTransform::new(-84.0, 60.0, 0.001, -30.0))
            .with_crs(CRS::wgs84());
        let areas = pixel_area(&raster).unwrap();
        let a = areas.band("area_m2").unwrap();
        assert!(a[(0, 0)] < a[(1, 0)]);
    }

    #[test]
    fn test_multi_band_mask_rejected() {
        let mask = utm_mask(vec![1.0; 4], 2, 2)
            .with_band("other", Array2::zeros((2, 2)))
            .unwrap();
        assert!(matches!(
            area_hectares(&mask, &Region::Extent, &ctx()),
            Err(Error::InvalidParameter { .. })
        ));
    }

    proptest! {
        #[test]
        fn prop_area_is_additive_over_disjoint_masks(bits in proptest::collection::vec(0u8..3, 30)) {
            let a: Vec<f64> = bits.iter().map(|&b| (b == 1) as u8 as f64).collect();
            let b: Vec<f64> = bits.iter().map(|&b| (b == 2) as u8 as f64).collect();
            let union: Vec<f64> = bits.iter().map(|&b| (b != 0) as u8 as f64).collect();
            let region = Region::rectangle(500_000.0, 999_950.0, 500_040.0, 1_000_000.0);

            let area = |v: Vec<f64>| area_hectares(&utm_mask(v, 5, 6), &region, &ctx()).unwrap().hectares;
            prop_assert!((area(union) - (area(a) + area(b))).abs() < 1e-9);
        }
    }
}
