//! Normalized-difference spectral indices
//!
//! `(A - B) / (A + B)` over two bands of one raster. Pixels where `A + B`
//! is zero, or where either input is invalid, are masked in the output:
//! a zero there would be indistinguishable from a genuine index of 0.

use ndarray::Array2;
use surtland_core::raster::Raster;
use surtland_core::{Error, Result};

/// Named indices with Sentinel-2 default band pairs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpectralIndex {
    /// Normalized Difference Vegetation Index, `(NIR - Red) / (NIR + Red)`
    Ndvi,
    /// Normalized Difference Water Index (McFeeters), `(Green - NIR) / (Green + NIR)`
    Ndwi,
    /// Modified NDWI (Xu), `(Green - SWIR1) / (Green + SWIR1)`
    Mndwi,
    /// Normalized Burn Ratio, `(NIR - SWIR2) / (NIR + SWIR2)`
    Nbr,
}

impl SpectralIndex {
    /// Positive and negative band of the ratio
    pub fn bands(&self) -> (&'static str, &'static str) {
        match self {
            SpectralIndex::Ndvi => ("B8", "B4"),
            SpectralIndex::Ndwi => ("B3", "B8"),
            SpectralIndex::Mndwi => ("B3", "B11"),
            SpectralIndex::Nbr => ("B8", "B12"),
        }
    }

    /// Output band name
    pub fn name(&self) -> &'static str {
        match self {
            SpectralIndex::Ndvi => "NDVI",
            SpectralIndex::Ndwi => "NDWI",
            SpectralIndex::Mndwi => "MNDWI",
            SpectralIndex::Nbr => "NBR",
        }
    }

    /// Parse a canonical name (`"ndvi"`, `"NDWI"`, ...)
    pub fn from_name(name: &str) -> Result<Self> {
        match name.to_ascii_uppercase().as_str() {
            "NDVI" => Ok(SpectralIndex::Ndvi),
            "NDWI" => Ok(SpectralIndex::Ndwi),
            "MNDWI" => Ok(SpectralIndex::Mndwi),
            "NBR" => Ok(SpectralIndex::Nbr),
            _ => Err(Error::invalid_parameter("index", name, "expected NDVI, NDWI, MNDWI or NBR")),
        }
    }
}

/// Compute `(a - b) / (a + b)` into a single-band raster named `name`.
///
/// The output keeps the geometry of `raster`; its pixel mask is the input
/// mask narrowed to pixels with a finite result.
///
/// # Errors
/// `MissingBand` if either band is absent.
pub fn normalized_difference(raster: &Raster, band_a: &str, band_b: &str, name: &str) -> Result<Raster> {
    let a = raster.band(band_a)?;
    let b = raster.band(band_b)?;

    let data = Array2::from_shape_fn(raster.shape(), |(r, c)| {
        let (Some(va), Some(vb)) = (raster.sample(a, r, c), raster.sample(b, r, c)) else {
            return f64::NAN;
        };
        let sum = va + vb;
        if sum == 0.0 {
            return f64::NAN;
        }
        (va - vb) / sum
    });
    let mask = data.mapv(f64::is_finite);

    let mut out = raster.with_same_meta();
    out.push_band(name, data)?;
    out.set_mask(Some(mask))?;
    Ok(out)
}

/// Compute a named index from its default band pair
pub fn spectral_index(raster: &Raster, index: SpectralIndex) -> Result<Raster> {
    let (a, b) = index.bands();
    normalized_difference(raster, a, b, index.name())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    fn two_band(a: Vec<f64>, b: Vec<f64>) -> Raster {
        let n = a.len();
        Raster::from_vec("B8", a, 1, n)
            .unwrap()
            .with_band("B4", Array2::from_shape_vec((1, n), b).unwrap())
            .unwrap()
    }

    #[test]
    fn test_ndvi_values() {
        let r = two_band(vec![0.5, 0.3, 0.0], vec![0.1, 0.3, 0.2]);
        let out = spectral_index(&r, SpectralIndex::Ndvi).unwrap();
        assert_eq!(out.band_names(), vec!["NDVI"]);
        let ndvi = out.band("NDVI").unwrap();
        assert_relative_eq!(ndvi[(0, 0)], 0.4 / 0.6, epsilon = 1e-12);
        assert_relative_eq!(ndvi[(0, 1)], 0.0);
        assert_relative_eq!(ndvi[(0, 2)], -1.0);
    }

    #[test]
    fn test_zero_sum_is_masked_not_zero() {
        let r = two_band(vec![0.0, 0.2], vec![0.0, -0.2]);
        let out = normalized_difference(&r, "B8", "B4", "ND").unwrap();
        assert!(!out.is_pixel_valid(0, 0));
        assert!(!out.is_pixel_valid(0, 1));
        assert!(out.band("ND").unwrap()[(0, 0)].is_nan());
    }

    #[test]
    fn test_masked_input_propagates() {
        let r = two_band(vec![0.5, 0.5], vec![0.1, 0.1])
            .with_mask(Array2::from_shape_vec((1, 2), vec![false, true]).unwrap())
            .unwrap();
        let out = normalized_difference(&r, "B8", "B4", "ND").unwrap();
        assert!(!out.is_pixel_valid(0, 0));
        assert!(out.is_pixel_valid(0, 1));
    }

    #[test]
    fn test_missing_band() {
        let r = two_band(vec![0.5], vec![0.1]);
        let err = spectral_index(&r, SpectralIndex::Nbr).unwrap_err();
        assert!(matches!(err, Error::MissingBand { ref band, .. } if band == "B12"));
    }

    proptest! {
        #[test]
        fn prop_nd_in_unit_interval(
            a in prop_oneof![Just(0.0), 0.0..1e4f64],
            b in prop_oneof![Just(0.0), 0.0..1e4f64],
        ) {
            let out = normalized_difference(&two_band(vec![a], vec![b]), "B8", "B4", "ND").unwrap();
            let v = out.band("ND").unwrap()[(0, 0)];
            if a + b > 0.0 {
                prop_assert!(out.is_pixel_valid(0, 0));
                prop_assert!((-1.0..=1.0).contains(&v), "nd({}, {}) = {}", a, b, v);
            } else {
                prop_assert!(!out.is_pixel_valid(0, 0));
                prop_assert!(v.is_nan());
            }
        }
    }

    #[test]
    fn test_index_names() {
        assert_eq!(SpectralIndex::from_name("mndwi").unwrap(), SpectralIndex::Mndwi);
        assert!(SpectralIndex::from_name("evi").is_err());
    }
}
