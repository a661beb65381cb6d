//! Single-band categorical rasters

use crate::error::{Error, Result};
use crate::raster::Raster;
use ndarray::Array2;

/// A raster with exactly one band of small non-negative integer class codes.
///
/// Codes are stored as `f64` like every other band; masked or NaN pixels are
/// "no class". The code range is checked by the operations that encode codes
/// (the transition matrix), not at construction.
#[derive(Debug, Clone)]
pub struct ClassificationRaster {
    raster: Raster,
}

impl ClassificationRaster {
    /// Wrap a raster, requiring exactly one band
    pub fn new(raster: Raster) -> Result<Self> {
        if raster.band_count() != 1 {
            return Err(Error::invalid_parameter(
                "bands",
                raster.band_count(),
                "a classification raster holds exactly one band",
            ));
        }
        Ok(Self { raster })
    }

    /// Build from a grid of integer codes
    pub fn from_codes(name: impl Into<String>, codes: Array2<u8>) -> Self {
        Self {
            raster: Raster::from_band(name, codes.mapv(f64::from)),
        }
    }

    pub fn raster(&self) -> &Raster {
        &self.raster
    }

    pub fn into_raster(self) -> Raster {
        self.raster
    }

    /// Name of the single band
    pub fn band_name(&self) -> &str {
        self.raster.band_at(0).name()
    }

    /// The code grid
    pub fn codes(&self) -> &Array2<f64> {
        self.raster.band_at(0).data()
    }

    /// Class code at (row, col), `None` if masked
    pub fn code_at(&self, row: usize, col: usize) -> Option<f64> {
        self.raster.sample(self.codes(), row, col)
    }

    pub fn shape(&self) -> (usize, usize) {
        self.raster.shape()
    }

    /// Builder: replace the georeferencing of the wrapped raster
    pub fn with_georef(self, transform: crate::GeoTransform, crs: Option<crate::CRS>) -> Self {
        let mut raster = self.raster.with_transform(transform);
        raster.set_crs(crs);
        Self { raster }
    }
}
