//! Main Raster type

use crate::crs::CRS;
use crate::error::{Error, Result};
use crate::raster::GeoTransform;
use ndarray::{Array2, ArrayView2, Zip};

/// A named 2-D grid of samples belonging to a [`Raster`].
#[derive(Debug, Clone)]
pub struct Band {
    name: String,
    data: Array2<f64>,
}

impl Band {
    /// Band name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Band samples in row-major order (row, col)
    pub fn data(&self) -> &Array2<f64> {
        &self.data
    }
}

/// A georeferenced, multi-band raster.
///
/// All bands share one shape, one [`GeoTransform`] and one CRS. Bands keep
/// their insertion order, which is the order used when stacking and
/// exporting.
///
/// Validity is tracked at two levels:
/// - the optional pixel `mask` (`true` = valid) invalidates a pixel in every band;
/// - a non-finite sample (NaN) invalidates that pixel in its own band only.
///
/// Masked samples are excluded from every reduction. Operations never mutate
/// their inputs; they return new rasters.
///
/// # Example
///
/// ```ignore
/// use ndarray::Array2;
/// use surtland_core::Raster;
///
/// let raster = Raster::from_band("B8", Array2::from_elem((10, 10), 0.3))
///     .with_band("B4", Array2::from_elem((10, 10), 0.1))?;
/// assert_eq!(raster.band_names(), vec!["B8", "B4"]);
/// ```
#[derive(Debug, Clone)]
pub struct Raster {
    bands: Vec<Band>,
    shape: (usize, usize),
    transform: GeoTransform,
    crs: Option<CRS>,
    mask: Option<Array2<bool>>,
}

impl Raster {
    /// Create a raster of the given shape with no bands
    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            bands: Vec::new(),
            shape: (rows, cols),
            transform: GeoTransform::default(),
            crs: None,
            mask: None,
        }
    }

    /// Create a single-band raster from an ndarray
    pub fn from_band(name: impl Into<String>, data: Array2<f64>) -> Self {
        let shape = data.dim();
        Self {
            bands: vec![Band {
                name: name.into(),
                data,
            }],
            shape,
            transform: GeoTransform::default(),
            crs: None,
            mask: None,
        }
    }

    /// Create a single-band raster filled with a value
    pub fn filled(rows: usize, cols: usize, name: impl Into<String>, value: f64) -> Self {
        Self::from_band(name, Array2::from_elem((rows, cols), value))
    }

    /// Create a single-band raster from row-major data
    pub fn from_vec(name: impl Into<String>, data: Vec<f64>, rows: usize, cols: usize) -> Result<Self> {
        let array = Array2::from_shape_vec((rows, cols), data).map_err(|_| {
            Error::GeometryMismatch(format!("buffer does not hold {}x{} samples", rows, cols))
        })?;
        Ok(Self::from_band(name, array))
    }

    /// Create an empty raster (no bands) sharing shape, transform, CRS and
    /// pixel mask with `self`
    pub fn with_same_meta(&self) -> Raster {
        Raster {
            bands: Vec::new(),
            shape: self.shape,
            transform: self.transform,
            crs: self.crs.clone(),
            mask: self.mask.clone(),
        }
    }

    /// Builder: append a band
    pub fn with_band(mut self, name: impl Into<String>, data: Array2<f64>) -> Result<Self> {
        self.push_band(name, data)?;
        Ok(self)
    }

    /// Builder: set the geotransform
    pub fn with_transform(mut self, transform: GeoTransform) -> Self {
        self.transform = transform;
        self
    }

    /// Builder: set the CRS
    pub fn with_crs(mut self, crs: CRS) -> Self {
        self.crs = Some(crs);
        self
    }

    /// Builder: set the pixel validity mask
    pub fn with_mask(mut self, mask: Array2<bool>) -> Result<Self> {
        self.set_mask(Some(mask))?;
        Ok(self)
    }

    /// Append a band. Fails on a name collision or a shape mismatch.
    pub fn push_band(&mut self, name: impl Into<String>, data: Array2<f64>) -> Result<()> {
        let name = name.into();
        if data.dim() != self.shape {
            return Err(Error::GeometryMismatch(format!(
                "band '{}' has shape {:?}, raster is {:?}",
                name,
                data.dim(),
                self.shape
            )));
        }
        if self.has_band(&name) {
            return Err(Error::DuplicateBand(name));
        }
        self.bands.push(Band { name, data });
        Ok(())
    }

    // Dimensions

    /// Number of rows
    pub fn rows(&self) -> usize {
        self.shape.0
    }

    /// Number of columns
    pub fn cols(&self) -> usize {
        self.shape.1
    }

    /// Dimensions as (rows, cols)
    pub fn shape(&self) -> (usize, usize) {
        self.shape
    }

    /// Total number of pixels per band
    pub fn len(&self) -> usize {
        self.shape.0 * self.shape.1
    }

    /// Whether the raster has no pixels
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // Bands

    /// Number of bands
    pub fn band_count(&self) -> usize {
        self.bands.len()
    }

    /// Band names in order
    pub fn band_names(&self) -> Vec<&str> {
        self.bands.iter().map(|b| b.name.as_str()).collect()
    }

    /// Whether a band with this name exists
    pub fn has_band(&self, name: &str) -> bool {
        self.bands.iter().any(|b| b.name == name)
    }

    /// Iterate over bands in order
    pub fn bands(&self) -> impl Iterator<Item = &Band> {
        self.bands.iter()
    }

    /// Band by position; panics if `index >= band_count()`
    pub fn band_at(&self, index: usize) -> &Band {
        &self.bands[index]
    }

    /// Get a band's samples, failing with `MissingBand` if absent
    pub fn band(&self, name: &str) -> Result<&Array2<f64>> {
        self.bands
            .iter()
            .find(|b| b.name == name)
            .map(|b| &b.data)
            .ok_or_else(|| self.missing(name))
    }

    /// Get a read-only view of a band
    pub fn view(&self, name: &str) -> Result<ArrayView2<'_, f64>> {
        self.band(name).map(|b| b.view())
    }

    /// Keep only the named bands, in the given order
    pub fn select(&self, names: &[&str]) -> Result<Raster> {
        let mut out = self.with_same_meta();
        for &name in names {
            out.push_band(name, self.band(name)?.clone())?;
        }
        Ok(out)
    }

    /// Drop a band if present
    pub fn without_band(&self, name: &str) -> Raster {
        let mut out = self.clone();
        out.bands.retain(|b| b.name != name);
        out
    }

    /// Rename every band with `f`; collisions fail with `DuplicateBand`
    pub fn rename_bands<F>(&self, f: F) -> Result<Raster>
    where
        F: Fn(&str) -> String,
    {
        let mut out = self.with_same_meta();
        for band in &self.bands {
            out.push_band(f(&band.name), band.data.clone())?;
        }
        Ok(out)
    }

    /// Concatenate the bands of `others` after the bands of `self`.
    ///
    /// All rasters must be aligned. Pixel masks are combined so a pixel
    /// invalid in any input stays invalid.
    pub fn concat(&self, others: &[&Raster]) -> Result<Raster> {
        let mut out = self.clone();
        for other in others {
            out.check_aligned(other)?;
            for band in &other.bands {
                out.push_band(band.name.clone(), band.data.clone())?;
            }
            out.mask = match (out.mask.take(), &other.mask) {
                (Some(a), Some(b)) => Some(Zip::from(&a).and(b).map_collect(|&x, &y| x && y)),
                (Some(a), None) => Some(a),
                (None, Some(b)) => Some(b.clone()),
                (None, None) => None,
            };
        }
        Ok(out)
    }

    // Metadata

    /// Get the geotransform
    pub fn transform(&self) -> &GeoTransform {
        &self.transform
    }

    /// Set the geotransform
    pub fn set_transform(&mut self, transform: GeoTransform) {
        self.transform = transform;
    }

    /// Get the CRS
    pub fn crs(&self) -> Option<&CRS> {
        self.crs.as_ref()
    }

    /// Set the CRS
    pub fn set_crs(&mut self, crs: Option<CRS>) {
        self.crs = crs;
    }

    /// Whether map coordinates are geographic degrees
    pub fn is_geographic(&self) -> bool {
        self.crs.as_ref().is_some_and(CRS::is_geographic)
    }

    /// Cell size (assumes square cells)
    pub fn cell_size(&self) -> f64 {
        self.transform.cell_size()
    }

    /// Map bounds (min_x, min_y, max_x, max_y)
    pub fn bounds(&self) -> (f64, f64, f64, f64) {
        self.transform.bounds(self.cols(), self.rows())
    }

    /// Convert pixel coordinates to map coordinates (pixel center)
    pub fn pixel_to_geo(&self, col: usize, row: usize) -> (f64, f64) {
        self.transform.pixel_to_geo(col, row)
    }

    /// Fail with `GeometryMismatch` unless `other` has the same shape, CRS
    /// and geotransform
    pub fn check_aligned(&self, other: &Raster) -> Result<()> {
        if self.shape != other.shape {
            return Err(Error::GeometryMismatch(format!(
                "shape {:?} vs {:?}",
                self.shape, other.shape
            )));
        }
        match (&self.crs, &other.crs) {
            (Some(a), Some(b)) if !a.is_equivalent(b) => {
                return Err(Error::GeometryMismatch(format!("CRS {} vs {}", a, b)));
            }
            (Some(a), None) | (None, Some(a)) => {
                return Err(Error::GeometryMismatch(format!("CRS {} vs none", a)));
            }
            _ => {}
        }
        if !self.transform.is_aligned_with(&other.transform) {
            return Err(Error::GeometryMismatch(format!(
                "geotransform {:?} vs {:?}",
                self.transform.to_gdal(),
                other.transform.to_gdal()
            )));
        }
        Ok(())
    }

    // Validity

    /// Get the pixel validity mask (`true` = valid), if any
    pub fn mask(&self) -> Option<&Array2<bool>> {
        self.mask.as_ref()
    }

    /// Replace the pixel validity mask
    pub fn set_mask(&mut self, mask: Option<Array2<bool>>) -> Result<()> {
        if let Some(m) = &mask
            && m.dim() != self.shape
        {
            return Err(Error::GeometryMismatch(format!(
                "mask shape {:?} vs raster {:?}",
                m.dim(),
                self.shape
            )));
        }
        self.mask = mask;
        Ok(())
    }

    /// Whether the pixel mask allows (row, col)
    #[inline]
    pub fn is_pixel_valid(&self, row: usize, col: usize) -> bool {
        self.mask.as_ref().is_none_or(|m| m[(row, col)])
    }

    /// Valid sample of `band` at (row, col): `None` when masked or non-finite
    #[inline]
    pub fn sample(&self, band: &Array2<f64>, row: usize, col: usize) -> Option<f64> {
        if !self.is_pixel_valid(row, col) {
            return None;
        }
        let v = band[(row, col)];
        v.is_finite().then_some(v)
    }

    /// Per-pixel validity of one band (pixel mask AND finite sample)
    pub fn valid_mask(&self, name: &str) -> Result<Array2<bool>> {
        let band = self.band(name)?;
        Ok(Array2::from_shape_fn(self.shape, |(r, c)| {
            self.sample(band, r, c).is_some()
        }))
    }

    /// Number of valid samples in a band
    pub fn valid_count(&self, name: &str) -> Result<usize> {
        Ok(self.valid_mask(name)?.iter().filter(|&&v| v).count())
    }

    // Statistics

    /// Basic statistics of a band over valid samples
    pub fn statistics(&self, name: &str) -> Result<RasterStatistics> {
        let band = self.band(name)?;
        let mut min: Option<f64> = None;
        let mut max: Option<f64> = None;
        let mut sum = 0.0;
        let mut count = 0usize;

        for ((r, c), _) in band.indexed_iter() {
            let Some(v) = self.sample(band, r, c) else {
                continue;
            };
            min = Some(min.map_or(v, |m| m.min(v)));
            max = Some(max.map_or(v, |m| m.max(v)));
            sum += v;
            count += 1;
        }

        Ok(RasterStatistics {
            min,
            max,
            mean: (count > 0).then(|| sum / count as f64),
            valid_count: count,
            nodata_count: self.len() - count,
        })
    }

    fn missing(&self, name: &str) -> Error {
        Error::MissingBand {
            band: name.to_string(),
            available: self.bands.iter().map(|b| b.name.clone()).collect(),
        }
    }
}

/// Basic statistics for one band
#[derive(Debug, Clone, PartialEq)]
pub struct RasterStatistics {
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub mean: Option<f64>,
    pub valid_count: usize,
    pub nodata_count: usize,
}
