//! Feature stacking across seasons and years

use ndarray::{Array2, Zip};
use surtland_core::raster::Raster;
use surtland_core::{Error, Result};
use tracing::debug;

use super::indices::{spectral_index, SpectralIndex};

/// Parameters for [`stack_seasonal_features`]
#[derive(Debug, Clone)]
pub struct SeasonalFeatureParams {
    /// Raw bands copied from the dry-season composite
    pub raw_bands: Vec<String>,
    /// Indices computed for each season (`<INDEX>_dry`, `<INDEX>_wet`)
    pub season_indices: Vec<SpectralIndex>,
    /// Indices whose wet-minus-dry difference and two-season mean are added
    /// (`<INDEX>_diff`, `<INDEX>_mean`)
    pub contrast_indices: Vec<SpectralIndex>,
}

impl Default for SeasonalFeatureParams {
    fn default() -> Self {
        Self {
            raw_bands: ["B2", "B3", "B4", "B8", "B11", "B12"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            season_indices: vec![SpectralIndex::Ndvi, SpectralIndex::Ndwi],
            contrast_indices: vec![SpectralIndex::Ndvi],
        }
    }
}

/// Stack raw dry-season bands with per-season indices and their
/// wet/dry difference and mean.
///
/// Derived samples are NaN wherever an input is invalid or an index
/// denominator is zero; the pixel mask is the intersection of both
/// composites' masks.
///
/// # Errors
/// - `GeometryMismatch` if the composites are not aligned
/// - `MissingBand` for an absent raw or index band
/// - `DuplicateBand` if a derived name collides with a raw band
pub fn stack_seasonal_features(dry: &Raster, wet: &Raster, params: &SeasonalFeatureParams) -> Result<Raster> {
    dry.check_aligned(wet)?;

    let raw: Vec<&str> = params.raw_bands.iter().map(String::as_str).collect();
    let mut out = dry.select(&raw)?;
    out.set_mask(intersect_masks(dry.mask(), wet.mask()))?;

    let mut computed: Vec<(SpectralIndex, Array2<f64>, Array2<f64>)> = Vec::new();
    for &index in &params.season_indices {
        let d = index_data(dry, index)?;
        let w = index_data(wet, index)?;
        out.push_band(format!("{}_dry", index.name()), d.clone())?;
        out.push_band(format!("{}_wet", index.name()), w.clone())?;
        computed.push((index, d, w));
    }

    for &index in &params.contrast_indices {
        let (d, w) = match computed.iter().find(|(i, _, _)| *i == index) {
            Some((_, d, w)) => (d.clone(), w.clone()),
            None => (index_data(dry, index)?, index_data(wet, index)?),
        };
        let diff = Zip::from(&w).and(&d).map_collect(|&w, &d| w - d);
        let mean = Zip::from(&w).and(&d).map_collect(|&w, &d| (w + d) / 2.0);
        out.push_band(format!("{}_diff", index.name()), diff)?;
        out.push_band(format!("{}_mean", index.name()), mean)?;
    }

    debug!(bands = out.band_count(), "stacked seasonal features");
    Ok(out)
}

/// Rename every band of each composite to `<band>_<year>` and concatenate
/// in input order.
///
/// # Errors
/// - `InvalidParameter` if `composites` is empty or `years` has a different length
/// - `BandMismatch` if the composites do not share one band set
/// - `GeometryMismatch` if they are not aligned
pub fn stack_multi_year(composites: &[Raster], years: &[i32]) -> Result<Raster> {
    if composites.is_empty() {
        return Err(Error::invalid_parameter("composites", 0, "at least one composite is required"));
    }
    if composites.len() != years.len() {
        return Err(Error::invalid_parameter(
            "years",
            years.len(),
            format!("expected one year per composite ({})", composites.len()),
        ));
    }

    let mut expected: Vec<String> = composites[0].band_names().iter().map(|s| s.to_string()).collect();
    expected.sort();
    for c in &composites[1..] {
        let mut actual: Vec<String> = c.band_names().iter().map(|s| s.to_string()).collect();
        actual.sort();
        if actual != expected {
            return Err(Error::BandMismatch { expected, actual });
        }
    }

    let renamed: Vec<Raster> = composites
        .iter()
        .zip(years)
        .map(|(c, year)| c.rename_bands(|b| format!("{}_{}", b, year)))
        .collect::<Result<_>>()?;

    let rest: Vec<&Raster> = renamed[1..].iter().collect();
    renamed[0].concat(&rest)
}

fn index_data(raster: &Raster, index: SpectralIndex) -> Result<Array2<f64>> {
    Ok(spectral_index(raster, index)?.band(index.name())?.clone())
}

fn intersect_masks(a: Option<&Array2<bool>>, b: Option<&Array2<bool>>) -> Option<Array2<bool>> {
    match (a, b) {
        (Some(a), Some(b)) => Some(Zip::from(a).and(b).map_collect(|&x, &y| x && y)),
        (Some(m), None) | (None, Some(m)) => Some(m.clone()),
        (None, None) => None,
    }
}
