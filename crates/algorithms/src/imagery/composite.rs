//! Temporal compositing
//!
//! Reduces a cloud-masked frame sequence to one raster per date window.
//! Every reducer works on the valid samples of each pixel only; a pixel
//! without any valid sample in the window is masked in the composite for
//! every reducer. `EmptyCollection` is reserved for windows where no frame
//! survives the filters at all.

use ndarray::Array2;
use std::fmt;
use std::str::FromStr;
use surtland_core::raster::{ymd, DateWindow, FrameSequence, Raster, TemporalFrame};
use surtland_core::{Error, Region, Result};
use surtland_parallel::ExecutionContext;
use tracing::{debug, warn};

use super::cloud_mask::{mask_clouds, CloudMaskParams, S2_CIRRUS_BIT, S2_OPAQUE_CLOUD_BIT, S2_QA_BAND};

/// Per-pixel statistic used to collapse the time axis
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Reducer {
    /// Median of valid samples; robust to residual cloud and noise
    #[default]
    Median,
    Mean,
    Min,
    Max,
    /// Population standard deviation
    StdDev,
    /// Nearest-rank percentile (0-100)
    Percentile(f64),
}

impl Reducer {
    /// Short name used as a band suffix (`mean`, `std`, `p25`, ...)
    pub fn suffix(&self) -> String {
        match self {
            Reducer::Median => "median".into(),
            Reducer::Mean => "mean".into(),
            Reducer::Min => "min".into(),
            Reducer::Max => "max".into(),
            Reducer::StdDev => "std".into(),
            Reducer::Percentile(p) => format!("p{}", p),
        }
    }

    fn validate(&self) -> Result<()> {
        if let Reducer::Percentile(p) = *self
            && !(0.0..=100.0).contains(&p)
        {
            return Err(Error::invalid_parameter("percentile", p, "must be between 0 and 100"));
        }
        Ok(())
    }

    /// Reduce valid samples; `None` for an empty slice
    pub fn reduce(&self, values: &mut [f64]) -> Option<f64> {
        if values.is_empty() {
            return None;
        }
        let n = values.len() as f64;

        let v = match self {
            Reducer::Mean => values.iter().sum::<f64>() / n,
            Reducer::StdDev => {
                let mean = values.iter().sum::<f64>() / n;
                let var = values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n;
                var.sqrt()
            }
            Reducer::Min => values.iter().cloned().fold(f64::INFINITY, f64::min),
            Reducer::Max => values.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
            Reducer::Median => {
                values.sort_by(|a, b| a.total_cmp(b));
                let mid = values.len() / 2;
                if values.len() % 2 == 0 {
                    (values[mid - 1] + values[mid]) / 2.0
                } else {
                    values[mid]
                }
            }
            Reducer::Percentile(p) => {
                values.sort_by(|a, b| a.total_cmp(b));
                let idx = (p / 100.0 * (values.len() - 1) as f64).round() as usize;
                values[idx.min(values.len() - 1)]
            }
        };
        Some(v)
    }
}

/// Seasons used for phenology composites
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Season {
    /// January 1 to May 31
    Dry,
    /// June 1 to November 30
    Wet,
}

impl Season {
    /// Closed date window of this season in `year`
    pub fn window(&self, year: i32) -> Result<DateWindow> {
        match self {
            Season::Dry => DateWindow::new(ymd(year, 1, 1)?, ymd(year, 5, 31)?),
            Season::Wet => DateWindow::new(ymd(year, 6, 1)?, ymd(year, 11, 30)?),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Season::Dry => "dry",
            Season::Wet => "wet",
        }
    }
}

impl FromStr for Season {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dry" => Ok(Season::Dry),
            "wet" => Ok(Season::Wet),
            _ => Err(Error::InvalidSeason(s.to_string())),
        }
    }
}

impl fmt::Display for Season {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parameters for temporal compositing
#[derive(Debug, Clone)]
pub struct CompositeParams {
    pub reducer: Reducer,
    /// QA band used for cloud masking; `None` when frames are already masked
    pub qa_band: Option<String>,
    /// QA bits that flag invalid pixels
    pub cloud_bits: Vec<u8>,
    pub cloud_mask: CloudMaskParams,
    /// Frames with a larger scene cloud fraction are dropped (default: 0.2)
    pub max_cloud_fraction: f64,
    /// Frames whose footprint misses this region are dropped
    pub region: Option<Region>,
    /// Bands to reduce; default: every band except the QA band
    pub bands: Option<Vec<String>>,
}

impl Default for CompositeParams {
    fn default() -> Self {
        Self {
            reducer: Reducer::Median,
            qa_band: Some(S2_QA_BAND.to_string()),
            cloud_bits: vec![S2_OPAQUE_CLOUD_BIT, S2_CIRRUS_BIT],
            cloud_mask: CloudMaskParams::default(),
            max_cloud_fraction: 0.2,
            region: None,
            bands: None,
        }
    }
}

impl CompositeParams {
    /// Parameters for frames that carry their own validity mask and
    /// reflectance values
    pub fn premasked(reducer: Reducer) -> Self {
        Self {
            reducer,
            qa_band: None,
            max_cloud_fraction: 1.0,
            ..Self::default()
        }
    }
}

/// Build a composite of the frames acquired inside `window`.
///
/// Frames are filtered by date, scene cloud fraction and region footprint,
/// cloud-masked, then reduced per pixel and per band.
///
/// # Errors
/// - `EmptyCollection` if no frame survives the filters
/// - `GeometryMismatch` / `BandMismatch` if surviving frames are not aligned
///   or do not share one band set
/// - `MissingBand` for a requested band or QA band that does not exist
pub fn composite(
    frames: &FrameSequence,
    window: &DateWindow,
    params: &CompositeParams,
    ctx: &ExecutionContext,
) -> Result<Raster> {
    params.reducer.validate()?;

    let selected: Vec<&TemporalFrame> = frames
        .iter()
        .filter(|f| window.contains(f.date()))
        .filter(|f| f.cloud_fraction() <= params.max_cloud_fraction)
        .filter(|f| {
            params
                .region
                .as_ref()
                .is_none_or(|r| r.intersects_bounds(f.raster().bounds()))
        })
        .collect();

    debug!(
        total = frames.len(),
        selected = selected.len(),
        start = %window.start,
        end = %window.end,
        "compositing frames"
    );

    if selected.is_empty() {
        return Err(Error::EmptyCollection {
            reason: format!(
                "none of {} frames fall in {}..{} with cloud fraction <= {} inside the region",
                frames.len(),
                window.start,
                window.end,
                params.max_cloud_fraction
            ),
        });
    }

    let masked: Vec<Raster> = selected
        .iter()
        .map(|f| match &params.qa_band {
            Some(qa) => mask_clouds(f, qa, &params.cloud_bits, &params.cloud_mask),
            None => Ok(f.raster().clone()),
        })
        .collect::<Result<_>>()?;

    let first = &masked[0];
    let mut expected: Vec<String> = first.band_names().iter().map(|s| s.to_string()).collect();
    expected.sort();
    for raster in &masked[1..] {
        first.check_aligned(raster)?;
        let mut actual: Vec<String> = raster.band_names().iter().map(|s| s.to_string()).collect();
        actual.sort();
        if actual != expected {
            return Err(Error::BandMismatch { expected, actual });
        }
    }

    let band_names: Vec<String> = match &params.bands {
        Some(bands) => bands.clone(),
        None => first
            .band_names()
            .into_iter()
            .filter(|b| Some(*b) != params.qa_band.as_deref())
            .map(str::to_string)
            .collect(),
    };

    let (rows, cols) = first.shape();
    let mut out = Raster::new(rows, cols).with_transform(*first.transform());
    out.set_crs(first.crs().cloned());

    for name in &band_names {
        let stack: Vec<(&Raster, &Array2<f64>)> = masked
            .iter()
            .map(|r| r.band(name).map(|b| (r, b)))
            .collect::<Result<_>>()?;

        let data = ctx.map_rows(rows, |row| {
            let mut values = Vec::with_capacity(stack.len());
            (0..cols)
                .map(|col| {
                    values.clear();
                    values.extend(stack.iter().filter_map(|(r, b)| r.sample(b, row, col)));
                    params.reducer.reduce(&mut values).unwrap_or(f64::NAN)
                })
                .collect()
        })?;

        let array = Array2::from_shape_vec((rows, cols), data).map_err(|e| Error::Other(e.to_string()))?;
        out.push_band(name.as_str(), array)?;
    }

    let mask = Array2::from_shape_fn((rows, cols), |(r, c)| {
        out.bands().any(|b| b.data()[(r, c)].is_finite())
    });
    let empty = mask.iter().filter(|&&v| !v).count();
    if empty > 0 {
        warn!(pixels = empty, "composite has pixels without any valid sample");
    }
    out.set_mask(Some(mask))?;

    Ok(out)
}

/// Composite of one season of one year
pub fn seasonal_composite(
    frames: &FrameSequence,
    year: i32,
    season: Season,
    params: &CompositeParams,
    ctx: &ExecutionContext,
) -> Result<Raster> {
    composite(frames, &season.window(year)?, params, ctx)
}

/// Dry- and wet-season composites of one year, as `(dry, wet)`
pub fn phenology_composites(
    frames: &FrameSequence,
    year: i32,
    params: &CompositeParams,
    ctx: &ExecutionContext,
) -> Result<(Raster, Raster)> {
    let dry = seasonal_composite(frames, year, Season::Dry, params, ctx)?;
    let wet = seasonal_composite(frames, year, Season::Wet, params, ctx)?;
    Ok((dry, wet))
}

/// Temporal mean, standard deviation, minimum and maximum of `bands`,
/// stacked as `<band>_mean`, `<band>_std`, `<band>_min`, `<band>_max`.
pub fn temporal_metrics(
    frames: &FrameSequence,
    window: &DateWindow,
    bands: &[&str],
    params: &CompositeParams,
    ctx: &ExecutionContext,
) -> Result<Raster> {
    let mut parts = Vec::with_capacity(4);
    for reducer in [Reducer::Mean, Reducer::StdDev, Reducer::Min, Reducer::Max] {
        let p = CompositeParams {
            reducer,
            bands: Some(bands.iter().map(|b| b.to_string()).collect()),
            ..params.clone()
        };
        let suffix = reducer.suffix();
        parts.push(composite(frames, window, &p, ctx)?.rename_bands(|b| format!("{}_{}", b, suffix))?);
    }

    let (head, tail) = parts.split_at(1);
    let rest: Vec<&Raster> = tail.iter().collect();
    head[0].concat(&rest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use surtland_core::GeoTransform;

    fn frame(date: (i32, u32, u32), b4: f64, cloud: f64) -> TemporalFrame {
        let raster = Raster::filled(3, 3, "B4", b4)
            .with_band("B8", Array2::from_elem((3, 3), b4 * 2.0))
            .unwrap()
            .with_transform(GeoTransform::new(0.0, 30.0, 10.0, -10.0));
        TemporalFrame::on_date(raster, ymd(date.0, date.1, date.2).unwrap(), cloud)
    }

    fn ctx() -> ExecutionContext {
        ExecutionContext::sequential()
    }

    #[test]
    fn test_reducers() {
        let vals = [4.0, 1.0, 3.0, 2.0];
        let run = |r: Reducer| r.reduce(&mut vals.clone()).unwrap();
        assert_relative_eq!(run(Reducer::Median), 2.5);
        assert_relative_eq!(run(Reducer::Mean), 2.5);
        assert_relative_eq!(run(Reducer::Min), 1.0);
        assert_relative_eq!(run(Reducer::Max), 4.0);
        assert_relative_eq!(run(Reducer::StdDev), 1.25_f64.sqrt());
        assert_relative_eq!(run(Reducer::Percentile(100.0)), 4.0);
        assert_relative_eq!(run(Reducer::Percentile(0.0)), 1.0);
        assert_eq!(Reducer::Mean.reduce(&mut []), None);
    }

    #[test]
    fn test_single_frame_median_is_identity() {
        let seq = FrameSequence::new(vec![frame((2024, 3, 1), 0.137, 0.0)]);
        let window = DateWindow::year(2024).unwrap();
        let out = composite(&seq, &window, &CompositeParams::premasked(Reducer::Median), &ctx()).unwrap();
        assert_eq!(out.band("B4").unwrap(), seq.frames()[0].raster().band("B4").unwrap());
        assert_eq!(out.band("B8").unwrap(), seq.frames()[0].raster().band("B8").unwrap());
    }

    #[test]
    fn test_filters_window_and_cloud_fraction() {
        let seq = FrameSequence::new(vec![
            frame((2024, 2, 1), 0.1, 0.05),
            frame((2024, 3, 1), 0.3, 0.05),
            frame((2024, 4, 1), 0.9, 0.80), // too cloudy
            frame((2024, 8, 1), 0.9, 0.00), // wet season
        ]);
        let mut params = CompositeParams::premasked(Reducer::Mean);
        params.max_cloud_fraction = 0.2;
        let out = seasonal_composite(&seq, 2024, Season::Dry, &params, &ctx()).unwrap();
        assert_relative_eq!(out.band("B4").unwrap()[(1, 1)], 0.2, epsilon = 1e-12);
    }

    #[test]
    fn test_empty_window_is_an_error() {
        let seq = FrameSequence::new(vec![frame((2023, 2, 1), 0.1, 0.0)]);
        let err = composite(
            &seq,
            &DateWindow::year(2024).unwrap(),
            &CompositeParams::premasked(Reducer::Median),
            &ctx(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::EmptyCollection { .. }));
    }

    #[test]
    fn test_region_outside_footprint_is_empty() {
        let seq = FrameSequence::new(vec![frame((2024, 2, 1), 0.1, 0.0)]);
        let mut params = CompositeParams::premasked(Reducer::Median);
        params.region = Some(Region::rectangle(1000.0, 1000.0, 2000.0, 2000.0));
        let err = composite(&seq, &DateWindow::year(2024).unwrap(), &params, &ctx()).unwrap_err();
        assert!(matches!(err, Error::EmptyCollection { .. }));
    }

    #[test]
    fn test_fully_masked_pixels_propagate_for_every_reducer() {
        let mut a = frame((2024, 2, 1), 0.1, 0.0);
        let mut b = frame((2024, 3, 1), 0.3, 0.0);
        let mut mask = Array2::from_elem((3, 3), true);
        mask[(0, 0)] = false;
        a = a.with_raster(a.raster().clone().with_mask(mask.clone()).unwrap());
        b = b.with_raster(b.raster().clone().with_mask(mask).unwrap());
        let seq = FrameSequence::new(vec![a, b]);

        for reducer in [
            Reducer::Median,
            Reducer::Mean,
            Reducer::Min,
            Reducer::Max,
            Reducer::StdDev,
            Reducer::Percentile(75.0),
        ] {
            let out = composite(&seq, &DateWindow::year(2024).unwrap(), &CompositeParams::premasked(reducer), &ctx())
                .unwrap();
            assert!(!out.is_pixel_valid(0, 0), "{:?}", reducer);
            assert!(out.band("B4").unwrap()[(0, 0)].is_nan());
            assert!(out.is_pixel_valid(1, 1));
        }
    }

    #[test]
    fn test_qa_masking_applied_per_frame() {
        let mk = |date, b4: f64, qa: f64| {
            let raster = Raster::filled(1, 1, "B4", b4)
                .with_band("QA60", Array2::from_elem((1, 1), qa))
                .unwrap();
            TemporalFrame::on_date(raster, ymd(2024, 1, date).unwrap(), 0.0)
        };
        let seq = FrameSequence::new(vec![
            mk(5, 1000.0, 0.0),
            mk(6, 9000.0, (1 << 10) as f64), // cloudy, must be ignored
            mk(7, 2000.0, 0.0),
        ]);
        let out = composite(
            &seq,
            &DateWindow::year(2024).unwrap(),
            &CompositeParams::default(),
            &ctx(),
        )
        .unwrap();
        assert_eq!(out.band_names(), vec!["B4"]);
        assert_relative_eq!(out.band("B4").unwrap()[(0, 0)], 0.15, epsilon = 1e-12);
    }

    #[test]
    fn test_band_mismatch() {
        let a = frame((2024, 2, 1), 0.1, 0.0);
        let b_raster = Raster::filled(3, 3, "B4", 0.1)
            .with_transform(GeoTransform::new(0.0, 30.0, 10.0, -10.0));
        let b = TemporalFrame::on_date(b_raster, ymd(2024, 2, 2).unwrap(), 0.0);
        let err = composite(
            &FrameSequence::new(vec![a, b]),
            &DateWindow::year(2024).unwrap(),
            &CompositeParams::premasked(Reducer::Median),
            &ctx(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::BandMismatch { .. }));
    }

    #[test]
    fn test_season_parsing() {
        assert_eq!("Dry".parse::<Season>().unwrap(), Season::Dry);
        assert_eq!(" wet ".parse::<Season>().unwrap(), Season::Wet);
        assert!(matches!("monsoon".parse::<Season>(), Err(Error::InvalidSeason(_))));
        let w = Season::Wet.window(2024).unwrap();
        assert_eq!(w.start, ymd(2024, 6, 1).unwrap());
        assert_eq!(w.end, ymd(2024, 11, 30).unwrap());
    }

    #[test]
    fn test_temporal_metrics_band_names() {
        let seq = FrameSequence::new(vec![frame((2024, 2, 1), 0.1, 0.0), frame((2024, 6, 1), 0.3, 0.0)]);
        let out = temporal_metrics(
            &seq,
            &DateWindow::year(2024).unwrap(),
            &["B4"],
            &CompositeParams::premasked(Reducer::Median),
            &ctx(),
        )
        .unwrap();
        assert_eq!(out.band_names(), vec!["B4_mean", "B4_std", "B4_min", "B4_max"]);
        assert_relative_eq!(out.band("B4_std").unwrap()[(0, 0)], 0.1, epsilon = 1e-12);
    }

    #[test]
    fn test_invalid_percentile() {
        let seq = FrameSequence::new(vec![frame((2024, 2, 1), 0.1, 0.0)]);
        let err = composite(
            &seq,
            &DateWindow::year(2024).unwrap(),
            &CompositeParams::premasked(Reducer::Percentile(120.0)),
            &ctx(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidParameter { .. }));
    }
}
