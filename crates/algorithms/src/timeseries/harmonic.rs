//! Harmonic trend regression
//!
//! Fits `y = b0 + b1 t + b2 cos(wt) + b3 sin(wt)` independently at every
//! pixel by ordinary least squares, with `t` in years since a reference
//! date and `w = 2π · cycles_per_year`.

use chrono::{NaiveDate, NaiveTime};
use ndarray::Array2;
use surtland_core::raster::{FrameSequence, Raster};
use surtland_core::{Error, Result};
use surtland_parallel::ExecutionContext;
use tracing::{debug, warn};

use crate::imagery::normalized_difference;

const N_COEF: usize = 4;
const DAYS_PER_YEAR: f64 = 365.25;

/// Output band names, in order
pub const HARMONIC_BANDS: [&str; 6] = ["constant", "t", "cos", "sin", "rmse", "n_obs"];

/// Scalar series fitted at each pixel
#[derive(Debug, Clone, PartialEq)]
pub enum HarmonicTarget {
    /// A band of each frame
    Band(String),
    /// `(a - b) / (a + b)` of each frame, e.g. NDVI from `B8`/`B4`
    NormalizedDifference { a: String, b: String },
}

impl HarmonicTarget {
    pub fn ndvi() -> Self {
        HarmonicTarget::NormalizedDifference {
            a: "B8".into(),
            b: "B4".into(),
        }
    }

    /// Target samples of one frame, NaN where invalid
    fn evaluate(&self, raster: &Raster) -> Result<Array2<f64>> {
        match self {
            HarmonicTarget::Band(name) => {
                let band = raster.band(name)?;
                Ok(Array2::from_shape_fn(raster.shape(), |(r, c)| {
                    raster.sample(band, r, c).unwrap_or(f64::NAN)
                }))
            }
            HarmonicTarget::NormalizedDifference { a, b } => {
                let nd = normalized_difference(raster, a, b, "target")?;
                let band = nd.band("target")?;
                Ok(Array2::from_shape_fn(raster.shape(), |(r, c)| {
                    nd.sample(band, r, c).unwrap_or(f64::NAN)
                }))
            }
        }
    }
}

/// Parameters for harmonic fitting
#[derive(Debug, Clone)]
pub struct HarmonicParams {
    /// Harmonic frequency in cycles per year (default: 1.0)
    pub cycles_per_year: f64,
    /// Minimum valid observations per pixel (default and minimum: 4)
    pub min_observations: usize,
}

impl Default for HarmonicParams {
    fn default() -> Self {
        Self {
            cycles_per_year: 1.0,
            min_observations: N_COEF,
        }
    }
}

/// Fit the harmonic model at every pixel of an aligned frame sequence.
///
/// Output bands are [`HARMONIC_BANDS`]: the four coefficients, the RMSE of
/// the fit and the number of valid observations. Pixels with fewer than
/// `min_observations` valid observations, or whose design matrix is
/// singular, are NaN in the coefficient and `rmse` bands; `n_obs` always
/// holds the count.
///
/// # Errors
/// - `EmptyCollection` for an empty sequence
/// - `GeometryMismatch` if frames are not aligned
/// - `MissingBand` if a target band is absent
/// - `InvalidParameter` for a non-finite frequency or `min_observations < 4`
pub fn fit_harmonic(
    frames: &FrameSequence,
    reference_date: NaiveDate,
    target: &HarmonicTarget,
    params: &HarmonicParams,
    ctx: &ExecutionContext,
) -> Result<Raster> {
    if !params.cycles_per_year.is_finite() || params.cycles_per_year <= 0.0 {
        return Err(Error::invalid_parameter(
            "cycles_per_year",
            params.cycles_per_year,
            "must be finite and > 0",
        ));
    }
    if params.min_observations < N_COEF {
        return Err(Error::invalid_parameter(
            "min_observations",
            params.min_observations,
            format!("must be >= {}", N_COEF),
        ));
    }
    let Some(first) = frames.frames().first() else {
        return Err(Error::EmptyCollection {
            reason: "harmonic fit needs at least one frame".into(),
        });
    };

    let reference = reference_date.and_time(NaiveTime::MIN);
    let omega = 2.0 * std::f64::consts::PI * params.cycles_per_year;

    let mut series: Vec<([f64; N_COEF], Array2<f64>)> = Vec::with_capacity(frames.len());
    for frame in frames.iter() {
        first.raster().check_aligned(frame.raster())?;
        let t = (frame.acquired() - reference).num_seconds() as f64 / 86_400.0 / DAYS_PER_YEAR;
        let x = [1.0, t, (omega * t).cos(), (omega * t).sin()];
        series.push((x, target.evaluate(frame.raster())?));
    }

    let (rows, cols) = first.raster().shape();
    debug!(frames = series.len(), rows, cols, "fitting harmonic model");

    let fits = ctx.map_rows(rows, |row| {
        (0..cols)
            .map(|col| fit_pixel(&series, row, col, params.min_observations))
            .collect()
    })?;

    let degenerate = fits.iter().filter(|f| f.coef.is_none()).count();
    if degenerate > 0 {
        warn!(pixels = degenerate, "harmonic fit underdetermined or singular");
    }

    let mut out = first.raster().with_same_meta();
    out.set_mask(None)?;
    for (k, name) in HARMONIC_BANDS.iter().enumerate() {
        let band = Array2::from_shape_fn((rows, cols), |(r, c)| {
            let fit = &fits[r * cols + c];
            match k {
                0..N_COEF => fit.coef.map_or(f64::NAN, |b| b[k]),
                4 => fit.rmse,
                _ => fit.n_obs as f64,
            }
        });
        out.push_band(*name, band)?;
    }
    Ok(out)
}

struct PixelFit {
    coef: Option<[f64; N_COEF]>,
    rmse: f64,
    n_obs: usize,
}

fn fit_pixel(series: &[([f64; N_COEF], Array2<f64>)], row: usize, col: usize, min_obs: usize) -> PixelFit {
    let mut xtx = [0.0; N_COEF * N_COEF];
    let mut xty = [0.0; N_COEF];
    let mut n_obs = 0;

    for (x, y) in series {
        let y = y[(row, col)];
        if !y.is_finite() {
            continue;
        }
        n_obs += 1;
        for i in 0..N_COEF {
            xty[i] += x[i] * y;
            for j in 0..N_COEF {
                xtx[i * N_COEF + j] += x[i] * x[j];
            }
        }
    }

    let failed = PixelFit {
        coef: None,
        rmse: f64::NAN,
        n_obs,
    };
    if n_obs < min_obs {
        return failed;
    }
    let Ok(beta) = solve_normal_equations(&mut xtx, &mut xty, n_obs) else {
        return failed;
    };

    let sse: f64 = series
        .iter()
        .filter(|(_, y)| y[(row, col)].is_finite())
        .map(|(x, y)| {
            let fitted: f64 = x.iter().zip(&beta).map(|(a, b)| a * b).sum();
            (y[(row, col)] - fitted).powi(2)
        })
        .sum();

    PixelFit {
        coef: Some(beta),
        rmse: (sse / n_obs as f64).sqrt(),
        n_obs,
    }
}

/// Gaussian elimination with partial pivoting on the 4x4 normal matrix.
fn solve_normal_equations(mat: &mut [f64; N_COEF * N_COEF], rhs: &mut [f64; N_COEF], n_obs: usize) -> Result<[f64; N_COEF]> {
    let n = N_COEF;
    let scale = (0..n).map(|i| mat[i * n + i].abs()).fold(0.0, f64::max).max(1.0);

    for col in 0..n {
        let mut max_val = mat[col * n + col].abs();
        let mut max_row = col;
        for row in (col + 1)..n {
            let val = mat[row * n + col].abs();
            if val > max_val {
                max_val = val;
                max_row = row;
            }
        }

        if max_val < 1e-10 * scale {
            return Err(Error::DegenerateFit {
                observations: n_obs,
                columns: n,
            });
        }

        if max_row != col {
            for j in 0..n {
                mat.swap(col * n + j, max_row * n + j);
            }
            rhs.swap(col, max_row);
        }

        let pivot = mat[col * n + col];
        for row in (col + 1)..n {
            let factor = mat[row * n + col] / pivot;
            mat[row * n + col] = 0.0;
            for j in (col + 1)..n {
                mat[row * n + j] -= factor * mat[col * n + j];
            }
            rhs[row] -= factor * rhs[col];
        }
    }

    let mut x = [0.0; N_COEF];
    for i in (0..n).rev() {
        let mut sum = rhs[i];
        for j in (i + 1)..n {
            sum -= mat[i * n + j] * x[j];
        }
        x[i] = sum / mat[i * n + i];
    }
    Ok(x)
}
