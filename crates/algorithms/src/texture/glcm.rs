//! Gray-Level Co-occurrence Matrix (GLCM) texture features
//!
//! Computes Haralick texture measures from a GLCM built over each pixel's
//! square window. Samples are quantized to `n_levels` gray levels using the
//! band's valid range over the whole raster.
//!
//! Edge policy is shrink-window: near the border the window is clipped to
//! the raster. Both cells of a pair must lie inside the (clipped) window,
//! and pairs touching an invalid sample are skipped. A pixel whose own sample is invalid, or whose
//! window yields no pair, is NaN in every output band.

use ndarray::Array2;
use surtland_core::raster::{Neighborhood, Raster};
use surtland_core::{Error, Result};
use surtland_parallel::ExecutionContext;
use tracing::debug;

/// Available GLCM texture measures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GlcmFeature {
    /// Angular Second Moment (energy), uniformity
    Asm,
    /// Contrast, local intensity variation
    Contrast,
    /// Correlation, linear dependency of gray levels
    Correlation,
    /// Sum of squares variance
    Variance,
    /// Inverse Difference Moment (homogeneity)
    Idm,
    /// Sum average
    SumAverage,
    /// Sum variance
    SumVariance,
    /// Sum entropy
    SumEntropy,
    /// Entropy, randomness/disorder
    Entropy,
    /// Difference variance
    DifferenceVariance,
    /// Difference entropy
    DifferenceEntropy,
    /// Dissimilarity, weighted absolute difference
    Dissimilarity,
    /// Information measure of correlation 1
    InfoCorrelation1,
    /// Information measure of correlation 2
    InfoCorrelation2,
}

impl GlcmFeature {
    pub const ALL: [GlcmFeature; 14] = [
        GlcmFeature::Asm,
        GlcmFeature::Contrast,
        GlcmFeature::Correlation,
        GlcmFeature::Variance,
        GlcmFeature::Idm,
        GlcmFeature::SumAverage,
        GlcmFeature::SumVariance,
        GlcmFeature::SumEntropy,
        GlcmFeature::Entropy,
        GlcmFeature::DifferenceVariance,
        GlcmFeature::DifferenceEntropy,
        GlcmFeature::Dissimilarity,
        GlcmFeature::InfoCorrelation1,
        GlcmFeature::InfoCorrelation2,
    ];

    /// Band-name suffix (`B8_contrast`, `B8_ent`, ...)
    pub fn suffix(&self) -> &'static str {
        match self {
            GlcmFeature::Asm => "asm",
            GlcmFeature::Contrast => "contrast",
            GlcmFeature::Correlation => "corr",
            GlcmFeature::Variance => "var",
            GlcmFeature::Idm => "idm",
            GlcmFeature::SumAverage => "savg",
            GlcmFeature::SumVariance => "svar",
            GlcmFeature::SumEntropy => "sent",
            GlcmFeature::Entropy => "ent",
            GlcmFeature::DifferenceVariance => "dvar",
            GlcmFeature::DifferenceEntropy => "dent",
            GlcmFeature::Dissimilarity => "diss",
            GlcmFeature::InfoCorrelation1 => "imcorr1",
            GlcmFeature::InfoCorrelation2 => "imcorr2",
        }
    }

    /// Parse a suffix; `entropy`, `correlation` and `homogeneity` are accepted too
    pub fn from_suffix(s: &str) -> Result<Self> {
        let s = s.trim().to_ascii_lowercase();
        let alias = match s.as_str() {
            "entropy" => "ent",
            "correlation" => "corr",
            "homogeneity" => "idm",
            "energy" => "asm",
            other => other,
        };
        Self::ALL
            .iter()
            .copied()
            .find(|f| f.suffix() == alias)
            .ok_or_else(|| Error::invalid_parameter("feature", s, "unknown GLCM feature"))
    }
}

/// Neighbor offsets used to build the co-occurrence matrix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GlcmDirections {
    /// 0°, 45°, 90°, 135°
    #[default]
    Four,
    /// Four plus their opposites, which makes the matrix symmetric
    Eight,
}

impl GlcmDirections {
    fn offsets(&self, d: isize) -> Vec<(isize, isize)> {
        let four = [(0, d), (-d, d), (-d, 0), (-d, -d)];
        match self {
            GlcmDirections::Four => four.to_vec(),
            GlcmDirections::Eight => four.iter().flat_map(|&(r, c)| [(r, c), (-r, -c)]).collect(),
        }
    }
}

/// Parameters for GLCM computation
#[derive(Debug, Clone)]
pub struct GlcmParams {
    /// Window radius; the window side is `2 * radius + 1`
    pub radius: usize,
    /// Number of quantization levels (default: 32)
    pub n_levels: usize,
    /// Distance for co-occurrence (default: 1)
    pub distance: usize,
    pub directions: GlcmDirections,
    /// Measures to compute (default: all)
    pub features: Vec<GlcmFeature>,
}

impl Default for GlcmParams {
    fn default() -> Self {
        Self {
            radius: 1,
            n_levels: 32,
            distance: 1,
            directions: GlcmDirections::Four,
            features: GlcmFeature::ALL.to_vec(),
        }
    }
}

/// Compute GLCM texture features for each requested band.
///
/// Output bands are named `<band>_<suffix>`, bands in input order and
/// features in `params.features` order. Cost is
/// O(pixels x window area x gray levels²), so request only the features
/// you need on large rasters.
///
/// # Errors
/// - `InvalidParameter` for radius 0, fewer than 2 levels, distance 0 or an
///   empty feature list
/// - `MissingBand` for an absent band
/// - `Cancelled` if the context is cancelled between tile batches
pub fn texture(raster: &Raster, bands: &[&str], params: &GlcmParams, ctx: &ExecutionContext) -> Result<Raster> {
    validate(params)?;

    let (rows, cols) = raster.shape();
    let n = params.n_levels;
    let (wr_half, wc_half) = Neighborhood::Square(params.radius).extent();
    let (wr_half, wc_half) = (wr_half as isize, wc_half as isize);
    let offsets = params.directions.offsets(params.distance as isize);
    let nf = params.features.len();

    let mut out = raster.with_same_meta();

    for &name in bands {
        let levels = quantize_band(raster, name, n)?;
        debug!(band = name, radius = params.radius, features = nf, "computing GLCM texture");

        let data = ctx.map_rows(rows, |row| {
            let mut glcm = vec![0.0; n * n];
            let mut row_data = vec![f64::NAN; cols * nf];

            for col in 0..cols {
                if levels[(row, col)].is_none() {
                    continue;
                }
                glcm.iter_mut().for_each(|v| *v = 0.0);
                let mut total = 0.0;

                let r0 = (row as isize - wr_half).max(0);
                let r1 = (row as isize + wr_half).min(rows as isize - 1);
                let c0 = (col as isize - wc_half).max(0);
                let c1 = (col as isize + wc_half).min(cols as isize - 1);

                for &(dr, dc) in &offsets {
                    for wr in r0..=r1 {
                        for wc in c0..=c1 {
                            let nr = wr + dr;
                            let nc = wc + dc;
                            if nr < r0 || nr > r1 || nc < c0 || nc > c1 {
                                continue;
                            }
                            let (wr, wc) = (wr as usize, wc as usize);
                            let (Some(i), Some(j)) = (levels[(wr, wc)], levels[(nr as usize, nc as usize)])
                            else {
                                continue;
                            };
                            glcm[i * n + j] += 1.0;
                            total += 1.0;
                        }
                    }
                }

                if total == 0.0 {
                    continue;
                }
                glcm.iter_mut().for_each(|v| *v /= total);

                let stats = GlcmStats::new(&glcm, n);
                for (k, feature) in params.features.iter().enumerate() {
                    row_data[col * nf + k] = stats.feature(*feature);
                }
            }
            row_data
        })?;

        for (k, feature) in params.features.iter().enumerate() {
            let band = Array2::from_shape_fn((rows, cols), |(r, c)| data[(r * cols + c) * nf + k]);
            out.push_band(format!("{}_{}", name, feature.suffix()), band)?;
        }
    }

    Ok(out)
}

/// Texture bands used by the land-cover classifier: NIR contrast, entropy
/// and correlation plus red contrast, named `nir_texture_contrast`,
/// `nir_texture_entropy`, `nir_texture_corr` and `red_texture_contrast`.
pub fn classification_texture(
    raster: &Raster,
    nir: &str,
    red: &str,
    radius: usize,
    ctx: &ExecutionContext,
) -> Result<Raster> {
    let nir_tex = texture(
        raster,
        &[nir],
        &GlcmParams {
            radius,
            features: vec![GlcmFeature::Contrast, GlcmFeature::Entropy, GlcmFeature::Correlation],
            ..Default::default()
        },
        ctx,
    )?
    .rename_bands(|b| {
        let suffix = b.rsplit('_').next().unwrap_or(b);
        match suffix {
            "ent" => "nir_texture_entropy".to_string(),
            other => format!("nir_texture_{}", other),
        }
    })?;

    let red_tex = texture(
        raster,
        &[red],
        &GlcmParams {
            radius,
            features: vec![GlcmFeature::Contrast],
            ..Default::default()
        },
        ctx,
    )?
    .rename_bands(|_| "red_texture_contrast".to_string())?;

    nir_tex.concat(&[&red_tex])
}

/// Contrast and entropy of one band at several radii, named
/// `texture_contrast_r<radius>` and `texture_entropy_r<radius>`.
///
/// Meant for exploring scale; cost grows roughly linearly with
/// `radii.len()` (and quadratically with each radius).
pub fn multiscale_texture(
    raster: &Raster,
    band: &str,
    radii: &[usize],
    params: &GlcmParams,
    ctx: &ExecutionContext,
) -> Result<Raster> {
    if radii.is_empty() {
        return Err(Error::invalid_parameter("radii", "[]", "at least one radius is required"));
    }

    let mut out = raster.with_same_meta();
    for &radius in radii {
        let p = GlcmParams {
            radius,
            features: vec![GlcmFeature::Contrast, GlcmFeature::Entropy],
            ..params.clone()
        };
        let tex = texture(raster, &[band], &p, ctx)?;
        out.push_band(
            format!("texture_contrast_r{}", radius),
            tex.band(&format!("{}_contrast", band))?.clone(),
        )?;
        out.push_band(
            format!("texture_entropy_r{}", radius),
            tex.band(&format!("{}_ent", band))?.clone(),
        )?;
    }
    Ok(out)
}

fn validate(params: &GlcmParams) -> Result<()> {
    if params.radius == 0 {
        return Err(Error::invalid_parameter("radius", params.radius, "must be > 0"));
    }
    if params.n_levels < 2 {
        return Err(Error::invalid_parameter("n_levels", params.n_levels, "must be >= 2"));
    }
    if params.distance == 0 {
        return Err(Error::invalid_parameter("distance", params.distance, "must be > 0"));
    }
    if params.features.is_empty() {
        return Err(Error::invalid_parameter("features", "[]", "at least one feature is required"));
    }
    Ok(())
}

/// Quantize valid samples of a band; `None` marks invalid samples.
/// A band without value range maps every valid sample to level 0.
fn quantize_band(raster: &Raster, name: &str, n_levels: usize) -> Result<Array2<Option<usize>>> {
    let band = raster.band(name)?;

    let mut vmin = f64::INFINITY;
    let mut vmax = f64::NEG_INFINITY;
    for ((r, c), _) in band.indexed_iter() {
        if let Some(v) = raster.sample(band, r, c) {
            vmin = vmin.min(v);
            vmax = vmax.max(v);
        }
    }
    let range = vmax - vmin;

    Ok(Array2::from_shape_fn(band.dim(), |(r, c)| {
        raster.sample(band, r, c).map(|v| quantize(v, vmin, range, n_levels))
    }))
}

fn quantize(value: f64, vmin: f64, range: f64, n_levels: usize) -> usize {
    if range <= 0.0 {
        return 0;
    }
    let normalized = (value - vmin) / range;
    let level = (normalized * (n_levels - 1) as f64).round() as usize;
    level.min(n_levels - 1)
}

/// Marginal and sum/difference distributions of a normalized GLCM
struct GlcmStats<'a> {
    p: &'a [f64],
    n: usize,
    mu_i: f64,
    mu_j: f64,
    var_i: f64,
    var_j: f64,
    /// Row and column marginals p_x(i), p_y(j)
    p_x: Vec<f64>,
    p_y: Vec<f64>,
    /// p_{x+y}(k), k in 0..2n-1
    p_sum: Vec<f64>,
    /// p_{x-y}(k), k in 0..n
    p_diff: Vec<f64>,
}

impl<'a> GlcmStats<'a> {
    fn new(p: &'a [f64], n: usize) -> Self {
        let mut mu_i = 0.0;
        let mut mu_j = 0.0;
        let mut p_sum = vec![0.0; 2 * n - 1];
        let mut p_diff = vec![0.0; n];
        let mut p_x = vec![0.0; n];
        let mut p_y = vec![0.0; n];
        for i in 0..n {
            for j in 0..n {
                let v = p[i * n + j];
                p_x[i] += v;
                p_y[j] += v;
                mu_i += i as f64 * v;
                mu_j += j as f64 * v;
                p_sum[i + j] += v;
                p_diff[i.abs_diff(j)] += v;
            }
        }

        let mut var_i = 0.0;
        let mut var_j = 0.0;
        for i in 0..n {
            for j in 0..n {
                let v = p[i * n + j];
                var_i += (i as f64 - mu_i).powi(2) * v;
                var_j += (j as f64 - mu_j).powi(2) * v;
            }
        }

        Self {
            p,
            n,
            mu_i,
            mu_j,
            var_i,
            var_j,
            p_x,
            p_y,
            p_sum,
            p_diff,
        }
    }

    /// (HXY1, HXY2) of the information measures of correlation
    fn marginal_entropies(&self) -> (f64, f64) {
        let n = self.n;
        let mut hxy1 = 0.0;
        let mut hxy2 = 0.0;
        for i in 0..n {
            for j in 0..n {
                let q = self.p_x[i] * self.p_y[j];
                if q <= 0.0 {
                    continue;
                }
                hxy1 -= self.p[i * n + j] * q.ln();
                hxy2 -= q * q.ln();
            }
        }
        (hxy1, hxy2)
    }

    fn weighted(&self, w: impl Fn(f64, f64) -> f64) -> f64 {
        let n = self.n;
        let mut val = 0.0;
        for i in 0..n {
            for j in 0..n {
                let v = self.p[i * n + j];
                if v > 0.0 {
                    val += v * w(i as f64, j as f64);
                }
            }
        }
        val
    }

    fn feature(&self, feature: GlcmFeature) -> f64 {
        match feature {
            GlcmFeature::Asm => self.p.iter().map(|v| v * v).sum(),
            GlcmFeature::Contrast => self.weighted(|i, j| (i - j).powi(2)),
            GlcmFeature::Dissimilarity => self.weighted(|i, j| (i - j).abs()),
            GlcmFeature::Idm => self.weighted(|i, j| 1.0 / (1.0 + (i - j).powi(2))),
            GlcmFeature::Variance => self.var_i,
            GlcmFeature::Correlation => {
                if self.var_i <= 1e-15 || self.var_j <= 1e-15 {
                    return f64::NAN;
                }
                let cov = self.weighted(|i, j| (i - self.mu_i) * (j - self.mu_j));
                cov / (self.var_i.sqrt() * self.var_j.sqrt())
            }
            GlcmFeature::Entropy => entropy(self.p),
            GlcmFeature::SumAverage => sum_average(&self.p_sum),
            GlcmFeature::SumVariance => {
                let avg = sum_average(&self.p_sum);
                self.p_sum
                    .iter()
                    .enumerate()
                    .map(|(k, v)| (k as f64 - avg).powi(2) * v)
                    .sum()
            }
            GlcmFeature::SumEntropy => entropy(&self.p_sum),
            GlcmFeature::DifferenceVariance => {
                let mean: f64 = self.p_diff.iter().enumerate().map(|(k, v)| k as f64 * v).sum();
                self.p_diff
                    .iter()
                    .enumerate()
                    .map(|(k, v)| (k as f64 - mean).powi(2) * v)
                    .sum()
            }
            GlcmFeature::DifferenceEntropy => entropy(&self.p_diff),
            GlcmFeature::InfoCorrelation1 => {
                let hx = entropy(&self.p_x).max(entropy(&self.p_y));
                if hx <= 1e-15 {
                    return f64::NAN;
                }
                let (hxy1, _) = self.marginal_entropies();
                (entropy(self.p) - hxy1) / hx
            }
            GlcmFeature::InfoCorrelation2 => {
                let (_, hxy2) = self.marginal_entropies();
                let gap = (hxy2 - entropy(self.p)).max(0.0);
                (1.0 - (-2.0 * gap).exp()).max(0.0).sqrt()
            }
        }
    }
}

fn sum_average(p_sum: &[f64]) -> f64 {
    p_sum.iter().enumerate().map(|(k, v)| k as f64 * v).sum()
}

fn entropy(p: &[f64]) -> f64 {
    p.iter().filter(|&&v| v > 0.0).map(|v| -v * v.ln()).sum::<f64>().max(0.0)
}
