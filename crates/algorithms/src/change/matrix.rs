//! From/to transition encoding between two classifications
//!
//! A transition code is `from * 10 + to`, which is unique only while both
//! codes are single decimal digits. Codes outside `[0, 9]` are rejected
//! with `CodeRange` instead of being truncated.

use std::collections::{BTreeMap, BTreeSet};

use ndarray::Array2;
use serde::Serialize;
use serde_json::{json, Map, Value};
use surtland_core::raster::{ClassificationRaster, Raster};
use surtland_core::{Error, Region, Result};
use surtland_parallel::ExecutionContext;
use tracing::debug;

use crate::statistics::area::{pixel_area_at, single_band};
use crate::statistics::area_hectares;

/// Band name of the transition-code raster
pub const TRANSITION_BAND: &str = "transition";
/// Largest class code the encoding supports
pub const MAX_CLASS_CODE: u8 = 9;

const N_CODES: usize = MAX_CLASS_CODE as usize + 1;

/// Encode a (from, to) pair.
///
/// # Errors
/// `InvalidParameter` if either class is above [`MAX_CLASS_CODE`].
pub fn transition_code(from: u8, to: u8) -> Result<u8> {
    check_class_arg("from", from)?;
    check_class_arg("to", to)?;
    Ok(from * 10 + to)
}

/// Encode two aligned classifications into one transition-code raster.
///
/// Pixels invalid in either input are masked in the output.
///
/// # Errors
/// - `GeometryMismatch` unless shape, CRS and geotransform match
/// - `CodeRange` for a valid code that is not an integer in `[0, 9]`
pub fn build_matrix(t1: &ClassificationRaster, t2: &ClassificationRaster) -> Result<Raster> {
    t1.raster().check_aligned(t2.raster())?;
    check_codes(t1)?;
    check_codes(t2)?;

    let out = boolean_like(t1.raster(), TRANSITION_BAND, |r, c| {
        let (a, b) = (t1.code_at(r, c)?, t2.code_at(r, c)?);
        Some(a * 10.0 + b)
    })?;
    debug!(shape = ?t1.shape(), "built transition matrix");
    Ok(out)
}

/// Boolean raster (1/0) of pixels whose transition is `from -> to`
pub fn transition_mask(matrix: &Raster, from: u8, to: u8) -> Result<Raster> {
    let code = transition_code(from, to)? as f64;
    let band = matrix.band(TRANSITION_BAND)?;

    boolean_like(matrix, &format!("transition_{}_{}", from, to), |r, c| {
        matrix.sample(band, r, c).map(|v| bool_value(v == code))
    })
}

/// Boolean raster of pixels that leave the forest class set: class in
/// `forest_classes` at t1 and not in it at t2. Works for a set of any size.
pub fn forest_loss(
    t1: &ClassificationRaster,
    t2: &ClassificationRaster,
    forest_classes: &BTreeSet<u8>,
) -> Result<Raster> {
    t1.raster().check_aligned(t2.raster())?;
    let is_forest = |code: f64| {
        code >= 0.0 && code.fract() == 0.0 && code <= u8::MAX as f64 && forest_classes.contains(&(code as u8))
    };

    boolean_like(t1.raster(), "forest_loss", |r, c| {
        let (a, b) = (t1.code_at(r, c)?, t2.code_at(r, c)?);
        Some(bool_value(is_forest(a) && !is_forest(b)))
    })
}

/// Boolean raster of pixels holding class `code`
pub fn class_mask(class: &ClassificationRaster, code: u8) -> Result<Raster> {
    let target = code as f64;
    boolean_like(class.raster(), &format!("class_{}", code), |r, c| {
        class.code_at(r, c).map(|v| bool_value(v == target))
    })
}

/// Hectares of `from -> to` inside `region` for each target class, keyed
/// `"<from>_to_<to>"`
pub fn transition_areas(
    matrix: &Raster,
    from: u8,
    to_classes: &[u8],
    region: &Region,
    ctx: &ExecutionContext,
) -> Result<BTreeMap<String, f64>> {
    let mut out = BTreeMap::new();
    for &to in to_classes {
        let mask = transition_mask(matrix, from, to)?;
        let area = area_hectares(&mask, region, ctx)?;
        out.insert(format!("{}_to_{}", from, to), area.hectares);
    }
    Ok(out)
}

/// Square transition-area table keyed by class name.
///
/// Rows are the "from" class, columns the "to" class; the diagonal holds
/// the unchanged area. Values are hectares at full precision.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransitionTable {
    pub classes: Vec<String>,
    pub hectares: Vec<Vec<f64>>,
}

impl TransitionTable {
    /// Area of `from -> to`, by class name
    pub fn get(&self, from: &str, to: &str) -> Option<f64> {
        let i = self.classes.iter().position(|c| c == from)?;
        let j = self.classes.iter().position(|c| c == to)?;
        Some(self.hectares[i][j])
    }

    /// Total area of every transition in the table
    pub fn total(&self) -> f64 {
        self.hectares.iter().flatten().sum()
    }

    /// Nested `{from: {to: hectares}}` map with values rounded to 2 decimals
    pub fn to_presentation(&self) -> Value {
        let mut rows = Map::new();
        for (i, from) in self.classes.iter().enumerate() {
            let mut cols = Map::new();
            for (j, to) in self.classes.iter().enumerate() {
                cols.insert(to.clone(), json!(round2(self.hectares[i][j])));
            }
            rows.insert(from.clone(), Value::Object(cols));
        }
        Value::Object(rows)
    }
}

/// Build a [`TransitionTable`] for the named classes in one pass over the
/// matrix. Codes without a name are left out.
///
/// # Errors
/// `CodeRange` if a valid sample of the matrix is not an integer in `[0, 99]`.
pub fn transition_table(
    matrix: &Raster,
    class_names: &BTreeMap<u8, String>,
    region: &Region,
    ctx: &ExecutionContext,
) -> Result<TransitionTable> {
    let band = matrix.band(TRANSITION_BAND)?;
    for &code in class_names.keys() {
        check_class_arg("class_names", code)?;
    }
    check_transition_codes(matrix, band)?;
    let geographic = matrix.is_geographic();
    let cols = matrix.cols();

    let cells = ctx.reduce_rows(
        matrix.rows(),
        || vec![0.0; N_CODES * N_CODES],
        |row| {
            let mut acc = vec![0.0; N_CODES * N_CODES];
            for col in 0..cols {
                let Some(code) = matrix.sample(band, row, col) else {
                    continue;
                };
                let (x, y) = matrix.pixel_to_geo(col, row);
                if !region.contains_point(x, y) {
                    continue;
                }
                acc[code as usize] += pixel_area_at(matrix, geographic, row, col);
            }
            acc
        },
        |mut a, b| {
            a.iter_mut().zip(b).for_each(|(x, y)| *x += y);
            a
        },
    )?;

    let codes: Vec<usize> = class_names.keys().map(|&c| c as usize).collect();
    Ok(TransitionTable {
        classes: class_names.values().cloned().collect(),
        hectares: codes
            .iter()
            .map(|&from| codes.iter().map(|&to| cells[from * 10 + to] / 10_000.0).collect())
            .collect(),
    })
}

pub(crate) fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

fn bool_value(b: bool) -> f64 {
    if b { 1.0 } else { 0.0 }
}

/// Single-band raster on the grid of `template`; `None` samples are NaN and
/// masked.
fn boolean_like<F>(template: &Raster, name: &str, f: F) -> Result<Raster>
where
    F: Fn(usize, usize) -> Option<f64>,
{
    let data = Array2::from_shape_fn(template.shape(), |(r, c)| f(r, c).unwrap_or(f64::NAN));
    let mask = data.mapv(f64::is_finite);
    let mut out = template.with_same_meta();
    out.push_band(name, data)?;
    out.set_mask(Some(mask))?;
    Ok(out)
}

fn check_codes(class: &ClassificationRaster) -> Result<()> {
    let (rows, cols) = class.shape();
    for row in 0..rows {
        for col in 0..cols {
            let Some(code) = class.code_at(row, col) else {
                continue;
            };
            if code < 0.0 || code > MAX_CLASS_CODE as f64 || code.fract() != 0.0 {
                return Err(Error::CodeRange { code, row, col });
            }
        }
    }
    Ok(())
}

fn check_transition_codes(matrix: &Raster, band: &Array2<f64>) -> Result<()> {
    let max = (N_CODES * N_CODES - 1) as f64;
    for ((row, col), _) in band.indexed_iter() {
        let Some(code) = matrix.sample(band, row, col) else {
            continue;
        };
        if code < 0.0 || code > max || code.fract() != 0.0 {
            return Err(Error::CodeRange { code, row, col });
        }
    }
    Ok(())
}

fn check_class_arg(name: &'static str, code: u8) -> Result<()> {
    if code > MAX_CLASS_CODE {
        return Err(Error::invalid_parameter(name, code, "class codes must be in [0, 9]"));
    }
    Ok(())
}

/// Whether a boolean raster is set at (row, col)
pub fn is_set(mask: &Raster, row: usize, col: usize) -> Result<bool> {
    let band = single_band(mask)?;
    Ok(mask.sample(band, row, col).is_some_and(|v| v != 0.0))
}
