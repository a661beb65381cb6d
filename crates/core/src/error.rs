//! Error types for SurtLand

use thiserror::Error;

/// Main error type for SurtLand operations.
///
/// Structural problems with a call (missing bands, misaligned rasters, bad
/// class codes) surface here. Per-pixel numerical edge cases never do: they
/// resolve to masked pixels in the returned raster.
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("required band '{band}' is missing (available: {available:?})")]
    MissingBand { band: String, available: Vec<String> },

    #[error("no frames left after filtering: {reason}")]
    EmptyCollection { reason: String },

    #[error("geometry mismatch: {0}")]
    GeometryMismatch(String),

    #[error("band set mismatch: expected {expected:?}, got {actual:?}")]
    BandMismatch {
        expected: Vec<String>,
        actual: Vec<String>,
    },

    #[error("duplicate band name '{0}'")]
    DuplicateBand(String),

    #[error("class code {code} at ({row}, {col}) is outside the encodable range [0, 9]")]
    CodeRange { code: f64, row: usize, col: usize },

    #[error("unrecognized season '{0}' (expected 'dry' or 'wet')")]
    InvalidSeason(String),

    #[error("underdetermined regression: {observations} observations for {columns} design columns")]
    DegenerateFit { observations: usize, columns: usize },

    #[error("Invalid parameter: {name} = {value} ({reason})")]
    InvalidParameter {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("operation cancelled after {completed} of {total} tiles")]
    Cancelled { completed: usize, total: usize },

    #[error("TIFF error: {0}")]
    Tiff(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Shorthand for [`Error::InvalidParameter`].
    pub fn invalid_parameter(
        name: &'static str,
        value: impl ToString,
        reason: impl Into<String>,
    ) -> Self {
        Error::InvalidParameter {
            name,
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<tiff::TiffError> for Error {
    fn from(e: tiff::TiffError) -> Self {
        Error::Tiff(e.to_string())
    }
}

/// Result type alias for SurtLand operations
pub type Result<T> = std::result::Result<T, Error>;
