//! Bitwise quality-band cloud masking
//!
//! A quality-assurance band encodes per-pixel flags as bits. A pixel stays
//! valid only when every listed bit is clear; reflectance bands are then
//! rescaled from digital counts to reflectance fractions.

use ndarray::Array2;
use surtland_core::raster::{Raster, TemporalFrame};
use surtland_core::{Error, Result};

/// Sentinel-2 L2A quality band
pub const S2_QA_BAND: &str = "QA60";
/// QA60 bit flagging opaque clouds
pub const S2_OPAQUE_CLOUD_BIT: u8 = 10;
/// QA60 bit flagging cirrus
pub const S2_CIRRUS_BIT: u8 = 11;

/// Parameters for cloud masking
#[derive(Debug, Clone)]
pub struct CloudMaskParams {
    /// Factor applied to every non-QA band (default: 1/10000, digital counts
    /// to reflectance)
    pub scale_factor: f64,
}

impl Default for CloudMaskParams {
    fn default() -> Self {
        Self {
            scale_factor: 1.0e-4,
        }
    }
}

/// Mask flagged pixels of a frame and rescale its reflectance bands.
///
/// A pixel is valid iff its QA value is a non-negative integer with all
/// `bit_flags` clear and it was valid before. The QA band itself is kept
/// unscaled. The input frame is not modified.
///
/// # Errors
/// `MissingBand` if `qa_band` is absent; `InvalidParameter` for bit
/// positions above 63.
pub fn mask_clouds(
    frame: &TemporalFrame,
    qa_band: &str,
    bit_flags: &[u8],
    params: &CloudMaskParams,
) -> Result<Raster> {
    let input = frame.raster();
    let qa = input.band(qa_band)?;

    let mut flags: u64 = 0;
    for &bit in bit_flags {
        if bit > 63 {
            return Err(Error::invalid_parameter("bit_flags", bit, "bit position must be <= 63"));
        }
        flags |= 1u64 << bit;
    }

    let mask = Array2::from_shape_fn(input.shape(), |(r, c)| {
        input.sample(qa, r, c).is_some_and(|v| qa_is_clear(v, flags))
    });

    let mut out = input.with_same_meta();
    for band in input.bands() {
        let data = if band.name() == qa_band {
            band.data().clone()
        } else {
            band.data().mapv(|v| v * params.scale_factor)
        };
        out.push_band(band.name(), data)?;
    }
    out.set_mask(Some(mask))?;
    Ok(out)
}

/// Sentinel-2 defaults: `QA60` with opaque-cloud and cirrus bits
pub fn mask_sentinel2_clouds(frame: &TemporalFrame, params: &CloudMaskParams) -> Result<Raster> {
    mask_clouds(frame, S2_QA_BAND, &[S2_OPAQUE_CLOUD_BIT, S2_CIRRUS_BIT], params)
}

fn qa_is_clear(value: f64, flags: u64) -> bool {
    if value < 0.0 || value.fract() != 0.0 || value > u64::MAX as f64 {
        return false;
    }
    (value as u64) & flags == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use surtland_core::raster::ymd;

    fn frame_with_qa(qa: Array2<f64>) -> TemporalFrame {
        let (rows, cols) = qa.dim();
        let raster = Raster::filled(rows, cols, "B4", 1200.0)
            .with_band("QA60", qa)
            .unwrap();
        TemporalFrame::on_date(raster, ymd(2024, 2, 10).unwrap(), 0.1)
    }

    #[test]
    fn test_any_flagged_bit_masks_pixel() {
        let mut qa = Array2::zeros((2, 2));
        qa[(0, 1)] = (1 << 10) as f64; // opaque cloud
        qa[(1, 0)] = (1 << 11) as f64; // cirrus
        qa[(1, 1)] = (1 << 3) as f64; // unrelated bit
        let out = mask_sentinel2_clouds(&frame_with_qa(qa), &CloudMaskParams::default()).unwrap();

        assert!(out.is_pixel_valid(0, 0));
        assert!(!out.is_pixel_valid(0, 1));
        assert!(!out.is_pixel_valid(1, 0));
        assert!(out.is_pixel_valid(1, 1));
    }

    #[test]
    fn test_rescales_all_but_qa() {
        let qa = Array2::from_elem((1, 1), 8.0);
        let out = mask_sentinel2_clouds(&frame_with_qa(qa), &CloudMaskParams::default()).unwrap();
        assert_relative_eq!(out.band("B4").unwrap()[(0, 0)], 0.12, epsilon = 1e-12);
        assert_relative_eq!(out.band("QA60").unwrap()[(0, 0)], 8.0);
    }

    #[test]
    fn test_missing_qa_band() {
        let raster = Raster::filled(1, 1, "B4", 1.0);
        let frame = TemporalFrame::on_date(raster, ymd(2024, 1, 1).unwrap(), 0.0);
        let err = mask_clouds(&frame, "QA60", &[10], &CloudMaskParams::default()).unwrap_err();
        assert!(matches!(err, Error::MissingBand { .. }));
    }

    #[test]
    fn test_input_frame_untouched() {
        let qa = Array2::from_elem((1, 1), (1 << 10) as f64);
        let frame = frame_with_qa(qa);
        let _ = mask_sentinel2_clouds(&frame, &CloudMaskParams::default()).unwrap();
        assert!(frame.raster().mask().is_none());
        assert_relative_eq!(frame.raster().band("B4").unwrap()[(0, 0)], 1200.0);
    }

    #[test]
    fn test_invalid_qa_values_are_masked() {
        let mut qa = Array2::zeros((1, 3));
        qa[(0, 0)] = f64::NAN;
        qa[(0, 1)] = -1.0;
        qa[(0, 2)] = 2.5;
        let out = mask_clouds(&frame_with_qa(qa), "QA60", &[10], &CloudMaskParams::default()).unwrap();
        assert_eq!(out.mask().unwrap().iter().filter(|&&v| v).count(), 0);
    }
}
