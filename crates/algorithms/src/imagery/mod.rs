//! Imagery algorithms
//!
//! - Cloud masking from bit-flag quality bands
//! - Temporal compositing: median, mean, min, max, stddev, percentile
//! - Normalized-difference indices: NDVI, NDWI, MNDWI, NBR
//! - Seasonal and multi-year feature stacking

mod cloud_mask;
mod composite;
mod indices;
mod stack;

pub use cloud_mask::{
    mask_clouds, mask_sentinel2_clouds, CloudMaskParams, S2_CIRRUS_BIT, S2_OPAQUE_CLOUD_BIT, S2_QA_BAND,
};
pub use composite::{
    composite, phenology_composites, seasonal_composite, temporal_metrics, CompositeParams, Reducer, Season,
};
pub use indices::{normalized_difference, spectral_index, SpectralIndex};
pub use stack::{stack_multi_year, stack_seasonal_features, SeasonalFeatureParams};
