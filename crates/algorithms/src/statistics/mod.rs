//! Zonal and focal statistics over boolean rasters
//!
//! - **area**: ground-area aggregation in hectares, per-pixel area
//! - **focal**: hotspot intensity over a metric radius

pub mod area;
pub mod focal;

pub use area::{
    area_hectares, geographic_cell_dimensions, pixel_area, region_area_hectares, AreaResult,
};
pub use focal::{focal_intensity, metric_neighborhood, INTENSITY_BAND};
