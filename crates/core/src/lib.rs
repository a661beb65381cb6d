//! # SurtLand Core
//!
//! Core types, errors and I/O for the SurtLand land-cover analytics engine.
//!
//! This crate provides:
//! - `Raster`: multi-band georeferenced grid with a pixel validity mask
//! - `TemporalFrame` / `FrameSequence`: time-stamped rasters
//! - `ClassificationRaster`: single-band categorical rasters
//! - `GeoTransform` and `CRS` georeferencing
//! - `Region`: polygonal study areas
//! - Multi-band GeoTIFF I/O

pub mod crs;
pub mod error;
pub mod io;
pub mod raster;
pub mod region;

pub use crs::CRS;
pub use error::{Error, Result};
pub use raster::{
    ymd, ClassificationRaster, DateWindow, FrameSequence, GeoTransform, Raster, TemporalFrame,
};
pub use region::Region;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::crs::CRS;
    pub use crate::error::{Error, Result};
    pub use crate::raster::{
        ClassificationRaster, DateWindow, FrameSequence, GeoTransform, Neighborhood, Raster,
        TemporalFrame,
    };
    pub use crate::region::Region;
}
