//! Raster data structures and operations

mod classification;
mod frame;
mod geotransform;
mod grid;
mod neighborhood;

pub use classification::ClassificationRaster;
pub use frame::{ymd, DateWindow, FrameSequence, TemporalFrame};
pub use geotransform::GeoTransform;
pub use grid::{Band, Raster, RasterStatistics};
pub use neighborhood::Neighborhood;
