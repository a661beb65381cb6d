//! Reading and writing multi-band rasters
//!
//! Rasters are stored as multi-page GeoTIFFs: one 32-bit float page per band,
//! the band name in `ImageDescription`, and the geotransform in the GeoTIFF
//! pixel-scale/tiepoint tags. Masked samples are written as NaN.

mod native;

pub use native::{
    read_geotiff, read_geotiff_from_buffer, write_geotiff, write_geotiff_to_buffer, GeoTiffOptions,
};
