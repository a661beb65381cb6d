//! Texture feature extraction
//!
//! - **GLCM**: Gray-Level Co-occurrence Matrix (Haralick textures), per band,
//!   at one or several window radii

mod glcm;

pub use glcm::{
    classification_texture, multiscale_texture, texture, GlcmDirections, GlcmFeature, GlcmParams,
};
