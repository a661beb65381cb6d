//! # SurtLand Algorithms
//!
//! Multi-temporal compositing, feature derivation and land-cover change
//! analytics over [`surtland_core::Raster`] values.
//!
//! ## Algorithm Categories
//!
//! - **imagery**: cloud masking, temporal composites, spectral indices, feature stacks
//! - **texture**: GLCM (Haralick) texture features
//! - **timeseries**: per-pixel harmonic trend regression
//! - **change**: transition matrices, forest loss, change reports
//! - **statistics**: area aggregation in hectares, focal hotspot intensity
//!
//! Heavy stages take a [`surtland_parallel::ExecutionContext`] that decides
//! the processing mode, tile height and cancellation.

pub mod change;
pub mod imagery;
pub mod statistics;
pub mod texture;
pub mod timeseries;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::change::{
        assemble_change_report, build_matrix, forest_loss, transition_mask, transition_table, ChangeReport,
        ChangeReportAssembler, ReportConfig, TransitionTable,
    };
    pub use crate::imagery::{
        composite, mask_clouds, normalized_difference, seasonal_composite, spectral_index,
        stack_multi_year, stack_seasonal_features, CompositeParams, Reducer, Season, SpectralIndex,
    };
    pub use crate::statistics::{area_hectares, focal_intensity, AreaResult};
    pub use crate::texture::{texture, GlcmFeature, GlcmParams};
    pub use crate::timeseries::{fit_harmonic, HarmonicParams, HarmonicTarget};
    pub use surtland_core::prelude::*;
    pub use surtland_parallel::ExecutionContext;
}
