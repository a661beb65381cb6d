//! # SurtLand Parallel
//!
//! Parallel processing strategies for raster stages.
//!
//! This crate provides:
//! - Processing modes (sequential, rayon global pool, fixed-size pool)
//! - Row-band tiling with cancellation checked between tile batches
//! - Associative partial reductions merged in tile order

pub mod cancel;
pub mod strategy;
pub mod tiled;

pub use cancel::CancelToken;
pub use strategy::{ParallelStrategy, ProcessingMode, WorkerPool};
pub use tiled::{ExecutionContext, Tile, TileIterator};
