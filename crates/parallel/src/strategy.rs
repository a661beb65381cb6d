//! Parallel processing strategies

use rayon::prelude::*;
use surtland_core::{Error, Result};

/// Processing mode for raster stages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProcessingMode {
    /// Single-threaded processing
    Sequential,
    /// Parallel processing on the global rayon pool
    #[default]
    Parallel,
    /// Parallel processing on a dedicated pool with the given number of threads
    ParallelWith(usize),
}

impl ProcessingMode {
    /// Number of workers this mode runs on
    pub fn threads(&self) -> usize {
        match self {
            ProcessingMode::Sequential => 1,
            ProcessingMode::Parallel => rayon::current_num_threads(),
            ProcessingMode::ParallelWith(n) => (*n).max(1),
        }
    }
}

/// Strategy for parallel execution
pub trait ParallelStrategy {
    /// Map a function over indices and collect results in index order
    fn par_map<T, F>(&self, range: std::ops::Range<usize>, f: F) -> Result<Vec<T>>
    where
        T: Send,
        F: Fn(usize) -> T + Sync + Send;
}

/// Workers for one processing mode.
///
/// A `ParallelWith(n)` mode owns a dedicated pool that is built once and
/// reused by every `par_map` call.
#[derive(Debug)]
pub struct WorkerPool {
    mode: ProcessingMode,
    pool: Option<rayon::ThreadPool>,
}

impl WorkerPool {
    pub fn new(mode: ProcessingMode) -> Result<Self> {
        let pool = match mode {
            ProcessingMode::ParallelWith(threads) => Some(
                rayon::ThreadPoolBuilder::new()
                    .num_threads(threads.max(1))
                    .build()
                    .map_err(|e| Error::Other(format!("cannot build thread pool: {}", e)))?,
            ),
            _ => None,
        };
        Ok(Self { mode, pool })
    }

    pub fn mode(&self) -> ProcessingMode {
        self.mode
    }

    pub fn threads(&self) -> usize {
        match &self.pool {
            Some(pool) => pool.current_num_threads(),
            None => self.mode.threads(),
        }
    }
}

impl ParallelStrategy for WorkerPool {
    fn par_map<T, F>(&self, range: std::ops::Range<usize>, f: F) -> Result<Vec<T>>
    where
        T: Send,
        F: Fn(usize) -> T + Sync + Send,
    {
        match (self.mode, &self.pool) {
            (ProcessingMode::Sequential, _) => Ok(range.map(f).collect()),
            (_, Some(pool)) => Ok(pool.install(|| range.into_par_iter().map(f).collect())),
            (_, None) => Ok(range.into_par_iter().map(f).collect()),
        }
    }
}
