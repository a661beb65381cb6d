//! Row-band tiling for raster stages
//!
//! Pixel-independent and window-based stages split the raster into bands of
//! rows. Tiles are processed in batches of roughly one tile per worker; the
//! cancellation token is checked before each batch, never mid-tile. Results
//! are merged by concatenation (maps) or by combining partials in tile order
//! (reductions), so no shared mutable state is needed.

use std::sync::{Arc, OnceLock};

use crate::cancel::CancelToken;
use crate::strategy::{ParallelStrategy, ProcessingMode, WorkerPool};
use surtland_core::{Error, Result};
use tracing::debug;

/// A band of consecutive rows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tile {
    /// First row in the source raster
    pub row_offset: usize,
    /// Number of rows in this tile
    pub rows: usize,
}

impl Tile {
    /// Source rows covered by this tile
    pub fn row_range(&self) -> std::ops::Range<usize> {
        self.row_offset..self.row_offset + self.rows
    }
}

/// Iterator over row tiles covering a raster
pub struct TileIterator {
    total_rows: usize,
    tile_rows: usize,
    current_row: usize,
}

impl TileIterator {
    pub fn new(total_rows: usize, tile_rows: usize) -> Self {
        Self {
            total_rows,
            tile_rows: tile_rows.max(1),
            current_row: 0,
        }
    }
}

impl Iterator for TileIterator {
    type Item = Tile;

    fn next(&mut self) -> Option<Self::Item> {
        if self.current_row >= self.total_rows {
            return None;
        }
        let rows = self.tile_rows.min(self.total_rows - self.current_row);
        let tile = Tile {
            row_offset: self.current_row,
            rows,
        };
        self.current_row += rows;
        Some(tile)
    }
}

/// How a stage executes: processing mode, tile height and cancellation.
///
/// Passed explicitly to every heavy stage; there is no process-wide state.
/// Clones share the worker pool, which is built on first use.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    mode: ProcessingMode,
    /// Rows per tile
    pub tile_rows: usize,
    pub cancel: CancelToken,
    workers: Arc<OnceLock<WorkerPool>>,
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self {
            mode: ProcessingMode::Parallel,
            tile_rows: 64,
            cancel: CancelToken::new(),
            workers: Arc::new(OnceLock::new()),
        }
    }
}

impl ExecutionContext {
    /// Single-threaded context
    pub fn sequential() -> Self {
        Self {
            mode: ProcessingMode::Sequential,
            ..Self::default()
        }
    }

    pub fn with_mode(mut self, mode: ProcessingMode) -> Self {
        self.mode = mode;
        self.workers = Arc::new(OnceLock::new());
        self
    }

    pub fn mode(&self) -> ProcessingMode {
        self.mode
    }

    pub fn with_tile_rows(mut self, tile_rows: usize) -> Self {
        self.tile_rows = tile_rows.max(1);
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    fn tiles(&self, rows: usize) -> Vec<Tile> {
        TileIterator::new(rows, self.tile_rows).collect()
    }

    fn workers(&self) -> Result<&WorkerPool> {
        if let Some(workers) = self.workers.get() {
            return Ok(workers);
        }
        debug!(mode = ?self.mode, "building worker pool");
        // A concurrent caller may have set it first; either pool is equivalent.
        let _ = self.workers.set(WorkerPool::new(self.mode)?);
        self.workers
            .get()
            .ok_or_else(|| Error::Other("worker pool unavailable".to_string()))
    }

    fn check_cancel(&self, completed: usize, total: usize) -> Result<()> {
        if self.cancel.is_cancelled() {
            debug!(completed, total, "stage cancelled at tile-batch boundary");
            return Err(Error::Cancelled { completed, total });
        }
        Ok(())
    }

    /// Map every row through `f` and concatenate the per-row outputs in row
    /// order.
    pub fn map_rows<T, F>(&self, rows: usize, f: F) -> Result<Vec<T>>
    where
        T: Send,
        F: Fn(usize) -> Vec<T> + Sync + Send,
    {
        let workers = self.workers()?;
        let tiles = self.tiles(rows);
        let batch = workers.threads().max(1);
        debug!(tiles = tiles.len(), batch, "mapping rows");

        let mut out = Vec::new();
        for (i, chunk) in tiles.chunks(batch).enumerate() {
            self.check_cancel(i * batch, tiles.len())?;
            let parts = workers.par_map(0..chunk.len(), |k| {
                chunk[k].row_range().flat_map(&f).collect::<Vec<T>>()
            })?;
            for part in parts {
                out.extend(part);
            }
        }
        Ok(out)
    }

    /// Reduce over rows with an associative `combine`.
    ///
    /// Each tile folds its rows into a partial, and partials are combined in
    /// tile order so the result does not depend on scheduling.
    pub fn reduce_rows<A, I, F, G>(&self, rows: usize, identity: I, fold_row: F, combine: G) -> Result<A>
    where
        A: Send,
        I: Fn() -> A + Sync + Send,
        F: Fn(usize) -> A + Sync + Send,
        G: Fn(A, A) -> A + Sync + Send,
    {
        let workers = self.workers()?;
        let tiles = self.tiles(rows);
        let batch = workers.threads().max(1);

        let mut acc = identity();
        for (i, chunk) in tiles.chunks(batch).enumerate() {
            self.check_cancel(i * batch, tiles.len())?;
            let partials = workers.par_map(0..chunk.len(), |k| {
                chunk[k]
                    .row_range()
                    .fold(identity(), |a, row| combine(a, fold_row(row)))
            })?;
            for p in partials {
                acc = combine(acc, p);
            }
        }
        Ok(acc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_tile_coverage() {
        let tiles: Vec<_> = TileIterator::new(100, 32).collect();
        assert_eq!(tiles.len(), 4);
        assert_eq!(tiles[0].row_offset, 0);
        assert_eq!(tiles[3].rows, 4);

        let covered: Vec<usize> = tiles.iter().flat_map(|t| t.row_range()).collect();
        assert_eq!(covered, (0..100).collect::<Vec<_>>());
    }

    #[test]
    fn test_map_rows_preserves_order() {
        for ctx in [
            ExecutionContext::sequential().with_tile_rows(3),
            ExecutionContext::default().with_tile_rows(2),
            ExecutionContext::default().with_mode(ProcessingMode::ParallelWith(2)),
        ] {
            let out = ctx.map_rows(10, |r| vec![r * 10, r * 10 + 1]).unwrap();
            let expected: Vec<usize> = (0..10).flat_map(|r| [r * 10, r * 10 + 1]).collect();
            assert_eq!(out, expected);
        }
    }

    #[test]
    fn test_reduce_rows_sums() {
        let ctx = ExecutionContext::default().with_tile_rows(7);
        let total = ctx.reduce_rows(50, || 0usize, |r| r, |a, b| a + b).unwrap();
        assert_eq!(total, (0..50).sum::<usize>());
    }

    #[test]
    fn test_cancelled_before_start() {
        let token = CancelToken::new();
        token.cancel();
        let ctx = ExecutionContext::default().with_cancel(token);
        let result = ctx.map_rows(10, |r| vec![r]);
        assert!(matches!(result, Err(Error::Cancelled { completed: 0, .. })));
    }

    #[test]
    fn test_dedicated_pool_reused_across_batches() {
        let ctx = ExecutionContext::default()
            .with_mode(ProcessingMode::ParallelWith(2))
            .with_tile_rows(1);
        let mut seen = HashSet::new();
        for _ in 0..3 {
            let ids = ctx.map_rows(40, |_| vec![std::thread::current().id()]).unwrap();
            seen.extend(ids);
        }
        let total = ctx.clone().reduce_rows(40, || 0usize, |r| r, |a, b| a + b).unwrap();
        assert_eq!(total, (0..40).sum::<usize>());
        // 60 batches ran; a fresh pool per batch would spawn new threads each time
        assert!(seen.len() <= 2, "{} distinct worker threads", seen.len());
    }

    #[test]
    fn test_with_mode_replaces_pool() {
        let ctx = ExecutionContext::default().with_mode(ProcessingMode::ParallelWith(2));
        ctx.map_rows(4, |r| vec![r]).unwrap();
        let ctx = ctx.with_mode(ProcessingMode::ParallelWith(3));
        assert_eq!(ctx.workers().unwrap().threads(), 3);
        assert_eq!(ctx.mode(), ProcessingMode::ParallelWith(3));
    }

    #[test]
    fn test_empty_raster() {
        let ctx = ExecutionContext::sequential();
        assert!(ctx.map_rows(0, |r| vec![r]).unwrap().is_empty());
    }
}
