//! Band partitioning and the per-band turn worker.
//!
//! A turn is split into horizontal bands of rows, one per worker. Bands are
//! contiguous, never overlap, and together cover every row exactly once;
//! the last band absorbs the remainder when the height does not divide
//! evenly.

use std::ops::Range;

use lifegrid_types::CellState;

use crate::grid::Grid;

/// A contiguous range of rows assigned to one worker for one turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Band {
    /// Position of the band in row order (0-indexed).
    pub index: usize,
    /// Rows covered, half-open.
    pub rows: Range<usize>,
}

impl Band {
    /// Number of rows in the band.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the band covers no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Output of one worker, tagged with the band it computed.
#[derive(Debug, Clone)]
pub struct BandResult {
    /// The band that was computed.
    pub band: Band,
    /// Next-generation cells of the band, row-major.
    pub cells: Vec<CellState>,
}

/// Split `height` rows into `workers` bands.
///
/// Each band gets `height / workers` rows and the last one also takes the
/// remainder. A worker count of zero is treated as one.
pub fn partition(height: usize, workers: usize) -> Vec<Band> {
    let workers = workers.max(1);
    let band_height = height.checked_div(workers).unwrap_or(height);
    let last = workers.saturating_sub(1);

    (0..workers)
        .map(|index| {
            let start = index.saturating_mul(band_height);
            let end = if index == last {
                height
            } else {
                start.saturating_add(band_height)
            };
            Band {
                index,
                rows: start..end,
            }
        })
        .collect()
}

/// Compute the next generation of one band.
///
/// The worker reads the whole shared grid so neighbor lookups can wrap
/// across band boundaries, and writes only its own rows.
pub fn compute_band(grid: &Grid, band: Band) -> BandResult {
    let cells = grid.next_rows(band.rows.clone());
    BandResult { band, cells }
}
