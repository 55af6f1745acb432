//! Turn scheduler: advances a run by exactly one generation.
//!
//! Each call to [`TurnScheduler::step`] runs this sequence:
//!
//! 1. **Snapshot** -- wait out any pause, then clone the current grid
//!    under the guard.
//! 2. **Dispatch** -- partition rows into bands and compute each band on a
//!    blocking worker (or inline when there is a single worker).
//! 3. **Fan-in** -- join every band and reassemble them by band index,
//!    never by completion order.
//! 4. **Diff** -- collect every cell whose value changed.
//! 5. **Publish** -- under the guard: emit one `CellFlipped` per changed
//!    cell (tagged with the turns completed so far), install the new grid,
//!    count the turn, emit `TurnComplete` with the new count.
//!
//! Step 5 is a single critical section. A pause that lands while workers
//! are running holds the new grid back until resume; a quit discards it.

use std::sync::Arc;

use futures::future::join_all;
use lifegrid_types::{CellState, Event};
use tokio::task::JoinError;
use tracing::debug;

use crate::bus::{BusError, EventBus};
use crate::grid::{Grid, GridError};
use crate::state::SharedRun;
use crate::worker::{self, BandResult};

/// Errors that can occur while computing a turn. All are fatal.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    /// A band worker panicked or was cancelled.
    #[error("worker for band {band} failed: {source}")]
    Worker {
        /// Index of the failed band.
        band: usize,
        /// The underlying join error.
        source: JoinError,
    },

    /// A band came back out of place.
    #[error("band reassembly mismatch: expected band {expected}, got band {actual}")]
    Reassembly {
        /// Band index expected at this position.
        expected: usize,
        /// Band index actually received.
        actual: usize,
    },

    /// A band came back with the wrong number of cells.
    #[error("band {band} has {actual} cells, expected {expected}")]
    BandSize {
        /// Index of the band.
        band: usize,
        /// Rows in the band times the grid width.
        expected: usize,
        /// Cells actually returned.
        actual: usize,
    },

    /// The reassembled cells do not form a grid of the original size.
    #[error("grid error: {source}")]
    Grid {
        /// The underlying grid error.
        #[from]
        source: GridError,
    },

    /// Publishing turn events failed.
    #[error("bus error: {source}")]
    Bus {
        /// The underlying bus error.
        #[from]
        source: BusError,
    },
}

/// Result of a single [`TurnScheduler::step`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnOutcome {
    /// A turn was installed.
    Completed {
        /// The turn number that completed.
        turn: u32,
        /// Number of cells that changed value.
        flipped: usize,
    },
    /// The run entered `Quitting`; no turn was installed.
    Stopped,
}

/// Splits each turn across workers and installs the result.
#[derive(Debug, Clone)]
pub struct TurnScheduler {
    workers: usize,
    bus: Arc<EventBus>,
}

impl TurnScheduler {
    /// Create a scheduler with `workers` bands per turn, publishing to `bus`.
    pub fn new(workers: usize, bus: Arc<EventBus>) -> Self {
        Self {
            workers: workers.max(1),
            bus,
        }
    }

    /// Number of bands each turn is split into.
    pub const fn workers(&self) -> usize {
        self.workers
    }

    /// Compute the next generation of `grid`.
    ///
    /// With one worker the grid is computed in the calling context.
    /// Otherwise every band runs on its own blocking task; all bands are
    /// joined before the result is assembled.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError`] if a worker fails or the bands do not
    /// reassemble into a grid of the original size.
    pub async fn compute_next(&self, grid: Arc<Grid>) -> Result<Grid, SchedulerError> {
        if self.workers == 1 {
            return Ok(grid.next_generation());
        }

        let handles = worker::partition(grid.height(), self.workers)
            .into_iter()
            .map(|band| {
                let grid = Arc::clone(&grid);
                tokio::task::spawn_blocking(move || worker::compute_band(&grid, band))
            });
        let joined = join_all(handles).await;

        let mut bands = Vec::with_capacity(joined.len());
        for (expected, result) in joined.into_iter().enumerate() {
            let result =
                result.map_err(|source| SchedulerError::Worker { band: expected, source })?;
            bands.push(check_band(expected, grid.width(), result)?);
        }

        Ok(Grid::from_bands(grid.width(), grid.height(), bands)?)
    }

    /// Advance the run by one turn.
    ///
    /// Blocks while the run is paused. Returns [`TurnOutcome::Stopped`]
    /// without emitting anything if the run is quitting, either before the
    /// turn starts or by the time it is ready to install.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError`] if computing or publishing the turn fails.
    pub async fn step(&self, run: &SharedRun) -> Result<TurnOutcome, SchedulerError> {
        let current = {
            let state = run.wait_until_runnable().await;
            if state.is_quitting() {
                return Ok(TurnOutcome::Stopped);
            }
            state.grid()
        };

        let next = self.compute_next(Arc::clone(&current)).await?;
        let flipped = current.flipped_cells(&next);

        let mut state = run.wait_until_runnable().await;
        if state.is_quitting() {
            debug!(turn = state.turn(), "Run quitting, discarding computed turn");
            return Ok(TurnOutcome::Stopped);
        }

        let completed = state.turn();
        self.bus
            .publish_all(
                flipped
                    .iter()
                    .copied()
                    .map(|cell| Event::CellFlipped { turn: completed, cell }),
            )
            .await?;
        let turn = state.advance(next);
        self.bus.publish(Event::TurnComplete { turn }).await?;
        drop(state);

        debug!(turn, flipped = flipped.len(), "Turn complete");
        Ok(TurnOutcome::Completed {
            turn,
            flipped: flipped.len(),
        })
    }
}

/// Verify a band landed in slot `expected` with a full set of rows.
fn check_band(
    expected: usize,
    width: usize,
    result: BandResult,
) -> Result<Vec<CellState>, SchedulerError> {
    let BandResult { band, cells } = result;
    if band.index != expected {
        return Err(SchedulerError::Reassembly {
            expected,
            actual: band.index,
        });
    }
    let size = band.len().saturating_mul(width);
    if cells.len() != size {
        return Err(SchedulerError::BandSize {
            band: band.index,
            expected: size,
            actual: cells.len(),
        });
    }
    Ok(cells)
}
