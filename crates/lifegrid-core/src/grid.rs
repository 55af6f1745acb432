//! The toroidal cell grid and Conway's transition rule.
//!
//! A [`Grid`] is a row-major matrix of [`CellState`] values whose edges wrap
//! in both directions. Its dimensions are fixed at construction. The grid is
//! never mutated in place during a run: each turn builds a new grid and the
//! scheduler swaps it in.
//!
//! # Design Principles
//!
//! - [`next_value`] and [`Grid::live_neighbor_count`] are pure, so any number
//!   of band workers may evaluate them concurrently over a shared grid.
//! - Neighbor wrap-around is computed with explicit predecessor/successor
//!   helpers, never by reading an already-wrapped index a second time.

use std::ops::Range;

use lifegrid_types::{Cell, CellState};

/// Errors that can occur when building a grid.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GridError {
    /// Width or height is zero.
    #[error("grid dimensions must be non-zero (got {width}x{height})")]
    EmptyDimensions {
        /// Requested width.
        width: usize,
        /// Requested height.
        height: usize,
    },

    /// The supplied cell data does not match `width * height`.
    #[error("expected {expected} cells, got {actual}")]
    LengthMismatch {
        /// Required number of cells.
        expected: usize,
        /// Number of cells supplied.
        actual: usize,
    },
}

/// Offsets of the 8 neighbors, expressed as `(column, row)` steps where
/// `-1` is "previous", `0` "same", `1` "next".
const NEIGHBOR_STEPS: [(i8, i8); 8] = [
    (-1, -1),
    (0, -1),
    (1, -1),
    (-1, 0),
    (1, 0),
    (-1, 1),
    (0, 1),
    (1, 1),
];

/// Apply Conway's rule to one cell.
///
/// An alive cell survives with 2 or 3 alive neighbors; a dead cell becomes
/// alive with exactly 3. Everything else is dead.
pub const fn next_value(current: CellState, neighbors: u8) -> CellState {
    match (current, neighbors) {
        (CellState::Alive, 2 | 3) | (CellState::Dead, 3) => CellState::Alive,
        _ => CellState::Dead,
    }
}

/// A fixed-size toroidal grid of cells.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grid {
    width: usize,
    height: usize,
    cells: Vec<CellState>,
}

impl Grid {
    /// Create an all-dead grid.
    ///
    /// # Errors
    ///
    /// Returns [`GridError::EmptyDimensions`] if either dimension is zero.
    pub fn new(width: usize, height: usize) -> Result<Self, GridError> {
        let len = checked_area(width, height)?;
        Ok(Self {
            width,
            height,
            cells: vec![CellState::Dead; len],
        })
    }

    /// Build a grid from row-major cell values.
    ///
    /// # Errors
    ///
    /// Returns [`GridError`] if a dimension is zero or `cells` has the wrong
    /// length.
    pub fn from_cells(width: usize, height: usize, cells: Vec<CellState>) -> Result<Self, GridError> {
        let expected = checked_area(width, height)?;
        if cells.len() != expected {
            return Err(GridError::LengthMismatch {
                expected,
                actual: cells.len(),
            });
        }
        Ok(Self {
            width,
            height,
            cells,
        })
    }

    /// Decode a grid from an image byte stream (`255` alive, anything else
    /// dead), row-major.
    ///
    /// # Errors
    ///
    /// Returns [`GridError`] if a dimension is zero or `bytes` has the wrong
    /// length.
    pub fn from_bytes(width: usize, height: usize, bytes: &[u8]) -> Result<Self, GridError> {
        let cells = bytes.iter().copied().map(CellState::from_byte).collect();
        Self::from_cells(width, height, cells)
    }

    /// Build a grid with the given cells alive. Coordinates outside the
    /// grid are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`GridError::EmptyDimensions`] if either dimension is zero.
    pub fn with_alive(
        width: usize,
        height: usize,
        alive: impl IntoIterator<Item = Cell>,
    ) -> Result<Self, GridError> {
        let mut grid = Self::new(width, height)?;
        for cell in alive {
            if let Some(idx) = grid.index(cell.x, cell.y) {
                if let Some(slot) = grid.cells.get_mut(idx) {
                    *slot = CellState::Alive;
                }
            }
        }
        Ok(grid)
    }

    /// Reassemble a grid from consecutive row bands, in order.
    ///
    /// # Errors
    ///
    /// Returns [`GridError::LengthMismatch`] if the bands do not add up to
    /// exactly `width * height` cells.
    pub fn from_bands(
        width: usize,
        height: usize,
        bands: impl IntoIterator<Item = Vec<CellState>>,
    ) -> Result<Self, GridError> {
        let expected = checked_area(width, height)?;
        let mut cells = Vec::with_capacity(expected);
        for band in bands {
            cells.extend(band);
        }
        Self::from_cells(width, height, cells)
    }

    /// Grid width in cells.
    pub const fn width(&self) -> usize {
        self.width
    }

    /// Grid height in cells.
    pub const fn height(&self) -> usize {
        self.height
    }

    /// Encode the grid as an image byte stream, row-major.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.cells.iter().map(|c| c.to_byte()).collect()
    }

    /// The value at `(x, y)`, or `None` if out of bounds.
    pub fn get(&self, x: usize, y: usize) -> Option<CellState> {
        self.index(x, y).and_then(|idx| self.cells.get(idx).copied())
    }

    /// Number of alive cells among the 8 toroidal neighbors of `(x, y)`.
    ///
    /// The cell itself is never counted. Returns 0 for coordinates outside
    /// the grid.
    pub fn live_neighbor_count(&self, x: usize, y: usize) -> u8 {
        if x >= self.width || y >= self.height {
            return 0;
        }
        let mut count: u8 = 0;
        for (dx, dy) in NEIGHBOR_STEPS {
            let nx = wrap_step(x, dx, self.width);
            let ny = wrap_step(y, dy, self.height);
            if self.get(nx, ny).is_some_and(CellState::is_alive) {
                count = count.saturating_add(1);
            }
        }
        count
    }

    /// Compute the next-generation values of the rows in `rows`.
    ///
    /// Reads the whole grid (for wrap-around) but produces only the
    /// requested band, row-major. Rows beyond the grid height are skipped.
    pub fn next_rows(&self, rows: Range<usize>) -> Vec<CellState> {
        let end = rows.end.min(self.height);
        let start = rows.start.min(end);
        let mut out = Vec::with_capacity(end.saturating_sub(start).saturating_mul(self.width));
        for y in start..end {
            for x in 0..self.width {
                let current = self.get(x, y).unwrap_or_default();
                out.push(next_value(current, self.live_neighbor_count(x, y)));
            }
        }
        out
    }

    /// Compute the full next generation in the calling context.
    pub fn next_generation(&self) -> Self {
        Self {
            width: self.width,
            height: self.height,
            cells: self.next_rows(0..self.height),
        }
    }

    /// Coordinates of all alive cells in row-major order.
    pub fn alive_cells(&self) -> Vec<Cell> {
        self.coords()
            .zip(&self.cells)
            .filter(|(_, state)| state.is_alive())
            .map(|(cell, _)| cell)
            .collect()
    }

    /// Number of alive cells.
    pub fn alive_count(&self) -> usize {
        self.cells.iter().filter(|c| c.is_alive()).count()
    }

    /// Cells whose value differs between `self` and `other`, row-major.
    ///
    /// Grids of different dimensions are compared over their common
    /// prefix; during a run dimensions never change.
    pub fn flipped_cells(&self, other: &Self) -> Vec<Cell> {
        self.coords()
            .zip(self.cells.iter().zip(&other.cells))
            .filter(|(_, (before, after))| before != after)
            .map(|(cell, _)| cell)
            .collect()
    }

    fn coords(&self) -> impl Iterator<Item = Cell> + '_ {
        (0..self.height).flat_map(move |y| (0..self.width).map(move |x| Cell::new(x, y)))
    }

    fn index(&self, x: usize, y: usize) -> Option<usize> {
        if x >= self.width || y >= self.height {
            return None;
        }
        y.checked_mul(self.width)?.checked_add(x)
    }
}

/// Validate dimensions and return the cell count.
fn checked_area(width: usize, height: usize) -> Result<usize, GridError> {
    if width == 0 || height == 0 {
        return Err(GridError::EmptyDimensions { width, height });
    }
    width
        .checked_mul(height)
        .ok_or(GridError::EmptyDimensions { width, height })
}

/// Move one step along an axis of length `size`, wrapping at both ends.
const fn wrap_step(pos: usize, delta: i8, size: usize) -> usize {
    match delta {
        d if d < 0 => {
            if pos == 0 {
                size.saturating_sub(1)
            } else {
                pos.saturating_sub(1)
            }
        }
        0 => pos,
        _ => {
            let next = pos.saturating_add(1);
            if next >= size { 0 } else { next }
        }
    }
}
