//! Core structs for the Lifegrid simulation: cell coordinates and run
//! parameters.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Errors produced when validating [`Params`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParamsError {
    /// A dimension, the turn count, or the worker count is zero.
    #[error("{field} must be at least 1")]
    Zero {
        /// Name of the offending parameter.
        field: &'static str,
    },

    /// More workers than rows would leave some bands empty.
    #[error("worker count {workers} exceeds grid height {height}")]
    TooManyWorkers {
        /// Requested worker count.
        workers: usize,
        /// Grid height in rows.
        height: usize,
    },
}

/// A grid coordinate. `x` is the column, `y` the row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Cell {
    /// Column index, `0 <= x < width`.
    pub x: usize,
    /// Row index, `0 <= y < height`.
    pub y: usize,
}

impl Cell {
    /// Create a cell coordinate.
    pub const fn new(x: usize, y: usize) -> Self {
        Self { x, y }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Immutable configuration of a single run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Params {
    /// Grid width in cells.
    pub width: usize,
    /// Grid height in cells.
    pub height: usize,
    /// Number of turns to execute before the run completes.
    pub turns: u32,
    /// Number of concurrent band workers per turn.
    pub workers: usize,
}

impl Params {
    /// Check that every parameter is positive and that each worker gets
    /// at least one row.
    ///
    /// # Errors
    ///
    /// Returns [`ParamsError`] describing the first violated constraint.
    pub const fn validate(&self) -> Result<(), ParamsError> {
        if self.width == 0 {
            return Err(ParamsError::Zero { field: "width" });
        }
        if self.height == 0 {
            return Err(ParamsError::Zero { field: "height" });
        }
        if self.turns == 0 {
            return Err(ParamsError::Zero { field: "turns" });
        }
        if self.workers == 0 {
            return Err(ParamsError::Zero { field: "workers" });
        }
        if self.workers > self.height {
            return Err(ParamsError::TooManyWorkers {
                workers: self.workers,
                height: self.height,
            });
        }
        Ok(())
    }

    /// Name of the input image: `"<width>x<height>"`.
    pub fn input_name(&self) -> String {
        format!("{}x{}", self.width, self.height)
    }

    /// Name of a snapshot taken after `turn` completed turns:
    /// `"<width>x<height>x<turn>"`.
    pub fn snapshot_name(&self, turn: u32) -> String {
        format!("{}x{}x{turn}", self.width, self.height)
    }
}
