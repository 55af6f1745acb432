//! Events reported from the engine to an external observer.
//!
//! Every state transition of a run is described by an [`Event`]. The
//! stream is ordered per producer and ends when the engine closes the bus.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::enums::ExecutionPhase;
use crate::structs::Cell;

/// An event emitted by a run.
///
/// Every variant carries `turn`, the number of turns completed when the
/// event was produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// The run entered a new execution phase.
    StateChange {
        /// Completed turns at the transition.
        turn: u32,
        /// The phase entered.
        phase: ExecutionPhase,
    },

    /// A cell changed value. Emitted for every alive cell of the loaded
    /// grid (turn 0) and for every cell that differs after a turn.
    CellFlipped {
        /// The turn that produced the change.
        turn: u32,
        /// The cell that flipped.
        cell: Cell,
    },

    /// A full-grid update finished.
    TurnComplete {
        /// The turn that just completed.
        turn: u32,
    },

    /// Periodic progress report.
    AliveCellsCount {
        /// Completed turns when the grid was sampled.
        turn: u32,
        /// Number of alive cells in the sampled grid.
        count: usize,
    },

    /// A snapshot of the grid was handed to the image service.
    ImageOutputComplete {
        /// Completed turns captured by the snapshot.
        turn: u32,
        /// Name the snapshot was saved under.
        filename: String,
    },

    /// The run stopped; carries the alive cells of the final grid.
    FinalTurnComplete {
        /// Completed turns at termination.
        turn: u32,
        /// Alive cells in row-major order.
        alive: Vec<Cell>,
    },
}

impl Event {
    /// The completed-turn count carried by this event.
    pub const fn turn(&self) -> u32 {
        match self {
            Self::StateChange { turn, .. }
            | Self::CellFlipped { turn, .. }
            | Self::TurnComplete { turn }
            | Self::AliveCellsCount { turn, .. }
            | Self::ImageOutputComplete { turn, .. }
            | Self::FinalTurnComplete { turn, .. } => *turn,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StateChange { phase, .. } => write!(f, "{phase}"),
            Self::CellFlipped { cell, .. } => write!(f, "Cell flipped at {cell}"),
            Self::TurnComplete { turn } => write!(f, "Turn {turn} complete"),
            Self::AliveCellsCount { count, .. } => write!(f, "Alive Cells {count}"),
            Self::ImageOutputComplete { filename, .. } => write!(f, "File {filename} output complete"),
            Self::FinalTurnComplete { alive, .. } => {
                write!(f, "Final turn complete with {} alive cells", alive.len())
            }
        }
    }
}
