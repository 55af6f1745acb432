//! Enumeration types for the Lifegrid simulation.
//!
//! Cell values, execution phases, and interactive commands. The byte
//! encoding of cells (`255` alive, `0` dead) only exists at the image I/O
//! boundary; everywhere else a cell is a [`CellState`].

use std::fmt;

use serde::{Deserialize, Serialize};

/// Byte written to an image stream for an alive cell.
pub const ALIVE_BYTE: u8 = 255;

/// Byte written to an image stream for a dead cell.
pub const DEAD_BYTE: u8 = 0;

// ---------------------------------------------------------------------------
// Cell State
// ---------------------------------------------------------------------------

/// The value of a single grid cell.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CellState {
    /// An empty cell.
    #[default]
    Dead,
    /// A living cell.
    Alive,
}

impl CellState {
    /// Decode a cell from its image byte.
    ///
    /// Only [`ALIVE_BYTE`] decodes to [`CellState::Alive`]; every other
    /// value is treated as dead.
    pub const fn from_byte(byte: u8) -> Self {
        if byte == ALIVE_BYTE {
            Self::Alive
        } else {
            Self::Dead
        }
    }

    /// Encode the cell as its image byte.
    pub const fn to_byte(self) -> u8 {
        match self {
            Self::Alive => ALIVE_BYTE,
            Self::Dead => DEAD_BYTE,
        }
    }

    /// Whether the cell is alive.
    pub const fn is_alive(self) -> bool {
        matches!(self, Self::Alive)
    }
}

// ---------------------------------------------------------------------------
// Execution Phase
// ---------------------------------------------------------------------------

/// Lifecycle phase of a run as reported through `StateChange` events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionPhase {
    /// Turns are being computed.
    Executing,
    /// Turn progress is suspended until resumed.
    Paused,
    /// The run is terminating; no further turns will be installed.
    Quitting,
}

impl fmt::Display for ExecutionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Executing => "Executing",
            Self::Paused => "Paused",
            Self::Quitting => "Quitting",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// Interactive Commands
// ---------------------------------------------------------------------------

/// An interactive command decoded from a single key press.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Command {
    /// Save a snapshot and terminate the run early.
    Quit,
    /// Save a snapshot and keep running.
    Save,
    /// Pause when executing, resume when paused.
    TogglePause,
}

impl Command {
    /// Decode a key press. Unrecognized keys yield `None`.
    pub const fn from_key(key: char) -> Option<Self> {
        match key {
            'q' => Some(Self::Quit),
            's' => Some(Self::Save),
            'p' => Some(Self::TogglePause),
            _ => None,
        }
    }
}
