//! Shared type definitions for the Lifegrid simulation.
//!
//! This crate is the single source of truth for the data exchanged between
//! the turn engine, its control loop, and external observers.
//!
//! # Modules
//!
//! - [`enums`] -- Cell values, execution phases, interactive commands
//! - [`structs`] -- Cell coordinates and run parameters
//! - [`events`] -- Events reported to the observer

pub mod enums;
pub mod events;
pub mod structs;

// Re-export all public types at crate root for convenience.
pub use enums::{ALIVE_BYTE, CellState, Command, DEAD_BYTE, ExecutionPhase};
pub use events::Event;
pub use structs::{Cell, Params, ParamsError};
