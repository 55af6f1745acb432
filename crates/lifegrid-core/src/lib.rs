//! Turn engine, control loop, and run orchestration for Lifegrid.
//!
//! This crate runs Conway's Game of Life on a toroidal grid, splitting every
//! turn across band workers while an interactive control loop pauses,
//! saves, and quits the run and an ordered event stream reports progress.
//!
//! # Modules
//!
//! - [`grid`] -- The toroidal cell matrix and the life rule.
//! - [`worker`] -- Row-band partitioning and per-band computation.
//! - [`scheduler`] -- One turn: fan out bands, fan in, publish, install.
//! - [`state`] -- The guarded grid, turn counter, and phase.
//! - [`control`] -- Key commands and the alive-cell ticker.
//! - [`bus`] -- Ordered outbound event channel.
//! - [`io`] -- Image service protocol, [`ImageStore`] trait, in-memory store.
//! - [`runner`] -- [`RunDriver`] lifecycle from load to close.
//! - [`config`] -- Configuration loading from `lifegrid-config.yaml` into
//!   strongly-typed structs.
//!
//! [`ImageStore`]: io::ImageStore
//! [`RunDriver`]: runner::RunDriver

pub mod bus;
pub mod config;
pub mod control;
pub mod grid;
pub mod io;
pub mod runner;
pub mod scheduler;
pub mod state;
pub mod worker;
