//! Shared run state guarded for the scheduler and the control loop.
//!
//! The current grid, the completed-turn counter, and the execution phase are
//! the only mutable state shared between tasks. They live in a
//! [`RunState`] reachable only through the [`SharedRun`] mutex, so a reader
//! can never observe a grid mid-swap.
//!
//! # Architecture
//!
//! The grid is held as an `Arc<Grid>` and replaced wholesale once per turn;
//! readers clone the `Arc` under the guard and work on that immutable
//! snapshot. A [`Notify`] wakes a scheduler that is waiting out a pause, and
//! also wakes it when the run is told to quit.

use std::sync::Arc;

use lifegrid_types::ExecutionPhase;
use tokio::sync::{Mutex, MutexGuard, Notify};

use crate::grid::Grid;

/// Mutable state of a run. Only reachable through [`SharedRun::lock`].
#[derive(Debug)]
pub struct RunState {
    grid: Arc<Grid>,
    turn: u32,
    phase: ExecutionPhase,
}

impl RunState {
    /// The current grid.
    pub fn grid(&self) -> Arc<Grid> {
        Arc::clone(&self.grid)
    }

    /// Number of completed turns.
    pub const fn turn(&self) -> u32 {
        self.turn
    }

    /// Current execution phase.
    pub const fn phase(&self) -> ExecutionPhase {
        self.phase
    }

    /// Whether the run has entered its terminal phase.
    pub const fn is_quitting(&self) -> bool {
        matches!(self.phase, ExecutionPhase::Quitting)
    }

    /// Switch phase. Returns the previous phase.
    pub(crate) const fn set_phase(&mut self, phase: ExecutionPhase) -> ExecutionPhase {
        let previous = self.phase;
        self.phase = phase;
        previous
    }

    /// Install the next generation and count the turn. Only the turn
    /// scheduler calls this.
    pub(crate) fn advance(&mut self, next: Grid) -> u32 {
        self.grid = Arc::new(next);
        self.turn = self.turn.saturating_add(1);
        self.turn
    }
}

/// Point-in-time copy of the run state.
#[derive(Debug, Clone)]
pub struct Snapshot {
    /// The grid at the time of the snapshot.
    pub grid: Arc<Grid>,
    /// Completed turns at the time of the snapshot.
    pub turn: u32,
    /// Phase at the time of the snapshot.
    pub phase: ExecutionPhase,
}

/// Shared owner of a run's mutable state.
#[derive(Debug)]
pub struct SharedRun {
    state: Mutex<RunState>,
    resume_notify: Notify,
}

impl SharedRun {
    /// Create the shared state for a freshly loaded grid at turn 0.
    pub fn new(grid: Grid) -> Self {
        Self {
            state: Mutex::new(RunState {
                grid: Arc::new(grid),
                turn: 0,
                phase: ExecutionPhase::Executing,
            }),
            resume_notify: Notify::new(),
        }
    }

    /// Acquire the state guard.
    pub async fn lock(&self) -> MutexGuard<'_, RunState> {
        self.state.lock().await
    }

    /// Take a consistent copy of grid, turn, and phase.
    pub async fn snapshot(&self) -> Snapshot {
        let state = self.state.lock().await;
        Snapshot {
            grid: state.grid(),
            turn: state.turn,
            phase: state.phase,
        }
    }

    /// Wake every task waiting in [`wait_until_runnable`](Self::wait_until_runnable).
    ///
    /// Call after leaving `Paused` (resume or quit).
    pub fn notify_phase_change(&self) {
        self.resume_notify.notify_waiters();
    }

    /// Wait until the run is not paused and return the guard.
    ///
    /// The returned phase is either `Executing` or `Quitting`; the guard is
    /// held so the caller can act on that phase atomically.
    pub async fn wait_until_runnable(&self) -> MutexGuard<'_, RunState> {
        loop {
            // Register for the wake-up before inspecting the phase so a
            // resume between the check and the await is not lost.
            let notified = self.resume_notify.notified();
            let state = self.state.lock().await;
            if state.phase != ExecutionPhase::Paused {
                return state;
            }
            drop(state);
            notified.await;
        }
    }
}
