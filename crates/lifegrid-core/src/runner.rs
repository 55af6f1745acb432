//! Run driver: loads the grid, runs every turn, and shuts the run down.
//!
//! [`RunDriver::run`] walks a fixed lifecycle:
//!
//! - **Loading** -- validate parameters, fetch the initial image, emit
//!   `StateChange{Executing}` and a `CellFlipped` for every alive cell;
//! - **Running** -- start the control loop and step the scheduler until
//!   the turn budget is spent or a quit is observed;
//! - **Saving** -- on completion, save the final grid and emit
//!   `ImageOutputComplete` and `FinalTurnComplete` (a quit already did this);
//! - **Draining** -- wait for the image service to report idle;
//! - **Closed** -- emit the last `StateChange{Quitting}` (on completion) and
//!   close the event bus.
//!
//! Completion and quit race for the `Quitting` phase under the run guard;
//! whichever wins emits the final events, exactly once.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use lifegrid_types::{Event, ExecutionPhase, Params, ParamsError};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinError;
use tracing::{debug, info, warn};

use crate::bus::{BusError, EventBus};
use crate::control::{ControlError, ControlExit, ControlLoop};
use crate::grid::{Grid, GridError};
use crate::io::{IoError, IoHandle};
use crate::scheduler::{SchedulerError, TurnOutcome, TurnScheduler};
use crate::state::SharedRun;

/// Default interval between alive-cell reports.
pub const DEFAULT_TICKER_INTERVAL: Duration = Duration::from_secs(2);

/// Errors that can occur during a run. All are fatal.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    /// The run parameters are invalid.
    #[error("invalid parameters: {source}")]
    Params {
        /// The violated constraint.
        #[from]
        source: ParamsError,
    },

    /// The loaded image does not form a grid of the configured size.
    #[error("grid error: {source}")]
    Grid {
        /// The underlying grid error.
        #[from]
        source: GridError,
    },

    /// The image service failed.
    #[error("image I/O error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: IoError,
    },

    /// Publishing an event failed.
    #[error("bus error: {source}")]
    Bus {
        /// The underlying bus error.
        #[from]
        source: BusError,
    },

    /// Computing a turn failed.
    #[error("scheduler error: {source}")]
    Scheduler {
        /// The underlying scheduler error.
        #[from]
        source: SchedulerError,
    },

    /// The control loop failed.
    #[error("control loop error: {source}")]
    Control {
        /// The underlying control error.
        #[from]
        source: ControlError,
    },

    /// The control loop task panicked.
    #[error("control loop task failed: {source}")]
    ControlTask {
        /// The underlying join error.
        source: JoinError,
    },

    /// The driver attempted an out-of-order lifecycle transition.
    #[error("illegal lifecycle transition from {from} to {to}")]
    Lifecycle {
        /// State the driver was in.
        from: DriverState,
        /// State it tried to enter.
        to: DriverState,
    },
}

/// Lifecycle states of the run driver, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    /// Fetching the initial grid.
    Loading,
    /// Executing turns.
    Running,
    /// Saving the final grid.
    Saving,
    /// Waiting for the image service to go idle.
    Draining,
    /// The event bus is closed.
    Closed,
}

impl DriverState {
    /// The only state this one may advance to.
    pub const fn successor(self) -> Option<Self> {
        match self {
            Self::Loading => Some(Self::Running),
            Self::Running => Some(Self::Saving),
            Self::Saving => Some(Self::Draining),
            Self::Draining => Some(Self::Closed),
            Self::Closed => None,
        }
    }
}

impl fmt::Display for DriverState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Tracks the driver's position in its lifecycle.
#[derive(Debug)]
struct Lifecycle {
    state: DriverState,
}

impl Lifecycle {
    const fn new() -> Self {
        Self {
            state: DriverState::Loading,
        }
    }

    fn advance(&mut self, to: DriverState) -> Result<(), RunError> {
        if self.state.successor() != Some(to) {
            return Err(RunError::Lifecycle {
                from: self.state,
                to,
            });
        }
        debug!(from = %self.state, to = %to, "Driver state transition");
        self.state = to;
        Ok(())
    }
}

/// Why the run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    /// Every configured turn was executed.
    Completed,
    /// A quit command stopped the run early.
    Quit,
}

/// Outcome of a finished run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    /// Why the run ended.
    pub end_reason: EndReason,
    /// Number of turns completed.
    pub turns_completed: u32,
    /// Alive cells in the final grid.
    pub alive_cells: usize,
    /// Wall-clock time the run started.
    pub started_at: DateTime<Utc>,
    /// Wall-clock time the event bus was closed.
    pub finished_at: DateTime<Utc>,
}

impl RunSummary {
    /// Elapsed wall-clock milliseconds, clamped at zero.
    pub fn elapsed_ms(&self) -> u64 {
        let elapsed = self
            .finished_at
            .signed_duration_since(self.started_at)
            .num_milliseconds();
        u64::try_from(elapsed.max(0)).unwrap_or(u64::MAX)
    }
}

/// Orchestrates one complete run.
#[derive(Debug)]
pub struct RunDriver {
    params: Params,
    bus: Arc<EventBus>,
    io: IoHandle,
    ticker_interval: Duration,
}

impl RunDriver {
    /// Create a driver for `params`, publishing to `bus` and loading and
    /// saving images through `io`.
    pub fn new(params: Params, bus: EventBus, io: IoHandle) -> Self {
        Self {
            params,
            bus: Arc::new(bus),
            io,
            ticker_interval: DEFAULT_TICKER_INTERVAL,
        }
    }

    /// Override the interval between alive-cell reports.
    #[must_use]
    pub const fn with_ticker_interval(mut self, interval: Duration) -> Self {
        self.ticker_interval = interval;
        self
    }

    /// Execute the run to completion or quit, then close the event bus.
    ///
    /// `keys` carries interactive key presses for the control loop.
    ///
    /// # Errors
    ///
    /// Returns [`RunError`] on invalid parameters, a bad initial image, a
    /// failed turn, a failed control action, or an I/O service failure.
    /// The bus is not closed when an error is returned.
    pub async fn run(self, keys: mpsc::Receiver<char>) -> Result<RunSummary, RunError> {
        let started_at = Utc::now();
        let mut lifecycle = Lifecycle::new();
        let params = self.params;

        // --- Loading ---
        params.validate()?;
        info!(
            width = params.width,
            height = params.height,
            turns = params.turns,
            workers = params.workers,
            "Run starting"
        );
        let grid = self.load_grid().await?;
        info!(alive = grid.alive_count(), "Initial grid loaded");

        self.bus
            .publish(Event::StateChange {
                turn: 0,
                phase: ExecutionPhase::Executing,
            })
            .await?;
        self.bus
            .publish_all(
                grid.alive_cells()
                    .into_iter()
                    .map(|cell| Event::CellFlipped { turn: 0, cell }),
            )
            .await?;
        let run = Arc::new(SharedRun::new(grid));

        // --- Running ---
        lifecycle.advance(DriverState::Running)?;
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let control = ControlLoop::new(
            params,
            Arc::clone(&run),
            Arc::clone(&self.bus),
            self.io.clone(),
            keys,
            self.ticker_interval,
        )
        .spawn(shutdown_rx);
        let scheduler = TurnScheduler::new(params.workers, Arc::clone(&self.bus));

        if let Err(e) = run_turns(&run, &scheduler, params.turns).await {
            warn!(error = %e, "Turn loop failed, stopping control loop");
            let _ = shutdown_tx.send(());
            if let Some(exit) = settle_control(control.await) {
                debug!(?exit, "Control loop stopped");
            }
            return Err(e.into());
        }

        // --- Saving ---
        lifecycle.advance(DriverState::Saving)?;
        let end_reason = {
            let mut state = run.lock().await;
            if state.is_quitting() {
                EndReason::Quit
            } else {
                state.set_phase(ExecutionPhase::Quitting);
                EndReason::Completed
            }
        };
        run.notify_phase_change();

        // The loop may already have exited on quit; a failed send is fine.
        let _ = shutdown_tx.send(());
        let exit = control
            .await
            .map_err(|source| RunError::ControlTask { source })??;
        debug!(?exit, ?end_reason, "Control loop joined");
        if end_reason == EndReason::Quit && exit != ControlExit::Quit {
            warn!(?exit, "Run quitting without a control loop quit");
        }

        let snapshot = run.snapshot().await;
        let turn = snapshot.turn;
        if end_reason == EndReason::Completed {
            let filename = params.snapshot_name(params.turns);
            self.io
                .save(
                    filename.clone(),
                    snapshot.grid.width(),
                    snapshot.grid.height(),
                    snapshot.grid.to_bytes(),
                )
                .await?;
            self.bus
                .publish_all([
                    Event::ImageOutputComplete { turn, filename },
                    Event::FinalTurnComplete {
                        turn,
                        alive: snapshot.grid.alive_cells(),
                    },
                ])
                .await?;
        }

        // --- Draining ---
        lifecycle.advance(DriverState::Draining)?;
        self.io.wait_idle().await?;
        debug!("Image service idle");

        // --- Closed ---
        if end_reason == EndReason::Completed {
            self.bus
                .publish(Event::StateChange {
                    turn,
                    phase: ExecutionPhase::Quitting,
                })
                .await?;
        }
        lifecycle.advance(DriverState::Closed)?;
        self.bus.close().await?;

        Ok(RunSummary {
            end_reason,
            turns_completed: turn,
            alive_cells: snapshot.grid.alive_count(),
            started_at,
            finished_at: Utc::now(),
        })
    }

    async fn load_grid(&self) -> Result<Grid, RunError> {
        let Params { width, height, .. } = self.params;
        let bytes = self.io.load(self.params.input_name(), width, height).await?;
        Ok(Grid::from_bytes(width, height, &bytes)?)
    }
}

/// Step the scheduler until `turns` turns are complete or the run quits.
async fn run_turns(
    run: &SharedRun,
    scheduler: &TurnScheduler,
    turns: u32,
) -> Result<(), SchedulerError> {
    loop {
        {
            let state = run.wait_until_runnable().await;
            if state.is_quitting() || state.turn() >= turns {
                return Ok(());
            }
        }
        if scheduler.step(run).await? == TurnOutcome::Stopped {
            return Ok(());
        }
    }
}

/// Settle a control loop joined on an error path, logging its failure.
///
/// Returns the exit reason when the loop ended cleanly.
fn settle_control(
    joined: Result<Result<ControlExit, ControlError>, JoinError>,
) -> Option<ControlExit> {
    match joined {
        Ok(Ok(exit)) => Some(exit),
        Ok(Err(e)) => {
            warn!(error = %e, "Control loop failed");
            None
        }
        Err(e) => {
            warn!(error = %e, "Control loop task failed");
            None
        }
    }
}

/// Log the end of a run.
pub fn log_run_end(summary: &RunSummary) {
    info!(
        reason = ?summary.end_reason,
        turns_completed = summary.turns_completed,
        alive_cells = summary.alive_cells,
        elapsed_ms = summary.elapsed_ms(),
        "Run ended"
    );
}
