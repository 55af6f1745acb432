//! Interactive control loop running alongside the turn scheduler.
//!
//! The loop blocks on three sources at once and wakes only when one of them
//! is ready:
//!
//! - **keys** -- `q` quit, `s` save, `p` pause/resume; anything else is
//!   ignored;
//! - **ticker** -- every `ticker_interval`, report the alive-cell count;
//! - **shutdown** -- the run driver is done with us.
//!
//! Every action takes the run guard, so it observes a whole turn or none of
//! it, and its events are ordered against the scheduler's.

use std::sync::Arc;
use std::time::Duration;

use lifegrid_types::{Command, Event, ExecutionPhase, Params};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::bus::{BusError, EventBus};
use crate::io::{IoError, IoHandle};
use crate::state::{RunState, SharedRun};

/// Errors that stop the control loop.
#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    /// Publishing an event failed.
    #[error("bus error: {source}")]
    Bus {
        /// The underlying bus error.
        #[from]
        source: BusError,
    },

    /// Handing a snapshot to the image service failed.
    #[error("image I/O error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: IoError,
    },
}

/// Why the control loop returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlExit {
    /// A quit command ended the run.
    Quit,
    /// The run driver asked the loop to stop.
    Shutdown,
}

/// What to do after handling a key.
enum Flow {
    Continue,
    Exit,
}

/// Reacts to key presses and periodic ticks for one run.
#[derive(Debug)]
pub struct ControlLoop {
    params: Params,
    run: Arc<SharedRun>,
    bus: Arc<EventBus>,
    io: IoHandle,
    keys: mpsc::Receiver<char>,
    ticker_interval: Duration,
}

impl ControlLoop {
    /// Create a control loop for a run.
    pub const fn new(
        params: Params,
        run: Arc<SharedRun>,
        bus: Arc<EventBus>,
        io: IoHandle,
        keys: mpsc::Receiver<char>,
        ticker_interval: Duration,
    ) -> Self {
        Self {
            params,
            run,
            bus,
            io,
            keys,
            ticker_interval,
        }
    }

    /// Run the loop on its own task.
    ///
    /// Dropping or firing `shutdown` stops the loop.
    pub fn spawn(self, shutdown: oneshot::Receiver<()>) -> JoinHandle<Result<ControlExit, ControlError>> {
        tokio::spawn(self.run(shutdown))
    }

    /// Run the loop until a quit command or shutdown.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError`] if an event cannot be published or a
    /// snapshot cannot be handed to the image service.
    pub async fn run(mut self, mut shutdown: oneshot::Receiver<()>) -> Result<ControlExit, ControlError> {
        let period = self.ticker_interval.max(Duration::from_millis(1));
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut keys_open = true;

        debug!(ticker_ms = period.as_millis(), "Control loop started");

        loop {
            tokio::select! {
                biased;

                _ = &mut shutdown => {
                    debug!("Control loop shutting down");
                    return Ok(ControlExit::Shutdown);
                }

                key = self.keys.recv(), if keys_open => match key {
                    Some(key) => {
                        if matches!(self.handle_key(key).await?, Flow::Exit) {
                            return Ok(ControlExit::Quit);
                        }
                    }
                    None => {
                        debug!("Key input closed");
                        keys_open = false;
                    }
                },

                _ = ticker.tick() => self.report_alive_cells().await?,
            }
        }
    }

    async fn handle_key(&self, key: char) -> Result<Flow, ControlError> {
        let Some(command) = Command::from_key(key) else {
            debug!(key = %key.escape_debug(), "Ignoring unrecognized key");
            return Ok(Flow::Continue);
        };

        match command {
            Command::Quit => self.quit().await,
            Command::Save => {
                self.save().await?;
                Ok(Flow::Continue)
            }
            Command::TogglePause => {
                self.toggle_pause().await?;
                Ok(Flow::Continue)
            }
        }
    }

    /// Save a snapshot, emit the final events, and enter `Quitting`.
    async fn quit(&self) -> Result<Flow, ControlError> {
        let mut state = self.run.lock().await;
        if state.is_quitting() {
            debug!("Quit ignored, run already terminating");
            return Ok(Flow::Continue);
        }

        let turn = state.turn();
        let filename = self.save_locked(&state).await?;
        let alive = state.grid().alive_cells();
        self.bus
            .publish_all([
                Event::ImageOutputComplete { turn, filename },
                Event::FinalTurnComplete { turn, alive },
                Event::StateChange {
                    turn,
                    phase: ExecutionPhase::Quitting,
                },
            ])
            .await?;
        state.set_phase(ExecutionPhase::Quitting);
        drop(state);
        self.run.notify_phase_change();

        info!(turn, "Quit requested");
        Ok(Flow::Exit)
    }

    /// Save a snapshot and keep running.
    async fn save(&self) -> Result<(), ControlError> {
        let state = self.run.lock().await;
        if state.is_quitting() {
            return Ok(());
        }
        let turn = state.turn();
        let filename = self.save_locked(&state).await?;
        self.bus
            .publish(Event::ImageOutputComplete { turn, filename })
            .await?;
        info!(turn, "Snapshot saved");
        Ok(())
    }

    async fn toggle_pause(&self) -> Result<(), ControlError> {
        let mut state = self.run.lock().await;
        let turn = state.turn();
        let next = match state.phase() {
            ExecutionPhase::Executing => ExecutionPhase::Paused,
            ExecutionPhase::Paused => ExecutionPhase::Executing,
            ExecutionPhase::Quitting => return Ok(()),
        };
        state.set_phase(next);
        self.bus
            .publish(Event::StateChange { turn, phase: next })
            .await?;
        drop(state);

        if next == ExecutionPhase::Executing {
            self.run.notify_phase_change();
            info!(turn, "Resumed");
        } else {
            info!(turn, "Paused");
        }
        Ok(())
    }

    async fn report_alive_cells(&self) -> Result<(), ControlError> {
        let state = self.run.lock().await;
        if state.is_quitting() {
            return Ok(());
        }
        let turn = state.turn();
        let count = state.grid().alive_count();
        self.bus.publish(Event::AliveCellsCount { turn, count }).await?;
        debug!(turn, count, "Alive cells reported");
        Ok(())
    }

    /// Hand the guarded grid to the image service. Returns the filename.
    async fn save_locked(&self, state: &RunState) -> Result<String, IoError> {
        let grid = state.grid();
        let filename = self.params.snapshot_name(state.turn());
        self.io
            .save(filename.clone(), grid.width(), grid.height(), grid.to_bytes())
            .await?;
        Ok(filename)
    }
}
