//! Integration tests driving complete runs through [`RunDriver`].
//!
//! Each test seeds a [`MemoryStore`] with the input image, starts the
//! driver on its own task, and talks to it only through the key channel
//! and the event stream, the way the binary does.

#![allow(clippy::unwrap_used)]

use std::collections::BTreeSet;
use std::time::Duration;

use lifegrid_core::bus::EventBus;
use lifegrid_core::grid::Grid;
use lifegrid_core::io::{IoError, MemoryStore, spawn_io_service};
use lifegrid_core::runner::{EndReason, RunDriver, RunError, RunSummary};
use lifegrid_types::{Cell, Event, ExecutionPhase, Params, ParamsError};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const QUIET: Duration = Duration::from_secs(3600);

struct Fixture {
    store: MemoryStore,
    keys: mpsc::Sender<char>,
    events: mpsc::Receiver<Event>,
    driver: JoinHandle<Result<RunSummary, RunError>>,
}

impl Fixture {
    fn launch(params: Params, grid: &Grid, ticker: Duration) -> Self {
        let store = MemoryStore::new();
        store.insert(params.input_name(), grid.to_bytes());
        Self::launch_with_store(params, store, ticker)
    }

    fn launch_with_store(params: Params, store: MemoryStore, ticker: Duration) -> Self {
        let (io, _io_task) = spawn_io_service(store.clone(), 16);
        let (bus, events) = EventBus::new(4096);
        let (keys, key_rx) = mpsc::channel(8);
        let driver = RunDriver::new(params, bus, io).with_ticker_interval(ticker);
        let driver = tokio::spawn(driver.run(key_rx));
        Self {
            store,
            keys,
            events,
            driver,
        }
    }

    async fn next(&mut self) -> Option<Event> {
        tokio::time::timeout(Duration::from_secs(10), self.events.recv())
            .await
            .unwrap()
    }

    /// Receive until the stream closes.
    async fn drain(&mut self) -> Vec<Event> {
        let mut events = Vec::new();
        while let Some(ev) = self.next().await {
            events.push(ev);
        }
        events
    }

    /// Receive until `pred` matches, returning every event seen.
    async fn until(&mut self, pred: impl Fn(&Event) -> bool) -> Vec<Event> {
        let mut seen = Vec::new();
        loop {
            let ev = self.next().await.unwrap();
            let done = pred(&ev);
            seen.push(ev);
            if done {
                return seen;
            }
        }
    }

    async fn finish(self) -> RunSummary {
        tokio::time::timeout(Duration::from_secs(10), self.driver)
            .await
            .unwrap()
            .unwrap()
            .unwrap()
    }
}

const fn params(width: usize, height: usize, turns: u32, workers: usize) -> Params {
    Params {
        width,
        height,
        turns,
        workers,
    }
}

fn glider(width: usize, height: usize, dx: usize, dy: usize) -> Grid {
    let shape = [(1, 0), (2, 1), (0, 2), (1, 2), (2, 2)];
    Grid::with_alive(
        width,
        height,
        shape.iter().map(|&(x, y)| Cell::new(x + dx, y + dy)),
    )
    .unwrap()
}

/// Deterministic pseudo-random soup.
fn soup(width: usize, height: usize, seed: u64) -> Grid {
    let mut state = seed;
    let mut alive = Vec::new();
    for y in 0..height {
        for x in 0..width {
            state = state
                .wrapping_mul(6_364_136_223_846_793_005)
                .wrapping_add(1_442_695_040_888_963_407);
            if (state >> 33) % 3 == 0 {
                alive.push(Cell::new(x, y));
            }
        }
    }
    Grid::with_alive(width, height, alive).unwrap()
}

fn last_turn_complete(events: &[Event]) -> Option<u32> {
    events.iter().rev().find_map(|ev| match ev {
        Event::TurnComplete { turn } => Some(*turn),
        _ => None,
    })
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn completed_run_emits_ordered_stream_and_closes() {
    let p = params(8, 8, 4, 2);
    let mut fx = Fixture::launch(p, &glider(8, 8, 0, 0), QUIET);
    let events = fx.drain().await;
    let keys = fx.keys.clone();

    assert_eq!(
        events.first(),
        Some(&Event::StateChange {
            turn: 0,
            phase: ExecutionPhase::Executing
        })
    );

    // Before the first TurnComplete: the initial alive cells, then the
    // flips of turn 1, all tagged with zero completed turns.
    let first_turn = events
        .iter()
        .position(|ev| matches!(ev, Event::TurnComplete { turn: 1 }))
        .unwrap();
    let mut board: BTreeSet<Cell> = BTreeSet::new();
    for ev in events.get(..first_turn).unwrap() {
        if let Event::CellFlipped { turn, cell } = ev {
            assert_eq!(*turn, 0);
            if !board.remove(cell) {
                board.insert(*cell);
            }
        }
    }
    assert_eq!(
        board,
        glider(8, 8, 0, 0)
            .next_generation()
            .alive_cells()
            .into_iter()
            .collect::<BTreeSet<_>>()
    );

    let turns: Vec<u32> = events
        .iter()
        .filter_map(|ev| match ev {
            Event::TurnComplete { turn } => Some(*turn),
            _ => None,
        })
        .collect();
    assert_eq!(turns, vec![1, 2, 3, 4]);

    let mut completed = 0;
    for ev in &events {
        match ev {
            Event::CellFlipped { turn, .. } => assert_eq!(*turn, completed),
            Event::TurnComplete { turn } => completed = *turn,
            _ => {}
        }
    }

    let expected = glider(8, 8, 1, 1);
    let tail = events.get(events.len() - 3..).unwrap();
    assert_eq!(
        tail,
        [
            Event::ImageOutputComplete {
                turn: 4,
                filename: String::from("8x8x4")
            },
            Event::FinalTurnComplete {
                turn: 4,
                alive: expected.alive_cells()
            },
            Event::StateChange {
                turn: 4,
                phase: ExecutionPhase::Quitting
            },
        ]
    );

    let summary = fx.finish().await;
    assert_eq!(summary.end_reason, EndReason::Completed);
    assert_eq!(summary.turns_completed, 4);
    assert_eq!(summary.alive_cells, 5);

    // The control loop is gone; keys go nowhere.
    assert!(keys.send('q').await.is_err());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn final_snapshot_is_saved_under_turn_count() {
    let p = params(8, 8, 4, 4);
    let mut fx = Fixture::launch(p, &glider(8, 8, 0, 0), QUIET);
    fx.drain().await;
    let store = fx.store.clone();
    fx.finish().await;

    let bytes = store.get("8x8x4").unwrap();
    assert_eq!(Grid::from_bytes(8, 8, &bytes).unwrap(), glider(8, 8, 1, 1));
    assert_eq!(store.names(), vec![String::from("8x8"), String::from("8x8x4")]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn flips_replay_to_the_final_grid() {
    let start = soup(32, 24, 11);
    let p = params(32, 24, 15, 5);
    let mut fx = Fixture::launch(p, &start, QUIET);
    let events = fx.drain().await;
    fx.finish().await;

    let mut board: BTreeSet<Cell> = BTreeSet::new();
    let mut final_alive = None;
    for ev in &events {
        match ev {
            Event::CellFlipped { cell, .. } => {
                if !board.remove(cell) {
                    board.insert(*cell);
                }
            }
            Event::FinalTurnComplete { alive, .. } => final_alive = Some(alive.clone()),
            _ => {}
        }
    }

    let mut expected = start;
    for _ in 0..15 {
        expected = expected.next_generation();
    }
    let expected: BTreeSet<Cell> = expected.alive_cells().into_iter().collect();
    assert_eq!(board, expected);
    assert_eq!(final_alive.unwrap().into_iter().collect::<BTreeSet<_>>(), expected);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn worker_count_does_not_change_final_image() {
    let start = soup(40, 30, 5);
    let mut images = Vec::new();
    for workers in [1, 3, 7, 30] {
        let mut fx = Fixture::launch(params(40, 30, 12, workers), &start, QUIET);
        fx.drain().await;
        let store = fx.store.clone();
        fx.finish().await;
        images.push(store.get("40x30x12").unwrap());
    }
    let (first, rest) = images.split_first().unwrap();
    for image in rest {
        assert_eq!(image, first);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn quit_mid_run_ends_with_final_sequence() {
    let p = params(64, 64, 1_000_000, 4);
    let mut fx = Fixture::launch(p, &soup(64, 64, 21), QUIET);

    let mut events = fx
        .until(|ev| matches!(ev, Event::TurnComplete { turn } if *turn >= 3))
        .await;
    fx.keys.send('q').await.unwrap();
    events.extend(fx.drain().await);
    let store = fx.store.clone();
    let summary = fx.finish().await;

    assert_eq!(summary.end_reason, EndReason::Quit);
    let turn = summary.turns_completed;
    assert!(turn >= 3);

    let tail = events.get(events.len() - 3..).unwrap();
    let filename = format!("64x64x{turn}");
    assert_eq!(
        tail.first(),
        Some(&Event::ImageOutputComplete {
            turn,
            filename: filename.clone()
        })
    );
    assert!(matches!(
        tail.get(1),
        Some(Event::FinalTurnComplete { turn: t, .. }) if *t == turn
    ));
    assert_eq!(
        tail.get(2),
        Some(&Event::StateChange {
            turn,
            phase: ExecutionPhase::Quitting
        })
    );

    // Nothing from the scheduler after the quit, and the last turn reported
    // is the one that was saved.
    assert_eq!(last_turn_complete(&events), Some(turn));
    assert!(store.get(&filename).is_some());
    assert!(store.get("64x64x1000000").is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn pause_holds_turns_until_resume() {
    let p = params(32, 32, 1_000_000, 2);
    let mut fx = Fixture::launch(p, &soup(32, 32, 8), QUIET);

    fx.until(|ev| matches!(ev, Event::TurnComplete { turn } if *turn >= 2))
        .await;
    fx.keys.send('p').await.unwrap();
    let seen = fx
        .until(|ev| {
            matches!(
                ev,
                Event::StateChange {
                    phase: ExecutionPhase::Paused,
                    ..
                }
            )
        })
        .await;
    let paused_at = seen.last().map(Event::turn).unwrap();
    assert_eq!(last_turn_complete(&seen), Some(paused_at));

    // No progress while paused.
    let quiet = tokio::time::timeout(Duration::from_millis(200), fx.events.recv()).await;
    assert!(quiet.is_err(), "event while paused: {quiet:?}");

    // Saving works while paused and captures the paused turn.
    fx.keys.send('s').await.unwrap();
    assert_eq!(
        fx.next().await,
        Some(Event::ImageOutputComplete {
            turn: paused_at,
            filename: format!("32x32x{paused_at}")
        })
    );

    fx.keys.send('p').await.unwrap();
    assert_eq!(
        fx.next().await,
        Some(Event::StateChange {
            turn: paused_at,
            phase: ExecutionPhase::Executing
        })
    );
    let resumed = fx
        .until(|ev| matches!(ev, Event::TurnComplete { .. }))
        .await;
    assert_eq!(
        resumed.last(),
        Some(&Event::TurnComplete {
            turn: paused_at + 1
        })
    );

    fx.keys.send('q').await.unwrap();
    fx.drain().await;
    assert_eq!(fx.finish().await.end_reason, EndReason::Quit);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn quit_while_paused_stops_the_run() {
    let p = params(16, 16, 1_000_000, 2);
    let mut fx = Fixture::launch(p, &soup(16, 16, 2), QUIET);

    fx.until(|ev| matches!(ev, Event::TurnComplete { .. })).await;
    fx.keys.send('p').await.unwrap();
    fx.keys.send('q').await.unwrap();
    let events = fx.drain().await;
    let summary = fx.finish().await;

    assert_eq!(summary.end_reason, EndReason::Quit);
    assert_eq!(
        events.last(),
        Some(&Event::StateChange {
            turn: summary.turns_completed,
            phase: ExecutionPhase::Quitting
        })
    );
    let paused = events
        .iter()
        .position(|ev| {
            matches!(
                ev,
                Event::StateChange {
                    phase: ExecutionPhase::Paused,
                    ..
                }
            )
        })
        .unwrap();
    assert!(
        events
            .iter()
            .skip(paused)
            .all(|ev| !matches!(ev, Event::TurnComplete { .. }))
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn ticker_reports_consistent_counts() {
    let p = params(24, 24, 1_000_000, 3);
    let mut fx = Fixture::launch(p, &soup(24, 24, 17), Duration::from_millis(15));

    let seen = fx
        .until(|ev| matches!(ev, Event::AliveCellsCount { .. }))
        .await;
    let turn = seen.last().map(Event::turn).unwrap();
    let count = seen
        .last()
        .and_then(|ev| match ev {
            Event::AliveCellsCount { count, .. } => Some(*count),
            _ => None,
        })
        .unwrap();
    // The report is taken under the same guard as turn installation.
    assert_eq!(last_turn_complete(&seen).unwrap_or(0), turn);

    let mut board: BTreeSet<Cell> = BTreeSet::new();
    for ev in &seen {
        if let Event::CellFlipped { cell, .. } = ev {
            if !board.remove(cell) {
                board.insert(*cell);
            }
        }
    }
    assert_eq!(board.len(), count);

    fx.keys.send('q').await.unwrap();
    fx.drain().await;
    fx.finish().await;
}

#[tokio::test]
async fn missing_input_image_is_fatal() {
    let mut fx = Fixture::launch_with_store(params(8, 8, 1, 1), MemoryStore::new(), QUIET);
    let result = fx.driver.await.unwrap();
    assert!(matches!(
        result,
        Err(RunError::Io {
            source: IoError::NotFound { .. }
        })
    ));
    assert!(fx.events.recv().await.is_none());
}

#[tokio::test]
async fn invalid_params_are_fatal() {
    let fx = Fixture::launch(params(8, 4, 1, 5), &Grid::new(8, 4).unwrap(), QUIET);
    let result = fx.driver.await.unwrap();
    assert!(matches!(
        result,
        Err(RunError::Params {
            source: ParamsError::TooManyWorkers { .. }
        })
    ));
}
