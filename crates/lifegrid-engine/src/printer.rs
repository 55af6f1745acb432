//! Event stream consumer.
//!
//! Logs every event through `tracing`, or writes it to stdout as one JSON
//! object per line. Returns once the stream closes.

use lifegrid_types::Event;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

/// How events are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// Structured log lines.
    Log,
    /// One JSON object per line on stdout.
    Json,
}

/// Consume `events` until the stream closes. Yields the number of events
/// seen.
pub fn spawn_printer(mut events: mpsc::Receiver<Event>, format: Format) -> JoinHandle<u64> {
    tokio::spawn(async move {
        let mut seen: u64 = 0;
        while let Some(event) = events.recv().await {
            seen = seen.saturating_add(1);
            match format {
                Format::Json => print_json(&event),
                Format::Log => log_event(&event),
            }
        }
        debug!(events = seen, "Event stream closed");
        seen
    })
}

fn print_json(event: &Event) {
    match serde_json::to_string(event) {
        Ok(line) => println!("{line}"),
        Err(e) => warn!(error = %e, "Failed to serialize event"),
    }
}

fn log_event(event: &Event) {
    match event {
        Event::CellFlipped { turn, cell } => trace!(turn, x = cell.x, y = cell.y, "Cell flipped"),
        Event::TurnComplete { turn } => debug!(turn, "Turn complete"),
        Event::AliveCellsCount { turn, count } => info!(turn, count, "Alive cells"),
        Event::StateChange { turn, phase } => info!(turn, phase = %phase, "State change"),
        Event::ImageOutputComplete { turn, filename } => {
            info!(turn, filename = %filename, "Image output complete");
        }
        Event::FinalTurnComplete { turn, alive } => {
            info!(turn, alive = alive.len(), "Final turn complete");
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use lifegrid_types::{Cell, ExecutionPhase};

    use super::*;

    #[tokio::test]
    async fn printer_drains_until_close() {
        let (tx, rx) = mpsc::channel(8);
        let printer = spawn_printer(rx, Format::Log);
        tx.send(Event::CellFlipped {
            turn: 0,
            cell: Cell::new(1, 1),
        })
        .await
        .unwrap();
        tx.send(Event::TurnComplete { turn: 1 }).await.unwrap();
        tx.send(Event::StateChange {
            turn: 1,
            phase: ExecutionPhase::Quitting,
        })
        .await
        .unwrap();
        drop(tx);
        assert_eq!(printer.await.unwrap(), 3);
    }

    #[tokio::test]
    async fn json_printer_handles_every_variant() {
        let (tx, rx) = mpsc::channel(8);
        let printer = spawn_printer(rx, Format::Json);
        tx.send(Event::AliveCellsCount { turn: 2, count: 7 })
            .await
            .unwrap();
        tx.send(Event::FinalTurnComplete {
            turn: 2,
            alive: vec![Cell::new(0, 0)],
        })
        .await
        .unwrap();
        drop(tx);
        assert_eq!(printer.await.unwrap(), 2);
    }
}
