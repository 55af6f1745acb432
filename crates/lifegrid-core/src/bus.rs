//! Ordered outbound event channel.
//!
//! [`EventBus`] wraps a bounded [`tokio::sync::mpsc`] channel. The turn
//! scheduler, the control loop, and the run driver publish through a shared
//! `Arc<EventBus>`; a single external consumer holds the receiver.
//!
//! # Rules
//!
//! - **FIFO per producer**: events from one task arrive in publish order.
//! - **Backpressure**: `publish` waits while the buffer is full.
//! - **Close once**: the driver closes the bus exactly once, after the final
//!   `StateChange{Quitting}`. A second close and any publish after close
//!   are errors.

use lifegrid_types::Event;
use tokio::sync::{Mutex, mpsc};
use tracing::debug;

/// Errors returned by [`EventBus`] operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BusError {
    /// The bus was closed before this publish.
    #[error("event bus is closed")]
    Closed,

    /// `close` was called on a bus that is already closed.
    #[error("event bus was already closed")]
    AlreadyClosed,

    /// The consumer dropped its receiver.
    #[error("event consumer disconnected (dropped event for turn {turn})")]
    Disconnected {
        /// Turn carried by the undeliverable event.
        turn: u32,
    },
}

/// Shared publishing side of the event stream.
#[derive(Debug)]
pub struct EventBus {
    tx: Mutex<Option<mpsc::Sender<Event>>>,
}

impl EventBus {
    /// Create a bus and the receiver its consumer reads from.
    ///
    /// The minimum capacity is 1 (clamped).
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Event>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                tx: Mutex::new(Some(tx)),
            },
            rx,
        )
    }

    /// Publish an event, waiting for buffer space if needed.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::Closed`] after [`close`](Self::close), or
    /// [`BusError::Disconnected`] if the receiver was dropped.
    pub async fn publish(&self, event: Event) -> Result<(), BusError> {
        let tx = self.tx.lock().await.clone().ok_or(BusError::Closed)?;
        tx.send(event).await.map_err(|err| BusError::Disconnected {
            turn: err.0.turn(),
        })
    }

    /// Publish a sequence of events in order.
    ///
    /// # Errors
    ///
    /// Stops at and returns the first publish error.
    pub async fn publish_all(&self, events: impl IntoIterator<Item = Event>) -> Result<(), BusError> {
        let tx = self.tx.lock().await.clone().ok_or(BusError::Closed)?;
        for event in events {
            tx.send(event).await.map_err(|err| BusError::Disconnected {
                turn: err.0.turn(),
            })?;
        }
        Ok(())
    }

    /// Close the bus. The consumer sees end-of-stream once every buffered
    /// event has been received.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::AlreadyClosed`] on a second call.
    pub async fn close(&self) -> Result<(), BusError> {
        let tx = self.tx.lock().await.take().ok_or(BusError::AlreadyClosed)?;
        drop(tx);
        debug!("Event bus closed");
        Ok(())
    }

    /// Whether [`close`](Self::close) has been called.
    pub async fn is_closed(&self) -> bool {
        self.tx.lock().await.is_none()
    }
}

#[cfg(test)]
mod tests {
    use lifegrid_types::{Cell, ExecutionPhase};

    use super::*;

    #[tokio::test]
    async fn delivers_in_order_then_closes() {
        let (bus, mut rx) = EventBus::new(8);
        bus.publish(Event::TurnComplete { turn: 1 }).await.ok();
        bus.publish_all([
            Event::CellFlipped {
                turn: 2,
                cell: Cell::new(0, 1),
            },
            Event::TurnComplete { turn: 2 },
        ])
        .await
        .ok();
        assert_eq!(bus.close().await, Ok(()));

        assert_eq!(rx.recv().await, Some(Event::TurnComplete { turn: 1 }));
        assert_eq!(
            rx.recv().await,
            Some(Event::CellFlipped {
                turn: 2,
                cell: Cell::new(0, 1)
            })
        );
        assert_eq!(rx.recv().await, Some(Event::TurnComplete { turn: 2 }));
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn second_close_fails() {
        let (bus, _rx) = EventBus::new(1);
        assert!(!bus.is_closed().await);
        assert_eq!(bus.close().await, Ok(()));
        assert!(bus.is_closed().await);
        assert_eq!(bus.close().await, Err(BusError::AlreadyClosed));
    }

    #[tokio::test]
    async fn publish_after_close_fails() {
        let (bus, _rx) = EventBus::new(1);
        bus.close().await.ok();
        let result = bus
            .publish(Event::StateChange {
                turn: 0,
                phase: ExecutionPhase::Executing,
            })
            .await;
        assert_eq!(result, Err(BusError::Closed));
    }

    #[tokio::test]
    async fn dropped_receiver_reports_disconnect() {
        let (bus, rx) = EventBus::new(1);
        drop(rx);
        let result = bus.publish(Event::TurnComplete { turn: 5 }).await;
        assert_eq!(result, Err(BusError::Disconnected { turn: 5 }));
    }
}
