//! # Event bus for broadcasting runtime events.
//!
//! [`Bus`] is a thin wrapper around [`tokio::sync::broadcast`] that lets the
//! supervisor, watchdog and coordinators publish without knowing who is
//! listening, and lets any component subscribe independently.
//!
//! ## Rules
//! - **Non-blocking publish**: `publish()` never blocks; it calls
//!   `broadcast::Sender::send`.
//! - **Bounded capacity**: a single ring buffer stores recent events for all
//!   receivers.
//! - **Lag handling**: slow receivers get `RecvError::Lagged(n)` and skip
//!   `n` oldest items.
//! - **No persistence**: events are lost if there are no active receivers at
//!   send time, so subscribe before triggering the work you want to observe.

use tokio::sync::broadcast;

use super::event::Event;

/// Broadcast channel for runtime events.
///
/// Cheap to clone (internally holds an `Arc`-backed sender); multiple
/// publishers may publish concurrently and every receiver sees its own copy
/// of each event.
#[derive(Clone, Debug)]
pub struct Bus {
    tx: broadcast::Sender<Event>,
}

impl Bus {
    /// Creates a new bus with the given channel capacity (clamped to ≥ 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, _rx) = broadcast::channel::<Event>(capacity);
        Self { tx }
    }

    /// Publishes an event to all active receivers.
    ///
    /// If there are no receivers the event is dropped; the call still
    /// returns immediately.
    pub fn publish(&self, ev: Event) {
        let _ = self.tx.send(ev);
    }

    /// Creates a new receiver that observes subsequent events.
    ///
    /// A receiver only gets events **sent after** it subscribes.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;

    #[tokio::test]
    async fn test_subscriber_sees_published_events() {
        let bus = Bus::new(16);
        let mut rx = bus.subscribe();

        bus.publish(Event::new(EventKind::Started));
        bus.publish(Event::new(EventKind::Exited).with_code(1).with_graceful(false));

        assert_eq!(rx.recv().await.unwrap().kind, EventKind::Started);
        let exited = rx.recv().await.unwrap();
        assert_eq!(exited.kind, EventKind::Exited);
        assert_eq!(exited.code, Some(1));
    }

    #[tokio::test]
    async fn test_publish_without_receivers_does_not_panic() {
        let bus = Bus::new(4);
        bus.publish(Event::new(EventKind::BackupStarted));
    }
}
