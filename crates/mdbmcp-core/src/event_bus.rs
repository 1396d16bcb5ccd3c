//! Typed event distribution.
//!
//! Connection, session, and export lifecycle changes all flow over
//! broadcast channels so that observers (the session, the transports, the
//! telemetry service) hold no back-reference to the emitter beyond the
//! channel itself.

use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Default channel capacity for an event bus.
const DEFAULT_CAPACITY: usize = 256;

/// A broadcast bus for one event family.
///
/// Each subscriber gets its own copy of every event emitted after
/// subscription, in emission order.
#[derive(Clone)]
pub struct EventBus<E: Clone> {
    sender: broadcast::Sender<E>,
}

impl<E: Clone + std::fmt::Debug> EventBus<E> {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Emit an event. Returns the number of receivers; 0 when no one is
    /// listening, which is not an error.
    pub fn emit(&self, event: E) -> usize {
        match self.sender.send(event) {
            Ok(count) => count,
            Err(broadcast::error::SendError(event)) => {
                debug!(?event, "[EventBus] No receivers for event");
                0
            }
        }
    }

    pub fn subscribe(&self) -> EventReceiver<E> {
        EventReceiver {
            receiver: self.sender.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl<E: Clone + std::fmt::Debug> Default for EventBus<E> {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiving side of an [`EventBus`] subscription.
pub struct EventReceiver<E: Clone> {
    receiver: broadcast::Receiver<E>,
}

impl<E: Clone> EventReceiver<E> {
    /// Receive the next event. Returns `None` once the channel closes.
    /// Lag is logged and skipped rather than treated as an error.
    pub async fn recv(&mut self) -> Option<E> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped_events = skipped, "[EventBus] Receiver lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    pub fn try_recv(&mut self) -> Option<E> {
        match self.receiver.try_recv() {
            Ok(event) => Some(event),
            Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                warn!(skipped_events = skipped, "[EventBus] Receiver lagged on try_recv");
                self.receiver.try_recv().ok()
            }
            Err(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    enum TestEvent {
        A,
        B(u32),
    }

    #[tokio::test]
    async fn delivers_in_order_to_all_subscribers() {
        let bus: EventBus<TestEvent> = EventBus::new();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        bus.emit(TestEvent::A);
        bus.emit(TestEvent::B(7));

        assert_eq!(rx1.recv().await, Some(TestEvent::A));
        assert_eq!(rx1.recv().await, Some(TestEvent::B(7)));
        assert_eq!(rx2.recv().await, Some(TestEvent::A));
        assert_eq!(rx2.recv().await, Some(TestEvent::B(7)));
    }

    #[test]
    fn emit_without_subscribers_returns_zero() {
        let bus: EventBus<TestEvent> = EventBus::new();
        assert_eq!(bus.emit(TestEvent::A), 0);
    }

    #[tokio::test]
    async fn events_before_subscription_are_not_delivered() {
        let bus: EventBus<TestEvent> = EventBus::new();
        bus.emit(TestEvent::A);
        let mut rx = bus.subscribe();
        bus.emit(TestEvent::B(1));
        assert_eq!(rx.recv().await, Some(TestEvent::B(1)));
    }
}
