use crate::core::protocol::ServerEvent;
use crate::domain::model::ConnectionId;
use std::collections::HashMap;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

pub type EventSender = mpsc::Sender<ServerEvent>;
pub type EventReceiver = mpsc::Receiver<ServerEvent>;

/// Events an observer may have queued before it is dropped as lagging.
pub const OBSERVER_QUEUE_CAPACITY: usize = 256;

/// Queue for one observer.
pub fn observer_channel() -> (EventSender, EventReceiver) {
    mpsc::channel(OBSERVER_QUEUE_CAPACITY)
}

/// Fan-out to every connected observer.
///
/// Each observer has its own bounded queue and only the engine task pushes
/// into it, so all observers see events in commit order. The engine never
/// waits on an observer: a closed or full queue is dropped on the spot, which
/// ends that connection's writer.
#[derive(Debug, Default)]
pub struct Broadcaster {
    observers: HashMap<ConnectionId, EventSender>,
}

impl Broadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, connection: ConnectionId, sender: EventSender) {
        self.observers.insert(connection, sender);
    }

    pub fn unregister(&mut self, connection: ConnectionId) -> bool {
        self.observers.remove(&connection).is_some()
    }

    pub fn publish(&mut self, event: ServerEvent) -> usize {
        let mut stale = Vec::new();
        for (connection, sender) in &self.observers {
            if let Err(e) = sender.try_send(event.clone()) {
                stale.push((*connection, e));
            }
        }
        for (connection, e) in stale {
            self.drop_observer(connection, &e);
        }

        let delivered = self.observers.len();
        tracing::debug!("📣 {} delivered to {} observer(s)", event.name(), delivered);
        delivered
    }

    /// Sends to a single observer (snapshots and errors).
    pub fn send_to(&mut self, connection: ConnectionId, event: ServerEvent) -> bool {
        let Some(sender) = self.observers.get(&connection) else {
            return false;
        };
        if let Err(e) = sender.try_send(event) {
            self.drop_observer(connection, &e);
            return false;
        }
        true
    }

    fn drop_observer(&mut self, connection: ConnectionId, error: &TrySendError<ServerEvent>) {
        self.observers.remove(&connection);
        match error {
            TrySendError::Full(_) => tracing::warn!(
                "⚠️ Dropped lagging observer {} ({} events queued)",
                connection,
                OBSERVER_QUEUE_CAPACITY
            ),
            TrySendError::Closed(_) => tracing::debug!("Dropped closed observer {}", connection),
        }
    }

    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_reaches_all_in_order() {
        let mut broadcaster = Broadcaster::new();
        let (tx_a, mut rx_a) = observer_channel();
        let (tx_b, mut rx_b) = observer_channel();
        broadcaster.register(ConnectionId(1), tx_a);
        broadcaster.register(ConnectionId(2), tx_b);

        for counter in 0..3 {
            assert_eq!(
                broadcaster.publish(ServerEvent::CounterReset {
                    daily_counter: counter
                }),
                2
            );
        }

        for rx in [&mut rx_a, &mut rx_b] {
            for expected in 0..3 {
                assert_eq!(
                    rx.try_recv().unwrap(),
                    ServerEvent::CounterReset {
                        daily_counter: expected
                    }
                );
            }
            assert!(rx.try_recv().is_err());
        }
    }

    #[test]
    fn test_closed_observer_is_dropped() {
        let mut broadcaster = Broadcaster::new();
        let (tx_a, rx_a) = observer_channel();
        let (tx_b, mut rx_b) = observer_channel();
        broadcaster.register(ConnectionId(1), tx_a);
        broadcaster.register(ConnectionId(2), tx_b);
        drop(rx_a);

        assert_eq!(broadcaster.publish(ServerEvent::CounterReset { daily_counter: 0 }), 1);
        assert_eq!(broadcaster.observer_count(), 1);
        assert!(rx_b.try_recv().is_ok());
    }

    #[test]
    fn test_send_to_targets_one_observer() {
        let mut broadcaster = Broadcaster::new();
        let (tx_a, mut rx_a) = observer_channel();
        let (tx_b, mut rx_b) = observer_channel();
        broadcaster.register(ConnectionId(1), tx_a);
        broadcaster.register(ConnectionId(2), tx_b);

        assert!(broadcaster.send_to(
            ConnectionId(2),
            ServerEvent::Error {
                kind: "NoActiveItem".to_string(),
                message: "No item is registered".to_string()
            }
        ));
        assert!(!broadcaster.send_to(ConnectionId(9), ServerEvent::CounterReset { daily_counter: 0 }));
        assert!(rx_a.try_recv().is_err());
        assert!(rx_b.try_recv().is_ok());
    }

    #[test]
    fn test_lagging_observer_is_dropped() {
        let mut broadcaster = Broadcaster::new();
        let (tx_slow, mut rx_slow) = mpsc::channel(2);
        let (tx_fast, mut rx_fast) = observer_channel();
        broadcaster.register(ConnectionId(1), tx_slow);
        broadcaster.register(ConnectionId(2), tx_fast);

        assert_eq!(broadcaster.publish(ServerEvent::CounterReset { daily_counter: 0 }), 2);
        assert_eq!(broadcaster.publish(ServerEvent::CounterReset { daily_counter: 1 }), 2);
        assert_eq!(broadcaster.publish(ServerEvent::CounterReset { daily_counter: 2 }), 1);
        assert_eq!(broadcaster.observer_count(), 1);

        // 已排入的事件仍可讀完，之後佇列關閉
        assert!(rx_slow.try_recv().is_ok());
        assert!(rx_slow.try_recv().is_ok());
        assert!(matches!(
            rx_slow.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        ));
        for _ in 0..3 {
            assert!(rx_fast.try_recv().is_ok());
        }
        assert!(!broadcaster.send_to(ConnectionId(1), ServerEvent::CounterReset { daily_counter: 3 }));
    }
}
