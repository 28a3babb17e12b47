//! The fan-out hub

use crate::stats::{HubMetrics, HubMetricsSnapshot};
use crate::subscriber::{DeliveryError, Subscriber, SubscriberId};
use crate::transport::{PushTransport, TransportSettings};
use deskwire_core::{Event, Topic};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::{Arc, OnceLock};
use tracing::{debug, info, warn};

/// Anything that can publish a change event on behalf of a mutation.
///
/// Implementations must never block or fail the caller; the return value
/// only says whether somebody was listening.
pub trait Notifier: Send + Sync {
    fn notify(&self, event: Event) -> bool;
}

/// Outcome of one broadcast
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BroadcastReport {
    /// Registry size when the broadcast started, whatever their topics
    pub registered: usize,
    /// Subscribers the event was addressed to
    pub recipients: usize,
    /// Successful writes
    pub delivered: usize,
    /// Writes skipped because the subscriber's buffer was full
    pub dropped: usize,
    /// Subscribers removed because their handle was closed
    pub pruned: usize,
}

impl BroadcastReport {
    /// Whether any realtime client was connected. A subscriber scoped to
    /// another topic still counts.
    pub fn had_subscribers(&self) -> bool {
        self.registered > 0
    }
}

/// Registry of live subscribers shared by the push and stream transports
pub struct FanoutHub {
    subscribers: Mutex<Vec<Subscriber>>,
    transport: OnceLock<Arc<PushTransport>>,
    metrics: HubMetrics,
}

impl FanoutHub {
    pub fn new() -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
            transport: OnceLock::new(),
            metrics: HubMetrics::new(),
        }
    }

    /// Set up the transport once. Later calls return the existing instance
    /// and ignore `settings`.
    pub fn initialize(&self, settings: TransportSettings) -> Arc<PushTransport> {
        let mut created = false;
        let transport = self.transport.get_or_init(|| {
            created = true;
            Arc::new(PushTransport::new(settings))
        });

        if created {
            info!(
                instance = %transport.instance_id(),
                origins = ?transport.settings().allowed_origins,
                "Realtime transport initialized"
            );
        } else {
            debug!(instance = %transport.instance_id(), "Realtime transport already initialized, reusing");
        }

        Arc::clone(transport)
    }

    pub fn transport(&self) -> Option<Arc<PushTransport>> {
        self.transport.get().cloned()
    }

    pub fn is_initialized(&self) -> bool {
        self.transport.get().is_some()
    }

    /// Add a subscriber. Registering the same subscriber twice keeps two
    /// entries; both are removed by a single `unregister`.
    pub fn register(&self, subscriber: Subscriber) -> SubscriberId {
        let id = subscriber.id;
        let kind = subscriber.kind;
        let active = {
            let mut subscribers = self.subscribers.lock();
            subscribers.push(subscriber);
            subscribers.len()
        };

        self.metrics.record_registration(active);
        debug!(subscriber = %id, ?kind, active, "Subscriber registered");
        id
    }

    /// Remove a subscriber. Returns false if it was not registered.
    pub fn unregister(&self, id: SubscriberId) -> bool {
        let (removed, active) = {
            let mut subscribers = self.subscribers.lock();
            let before = subscribers.len();
            subscribers.retain(|s| s.id != id);
            (before != subscribers.len(), subscribers.len())
        };

        if removed {
            self.metrics.record_unregistration(active);
            debug!(subscriber = %id, active, "Subscriber unregistered");
        }
        removed
    }

    /// Restrict a subscriber to `topic` (plus any topic joined before)
    pub fn join(&self, id: SubscriberId, topic: Topic) -> bool {
        self.with_subscriber(id, |s| s.join(topic))
    }

    pub fn leave(&self, id: SubscriberId, topic: Topic) -> bool {
        self.with_subscriber(id, |s| s.leave(topic))
    }

    fn with_subscriber(&self, id: SubscriberId, mut f: impl FnMut(&mut Subscriber)) -> bool {
        let mut subscribers = self.subscribers.lock();
        let mut found = false;
        for subscriber in subscribers.iter_mut().filter(|s| s.id == id) {
            f(subscriber);
            found = true;
        }
        found
    }

    pub fn contains(&self, id: SubscriberId) -> bool {
        self.subscribers.lock().iter().any(|s| s.id == id)
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }

    /// Deliver `event` to every interested subscriber.
    ///
    /// Works on a snapshot of the registry so connects and disconnects that
    /// race with the loop neither skip nor double-notify anyone. Closed
    /// subscribers are pruned after the loop.
    pub fn broadcast(&self, event: Event) -> BroadcastReport {
        if !self.is_initialized() {
            debug!(kind = %event.kind(), "Realtime transport not initialized, skipping broadcast");
            return BroadcastReport::default();
        }

        let (registered, snapshot) = {
            let subscribers = self.subscribers.lock();
            let snapshot: Vec<Subscriber> = subscribers
                .iter()
                .filter(|s| s.wants(&event))
                .cloned()
                .collect();
            (subscribers.len(), snapshot)
        };

        let kind = event.kind();
        let event = Arc::new(event);
        let mut report = BroadcastReport {
            registered,
            recipients: snapshot.len(),
            ..Default::default()
        };
        let mut dead: Vec<SubscriberId> = Vec::new();

        for subscriber in &snapshot {
            match subscriber.deliver(&event) {
                Ok(()) => report.delivered += 1,
                Err(DeliveryError::Lagging) => {
                    report.dropped += 1;
                    warn!(subscriber = %subscriber.id, %kind, "Subscriber lagging, event dropped");
                }
                Err(DeliveryError::Closed) => {
                    debug!(subscriber = %subscriber.id, %kind, "Subscriber closed, pruning");
                    dead.push(subscriber.id);
                }
            }
        }

        let active = {
            let mut subscribers = self.subscribers.lock();
            if !dead.is_empty() {
                let before = subscribers.len();
                subscribers.retain(|s| !dead.contains(&s.id));
                report.pruned = before - subscribers.len();
            }
            subscribers.len()
        };

        self.metrics.record_broadcast(&report, active);
        debug!(
            %kind,
            registered = report.registered,
            recipients = report.recipients,
            delivered = report.delivered,
            pruned = report.pruned,
            "Broadcast complete"
        );
        report
    }

    pub fn metrics(&self) -> HubMetricsSnapshot {
        self.metrics.snapshot()
    }
}

impl Default for FanoutHub {
    fn default() -> Self {
        Self::new()
    }
}

impl Notifier for FanoutHub {
    fn notify(&self, event: Event) -> bool {
        self.broadcast(event).had_subscribers()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subscriber::{ChannelSink, SubscriberSink, TransportKind};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct BrokenSink;

    impl SubscriberSink for BrokenSink {
        fn deliver(&self, _event: &Arc<Event>) -> Result<(), DeliveryError> {
            Err(DeliveryError::Closed)
        }
    }

    #[derive(Default)]
    struct CountingSink(AtomicUsize);

    impl SubscriberSink for CountingSink {
        fn deliver(&self, _event: &Arc<Event>) -> Result<(), DeliveryError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn ready_hub() -> FanoutHub {
        let hub = FanoutHub::new();
        hub.initialize(TransportSettings::default());
        hub
    }

    fn event() -> Event {
        Event::NoticeDeleted { id: 42 }
    }

    #[test]
    fn test_initialize_is_idempotent() {
        let hub = FanoutHub::new();
        let first = hub.initialize(TransportSettings::default());
        let second = hub.initialize(TransportSettings {
            subscriber_buffer: 1,
            ..Default::default()
        });

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.settings().subscriber_buffer, 64);
    }

    #[test]
    fn test_broadcast_before_initialize_is_noop() {
        let hub = FanoutHub::new();
        let sink = Arc::new(CountingSink::default());
        hub.register(Subscriber::new(TransportKind::Push, sink.clone()));

        let report = hub.broadcast(event());

        assert!(!report.had_subscribers());
        assert_eq!(sink.0.load(Ordering::SeqCst), 0);
        assert_eq!(hub.subscriber_count(), 1);
    }

    #[test]
    fn test_broadcast_without_subscribers() {
        let hub = ready_hub();
        let report = hub.broadcast(event());
        assert_eq!(report, BroadcastReport::default());
        assert!(!hub.notify(event()));
    }

    #[test]
    fn test_dead_subscribers_are_pruned_and_rest_delivered() {
        let hub = ready_hub();
        let healthy: Vec<Arc<CountingSink>> = (0..3).map(|_| Arc::new(CountingSink::default())).collect();
        for sink in &healthy {
            hub.register(Subscriber::new(TransportKind::Push, sink.clone()));
        }
        let broken_a = hub.register(Subscriber::new(TransportKind::Push, Arc::new(BrokenSink)));
        let broken_b = hub.register(Subscriber::new(TransportKind::Stream, Arc::new(BrokenSink)));

        let report = hub.broadcast(event());

        assert_eq!(report.recipients, 5);
        assert_eq!(report.delivered, 3);
        assert_eq!(report.pruned, 2);
        assert!(!hub.contains(broken_a));
        assert!(!hub.contains(broken_b));
        assert_eq!(hub.subscriber_count(), 3);
        for sink in &healthy {
            assert_eq!(sink.0.load(Ordering::SeqCst), 1);
        }
    }

    #[test]
    fn test_failing_handle_removed_healthy_gets_exactly_one() {
        let hub = ready_hub();
        let (sink, mut rx) = ChannelSink::channel(8);
        let healthy = hub.register(Subscriber::new(TransportKind::Push, Arc::new(sink)));
        let broken = hub.register(Subscriber::new(TransportKind::Push, Arc::new(BrokenSink)));

        let report = hub.broadcast(event());

        assert!(report.had_subscribers());
        assert!(!hub.contains(broken));
        assert!(hub.contains(healthy));
        assert_eq!(*rx.try_recv().unwrap(), event());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_dropped_receiver_is_pruned() {
        let hub = ready_hub();
        let (sink, rx) = ChannelSink::channel(8);
        let id = hub.register(Subscriber::new(TransportKind::Stream, Arc::new(sink)));
        drop(rx);

        let report = hub.broadcast(event());
        assert_eq!(report.pruned, 1);
        assert!(!hub.contains(id));
    }

    #[test]
    fn test_lagging_subscriber_is_kept() {
        let hub = ready_hub();
        let (sink, _rx) = ChannelSink::channel(1);
        let id = hub.register(Subscriber::new(TransportKind::Push, Arc::new(sink)));

        hub.broadcast(event());
        let report = hub.broadcast(event());

        assert_eq!(report.dropped, 1);
        assert_eq!(report.pruned, 0);
        assert!(hub.contains(id));
    }

    #[test]
    fn test_duplicate_registration_and_repeated_unregister() {
        let hub = ready_hub();
        let sink = Arc::new(CountingSink::default());
        let subscriber = Subscriber::new(TransportKind::Push, sink.clone());
        let id = hub.register(subscriber.clone());
        hub.register(subscriber);

        hub.broadcast(event());
        assert_eq!(sink.0.load(Ordering::SeqCst), 2);

        assert!(hub.unregister(id));
        assert!(!hub.unregister(id));
        assert_eq!(hub.subscriber_count(), 0);
    }

    #[test]
    fn test_joined_topic_scopes_delivery() {
        let hub = ready_hub();
        let sink = Arc::new(CountingSink::default());
        let id = hub.register(Subscriber::new(TransportKind::Push, sink.clone()));
        assert!(hub.join(id, Topic::Tickets));

        let report = hub.broadcast(event());
        assert_eq!(report.recipients, 0);
        assert_eq!(sink.0.load(Ordering::SeqCst), 0);
        // Listening, just not to this topic
        assert!(report.had_subscribers());
        assert!(hub.notify(event()));

        assert!(hub.leave(id, Topic::Tickets));
        assert!(hub.join(id, Topic::Notices));
        hub.broadcast(event());
        assert_eq!(sink.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_metrics_accumulate() {
        let hub = ready_hub();
        hub.register(Subscriber::new(TransportKind::Push, Arc::new(BrokenSink)));
        hub.broadcast(event());
        hub.broadcast(event());

        let snapshot = hub.metrics();
        assert_eq!(snapshot.broadcasts, 2);
        assert_eq!(snapshot.pruned, 1);
        assert_eq!(snapshot.registrations, 1);
    }
}
