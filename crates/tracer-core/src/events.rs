//! Discovery event channels.
//!
//! The radio layer publishes three kinds of [`DiscoveryEvent`]. Each kind
//! gets its own broadcast channel, so delivery order is preserved within a
//! kind while kinds are processed independently of each other.

use tokio::sync::broadcast;

use tracer_types::{DiscoveryEvent, EventKind};

/// Default capacity of each per-kind channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 100;

/// Sender for discovery events.
pub type EventSender = broadcast::Sender<DiscoveryEvent>;

/// Receiver for discovery events.
pub type EventReceiver = broadcast::Receiver<DiscoveryEvent>;

/// One receiver per event kind.
#[derive(Debug)]
pub struct EventSubscriptions {
    /// `AdvertiserMessage` events.
    pub advertiser: EventReceiver,
    /// `NearbyDeviceFound` events.
    pub devices: EventReceiver,
    /// `NearbyBeaconFound` events.
    pub beacons: EventReceiver,
}

/// Dispatcher that fans discovery events out to subscribers by kind.
#[derive(Debug, Clone)]
pub struct DiscoveryEvents {
    advertiser: EventSender,
    devices: EventSender,
    beacons: EventSender,
    capacity: usize,
}

impl DiscoveryEvents {
    /// Create a dispatcher whose channels each hold `capacity` events.
    ///
    /// A `capacity` of zero is treated as one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (advertiser, _) = broadcast::channel(capacity);
        let (devices, _) = broadcast::channel(capacity);
        let (beacons, _) = broadcast::channel(capacity);
        Self {
            advertiser,
            devices,
            beacons,
            capacity,
        }
    }

    fn sender(&self, kind: EventKind) -> &EventSender {
        match kind {
            EventKind::AdvertiserMessage => &self.advertiser,
            EventKind::NearbyDevice => &self.devices,
            EventKind::NearbyBeacon => &self.beacons,
        }
    }

    /// Publish an event on the channel of its kind.
    ///
    /// Returns the number of subscribers that will see it.
    pub fn publish(&self, event: DiscoveryEvent) -> usize {
        // No subscribers is not an error.
        self.sender(event.kind()).send(event).unwrap_or(0)
    }

    /// Subscribe to one kind.
    pub fn subscribe(&self, kind: EventKind) -> EventReceiver {
        self.sender(kind).subscribe()
    }

    /// Subscribe to all three kinds at once.
    pub fn subscribe_all(&self) -> EventSubscriptions {
        EventSubscriptions {
            advertiser: self.advertiser.subscribe(),
            devices: self.devices.subscribe(),
            beacons: self.beacons.subscribe(),
        }
    }

    /// Events of one kind not yet seen by every subscriber.
    ///
    /// Publishers that must not outrun slow subscribers can wait for this
    /// to drop below [`capacity`](Self::capacity).
    pub fn queued(&self, kind: EventKind) -> usize {
        self.sender(kind).len()
    }

    /// Capacity of each per-kind channel.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of active subscribers for one kind.
    pub fn receiver_count(&self, kind: EventKind) -> usize {
        self.sender(kind).receiver_count()
    }
}

impl Default for DiscoveryEvents {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_events_routed_by_kind() {
        let events = DiscoveryEvents::default();
        let mut subs = events.subscribe_all();

        events.publish(DiscoveryEvent::NearbyDevice {
            name: "Pixel".into(),
            rssi: -70,
        });
        events.publish(DiscoveryEvent::NearbyBeacon {
            uuid: "A".into(),
            major: 1,
            minor: 2,
        });

        assert_eq!(events.queued(EventKind::NearbyDevice), 1);
        assert_eq!(subs.devices.recv().await.unwrap().kind(), EventKind::NearbyDevice);
        assert_eq!(events.queued(EventKind::NearbyDevice), 0);
        assert_eq!(subs.beacons.recv().await.unwrap().kind(), EventKind::NearbyBeacon);
        assert!(subs.advertiser.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_order_preserved_within_kind() {
        let events = DiscoveryEvents::new(16);
        let mut devices = events.subscribe(EventKind::NearbyDevice);

        for name in ["a", "b", "c"] {
            events.publish(DiscoveryEvent::NearbyDevice {
                name: name.into(),
                rssi: -50,
            });
        }

        for expected in ["a", "b", "c"] {
            match devices.recv().await.unwrap() {
                DiscoveryEvent::NearbyDevice { name, .. } => assert_eq!(name, expected),
                other => panic!("unexpected event {other:?}"),
            }
        }
    }

    #[test]
    fn test_publish_without_subscribers() {
        let events = DiscoveryEvents::default();
        assert_eq!(events.capacity(), DEFAULT_EVENT_CAPACITY);
        let delivered = events.publish(DiscoveryEvent::AdvertiserMessage {
            message: "started".into(),
        });
        assert_eq!(delivered, 0);
        assert_eq!(events.receiver_count(EventKind::AdvertiserMessage), 0);

        let _sub = events.subscribe_all();
        for kind in EventKind::ALL {
            assert_eq!(events.receiver_count(kind), 1);
        }
    }
}
