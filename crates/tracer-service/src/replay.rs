//! JSON-lines discovery event replay.
//!
//! Each non-empty line holds one event, tagged by `type`:
//!
//! ```text
//! {"type":"nearby_device","name":"Pixel 7","rssi":-70}
//! {"type":"nearby_beacon","uuid":"f7826da6","major":10,"minor":3}
//! {"type":"advertiser_message","message":"advertising started"}
//! ```
//!
//! Lines starting with `#` are comments.

use std::time::Duration;

use serde::Serialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{debug, warn};

use tracer_core::{DiscoveryEvent, DiscoveryEvents, EventKind};

/// Outcome of a replay.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReplayStats {
    /// Events handed to the dispatcher.
    pub published: usize,
    /// Lines that could not be decoded into a valid event.
    pub malformed: usize,
}

/// Publish every event read from `reader`.
///
/// Waits for subscribers to catch up whenever a channel is half full, so
/// listeners slowed down by lookups do not lose events.
pub async fn replay<R>(reader: R, events: &DiscoveryEvents) -> std::io::Result<ReplayStats>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut stats = ReplayStats::default();
    let mut line_number = 0usize;

    while let Some(line) = lines.next_line().await? {
        line_number += 1;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        match DiscoveryEvent::from_json(line) {
            Ok(event) => {
                let kind = event.kind();
                debug!("Replaying {} event from line {}", kind, line_number);
                events.publish(event);
                stats.published += 1;
                wait_for_room(events, kind).await;
            }
            Err(e) => {
                warn!("Skipping line {}: {}", line_number, e);
                stats.malformed += 1;
            }
        }
    }

    Ok(stats)
}

async fn wait_for_room(events: &DiscoveryEvents, kind: EventKind) {
    let high_water = (events.capacity() / 2).max(1);
    while events.queued(kind) >= high_water {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::BufReader;

    #[tokio::test]
    async fn test_replay_skips_comments_and_bad_lines() {
        let input = br#"
# recorded on the bus
{"type":"nearby_device","name":"Pixel 7","rssi":-70}
{"type":"nearby_device","name":"","rssi":-70}
not json
{"type":"nearby_beacon","uuid":"A","major":1,"minor":2}
"#;
        let events = DiscoveryEvents::new(16);
        let mut devices = events.subscribe(EventKind::NearbyDevice);
        let mut beacons = events.subscribe(EventKind::NearbyBeacon);

        let stats = replay(BufReader::new(&input[..]), &events).await.unwrap();

        assert_eq!(stats.published, 2);
        assert_eq!(stats.malformed, 2);
        assert!(matches!(
            devices.recv().await.unwrap(),
            DiscoveryEvent::NearbyDevice { .. }
        ));
        assert_eq!(beacons.recv().await.unwrap().kind(), EventKind::NearbyBeacon);
    }

    #[tokio::test]
    async fn test_replay_without_subscribers_does_not_block() {
        let input = br#"{"type":"advertiser_message","message":"hello"}
{"type":"advertiser_message","message":"again"}"#;
        let events = DiscoveryEvents::new(1);

        let stats = replay(BufReader::new(&input[..]), &events).await.unwrap();
        assert_eq!(stats.published, 2);
    }
}
