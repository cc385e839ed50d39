//! Example: A Tracing Session Against Mock Collaborators
//!
//! This example enables the coordinator, feeds it a few discovery events,
//! advances a manual clock past the batch window and prints what was
//! uploaded along with the capability trace.
//!
//! Run with: `RUST_LOG=debug cargo run -p tracer-core --example mock_session`

use std::sync::Arc;

use time::macros::datetime;

use tracer_core::mock::{ManualClock, MockLookup, MockPermissions, MockRadio, MockUploader};
use tracer_core::{
    BATCH_WINDOW, BeaconIdentity, Collaborators, CoordinatorConfig, DiscoveryEvent,
    TracerCoordinator,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    let radio = Arc::new(MockRadio::new());
    let lookup = Arc::new(MockLookup::new());
    let uploader = Arc::new(MockUploader::new());
    let clock = Arc::new(ManualClock::new(datetime!(2024-05-01 08:00 UTC)));

    let beacon = BeaconIdentity::new("f7826da6-4fa2-4e98-8024-bc5b71e0893e", 10, 3)?;
    lookup.set_response(&beacon, "anon-42").await;

    let config = CoordinatorConfig {
        user_id: Some("demo-user".to_string()),
        ..CoordinatorConfig::default()
    };
    let collaborators = Collaborators::new(
        radio.clone(),
        Arc::new(MockPermissions::granted()),
        lookup,
        uploader.clone(),
    )
    .with_clock(clock.clone());
    let coordinator = TracerCoordinator::new(config, collaborators)?;

    coordinator.enable().await;
    println!("State: {}", coordinator.state().await);
    println!();

    coordinator
        .handle_event(DiscoveryEvent::NearbyDevice {
            name: "Pixel 7".to_string(),
            rssi: -68,
        })
        .await;
    coordinator
        .handle_event(DiscoveryEvent::NearbyBeacon {
            uuid: beacon.uuid().to_string(),
            major: beacon.major(),
            minor: beacon.minor(),
        })
        .await;

    // The next observation finds the oldest one stale and ships the batch.
    clock.advance(BATCH_WINDOW + time::Duration::seconds(1));
    coordinator
        .handle_event(DiscoveryEvent::NearbyDevice {
            name: "Galaxy S23".to_string(),
            rssi: -81,
        })
        .await;

    for (i, batch) in uploader.batches().await.iter().enumerate() {
        println!("Batch {}:", i + 1);
        for observation in batch {
            println!("  {} at {}", observation.label(), observation.observed_at());
        }
    }
    println!("Still buffered: {}", coordinator.buffer().len().await);
    println!();

    println!("Capability trace (newest first):");
    println!("{}", coordinator.trace().render().await);

    coordinator.disable().await;
    println!();
    println!("State: {}", coordinator.state().await);

    Ok(())
}
