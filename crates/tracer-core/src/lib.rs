//! Coordination core for a proximity contact-tracing client.
//!
//! This crate manages the lifecycle of a background proximity-detection
//! service, processes the stream of nearby device and beacon discoveries,
//! resolves beacon identities through a time-bounded cache, and decides when
//! buffered observations are uploaded.
//!
//! # Features
//!
//! - **Lifecycle state machine**: pure transitions returning side-effect
//!   commands, executed by [`TracerCoordinator`]
//! - **Capability probe**: ordered radio/permission negotiation with a
//!   human-readable [`CapabilityTrace`]
//! - **Identity cache**: 24 hour TTL, single-flight lookups, no negative
//!   caching
//! - **Observation buffer**: time-ordered, uploads once the oldest entry is
//!   older than 30 minutes
//! - **Event routing**: one listener per discovery event kind, attached and
//!   detached as a single [`Attachment`]
//! - **HTTP endpoints** (`http` feature): lookup and upload over reqwest
//!
//! The radio, the permission dialog and the network endpoints are reached
//! only through the traits in [`traits`]; [`mock`] provides in-memory
//! versions for tests.
//!
//! # Quick Start
//!
//! ```
//! use std::sync::Arc;
//! use tracer_core::mock::{MockLookup, MockPermissions, MockRadio, MockUploader};
//! use tracer_core::{Collaborators, CoordinatorConfig, TracerCoordinator};
//! use tracer_types::DiscoveryEvent;
//!
//! # #[tokio::main]
//! # async fn main() -> tracer_core::Result<()> {
//! let coordinator = Arc::new(TracerCoordinator::new(
//!     CoordinatorConfig::default(),
//!     Collaborators::new(
//!         Arc::new(MockRadio::new()),
//!         Arc::new(MockPermissions::granted()),
//!         Arc::new(MockLookup::new()),
//!         Arc::new(MockUploader::new()),
//!     ),
//! )?);
//!
//! coordinator.enable().await;
//! coordinator
//!     .handle_event(DiscoveryEvent::NearbyDevice { name: "Pixel 7".into(), rssi: -70 })
//!     .await;
//! assert_eq!(coordinator.buffer().len().await, 1);
//! # Ok(())
//! # }
//! ```

pub mod buffer;
pub mod coordinator;
pub mod error;
pub mod events;
pub mod guard;
#[cfg(feature = "http")]
pub mod http;
pub mod identity;
pub mod lifecycle;
pub mod mock;
pub mod probe;
pub mod trace;
pub mod traits;

pub use buffer::{BATCH_WINDOW, BufferStats, DEFAULT_MAX_BUFFERED, ObservationBuffer};
pub use coordinator::{
    Collaborators, CoordinatorConfig, CoordinatorStats, ServiceStatus, TracerCoordinator,
};
pub use error::{Error, Result};
pub use events::{DEFAULT_EVENT_CAPACITY, DiscoveryEvents, EventReceiver, EventSender, EventSubscriptions};
pub use guard::Attachment;
#[cfg(feature = "http")]
pub use http::{HttpIdentityLookup, HttpUploader};
pub use identity::{CacheStats, IDENTITY_TTL, IdentityCache};
pub use lifecycle::{Command, Lifecycle, LifecycleEvent, ProbeStatus, Transition, transition};
pub use probe::run_probe;
pub use trace::{CapabilityTrace, DEFAULT_TRACE_LINES};
pub use traits::{Clock, IdentityLookup, PermissionGrantor, RadioControl, SystemClock, Uploader};

// Re-export the data model
pub use tracer_types::{
    BeaconIdentity, CapabilityFlags, DiscoveryEvent, EventKind, Observation, ServiceState,
};
