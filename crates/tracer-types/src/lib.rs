//! Platform-agnostic types for the proximity contact tracer.
//!
//! This crate provides the data model shared by the coordination core
//! (tracer-core) and the service binary (tracer-service).
//!
//! # Features
//!
//! - Beacon identities with a validated, unambiguous canonical key
//! - Observations: normalized discovery records with a timestamp
//! - Service lifecycle state and capability flags
//! - Discovery events as published by the radio layer
//!
//! # Example
//!
//! ```
//! use tracer_types::{BeaconIdentity, DiscoveryEvent, EventKind};
//!
//! let beacon = BeaconIdentity::new("f7826da6", 10, 3).unwrap();
//! assert_eq!(beacon.cache_key(), "f7826da6.10.3");
//!
//! let event = DiscoveryEvent::NearbyBeacon { uuid: "f7826da6".into(), major: 10, minor: 3 };
//! assert_eq!(event.kind(), EventKind::NearbyBeacon);
//! ```

pub mod error;
pub mod event;
pub mod types;

pub use error::{ParseError, ParseResult};
pub use event::{DiscoveryEvent, EventKind};
pub use types::{
    BeaconIdentity, CapabilityFlags, KEY_SEPARATOR, MAX_UUID_LEN, Observation, ServiceState,
};
