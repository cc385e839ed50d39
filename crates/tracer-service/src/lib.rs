//! Runner for the proximity tracer coordination core.
//!
//! This crate wires [`tracer_core::TracerCoordinator`] to:
//! - A simulated radio configured from the `[radio]` section
//! - HTTP identity lookup and upload endpoints, or offline stand-ins when no
//!   URL is configured
//! - A JSON-lines discovery event stream read from a file or stdin
//!
//! # Configuration
//!
//! The service reads configuration from `~/.config/tracer/service.toml`:
//!
//! ```toml
//! [identity]
//! user_id = "3f0c2a9e"
//! onboarded = true
//!
//! [endpoints]
//! lookup_url = "https://tracer.example.org/api"
//! upload_url = "https://collector.example.org"
//! timeout_secs = 10
//!
//! [buffer]
//! max_observations = 10000
//! event_capacity = 1024
//!
//! [radio]
//! available = true
//! location_permission = true
//! can_enable = true
//! multiple_advertisement = true
//! service_enabled = false
//! ```

pub mod config;
pub mod offline;
pub mod radio;
pub mod replay;

pub use config::{
    BufferConfig, Config, ConfigError, EndpointsConfig, IdentityConfig, RadioConfig,
    ValidationError, default_config_path,
};
pub use offline::{LogUploader, OfflineLookup};
pub use radio::SimulatedRadio;
pub use replay::{ReplayStats, replay};
