//! Trait abstractions for the collaborators the core talks to.
//!
//! The radio driver, the permission dialog, the identity lookup endpoint and
//! the upload endpoint all live outside this crate. The coordinator only sees
//! them through these traits, which lets tests swap in the types from
//! [`crate::mock`].
//!
//! # Example
//!
//! ```ignore
//! use tracer_core::{RadioControl, Result};
//!
//! async fn report<R: RadioControl>(radio: &R) -> Result<()> {
//!     if radio.is_available().await? {
//!         println!("service enabled: {}", radio.is_service_enabled().await?);
//!     }
//!     Ok(())
//! }
//! ```

use async_trait::async_trait;
use time::OffsetDateTime;

use tracer_types::{BeaconIdentity, Observation};

use crate::error::Result;

/// Control surface of the platform radio and its background service.
///
/// The persisted "service enabled" flag lives behind this trait; the
/// coordinator only keeps an advisory copy.
#[async_trait]
pub trait RadioControl: Send + Sync {
    // --- Hardware ---

    /// Whether the radio hardware is present.
    async fn is_available(&self) -> Result<bool>;

    /// Ask the user/system to switch the radio on. Returns whether it is on.
    async fn try_enable_radio(&self) -> Result<bool>;

    /// Whether multiple simultaneous advertisement is supported.
    async fn is_multiple_advertisement_supported(&self) -> Result<bool>;

    // --- Identity ---

    /// Hand the anonymized user id to the advertiser.
    async fn set_user_id(&self, user_id: &str) -> Result<()>;

    // --- Background service ---

    /// Read the persisted enabled flag.
    async fn is_service_enabled(&self) -> Result<bool>;

    /// Persist enabled and start the background service.
    async fn enable_service(&self) -> Result<()>;

    /// Persist disabled and stop the background service.
    async fn disable_service(&self) -> Result<()>;

    /// Stop the running service without touching the persisted flag.
    async fn stop_service(&self) -> Result<()>;

    /// Restart the service if it is marked enabled but not running.
    async fn refresh_service_status(&self) -> Result<()>;
}

/// Grants runtime permissions.
#[async_trait]
pub trait PermissionGrantor: Send + Sync {
    /// Request the location permission required for scanning.
    async fn request_location_permission(&self) -> Result<bool>;
}

/// Resolves a beacon identity to an anonymized identifier.
#[async_trait]
pub trait IdentityLookup: Send + Sync {
    /// Look up a beacon. `Ok(None)` means the endpoint returned no identifier.
    async fn lookup(&self, beacon: &BeaconIdentity) -> Result<Option<String>>;
}

/// Best-effort sink for observation batches.
#[async_trait]
pub trait Uploader: Send + Sync {
    /// Upload one batch.
    async fn upload(&self, batch: &[Observation]) -> Result<()>;
}

/// Source of wall-clock time.
pub trait Clock: Send + Sync {
    /// The current instant.
    fn now(&self) -> OffsetDateTime;
}

/// [`Clock`] backed by the system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}
