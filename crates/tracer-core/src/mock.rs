//! Mock collaborators for testing.
//!
//! This module provides in-memory implementations of every collaborator
//! trait so the coordinator can be exercised without a radio, a permission
//! dialog or network endpoints.
//!
//! # Features
//!
//! - **Failure injection**: Make specific operations fail, always or for a
//!   fixed number of calls
//! - **Latency simulation**: Add artificial delays to exercise concurrency
//! - **Call counting**: Assert how often each collaborator was reached
//! - **Manual time**: [`ManualClock`] only moves when the test says so

use std::collections::{HashMap, HashSet};
use std::sync::Mutex as StdMutex;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;

use tracer_types::{BeaconIdentity, Observation};

use crate::error::{Error, Result};
use crate::traits::{Clock, IdentityLookup, PermissionGrantor, RadioControl, Uploader};

async fn simulate_latency(latency_ms: &AtomicU64) {
    let latency = latency_ms.load(Ordering::Relaxed);
    if latency > 0 {
        tokio::time::sleep(Duration::from_millis(latency)).await;
    }
}

/// Take one transient failure if any remain.
fn take_failure(remaining: &AtomicU32) -> bool {
    remaining
        .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1))
        .is_ok()
}

/// A [`Clock`] that only moves when told to.
///
/// # Example
///
/// ```
/// use tracer_core::mock::ManualClock;
/// use tracer_core::Clock;
/// use time::macros::datetime;
///
/// let clock = ManualClock::new(datetime!(2024-05-01 08:00 UTC));
/// clock.advance(time::Duration::minutes(31));
/// assert_eq!(clock.now(), datetime!(2024-05-01 08:31 UTC));
/// ```
#[derive(Debug)]
pub struct ManualClock {
    now: StdMutex<OffsetDateTime>,
}

impl ManualClock {
    /// Create a clock stopped at `start`.
    pub fn new(start: OffsetDateTime) -> Self {
        Self {
            now: StdMutex::new(start),
        }
    }

    /// Move the clock forward (or back, for a negative duration).
    pub fn advance(&self, by: time::Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }

    /// Jump to an arbitrary instant.
    pub fn set(&self, to: OffsetDateTime) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> OffsetDateTime {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// In-memory identity lookup endpoint.
///
/// Unknown beacons resolve to `Ok(None)`.
pub struct MockLookup {
    responses: RwLock<HashMap<String, String>>,
    call_count: AtomicU32,
    should_fail: AtomicBool,
    remaining_failures: AtomicU32,
    latency_ms: AtomicU64,
}

impl std::fmt::Debug for MockLookup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockLookup")
            .field("call_count", &self.call_count())
            .field("should_fail", &self.should_fail.load(Ordering::Relaxed))
            .finish()
    }
}

impl Default for MockLookup {
    fn default() -> Self {
        Self::new()
    }
}

impl MockLookup {
    /// Create a lookup that knows no beacons.
    pub fn new() -> Self {
        Self {
            responses: RwLock::new(HashMap::new()),
            call_count: AtomicU32::new(0),
            should_fail: AtomicBool::new(false),
            remaining_failures: AtomicU32::new(0),
            latency_ms: AtomicU64::new(0),
        }
    }

    /// Answer `anonymous_id` for `beacon`.
    pub async fn set_response(&self, beacon: &BeaconIdentity, anonymous_id: &str) {
        self.responses
            .write()
            .await
            .insert(beacon.cache_key(), anonymous_id.to_string());
    }

    /// Make every lookup fail.
    pub fn set_should_fail(&self, fail: bool) {
        self.should_fail.store(fail, Ordering::Relaxed);
    }

    /// Fail the next `count` lookups, then answer normally.
    pub fn set_transient_failures(&self, count: u32) {
        self.remaining_failures.store(count, Ordering::Relaxed);
    }

    /// Delay every lookup.
    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::Relaxed);
    }

    /// Number of lookups received, failed ones included.
    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl IdentityLookup for MockLookup {
    async fn lookup(&self, beacon: &BeaconIdentity) -> Result<Option<String>> {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        simulate_latency(&self.latency_ms).await;

        if take_failure(&self.remaining_failures) || self.should_fail.load(Ordering::Relaxed) {
            return Err(Error::lookup(beacon.cache_key(), "mock failure"));
        }
        Ok(self.responses.read().await.get(&beacon.cache_key()).cloned())
    }
}

/// Upload endpoint that records every batch it receives.
pub struct MockUploader {
    batches: RwLock<Vec<Vec<Observation>>>,
    should_fail: AtomicBool,
}

impl std::fmt::Debug for MockUploader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockUploader")
            .field("should_fail", &self.should_fail.load(Ordering::Relaxed))
            .finish()
    }
}

impl Default for MockUploader {
    fn default() -> Self {
        Self::new()
    }
}

impl MockUploader {
    /// Create an uploader that accepts everything.
    pub fn new() -> Self {
        Self {
            batches: RwLock::new(Vec::new()),
            should_fail: AtomicBool::new(false),
        }
    }

    /// Reject every batch (batches are still recorded).
    pub fn set_should_fail(&self, fail: bool) {
        self.should_fail.store(fail, Ordering::Relaxed);
    }

    /// Every batch received so far, in order.
    pub async fn batches(&self) -> Vec<Vec<Observation>> {
        self.batches.read().await.clone()
    }

    /// Number of upload attempts, rejected ones included.
    pub async fn upload_count(&self) -> usize {
        self.batches.read().await.len()
    }
}

#[async_trait]
impl Uploader for MockUploader {
    async fn upload(&self, batch: &[Observation]) -> Result<()> {
        self.batches.write().await.push(batch.to_vec());
        if self.should_fail.load(Ordering::Relaxed) {
            return Err(Error::upload(batch.len(), "mock failure"));
        }
        Ok(())
    }
}

/// Simulated radio and background service.
///
/// Defaults to a present radio that can be switched on and supports
/// multiple advertisement, with the service persisted as disabled.
///
/// # Example
///
/// ```
/// use tracer_core::mock::MockRadio;
/// use tracer_core::RadioControl;
///
/// # #[tokio::main]
/// # async fn main() {
/// let radio = MockRadio::new();
/// radio.fail_operation("is_available").await;
/// assert!(radio.is_available().await.is_err());
/// # }
/// ```
pub struct MockRadio {
    available: AtomicBool,
    can_enable_radio: AtomicBool,
    radio_on: AtomicBool,
    multiple_advertisement: AtomicBool,
    service_enabled: AtomicBool,
    service_running: AtomicBool,
    user_id: RwLock<Option<String>>,
    failing: RwLock<HashSet<&'static str>>,
    latency_ms: AtomicU64,
    enable_calls: AtomicU32,
    disable_calls: AtomicU32,
    stop_calls: AtomicU32,
    refresh_calls: AtomicU32,
    set_user_id_calls: AtomicU32,
}

impl std::fmt::Debug for MockRadio {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockRadio")
            .field("available", &self.available.load(Ordering::Relaxed))
            .field("service_enabled", &self.service_enabled())
            .field("service_running", &self.service_running())
            .finish()
    }
}

impl Default for MockRadio {
    fn default() -> Self {
        Self::new()
    }
}

impl MockRadio {
    /// Create a healthy radio.
    pub fn new() -> Self {
        Self {
            available: AtomicBool::new(true),
            can_enable_radio: AtomicBool::new(true),
            radio_on: AtomicBool::new(false),
            multiple_advertisement: AtomicBool::new(true),
            service_enabled: AtomicBool::new(false),
            service_running: AtomicBool::new(false),
            user_id: RwLock::new(None),
            failing: RwLock::new(HashSet::new()),
            latency_ms: AtomicU64::new(0),
            enable_calls: AtomicU32::new(0),
            disable_calls: AtomicU32::new(0),
            stop_calls: AtomicU32::new(0),
            refresh_calls: AtomicU32::new(0),
            set_user_id_calls: AtomicU32::new(0),
        }
    }

    /// Set whether the radio hardware is present.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::Relaxed);
    }

    /// Set whether switching the radio on succeeds.
    pub fn set_can_enable_radio(&self, can: bool) {
        self.can_enable_radio.store(can, Ordering::Relaxed);
    }

    /// Set the multiple-advertisement answer.
    pub fn set_multiple_advertisement(&self, supported: bool) {
        self.multiple_advertisement
            .store(supported, Ordering::Relaxed);
    }

    /// Set the persisted service flag directly.
    pub fn set_service_enabled(&self, enabled: bool) {
        self.service_enabled.store(enabled, Ordering::Relaxed);
    }

    /// Make the named operation fail. Names match the [`RadioControl`]
    /// method names.
    pub async fn fail_operation(&self, operation: &'static str) {
        self.failing.write().await.insert(operation);
    }

    /// Let every operation succeed again.
    pub async fn clear_failures(&self) {
        self.failing.write().await.clear();
    }

    /// Delay every call.
    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::Relaxed);
    }

    /// The persisted service flag.
    pub fn service_enabled(&self) -> bool {
        self.service_enabled.load(Ordering::Relaxed)
    }

    /// Whether the background service is running.
    pub fn service_running(&self) -> bool {
        self.service_running.load(Ordering::Relaxed)
    }

    /// The last user id handed to the radio.
    pub async fn user_id(&self) -> Option<String> {
        self.user_id.read().await.clone()
    }

    /// Number of `enable_service` calls.
    pub fn enable_calls(&self) -> u32 {
        self.enable_calls.load(Ordering::Relaxed)
    }

    /// Number of `disable_service` calls.
    pub fn disable_calls(&self) -> u32 {
        self.disable_calls.load(Ordering::Relaxed)
    }

    /// Number of `stop_service` calls.
    pub fn stop_calls(&self) -> u32 {
        self.stop_calls.load(Ordering::Relaxed)
    }

    /// Number of `refresh_service_status` calls.
    pub fn refresh_calls(&self) -> u32 {
        self.refresh_calls.load(Ordering::Relaxed)
    }

    /// Number of `set_user_id` calls.
    pub fn set_user_id_calls(&self) -> u32 {
        self.set_user_id_calls.load(Ordering::Relaxed)
    }

    async fn check(&self, operation: &'static str) -> Result<()> {
        simulate_latency(&self.latency_ms).await;
        if self.failing.read().await.contains(operation) {
            Err(Error::radio(operation, "mock failure"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl RadioControl for MockRadio {
    async fn is_available(&self) -> Result<bool> {
        self.check("is_available").await?;
        Ok(self.available.load(Ordering::Relaxed))
    }

    async fn try_enable_radio(&self) -> Result<bool> {
        self.check("try_enable_radio").await?;
        let on = self.available.load(Ordering::Relaxed)
            && self.can_enable_radio.load(Ordering::Relaxed);
        self.radio_on.store(on, Ordering::Relaxed);
        Ok(on)
    }

    async fn is_multiple_advertisement_supported(&self) -> Result<bool> {
        self.check("is_multiple_advertisement_supported").await?;
        Ok(self.multiple_advertisement.load(Ordering::Relaxed))
    }

    async fn set_user_id(&self, user_id: &str) -> Result<()> {
        self.set_user_id_calls.fetch_add(1, Ordering::Relaxed);
        self.check("set_user_id").await?;
        *self.user_id.write().await = Some(user_id.to_string());
        Ok(())
    }

    async fn is_service_enabled(&self) -> Result<bool> {
        self.check("is_service_enabled").await?;
        Ok(self.service_enabled())
    }

    async fn enable_service(&self) -> Result<()> {
        self.enable_calls.fetch_add(1, Ordering::Relaxed);
        self.check("enable_service").await?;
        self.service_enabled.store(true, Ordering::Relaxed);
        self.service_running.store(true, Ordering::Relaxed);
        Ok(())
    }

    async fn disable_service(&self) -> Result<()> {
        self.disable_calls.fetch_add(1, Ordering::Relaxed);
        self.check("disable_service").await?;
        self.service_enabled.store(false, Ordering::Relaxed);
        self.service_running.store(false, Ordering::Relaxed);
        Ok(())
    }

    async fn stop_service(&self) -> Result<()> {
        self.stop_calls.fetch_add(1, Ordering::Relaxed);
        self.check("stop_service").await?;
        self.service_running.store(false, Ordering::Relaxed);
        Ok(())
    }

    async fn refresh_service_status(&self) -> Result<()> {
        self.refresh_calls.fetch_add(1, Ordering::Relaxed);
        self.check("refresh_service_status").await?;
        if self.service_enabled() && self.radio_on.load(Ordering::Relaxed) {
            self.service_running.store(true, Ordering::Relaxed);
        }
        Ok(())
    }
}

/// Permission dialog with a fixed answer.
#[derive(Debug)]
pub struct MockPermissions {
    grant: AtomicBool,
    should_fail: AtomicBool,
    request_count: AtomicU32,
}

impl MockPermissions {
    /// A dialog the user always accepts.
    pub fn granted() -> Self {
        Self::with_answer(true)
    }

    /// A dialog the user always declines.
    pub fn denied() -> Self {
        Self::with_answer(false)
    }

    fn with_answer(grant: bool) -> Self {
        Self {
            grant: AtomicBool::new(grant),
            should_fail: AtomicBool::new(false),
            request_count: AtomicU32::new(0),
        }
    }

    /// Change the answer.
    pub fn set_granted(&self, grant: bool) {
        self.grant.store(grant, Ordering::Relaxed);
    }

    /// Make the request itself fail.
    pub fn set_should_fail(&self, fail: bool) {
        self.should_fail.store(fail, Ordering::Relaxed);
    }

    /// Number of permission requests made.
    pub fn request_count(&self) -> u32 {
        self.request_count.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl PermissionGrantor for MockPermissions {
    async fn request_location_permission(&self) -> Result<bool> {
        self.request_count.fetch_add(1, Ordering::Relaxed);
        if self.should_fail.load(Ordering::Relaxed) {
            return Err(Error::Permission("mock failure".to_string()));
        }
        Ok(self.grant.load(Ordering::Relaxed))
    }
}
