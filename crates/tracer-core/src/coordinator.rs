//! Service lifecycle coordinator.
//!
//! [`TracerCoordinator`] owns the identity cache, the observation buffer and
//! the capability trace, drives the lifecycle state machine from
//! [`crate::lifecycle`], and routes discovery events into the buffer.
//!
//! Transitions are computed under a short lock; the resulting commands run
//! against the collaborators without holding it, so a `disable()` can land
//! while a probe started by `enable()` is still in flight.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use tracer_types::{CapabilityFlags, DiscoveryEvent, ServiceState};

use crate::buffer::{BufferStats, DEFAULT_MAX_BUFFERED, ObservationBuffer};
use crate::error::{Error, Result};
use crate::events::{DEFAULT_EVENT_CAPACITY, DiscoveryEvents, EventReceiver};
use crate::guard::Attachment;
use crate::identity::{CacheStats, IdentityCache};
use crate::lifecycle::{Command, Lifecycle, LifecycleEvent, transition};
use crate::probe::run_probe;
use crate::trace::CapabilityTrace;
use crate::traits::{Clock, IdentityLookup, PermissionGrantor, RadioControl, SystemClock, Uploader};

/// Runtime options for the coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Buffered observations that force a flush.
    pub max_buffered_observations: usize,
    /// Capacity of each per-kind event channel created by
    /// [`TracerCoordinator::event_source`].
    pub event_capacity: usize,
    /// Anonymized user id handed to the radio on first enable.
    pub user_id: Option<String>,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            max_buffered_observations: DEFAULT_MAX_BUFFERED,
            event_capacity: DEFAULT_EVENT_CAPACITY,
            user_id: None,
        }
    }
}

impl CoordinatorConfig {
    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.max_buffered_observations == 0 {
            return Err(Error::invalid_config(
                "max_buffered_observations must be > 0",
            ));
        }
        if self.event_capacity == 0 {
            return Err(Error::invalid_config("event_capacity must be > 0"));
        }
        if let Some(user_id) = &self.user_id
            && user_id.trim().is_empty()
        {
            return Err(Error::invalid_config("user_id must not be blank"));
        }
        Ok(())
    }
}

/// The external systems the coordinator talks to.
#[derive(Clone)]
pub struct Collaborators {
    /// Radio and background service control.
    pub radio: Arc<dyn RadioControl>,
    /// Runtime permission dialog.
    pub permissions: Arc<dyn PermissionGrantor>,
    /// Beacon identity lookup endpoint.
    pub lookup: Arc<dyn IdentityLookup>,
    /// Observation upload endpoint.
    pub uploader: Arc<dyn Uploader>,
    /// Wall clock.
    pub clock: Arc<dyn Clock>,
}

impl Collaborators {
    /// Bundle collaborators using the system clock.
    pub fn new(
        radio: Arc<dyn RadioControl>,
        permissions: Arc<dyn PermissionGrantor>,
        lookup: Arc<dyn IdentityLookup>,
        uploader: Arc<dyn Uploader>,
    ) -> Self {
        Self {
            radio,
            permissions,
            lookup,
            uploader,
            clock: Arc::new(SystemClock),
        }
    }

    /// Replace the clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}

/// Snapshot of the coordinator state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceStatus {
    /// Local lifecycle state.
    pub state: ServiceState,
    /// Result of the capability probe, once it has finished.
    pub flags: Option<CapabilityFlags>,
    /// Last known value of the persisted enabled flag. Advisory only.
    pub service_enabled: bool,
    /// Anonymized user id, if configured.
    pub user_id: Option<String>,
}

/// Counters from the cache and the buffer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoordinatorStats {
    /// Identity cache counters.
    pub cache: CacheStats,
    /// Observation buffer counters.
    pub buffer: BufferStats,
}

/// Coordinates the tracing service lifecycle and discovery event processing.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use tracer_core::mock::{MockLookup, MockPermissions, MockRadio, MockUploader};
/// use tracer_core::{Collaborators, CoordinatorConfig, TracerCoordinator};
/// use tracer_types::ServiceState;
///
/// # #[tokio::main]
/// # async fn main() -> tracer_core::Result<()> {
/// let collaborators = Collaborators::new(
///     Arc::new(MockRadio::new()),
///     Arc::new(MockPermissions::granted()),
///     Arc::new(MockLookup::new()),
///     Arc::new(MockUploader::new()),
/// );
/// let coordinator = TracerCoordinator::new(CoordinatorConfig::default(), collaborators)?;
///
/// coordinator.enable().await;
/// assert_eq!(coordinator.state().await, ServiceState::Enabled);
/// # Ok(())
/// # }
/// ```
pub struct TracerCoordinator {
    radio: Arc<dyn RadioControl>,
    permissions: Arc<dyn PermissionGrantor>,
    cache: IdentityCache,
    buffer: ObservationBuffer,
    trace: CapabilityTrace,
    lifecycle: Mutex<Lifecycle>,
    /// Serializes `enable()`/`refresh()` so a second caller waits for the
    /// first probe instead of returning early.
    enabling: Mutex<()>,
    service_enabled: AtomicBool,
    config: CoordinatorConfig,
}

impl std::fmt::Debug for TracerCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TracerCoordinator")
            .field("config", &self.config)
            .field("service_enabled", &self.service_enabled.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl TracerCoordinator {
    /// Create a coordinator. Fails only on invalid configuration.
    pub fn new(config: CoordinatorConfig, collaborators: Collaborators) -> Result<Self> {
        config.validate()?;
        let Collaborators {
            radio,
            permissions,
            lookup,
            uploader,
            clock,
        } = collaborators;

        Ok(Self {
            radio,
            permissions,
            cache: IdentityCache::new(lookup, Arc::clone(&clock)),
            buffer: ObservationBuffer::with_max_len(
                uploader,
                clock,
                config.max_buffered_observations,
            ),
            trace: CapabilityTrace::new(),
            lifecycle: Mutex::new(Lifecycle::default()),
            enabling: Mutex::new(()),
            service_enabled: AtomicBool::new(false),
            config,
        })
    }

    /// Create a discovery event dispatcher sized by the configuration.
    pub fn event_source(&self) -> DiscoveryEvents {
        DiscoveryEvents::new(self.config.event_capacity)
    }

    // --- Lifecycle operations ---

    /// Enable the tracing service.
    ///
    /// The first call runs the capability probe; later calls go straight to
    /// the radio. Enabling is attempted whatever the probe reports.
    pub async fn enable(&self) {
        let _enabling = self.enabling.lock().await;
        self.dispatch(LifecycleEvent::EnableRequested).await;
    }

    /// Disable the tracing service. No-op when already disabled.
    pub async fn disable(&self) {
        self.dispatch(LifecycleEvent::DisableRequested).await;
    }

    /// Reconcile local state with the persisted enabled flag.
    pub async fn refresh(&self) {
        let _enabling = self.enabling.lock().await;
        self.dispatch(LifecycleEvent::RefreshRequested).await;
    }

    /// Feed `event` to the state machine and run the resulting commands,
    /// including those produced by follow-up events.
    async fn dispatch(&self, event: LifecycleEvent) {
        let mut pending = VecDeque::from([event]);
        while let Some(event) = pending.pop_front() {
            let commands = {
                let mut lifecycle = self.lifecycle.lock().await;
                let step = transition(*lifecycle, event);
                if step.next.state != lifecycle.state {
                    info!(
                        "Service state {} -> {} ({:?})",
                        lifecycle.state, step.next.state, event
                    );
                }
                *lifecycle = step.next;
                step.commands
            };

            for command in commands {
                if let Some(follow_up) = self.execute(command).await {
                    pending.push_back(follow_up);
                }
            }
        }
    }

    async fn execute(&self, command: Command) -> Option<LifecycleEvent> {
        debug!("Executing {:?}", command);
        match command {
            Command::PropagateUserId => {
                match &self.config.user_id {
                    Some(user_id) => {
                        if let Err(e) = self.radio.set_user_id(user_id).await {
                            warn!("Failed to hand user id to the radio: {}", e);
                        }
                    }
                    None => debug!("No user id configured, skipping propagation"),
                }
                None
            }
            Command::SyncServiceStatus => {
                match self.radio.is_service_enabled().await {
                    Ok(enabled) => self.service_enabled.store(enabled, Ordering::Relaxed),
                    Err(e) => warn!("Failed to read service status: {}", e),
                }
                if let Err(e) = self.radio.refresh_service_status().await {
                    warn!("Failed to refresh service status: {}", e);
                }
                None
            }
            Command::RunProbe => {
                let flags = run_probe(&*self.radio, &*self.permissions, &self.trace).await;
                Some(LifecycleEvent::ProbeCompleted(flags))
            }
            Command::EnableService => {
                match self.radio.enable_service().await {
                    Ok(()) => {
                        self.service_enabled.store(true, Ordering::Relaxed);
                        info!("Tracing service enabled");
                    }
                    Err(e) => warn!("Failed to enable tracing service: {}", e),
                }
                None
            }
            Command::DisableService => {
                match self.radio.disable_service().await {
                    Ok(()) => {
                        self.service_enabled.store(false, Ordering::Relaxed);
                        info!("Tracing service disabled");
                    }
                    Err(e) => warn!("Failed to disable tracing service: {}", e),
                }
                None
            }
            Command::QueryServiceEnabled => match self.radio.is_service_enabled().await {
                Ok(enabled) => {
                    self.service_enabled.store(enabled, Ordering::Relaxed);
                    Some(LifecycleEvent::RefreshReported { enabled })
                }
                Err(e) => {
                    warn!("Failed to read service status during refresh: {}", e);
                    None
                }
            },
        }
    }

    // --- Event processing ---

    /// Register the three discovery listeners as one bundle.
    ///
    /// Afterwards any background service left over from a previous process
    /// is stopped, and if the user is onboarded and the service is persisted
    /// as enabled, [`enable`](Self::enable) runs.
    pub async fn attach(self: &Arc<Self>, events: &DiscoveryEvents) -> Attachment {
        self.attach_with(events, false).await
    }

    /// Like [`attach`](Self::attach), resuming the persisted service state
    /// when `onboarded` is set.
    pub async fn attach_with(self: &Arc<Self>, events: &DiscoveryEvents, onboarded: bool) -> Attachment {
        let subscriptions = events.subscribe_all();
        let cancel = CancellationToken::new();
        let tasks = [
            subscriptions.advertiser,
            subscriptions.devices,
            subscriptions.beacons,
        ]
        .into_iter()
        .map(|receiver| {
            let coordinator = Arc::clone(self);
            let cancel = cancel.clone();
            tokio::spawn(async move { coordinator.listen(receiver, cancel).await })
        })
        .collect();
        let attachment = Attachment::new(cancel, tasks);
        debug!("Attached discovery listeners");

        if let Err(e) = self.radio.stop_service().await {
            warn!("Failed to stop stale tracing service: {}", e);
        }

        if onboarded {
            match self.radio.is_service_enabled().await {
                Ok(true) => self.enable().await,
                Ok(false) => {
                    self.service_enabled.store(false, Ordering::Relaxed);
                    debug!("Service persisted as disabled, not resuming");
                }
                Err(e) => warn!("Failed to read service status on attach: {}", e),
            }
        }

        attachment
    }

    async fn listen(&self, mut receiver: EventReceiver, cancel: CancellationToken) {
        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => break,
                received = receiver.recv() => received,
            };
            match event {
                Ok(event) => self.handle_event(event).await,
                Err(RecvError::Lagged(missed)) => {
                    warn!("Event listener lagged, {} event(s) lost", missed);
                }
                Err(RecvError::Closed) => {
                    debug!("Event source closed");
                    break;
                }
            }
        }
    }

    /// Process one discovery event.
    ///
    /// Malformed events are logged and dropped.
    pub async fn handle_event(&self, event: DiscoveryEvent) {
        if let Err(e) = event.validate() {
            debug!("Dropping malformed {} event: {}", event.kind(), e);
            return;
        }

        match event {
            DiscoveryEvent::AdvertiserMessage { message } => {
                self.trace.append(message).await;
            }
            DiscoveryEvent::NearbyDevice { name, rssi } => {
                self.trace.append(format!("***** RSSI: {rssi}")).await;
                self.trace
                    .append(format!("***** Found Nearby Device: {name}"))
                    .await;
                self.buffer.append(name).await;
            }
            ref beacon_event @ DiscoveryEvent::NearbyBeacon { .. } => {
                let beacon = match beacon_event.beacon_identity() {
                    Ok(beacon) => beacon,
                    Err(e) => {
                        debug!("Dropping beacon event: {}", e);
                        return;
                    }
                };
                self.trace
                    .append(format!("***** Found Beacon: {}", beacon.uuid()))
                    .await;
                self.trace
                    .append(format!("***** major: {}", beacon.major()))
                    .await;
                self.trace
                    .append(format!("***** minor: {}", beacon.minor()))
                    .await;

                let anonymous_id = self.cache.resolve(&beacon).await;
                self.buffer.append(beacon.cache_key()).await;
                if let Some(anonymous_id) = anonymous_id {
                    self.buffer.append(anonymous_id).await;
                }
            }
            other => debug!("Ignoring unsupported event {:?}", other),
        }
    }

    // --- Accessors ---

    /// Current lifecycle state.
    pub async fn state(&self) -> ServiceState {
        self.lifecycle.lock().await.state
    }

    /// Snapshot of state, probe flags and the advisory enabled flag.
    pub async fn status(&self) -> ServiceStatus {
        let lifecycle = *self.lifecycle.lock().await;
        ServiceStatus {
            state: lifecycle.state,
            flags: lifecycle.probe.flags(),
            service_enabled: self.service_enabled.load(Ordering::Relaxed),
            user_id: self.config.user_id.clone(),
        }
    }

    /// The capability trace.
    pub fn trace(&self) -> &CapabilityTrace {
        &self.trace
    }

    /// The observation buffer.
    pub fn buffer(&self) -> &ObservationBuffer {
        &self.buffer
    }

    /// The identity cache.
    pub fn cache(&self) -> &IdentityCache {
        &self.cache
    }

    /// Cache and buffer counters.
    pub fn stats(&self) -> CoordinatorStats {
        CoordinatorStats {
            cache: self.cache.stats(),
            buffer: self.buffer.stats(),
        }
    }

    /// Upload whatever is buffered. Returns the batch size.
    pub async fn flush(&self) -> usize {
        self.buffer.flush().await
    }

    /// The active configuration.
    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }
}
