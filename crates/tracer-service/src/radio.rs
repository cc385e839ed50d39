//! Simulated radio for running the coordinator without hardware.
//!
//! The answers come from the `[radio]` configuration section. The persisted
//! service flag only lives for the lifetime of the process.

use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tracing::{debug, info};

use tracer_core::{PermissionGrantor, RadioControl, Result};

use crate::config::RadioConfig;

/// Radio and permission dialog driven by configuration.
#[derive(Debug)]
pub struct SimulatedRadio {
    config: RadioConfig,
    radio_on: AtomicBool,
    service_enabled: AtomicBool,
    service_running: AtomicBool,
    user_id: RwLock<Option<String>>,
}

impl SimulatedRadio {
    /// Create a radio answering according to `config`.
    pub fn new(config: &RadioConfig) -> Self {
        Self {
            config: config.clone(),
            radio_on: AtomicBool::new(false),
            service_enabled: AtomicBool::new(config.service_enabled),
            service_running: AtomicBool::new(config.service_enabled),
            user_id: RwLock::new(None),
        }
    }

    /// Whether the simulated background service is running.
    pub fn is_running(&self) -> bool {
        self.service_running.load(Ordering::Relaxed)
    }

    /// The user id last handed to the radio.
    pub fn user_id(&self) -> Option<String> {
        self.user_id
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl RadioControl for SimulatedRadio {
    async fn is_available(&self) -> Result<bool> {
        Ok(self.config.available)
    }

    async fn try_enable_radio(&self) -> Result<bool> {
        let on = self.config.available && self.config.can_enable;
        self.radio_on.store(on, Ordering::Relaxed);
        debug!("Radio switched {}", if on { "on" } else { "off" });
        Ok(on)
    }

    async fn is_multiple_advertisement_supported(&self) -> Result<bool> {
        Ok(self.config.multiple_advertisement)
    }

    async fn set_user_id(&self, user_id: &str) -> Result<()> {
        debug!("Advertising as {}", user_id);
        *self.user_id.write().unwrap_or_else(|e| e.into_inner()) = Some(user_id.to_string());
        Ok(())
    }

    async fn is_service_enabled(&self) -> Result<bool> {
        Ok(self.service_enabled.load(Ordering::Relaxed))
    }

    async fn enable_service(&self) -> Result<()> {
        self.service_enabled.store(true, Ordering::Relaxed);
        self.service_running.store(true, Ordering::Relaxed);
        info!("Simulated background service started");
        Ok(())
    }

    async fn disable_service(&self) -> Result<()> {
        self.service_enabled.store(false, Ordering::Relaxed);
        self.service_running.store(false, Ordering::Relaxed);
        info!("Simulated background service stopped");
        Ok(())
    }

    async fn stop_service(&self) -> Result<()> {
        if self.service_running.swap(false, Ordering::Relaxed) {
            info!("Stopped simulated background service left from a previous run");
        }
        Ok(())
    }

    async fn refresh_service_status(&self) -> Result<()> {
        if self.service_enabled.load(Ordering::Relaxed)
            && self.radio_on.load(Ordering::Relaxed)
            && !self.service_running.swap(true, Ordering::Relaxed)
        {
            info!("Restarted simulated background service");
        }
        Ok(())
    }
}

#[async_trait]
impl PermissionGrantor for SimulatedRadio {
    async fn request_location_permission(&self) -> Result<bool> {
        Ok(self.config.location_permission)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_answers_follow_config() {
        let radio = SimulatedRadio::new(&RadioConfig {
            can_enable: false,
            location_permission: false,
            ..Default::default()
        });

        assert!(radio.is_available().await.unwrap());
        assert!(!radio.try_enable_radio().await.unwrap());
        assert!(!radio.request_location_permission().await.unwrap());
        assert!(radio.is_multiple_advertisement_supported().await.unwrap());
    }

    #[tokio::test]
    async fn test_service_flags() {
        let radio = SimulatedRadio::new(&RadioConfig {
            service_enabled: true,
            ..Default::default()
        });
        assert!(radio.is_running());

        radio.stop_service().await.unwrap();
        assert!(!radio.is_running());
        assert!(radio.is_service_enabled().await.unwrap());

        // Refresh only restarts once the radio is on.
        radio.refresh_service_status().await.unwrap();
        assert!(!radio.is_running());
        radio.try_enable_radio().await.unwrap();
        radio.refresh_service_status().await.unwrap();
        assert!(radio.is_running());

        radio.disable_service().await.unwrap();
        assert!(!radio.is_service_enabled().await.unwrap());
        assert!(!radio.is_running());
    }

    #[tokio::test]
    async fn test_user_id_recorded() {
        let radio = SimulatedRadio::new(&RadioConfig::default());
        assert!(radio.user_id().is_none());
        radio.set_user_id("user-1").await.unwrap();
        assert_eq!(radio.user_id().as_deref(), Some("user-1"));
    }
}
