//! Endpoints used when no URL is configured.

use async_trait::async_trait;
use tracing::{debug, info};

use tracer_core::{BeaconIdentity, IdentityLookup, Observation, Result, Uploader};

/// Lookup that never resolves anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineLookup;

#[async_trait]
impl IdentityLookup for OfflineLookup {
    async fn lookup(&self, beacon: &BeaconIdentity) -> Result<Option<String>> {
        debug!("No lookup endpoint configured, {} stays unresolved", beacon);
        Ok(None)
    }
}

/// Uploader that writes batches to the log instead of the network.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogUploader;

#[async_trait]
impl Uploader for LogUploader {
    async fn upload(&self, batch: &[Observation]) -> Result<()> {
        info!("No upload endpoint configured, logging {} observation(s)", batch.len());
        for observation in batch {
            debug!("  {} at {}", observation.label(), observation.observed_at());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_offline_endpoints_never_fail() {
        let beacon = BeaconIdentity::new("A", 1, 2).unwrap();
        assert_eq!(OfflineLookup.lookup(&beacon).await.unwrap(), None);

        let batch = vec![Observation::new("a", time::OffsetDateTime::UNIX_EPOCH)];
        assert!(LogUploader.upload(&batch).await.is_ok());
    }
}
