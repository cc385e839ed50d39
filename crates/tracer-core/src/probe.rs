//! Ordered capability negotiation with the host environment.
//!
//! The probe walks four steps, each gated on the previous one:
//!
//! 1. radio present
//! 2. location permission granted
//! 3. radio switched on
//! 4. multiple advertisement supported (diagnostic only)
//!
//! Every executed step appends one line to the [`CapabilityTrace`]. A
//! negative answer or a failed call ends the sequence and leaves the
//! remaining flags `false`. The probe only reports; it never changes the
//! persisted service-enabled flag.

use tracing::{debug, warn};

use tracer_types::CapabilityFlags;

use crate::error::Result;
use crate::trace::CapabilityTrace;
use crate::traits::{PermissionGrantor, RadioControl};

/// Trace lines for one probe step.
struct StepText {
    positive: &'static str,
    negative: &'static str,
    failed: &'static str,
}

const RADIO_AVAILABLE: StepText = StepText {
    positive: "radio is available",
    negative: "radio is NOT available",
    failed: "radio availability check failed",
};

const LOCATION_PERMISSION: StepText = StepText {
    positive: "Location permission is granted",
    negative: "Location permission is NOT granted",
    failed: "Location permission request failed",
};

const RADIO_ON: StepText = StepText {
    positive: "Bluetooth is On",
    negative: "Bluetooth is Off",
    failed: "Bluetooth could not be switched on",
};

const MULTIPLE_ADVERTISEMENT: StepText = StepText {
    positive: "Multiple advertisement is supported",
    negative: "Multiple advertisement is NOT supported",
    failed: "Multiple advertisement check failed",
};

/// Run the capability probe once.
///
/// Callers are responsible for not running two probes at the same time;
/// the coordinator guarantees this through its lifecycle state.
pub async fn run_probe(
    radio: &dyn RadioControl,
    permissions: &dyn PermissionGrantor,
    trace: &CapabilityTrace,
) -> CapabilityFlags {
    let mut flags = CapabilityFlags::default();

    flags.radio_available = step(trace, &RADIO_AVAILABLE, radio.is_available().await).await;
    if !flags.radio_available {
        return flags;
    }

    flags.location_permission_granted = step(
        trace,
        &LOCATION_PERMISSION,
        permissions.request_location_permission().await,
    )
    .await;
    if !flags.location_permission_granted {
        return flags;
    }

    flags.bluetooth_on = step(trace, &RADIO_ON, radio.try_enable_radio().await).await;
    if !flags.bluetooth_on {
        return flags;
    }

    // The service may have died while the radio was off.
    if let Err(e) = radio.refresh_service_status().await {
        warn!("Failed to refresh service status after radio came up: {}", e);
    }

    flags.multiple_advertisement_supported = step(
        trace,
        &MULTIPLE_ADVERTISEMENT,
        radio.is_multiple_advertisement_supported().await,
    )
    .await;

    debug!("Capability probe finished: {:?}", flags);
    flags
}

async fn step(trace: &CapabilityTrace, text: &StepText, outcome: Result<bool>) -> bool {
    match outcome {
        Ok(true) => {
            trace.append(text.positive).await;
            true
        }
        Ok(false) => {
            trace.append(text.negative).await;
            false
        }
        Err(e) => {
            warn!("{}: {}", text.failed, e);
            trace.append(format!("{}: {}", text.failed, e)).await;
            false
        }
    }
}
