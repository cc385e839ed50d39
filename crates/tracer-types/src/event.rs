//! Discovery events delivered by the radio layer.

use core::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{ParseError, ParseResult};
use crate::types::BeaconIdentity;

/// The three event kinds emitted by the radio layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum EventKind {
    /// Diagnostic text from the advertiser.
    AdvertiserMessage,
    /// A nearby device was seen.
    NearbyDevice,
    /// A nearby fixed beacon was seen.
    NearbyBeacon,
}

impl EventKind {
    /// All event kinds, in registration order.
    pub const ALL: [EventKind; 3] = [
        EventKind::AdvertiserMessage,
        EventKind::NearbyDevice,
        EventKind::NearbyBeacon,
    ];

    /// The name the radio layer publishes this event under.
    pub fn name(self) -> &'static str {
        match self {
            EventKind::AdvertiserMessage => "AdvertiserMessage",
            EventKind::NearbyDevice => "NearbyDeviceFound",
            EventKind::NearbyBeacon => "NearbyBeaconFound",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A discovery notification from the radio layer.
///
/// Payload fields are kept as received; [`DiscoveryEvent::validate`] rejects
/// payloads that must not reach the observation buffer.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new event types
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "type", rename_all = "snake_case"))]
#[non_exhaustive]
pub enum DiscoveryEvent {
    /// Status text from the advertiser.
    AdvertiserMessage { message: String },
    /// A nearby device advertising `name`.
    NearbyDevice {
        name: String,
        #[cfg_attr(feature = "serde", serde(alias = "signalStrength"))]
        rssi: i16,
    },
    /// A nearby beacon broadcasting a uuid/major/minor triple.
    NearbyBeacon { uuid: String, major: u16, minor: u16 },
}

impl DiscoveryEvent {
    /// Which channel this event belongs to.
    pub fn kind(&self) -> EventKind {
        match self {
            DiscoveryEvent::AdvertiserMessage { .. } => EventKind::AdvertiserMessage,
            DiscoveryEvent::NearbyDevice { .. } => EventKind::NearbyDevice,
            DiscoveryEvent::NearbyBeacon { .. } => EventKind::NearbyBeacon,
        }
    }

    /// Check that the payload carries every required field.
    pub fn validate(&self) -> ParseResult<()> {
        match self {
            DiscoveryEvent::AdvertiserMessage { .. } => Ok(()),
            DiscoveryEvent::NearbyDevice { name, .. } => {
                if name.trim().is_empty() {
                    Err(ParseError::MissingField("name"))
                } else {
                    Ok(())
                }
            }
            DiscoveryEvent::NearbyBeacon { .. } => self.beacon_identity().map(|_| ()),
        }
    }

    /// Build the beacon identity of a `NearbyBeacon` event.
    pub fn beacon_identity(&self) -> ParseResult<BeaconIdentity> {
        match self {
            DiscoveryEvent::NearbyBeacon { uuid, major, minor } => {
                BeaconIdentity::new(uuid.clone(), *major, *minor)
            }
            _ => Err(ParseError::InvalidPayload(format!(
                "{} event carries no beacon identity",
                self.kind()
            ))),
        }
    }

    /// Decode and validate one JSON-encoded event.
    #[cfg(feature = "serde")]
    pub fn from_json(input: &str) -> ParseResult<Self> {
        let event: Self =
            serde_json::from_str(input).map_err(|e| ParseError::InvalidPayload(e.to_string()))?;
        event.validate()?;
        Ok(event)
    }
}
