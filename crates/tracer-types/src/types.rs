//! Core types for the tracer data model.

use core::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::{ParseError, ParseResult};

/// Separator used in a beacon's canonical key.
///
/// It is outside the set of characters a valid beacon uuid may contain, so
/// the composed key is unambiguous.
pub const KEY_SEPARATOR: char = '.';

/// Maximum length of a beacon uuid (the hyphenated 128-bit form).
pub const MAX_UUID_LEN: usize = 36;

/// Broadcast identity of a fixed beacon: the iBeacon uuid/major/minor triple.
///
/// Equality and hashing are by exact triple match. The uuid is kept as it was
/// received (no case folding).
///
/// # Examples
///
/// ```
/// use tracer_types::BeaconIdentity;
///
/// let beacon = BeaconIdentity::new("A", 1, 2).unwrap();
/// assert_eq!(beacon.cache_key(), "A.1.2");
///
/// assert!(BeaconIdentity::new("not.a.uuid", 1, 2).is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "BeaconFields"))]
pub struct BeaconIdentity {
    uuid: String,
    major: u16,
    minor: u16,
}

/// Unvalidated wire form of a [`BeaconIdentity`].
#[cfg(feature = "serde")]
#[derive(Deserialize)]
struct BeaconFields {
    uuid: String,
    major: u16,
    minor: u16,
}

#[cfg(feature = "serde")]
impl TryFrom<BeaconFields> for BeaconIdentity {
    type Error = ParseError;

    fn try_from(fields: BeaconFields) -> ParseResult<Self> {
        Self::new(fields.uuid, fields.major, fields.minor)
    }
}

impl BeaconIdentity {
    /// Create a beacon identity, rejecting uuids that could not appear in a
    /// beacon advertisement.
    pub fn new(uuid: impl Into<String>, major: u16, minor: u16) -> ParseResult<Self> {
        let uuid = uuid.into();
        if !is_valid_uuid(&uuid) {
            return Err(ParseError::InvalidUuid(uuid));
        }
        Ok(Self { uuid, major, minor })
    }

    /// The beacon uuid as received.
    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    /// The major number.
    pub fn major(&self) -> u16 {
        self.major
    }

    /// The minor number.
    pub fn minor(&self) -> u16 {
        self.minor
    }

    /// Deterministic key used for caching and as the raw observation label.
    #[must_use]
    pub fn cache_key(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for BeaconIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{sep}{}{sep}{}",
            self.uuid,
            self.major,
            self.minor,
            sep = KEY_SEPARATOR
        )
    }
}

fn is_valid_uuid(uuid: &str) -> bool {
    !uuid.is_empty()
        && uuid.len() <= MAX_UUID_LEN
        && uuid.chars().all(|c| c.is_ascii_hexdigit() || c == '-')
}

/// A normalized discovery record.
///
/// The label is a device name, a beacon's canonical key, or a resolved
/// anonymous identifier. Observations are immutable once created.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct Observation {
    label: String,
    #[cfg_attr(feature = "serde", serde(with = "time::serde::rfc3339"))]
    observed_at: OffsetDateTime,
}

impl Observation {
    /// Create an observation.
    pub fn new(label: impl Into<String>, observed_at: OffsetDateTime) -> Self {
        Self {
            label: label.into(),
            observed_at,
        }
    }

    /// What was observed.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// When it was observed.
    pub fn observed_at(&self) -> OffsetDateTime {
        self.observed_at
    }
}

/// Lifecycle state of the background tracing service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ServiceState {
    /// `enable()` has never been called.
    #[default]
    Uninitialized,
    /// The capability probe is running.
    Initializing,
    /// The background service was asked to start.
    Enabled,
    /// The background service was asked to stop.
    Disabled,
}

impl ServiceState {
    /// Whether the service is (locally believed to be) enabled.
    pub fn is_enabled(self) -> bool {
        matches!(self, ServiceState::Enabled)
    }
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ServiceState::Uninitialized => "uninitialized",
            ServiceState::Initializing => "initializing",
            ServiceState::Enabled => "enabled",
            ServiceState::Disabled => "disabled",
        };
        f.write_str(name)
    }
}

/// Result of the capability probe.
///
/// Flags after the first failing step stay `false`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CapabilityFlags {
    /// The radio hardware is present.
    pub radio_available: bool,
    /// Location permission was granted.
    pub location_permission_granted: bool,
    /// The radio is switched on.
    pub bluetooth_on: bool,
    /// Multiple simultaneous advertisement is supported.
    pub multiple_advertisement_supported: bool,
}

impl CapabilityFlags {
    /// Whether every gating step of the probe succeeded.
    pub fn is_ready(&self) -> bool {
        self.radio_available && self.location_permission_granted && self.bluetooth_on
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn test_cache_key_composition() {
        let beacon = BeaconIdentity::new("f7826da6-4fa2-4e98-8024-bc5b71e0893e", 100, 7).unwrap();
        assert_eq!(beacon.cache_key(), "f7826da6-4fa2-4e98-8024-bc5b71e0893e.100.7");
        assert_eq!(beacon.to_string(), beacon.cache_key());
    }

    #[test]
    fn test_uuid_validation() {
        assert!(BeaconIdentity::new("A", 1, 2).is_ok());
        assert!(BeaconIdentity::new("abcdef-0123", 0, 0).is_ok());

        assert!(matches!(
            BeaconIdentity::new("", 1, 2),
            Err(ParseError::InvalidUuid(_))
        ));
        assert!(BeaconIdentity::new("A.1", 1, 2).is_err());
        assert!(BeaconIdentity::new("xyz", 1, 2).is_err());
        assert!(BeaconIdentity::new("a".repeat(MAX_UUID_LEN + 1), 1, 2).is_err());
    }

    #[test]
    fn test_identity_equality_is_exact() {
        let a = BeaconIdentity::new("AB", 1, 2).unwrap();
        let b = BeaconIdentity::new("ab", 1, 2).unwrap();
        let c = BeaconIdentity::new("AB", 2, 1).unwrap();
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_eq!(a, BeaconIdentity::new("AB", 1, 2).unwrap());
    }

    #[test]
    fn test_observation_accessors() {
        let at = datetime!(2024-05-01 12:00 UTC);
        let obs = Observation::new("Pixel 7", at);
        assert_eq!(obs.label(), "Pixel 7");
        assert_eq!(obs.observed_at(), at);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_observation_serializes_camel_case() {
        let obs = Observation::new("anon-1", datetime!(2024-05-01 12:00 UTC));
        let json = serde_json::to_value(&obs).unwrap();
        assert_eq!(json["label"], "anon-1");
        assert_eq!(json["observedAt"], "2024-05-01T12:00:00Z");
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_beacon_deserialize_validates() {
        let ok: BeaconIdentity =
            serde_json::from_str(r#"{"uuid":"A","major":1,"minor":2}"#).unwrap();
        assert_eq!(ok.cache_key(), "A.1.2");

        let bad = serde_json::from_str::<BeaconIdentity>(r#"{"uuid":"A.B","major":1,"minor":2}"#);
        assert!(bad.is_err());

        let out_of_range =
            serde_json::from_str::<BeaconIdentity>(r#"{"uuid":"A","major":70000,"minor":2}"#);
        assert!(out_of_range.is_err());
    }

    #[test]
    fn test_service_state_default_and_display() {
        assert_eq!(ServiceState::default(), ServiceState::Uninitialized);
        assert_eq!(ServiceState::Enabled.to_string(), "enabled");
        assert!(ServiceState::Enabled.is_enabled());
        assert!(!ServiceState::Initializing.is_enabled());
    }

    #[test]
    fn test_capability_flags_ready() {
        let mut flags = CapabilityFlags::default();
        assert!(!flags.is_ready());
        flags.radio_available = true;
        flags.location_permission_granted = true;
        flags.bluetooth_on = true;
        assert!(flags.is_ready());
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn cache_key_splits_back_into_fields(
                uuid in "[0-9a-fA-F-]{1,36}",
                major: u16,
                minor: u16,
            ) {
                let beacon = BeaconIdentity::new(uuid.clone(), major, minor).unwrap();
                let key = beacon.cache_key();
                let parts: Vec<&str> = key.split(KEY_SEPARATOR).collect();
                prop_assert_eq!(parts.len(), 3);
                prop_assert_eq!(parts[0], uuid.as_str());
                prop_assert_eq!(parts[1].parse::<u16>().unwrap(), major);
                prop_assert_eq!(parts[2].parse::<u16>().unwrap(), minor);
            }
        }
    }
}
