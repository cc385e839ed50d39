//! Error types for tracer-core.
//!
//! Collaborator calls (radio control, permission requests, identity lookups,
//! uploads) report failures through [`Error`]. None of these failures is
//! fatal: the coordinator records or logs them and carries on with reduced
//! functionality.
//!
//! | Error | Effect on the coordinator |
//! |-------|---------------------------|
//! | [`Error::Radio`] | Probe step counts as negative, trace line added |
//! | [`Error::Permission`] | Probe stops at the permission step |
//! | [`Error::Lookup`] | Beacon recorded under its raw key only, not cached |
//! | [`Error::Upload`] | Batch dropped, buffer cleared anyway |
//! | [`Error::MalformedEvent`] | Event ignored |
//! | [`Error::InvalidConfig`] | Returned from constructors only |

use thiserror::Error;

/// Errors that can occur in the coordination core and its collaborators.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// A radio-control call was rejected.
    #[error("Radio call '{operation}' failed: {reason}")]
    Radio {
        /// The collaborator operation that failed.
        operation: &'static str,
        /// Why it failed.
        reason: String,
    },

    /// The location permission request could not be completed.
    #[error("Permission request failed: {0}")]
    Permission(String),

    /// The identity lookup endpoint failed or answered with garbage.
    #[error("Identity lookup for {key} failed: {reason}")]
    Lookup {
        /// Canonical key of the beacon.
        key: String,
        /// Why it failed.
        reason: String,
    },

    /// The upload endpoint rejected a batch.
    #[error("Upload of {count} observation(s) failed: {reason}")]
    Upload {
        /// Size of the rejected batch.
        count: usize,
        /// Why it failed.
        reason: String,
    },

    /// An event payload was missing required fields.
    #[error("Malformed event: {0}")]
    MalformedEvent(#[from] tracer_types::ParseError),

    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// Create a radio-control failure.
    pub fn radio(operation: &'static str, reason: impl Into<String>) -> Self {
        Self::Radio {
            operation,
            reason: reason.into(),
        }
    }

    /// Create a lookup failure.
    pub fn lookup(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Lookup {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Create an upload failure.
    pub fn upload(count: usize, reason: impl Into<String>) -> Self {
        Self::Upload {
            count,
            reason: reason.into(),
        }
    }

    /// Create a configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }
}

/// Result type alias using tracer-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;
