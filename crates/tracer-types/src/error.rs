//! Error types for data parsing in tracer-types.

use thiserror::Error;

/// Errors that can occur when building or parsing tracer data.
///
/// This error type is platform-agnostic and does not include radio or
/// network errors (those belong in tracer-core).
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ParseError {
    /// Beacon uuid is empty, too long, or contains characters outside `[0-9a-fA-F-]`.
    #[error("Invalid beacon uuid '{0}': expected 1-36 hex digits or '-'")]
    InvalidUuid(String),

    /// A required field was missing or empty.
    #[error("Missing required field '{0}'")]
    MissingField(&'static str),

    /// The payload could not be decoded.
    #[error("Invalid event payload: {0}")]
    InvalidPayload(String),
}

/// Result type alias using tracer-types' ParseError type.
pub type ParseResult<T> = std::result::Result<T, ParseError>;
