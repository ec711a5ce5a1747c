//! # Error Types
//!
//! Error types for the PDU controller using `thiserror`.
//!
//! [`PduError`] is the fatal class: it covers the surrounding I/O (configuration
//! files, socket setup, journal files). [`TelemetryFault`] is the non-fatal
//! taxonomy reported by the engine; a fault is logged and the offending packet
//! or intent is dropped, but the engine keeps running with its numeric state
//! untouched.

use thiserror::Error;

use crate::engine::flight::FlightState;

/// Main error type for the PDU controller
#[derive(Debug, Error)]
pub enum PduError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// Datagram link errors (bind, send, receive)
    #[error("Link error: {0}")]
    Link(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for the PDU controller
pub type Result<T> = std::result::Result<T, PduError>;

/// Non-fatal fault reported while decoding telemetry or applying an intent.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TelemetryFault {
    /// Fewer than the three mandatory comma-separated fields
    #[error("malformed packet ({reason}): {raw:?}")]
    MalformedPacket { raw: String, reason: String },

    /// Timestamp field could not be decoded; the receive instant was used instead
    #[error("timestamp could not be decoded: {field:?}")]
    TimestampDecodeFailure { field: String },

    /// Channel index is numeric but outside 1..=6
    #[error("channel index {index} out of range for {context}")]
    ChannelIndexOutOfRange { context: String, index: u64 },

    /// Channel index field is not a decimal number
    #[error("bad channel index {field:?} for {context}")]
    NonNumericChannelIndex { context: String, field: String },

    /// Known header without the arguments it requires
    #[error("{header} packet too short: expected {expected} arguments, got {got}")]
    MissingArguments {
        header: String,
        expected: usize,
        got: usize,
    },

    /// Argument present but unusable (bad current value, bad on/off flag)
    #[error("invalid {name} {value:?} in {header} packet")]
    InvalidArgument {
        header: String,
        name: &'static str,
        value: String,
    },

    /// Flight session transition requested from the wrong state
    #[error("cannot {attempted} while {state}")]
    InvalidSessionTransition {
        attempted: &'static str,
        state: FlightState,
    },

    /// Operator-supplied setting rejected (negative limit, zero capacity, ...)
    #[error("invalid {name}: {value}")]
    InvalidParameter { name: &'static str, value: f64 },
}
