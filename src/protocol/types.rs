//! # PDU Protocol Constants and Types
//!
//! Core protocol definitions shared by the encoder, decoder and engine.

use std::net::Ipv4Addr;

use chrono::{DateTime, Utc};

use crate::error::TelemetryFault;

/// Number of switchable PDU outputs (wire ids 1..=6)
pub const CHANNEL_COUNT: usize = 6;

/// Field separator on the wire
pub const FIELD_SEPARATOR: char = ',';

/// Minimum number of fields in a framed packet: source, timestamp, header
pub const MIN_PACKET_FIELDS: usize = 3;

/// Source tag of telemetry coming from the PDU
pub const SOURCE_PDU: &str = "PDU";

/// Source tag of lines originated by the ground station
pub const SOURCE_GROUND: &str = "GND";

/// Reply headers
pub const HEADER_SRVCSET: &str = "SRVCSET";
pub const HEADER_STATUS: &str = "STATUS";
pub const HEADER_IPSET: &str = "IPSET";
pub const HEADER_PORTSET: &str = "PORTSET";
pub const HEADER_RESETTING: &str = "Resetting";
pub const HEADER_CMDERROR: &str = "CMDERROR";
pub const HEADER_EVENT: &str = "EVENT";
pub const HEADER_WARNING: &str = "WARNING";

/// Command keywords
pub const CMD_SETSRVC: &str = "SETSRVC";
pub const CMD_STATUS: &str = "STATUS";
pub const CMD_RESET: &str = "RESET";
pub const CMD_SETIP: &str = "SETIP";
pub const CMD_SETPORT: &str = "SETPORT";

/// Flight session event names. These are keywords matched by log replay.
pub const EVENT_START_FLIGHT: &str = "START_FLIGHT";
pub const EVENT_END_FLIGHT: &str = "END_FLIGHT";

/// Outbound command intent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Switch a channel on or off (`SETSRVC,<id>,<0|1>`)
    SetService { channel: u8, on: bool },

    /// Request the current draw of a channel (`STATUS,<id>`)
    Status { channel: u8 },

    /// Reset the PDU network settings (`RESET`)
    Reset,

    /// Change the PDU IP address (`SETIP,<a>,<b>,<c>,<d>`)
    SetIp { address: Ipv4Addr },

    /// Change the PDU listening port (`SETPORT,<port>`)
    SetPort { port: u16 },
}

/// Typed content of an inbound packet
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// Confirmed channel state (`SRVCSET,<id>,<0|1>`)
    ServiceSet { channel: u8, on: bool },

    /// Current draw sample (`STATUS,<id>,<amps>`)
    Status { channel: u8, amps: f64 },

    /// IP address change acknowledged
    IpSet { address: Ipv4Addr },

    /// Port change acknowledged
    PortSet { port: u16 },

    /// PDU is resetting its network settings
    Resetting,

    /// PDU did not recognise the last command
    CommandError,

    /// Named event (flight session bookkeeping)
    Event { name: String },

    /// Header this controller does not know; inert
    Unknown,

    /// Known header whose arguments could not be used
    Rejected(TelemetryFault),

    /// Fewer than three fields
    Malformed { reason: String },
}

/// One decoded inbound packet
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedTelemetry {
    /// First field (`PDU`, `GND`, ...)
    pub source: String,

    /// Decoded packet timestamp, or the receive instant if it did not decode
    pub received_at: DateTime<Utc>,

    /// Third field, verbatim
    pub header: String,

    /// Remaining fields, verbatim
    pub args: Vec<String>,

    /// Typed interpretation of header and args
    pub message: Message,

    /// Set when the timestamp field had to be replaced by the receive instant
    pub timestamp_fault: Option<TelemetryFault>,
}

impl ParsedTelemetry {
    /// Whether the packet came from the PDU itself
    pub fn is_from_pdu(&self) -> bool {
        self.source == SOURCE_PDU
    }

    /// Whether decoding stopped at the field count
    pub fn is_malformed(&self) -> bool {
        matches!(self.message, Message::Malformed { .. })
    }
}
