//! # PDU Packet Decoder
//!
//! Decodes framed telemetry lines (`SOURCE,TIMESTAMP,HEADER[,arg]*`) into
//! [`ParsedTelemetry`]. Decoding fails soft: a short packet becomes
//! [`Message::Malformed`], a bad timestamp is replaced by the receive instant,
//! and bad arguments of a known header become [`Message::Rejected`].

use std::net::Ipv4Addr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};

use super::types::*;
use crate::error::TelemetryFault;

/// Naive timestamp layouts accepted after RFC 3339 fails. All are read as UTC.
const NAIVE_TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

/// Decode one framed packet
///
/// # Arguments
///
/// * `raw` - Framed packet text (trailing newline tolerated)
/// * `received_at` - Local receive instant, substituted when the timestamp is bad
///
/// # Returns
///
/// * `ParsedTelemetry` - Always returned; inspect `message` for the outcome
///
/// # Examples
///
/// ```
/// use chrono::Utc;
/// use pdu_controller::protocol::decoder::decode;
/// use pdu_controller::protocol::types::Message;
///
/// let packet = decode("PDU,2024-05-01 10:00:00.000,STATUS,2,0.750", Utc::now());
/// assert_eq!(packet.message, Message::Status { channel: 2, amps: 0.75 });
/// ```
pub fn decode(raw: &str, received_at: DateTime<Utc>) -> ParsedTelemetry {
    let line = raw.trim_end_matches(['\r', '\n']);
    let fields: Vec<&str> = line.split(FIELD_SEPARATOR).collect();

    if fields.len() < MIN_PACKET_FIELDS {
        return ParsedTelemetry {
            source: fields.first().map(|s| s.to_string()).unwrap_or_default(),
            received_at,
            header: String::new(),
            args: Vec::new(),
            message: Message::Malformed {
                reason: format!("{} fields, need {}", fields.len(), MIN_PACKET_FIELDS),
            },
            timestamp_fault: None,
        };
    }

    let (stamp, timestamp_fault) = match parse_timestamp(fields[1]) {
        Some(stamp) => (stamp, None),
        None => (
            received_at,
            Some(TelemetryFault::TimestampDecodeFailure {
                field: fields[1].to_string(),
            }),
        ),
    };

    let header = fields[2];
    let args: Vec<String> = fields[3..].iter().map(|s| s.to_string()).collect();
    let message = decode_message(header, &args);

    ParsedTelemetry {
        source: fields[0].to_string(),
        received_at: stamp,
        header: header.to_string(),
        args,
        message,
        timestamp_fault,
    }
}

/// Parse an ISO-8601 timestamp field
///
/// Accepts RFC 3339 with an offset, the ground journal's
/// `YYYY-MM-DD HH:MM:SS.mmm` form (space or `T` separated, fraction optional)
/// and a bare date. Naive values are taken as UTC.
pub fn parse_timestamp(field: &str) -> Option<DateTime<Utc>> {
    let field = field.trim();

    if let Ok(stamp) = DateTime::parse_from_rfc3339(field) {
        return Some(stamp.with_timezone(&Utc));
    }

    for format in NAIVE_TIMESTAMP_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(field, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }

    NaiveDate::parse_from_str(field, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}

/// Parse a channel index field
///
/// Only plain decimal digits are accepted. Range checking against 1..=6 is
/// left to the channel store; values that do not even fit a `u8` are reported
/// as out of range here.
pub fn parse_channel_field(field: &str, context: &str) -> Result<u8, TelemetryFault> {
    if field.is_empty() || !field.bytes().all(|b| b.is_ascii_digit()) {
        return Err(TelemetryFault::NonNumericChannelIndex {
            context: context.to_string(),
            field: field.to_string(),
        });
    }

    let index = field.parse::<u64>().unwrap_or(u64::MAX);
    u8::try_from(index).map_err(|_| TelemetryFault::ChannelIndexOutOfRange {
        context: context.to_string(),
        index,
    })
}

fn decode_message(header: &str, args: &[String]) -> Message {
    let decoded = match header {
        HEADER_SRVCSET => decode_service_set(args),
        HEADER_STATUS => decode_status(args),
        HEADER_IPSET => decode_ip_set(args),
        HEADER_PORTSET => decode_port_set(args),
        HEADER_RESETTING => Ok(Message::Resetting),
        HEADER_CMDERROR => Ok(Message::CommandError),
        HEADER_EVENT => require_args(HEADER_EVENT, args, 1).map(|_| Message::Event {
            name: args[0].trim().to_string(),
        }),
        _ => Ok(Message::Unknown),
    };

    decoded.unwrap_or_else(Message::Rejected)
}

fn require_args(header: &str, args: &[String], expected: usize) -> Result<(), TelemetryFault> {
    if args.len() < expected {
        return Err(TelemetryFault::MissingArguments {
            header: header.to_string(),
            expected,
            got: args.len(),
        });
    }
    Ok(())
}

fn decode_service_set(args: &[String]) -> Result<Message, TelemetryFault> {
    require_args(HEADER_SRVCSET, args, 2)?;
    let channel = parse_channel_field(args[0].trim(), HEADER_SRVCSET)?;
    let on = match args[1].trim() {
        "1" => true,
        "0" => false,
        other => {
            return Err(TelemetryFault::InvalidArgument {
                header: HEADER_SRVCSET.to_string(),
                name: "state",
                value: other.to_string(),
            })
        }
    };
    Ok(Message::ServiceSet { channel, on })
}

fn decode_status(args: &[String]) -> Result<Message, TelemetryFault> {
    require_args(HEADER_STATUS, args, 2)?;
    let channel = parse_channel_field(args[0].trim(), HEADER_STATUS)?;
    let amps = args[1]
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|amps| amps.is_finite() && *amps >= 0.0)
        .ok_or_else(|| TelemetryFault::InvalidArgument {
            header: HEADER_STATUS.to_string(),
            name: "current",
            value: args[1].clone(),
        })?;
    Ok(Message::Status { channel, amps })
}

fn decode_ip_set(args: &[String]) -> Result<Message, TelemetryFault> {
    require_args(HEADER_IPSET, args, 4)?;
    let mut octets = [0u8; 4];
    for (octet, field) in octets.iter_mut().zip(args) {
        *octet = field
            .trim()
            .parse()
            .map_err(|_| TelemetryFault::InvalidArgument {
                header: HEADER_IPSET.to_string(),
                name: "octet",
                value: field.clone(),
            })?;
    }
    Ok(Message::IpSet { address: Ipv4Addr::from(octets) })
}

fn decode_port_set(args: &[String]) -> Result<Message, TelemetryFault> {
    require_args(HEADER_PORTSET, args, 1)?;
    let port = args[0]
        .trim()
        .parse()
        .map_err(|_| TelemetryFault::InvalidArgument {
            header: HEADER_PORTSET.to_string(),
            name: "port",
            value: args[0].clone(),
        })?;
    Ok(Message::PortSet { port })
}

/// Decode a bare command datagram as the PDU receives it
///
/// Returns `None` for anything the PDU would answer with `CMDERROR`.
///
/// # Examples
///
/// ```
/// use pdu_controller::protocol::decoder::decode_command;
/// use pdu_controller::protocol::types::Command;
///
/// assert_eq!(decode_command("SETSRVC,4,0"), Some(Command::SetService { channel: 4, on: false }));
/// assert_eq!(decode_command("LAUNCH"), None);
/// ```
pub fn decode_command(raw: &str) -> Option<Command> {
    let line = raw.trim_end_matches(['\r', '\n', '\0']);
    let fields: Vec<&str> = line.split(FIELD_SEPARATOR).map(str::trim).collect();

    match fields.as_slice() {
        [CMD_SETSRVC, channel, state] => {
            let on = match *state {
                "1" => true,
                "0" => false,
                _ => return None,
            };
            Some(Command::SetService { channel: channel.parse().ok()?, on })
        }
        [CMD_STATUS, channel] => Some(Command::Status { channel: channel.parse().ok()? }),
        [CMD_RESET] => Some(Command::Reset),
        [CMD_SETIP, a, b, c, d] => Some(Command::SetIp {
            address: Ipv4Addr::new(a.parse().ok()?, b.parse().ok()?, c.parse().ok()?, d.parse().ok()?),
        }),
        [CMD_SETPORT, port] => Some(Command::SetPort { port: port.parse().ok()? }),
        _ => None,
    }
}
