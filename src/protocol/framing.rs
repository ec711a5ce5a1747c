//! # Ground-side TMTC Framing
//!
//! The PDU replies with bare `HEADER[,arg]*` datagrams. The ground station
//! stamps every received datagram, transmitted command and session event with
//! a source tag and a UTC timestamp, producing the lines the decoder and the
//! journal work with:
//!
//! ```text
//! PDU,2024-05-01 10:00:05.250,STATUS,1,0.750
//! GND,2024-05-01 10:00:05.001,STATUS,1
//! GND,2024-05-01 10:03:00.000,EVENT,START_FLIGHT
//! GND,2024-05-01 10:03:01.000,WARNING,channel index 7 out of range for STATUS
//! ```

use chrono::{DateTime, Utc};

use super::types::{Command, HEADER_EVENT, HEADER_WARNING, SOURCE_GROUND, SOURCE_PDU};

/// Timestamp layout written into framed lines (millisecond precision)
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Format an instant the way framed lines carry it
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

/// Frame a datagram received from the PDU
pub fn frame_rx(raw: &str, at: DateTime<Utc>) -> String {
    let payload = raw.trim_end_matches(['\r', '\n', '\0']);
    format!("{},{},{}", SOURCE_PDU, format_timestamp(at), payload)
}

/// Frame a command sent by the ground station
pub fn frame_tx(command: &Command, at: DateTime<Utc>) -> String {
    format!("{},{},{}", SOURCE_GROUND, format_timestamp(at), command)
}

/// Frame a ground event such as `START_FLIGHT`
pub fn frame_event(name: &str, at: DateTime<Utc>) -> String {
    format!("{},{},{},{}", SOURCE_GROUND, format_timestamp(at), HEADER_EVENT, name)
}

/// Frame a ground-side warning, kept on a single journal line
pub fn frame_warning(message: &str, at: DateTime<Utc>) -> String {
    let message = message.replace(['\r', '\n'], " ");
    format!("{},{},{},{}", SOURCE_GROUND, format_timestamp(at), HEADER_WARNING, message.trim())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::decoder::decode;
    use crate::protocol::types::{Message, EVENT_END_FLIGHT};
    use chrono::TimeZone;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 5).unwrap() + chrono::Duration::milliseconds(250)
    }

    #[test]
    fn test_frame_rx_prefixes_source_and_time() {
        assert_eq!(
            frame_rx("STATUS,1,0.750\n", at()),
            "PDU,2024-05-01 10:00:05.250,STATUS,1,0.750"
        );
    }

    #[test]
    fn test_frame_tx() {
        let line = frame_tx(&Command::SetService { channel: 2, on: false }, at());
        assert_eq!(line, "GND,2024-05-01 10:00:05.250,SETSRVC,2,0");
    }

    #[test]
    fn test_frame_warning_stays_on_one_line() {
        let line = frame_warning("malformed packet \"PDU,x\nSTATUS\": too few fields\n", at());
        assert_eq!(
            line,
            "GND,2024-05-01 10:00:05.250,WARNING,malformed packet \"PDU,x STATUS\": too few fields"
        );
        assert_eq!(line.lines().count(), 1);
    }

    #[test]
    fn test_framed_lines_decode_with_their_own_timestamp() {
        let fallback = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap();

        let packet = decode(&frame_rx("SRVCSET,4,1", at()), fallback);
        assert_eq!(packet.received_at, at());
        assert_eq!(packet.message, Message::ServiceSet { channel: 4, on: true });

        let packet = decode(&frame_event(EVENT_END_FLIGHT, at()), fallback);
        assert_eq!(packet.source, "GND");
        assert_eq!(packet.received_at, at());
        assert_eq!(packet.message, Message::Event { name: "END_FLIGHT".to_string() });
    }
}
