//! # PDU Simulator
//!
//! Bench stand-in for the PDU firmware. Answers bare command datagrams with
//! the replies the real unit sends:
//!
//! | Command | Reply |
//! |---------|-------|
//! | `SETSRVC,i,s` | `SRVCSET,i,s` |
//! | `STATUS,i` | `STATUS,i,<amps:.3>` |
//! | `SETIP,a,b,c,d` | `IPSET,a,b,c,d` |
//! | `SETPORT,p` | `PORTSET,p` |
//! | `RESET` | `Resetting` |
//! | anything else | `CMDERROR` |
//!
//! Channels switched off report 0 A; channels switched on report whatever
//! the current source yields.

use tracing::debug;

use crate::protocol::decoder::decode_command;
use crate::protocol::types::*;

/// Produces a current draw for a channel that is switched on
pub type CurrentSource = Box<dyn FnMut(u8) -> f64 + Send>;

/// Simulated PDU
pub struct PduSimulator {
    outputs: [bool; CHANNEL_COUNT],
    current_source: CurrentSource,
}

impl std::fmt::Debug for PduSimulator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PduSimulator")
            .field("outputs", &self.outputs)
            .finish_non_exhaustive()
    }
}

impl PduSimulator {
    /// Create a simulator with every output off
    ///
    /// # Examples
    ///
    /// ```
    /// use pdu_controller::sim::PduSimulator;
    ///
    /// let mut pdu = PduSimulator::new(Box::new(|_channel| 0.75));
    /// assert_eq!(pdu.reply("SETSRVC,2,1"), "SRVCSET,2,1");
    /// assert_eq!(pdu.reply("STATUS,2"), "STATUS,2,0.750");
    /// assert_eq!(pdu.reply("STATUS,3"), "STATUS,3,0.000");
    /// ```
    pub fn new(current_source: CurrentSource) -> Self {
        Self {
            outputs: [false; CHANNEL_COUNT],
            current_source,
        }
    }

    pub fn is_on(&self, channel: u8) -> bool {
        output_slot(channel).map(|slot| self.outputs[slot]).unwrap_or(false)
    }

    /// Reply to one bare command datagram
    pub fn reply(&mut self, raw: &str) -> String {
        let reply = match decode_command(raw) {
            Some(Command::SetService { channel, on }) => match output_slot(channel) {
                Some(slot) => {
                    self.outputs[slot] = on;
                    format!("{},{},{}", HEADER_SRVCSET, channel, u8::from(on))
                }
                None => HEADER_CMDERROR.to_string(),
            },
            Some(Command::Status { channel }) => match output_slot(channel) {
                Some(slot) => {
                    let amps = if self.outputs[slot] {
                        (self.current_source)(channel).max(0.0)
                    } else {
                        0.0
                    };
                    format!("{},{},{:.3}", HEADER_STATUS, channel, amps)
                }
                None => HEADER_CMDERROR.to_string(),
            },
            Some(Command::SetIp { address }) => {
                let [a, b, c, d] = address.octets();
                format!("{},{},{},{},{}", HEADER_IPSET, a, b, c, d)
            }
            Some(Command::SetPort { port }) => format!("{},{}", HEADER_PORTSET, port),
            Some(Command::Reset) => {
                self.outputs = [false; CHANNEL_COUNT];
                HEADER_RESETTING.to_string()
            }
            None => HEADER_CMDERROR.to_string(),
        };

        debug!(command = %raw.trim_end(), %reply, "Simulated PDU reply");
        reply
    }
}

fn output_slot(channel: u8) -> Option<usize> {
    (1..=CHANNEL_COUNT as u8)
        .contains(&channel)
        .then(|| usize::from(channel - 1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{Engine, EngineSettings};
    use crate::protocol::framing::frame_rx;
    use chrono::{Duration, TimeZone, Utc};

    fn simulator() -> PduSimulator {
        PduSimulator::new(Box::new(|channel| 0.5 + f64::from(channel) / 10.0))
    }

    #[test]
    fn test_reply_table() {
        let mut pdu = simulator();
        assert_eq!(pdu.reply("SETSRVC,1,1"), "SRVCSET,1,1");
        assert!(pdu.is_on(1));
        assert_eq!(pdu.reply("STATUS,1"), "STATUS,1,0.600");
        assert_eq!(pdu.reply("SETIP,192,168,1,50"), "IPSET,192,168,1,50");
        assert_eq!(pdu.reply("SETPORT,50001"), "PORTSET,50001");
        assert_eq!(pdu.reply("RESET"), "Resetting");
        assert_eq!(pdu.reply("HELLO"), "CMDERROR");
        assert_eq!(pdu.reply("STATUS,7"), "CMDERROR");
        assert_eq!(pdu.reply("SETSRVC,0,1"), "CMDERROR");
    }

    #[test]
    fn test_off_channels_draw_nothing() {
        let mut pdu = simulator();
        assert_eq!(pdu.reply("STATUS,4"), "STATUS,4,0.000");
        pdu.reply("SETSRVC,4,1");
        pdu.reply("SETSRVC,4,0");
        assert_eq!(pdu.reply("STATUS,4"), "STATUS,4,0.000");
    }

    #[test]
    fn test_reset_switches_everything_off() {
        let mut pdu = simulator();
        pdu.reply("SETSRVC,2,1\r\n");
        pdu.reply("RESET");
        assert!(!pdu.is_on(2));
    }

    #[test]
    fn test_engine_against_simulator() {
        let t0 = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        let mut engine = Engine::new(&EngineSettings::default(), t0).unwrap();
        let mut pdu = PduSimulator::new(Box::new(|_| 1.0));

        let request = engine.request_toggle(5).unwrap();
        let reply = pdu.reply(&request.to_string());
        engine.submit_inbound_packet(&frame_rx(&reply, t0), t0);
        assert!(engine.channel(5).unwrap().confirmed_on);

        for minutes in [0, 30, 60] {
            let at = t0 + Duration::minutes(minutes);
            for command in engine.request_refresh_all() {
                let reply = pdu.reply(&command.to_string());
                let report = engine.submit_inbound_packet(&frame_rx(&reply, at), at);
                assert!(report.is_clean());
            }
        }

        assert!((engine.channel(5).unwrap().accumulated_wh - 28.0).abs() < 1e-9);
        assert_eq!(engine.channel(1).unwrap().accumulated_wh, 0.0);
    }
}
