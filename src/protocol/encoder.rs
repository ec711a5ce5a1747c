//! # PDU Command Encoder
//!
//! Formats outbound command intents into wire datagrams. Commands carry no
//! source or timestamp prefix; the encoder is stateless and knows nothing
//! about the destination address.

use std::fmt;

use bytes::Bytes;

use super::types::*;

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::SetService { channel, on } => {
                write!(f, "{},{},{}", CMD_SETSRVC, channel, u8::from(*on))
            }
            Command::Status { channel } => write!(f, "{},{}", CMD_STATUS, channel),
            Command::Reset => f.write_str(CMD_RESET),
            Command::SetIp { address } => {
                let [a, b, c, d] = address.octets();
                write!(f, "{},{},{},{},{}", CMD_SETIP, a, b, c, d)
            }
            Command::SetPort { port } => write!(f, "{},{}", CMD_SETPORT, port),
        }
    }
}

/// Encode a command into the datagram payload
///
/// # Arguments
///
/// * `command` - Command intent to encode
///
/// # Returns
///
/// * `Bytes` - ASCII datagram, e.g. `SETSRVC,3,1`
///
/// # Examples
///
/// ```
/// use pdu_controller::protocol::encoder::encode_command;
/// use pdu_controller::protocol::types::Command;
///
/// let datagram = encode_command(&Command::Status { channel: 2 });
/// assert_eq!(&datagram[..], b"STATUS,2");
/// ```
pub fn encode_command(command: &Command) -> Bytes {
    Bytes::from(command.to_string())
}

/// Status requests for every channel, in channel order
pub fn refresh_all_commands() -> Vec<Command> {
    (1..=CHANNEL_COUNT as u8)
        .map(|channel| Command::Status { channel })
        .collect()
}
