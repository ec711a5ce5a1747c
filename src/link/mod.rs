//! # Datagram Link Module
//!
//! Handles the UDP link between the ground station and the PDU.
//!
//! This module handles:
//! - Binding the local socket (fixed receive port or ephemeral)
//! - Encoding and sending commands to the PDU
//! - Polling for replies with a short receive timeout
//! - Following PDU address changes acknowledged over the link

pub mod datagram;

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use tokio::net::UdpSocket;
use tracing::{debug, info};

use crate::config::LinkConfig;
use crate::error::{PduError, Result};
use crate::protocol::encoder::encode_command;
use crate::protocol::types::{Command, Message, ParsedTelemetry};
use datagram::{DatagramIO, TokioUdpSocket};

/// Largest datagram the PDU sends
pub const MAX_DATAGRAM_LEN: usize = 2048;

/// Link to the PDU over any [`DatagramIO`] implementation
pub struct PduLink<S: DatagramIO> {
    socket: S,
    peer: SocketAddr,
    recv_timeout: Duration,
    buf: Vec<u8>,
}

impl<S: DatagramIO> std::fmt::Debug for PduLink<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PduLink")
            .field("peer", &self.peer)
            .field("recv_timeout", &self.recv_timeout)
            .finish_non_exhaustive()
    }
}

impl PduLink<TokioUdpSocket> {
    /// Bind the local UDP socket described by `config`
    ///
    /// A `recv_port` of 0 lets the OS pick a port; the PDU replies to the
    /// sender address in that case.
    ///
    /// # Errors
    ///
    /// Returns `PduError::Link` if the socket cannot be bound
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use pdu_controller::config::LinkConfig;
    /// use pdu_controller::link::PduLink;
    ///
    /// #[tokio::main]
    /// async fn main() -> anyhow::Result<()> {
    ///     let link = PduLink::bind(&LinkConfig::default()).await?;
    ///     println!("Talking to {}", link.peer());
    ///     Ok(())
    /// }
    /// ```
    pub async fn bind(config: &LinkConfig) -> Result<Self> {
        let local = SocketAddr::new(config.bind_ip, config.recv_port);
        let peer = SocketAddr::new(IpAddr::V4(config.pdu_ip), config.pdu_port);

        let socket = UdpSocket::bind(local)
            .await
            .map_err(|e| PduError::Link(format!("Failed to bind {}: {}", local, e)))?;

        let bound = socket.local_addr()?;
        info!(local = %bound, pdu = %peer, "PDU link ready");

        Ok(Self::new(
            TokioUdpSocket::new(socket, peer),
            peer,
            Duration::from_millis(config.recv_timeout_ms),
        ))
    }
}

impl<S: DatagramIO> PduLink<S> {
    pub fn new(mut socket: S, peer: SocketAddr, recv_timeout: Duration) -> Self {
        socket.set_peer(peer);
        Self {
            socket,
            peer,
            recv_timeout,
            buf: vec![0; MAX_DATAGRAM_LEN],
        }
    }

    /// Current PDU address
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Send one command to the PDU
    ///
    /// # Errors
    ///
    /// Returns `PduError::Link` if the datagram cannot be sent
    pub async fn send_command(&mut self, command: &Command) -> Result<()> {
        let packet = encode_command(command);
        self.socket
            .send_datagram(&packet)
            .await
            .map_err(|e| PduError::Link(format!("Failed to send {}: {}", command, e)))?;

        debug!(pdu = %self.peer, %command, "TX");
        Ok(())
    }

    /// Wait up to the receive timeout for one reply
    ///
    /// # Returns
    ///
    /// * `Ok(Some(text))` - A datagram arrived (lossy UTF-8)
    /// * `Ok(None)` - Nothing arrived within the timeout
    ///
    /// # Errors
    ///
    /// Returns `PduError::Link` on socket errors other than the timeout
    pub async fn poll_reply(&mut self) -> Result<Option<String>> {
        let received = tokio::time::timeout(
            self.recv_timeout,
            self.socket.recv_datagram(&mut self.buf),
        )
        .await;

        match received {
            Err(_elapsed) => Ok(None),
            Ok(Err(e)) => Err(PduError::Link(format!("Failed to receive: {}", e))),
            Ok(Ok(len)) => {
                let text = String::from_utf8_lossy(&self.buf[..len]).into_owned();
                debug!(pdu = %self.peer, reply = %text.trim_end(), "RX");
                Ok(Some(text))
            }
        }
    }

    /// Point future commands at a new PDU address or port
    ///
    /// Used after the PDU acknowledges `SETIP` / `SETPORT`.
    pub fn retarget(&mut self, peer: SocketAddr) {
        if peer != self.peer {
            info!(old = %self.peer, new = %peer, "PDU address changed");
            self.peer = peer;
            self.socket.set_peer(peer);
        }
    }

    /// Re-target after an `IPSET` / `PORTSET` acknowledgement from the PDU
    ///
    /// Packets from any other source, and every other message, leave the
    /// peer untouched.
    pub fn follow_acknowledgement(&mut self, packet: &ParsedTelemetry) {
        if !packet.is_from_pdu() {
            return;
        }
        match packet.message {
            Message::IpSet { address } => {
                self.retarget(SocketAddr::new(IpAddr::V4(address), self.peer.port()))
            }
            Message::PortSet { port } => self.retarget(SocketAddr::new(self.peer.ip(), port)),
            _ => {}
        }
    }
}
