//! # PDU Simulator
//!
//! Answers PDU commands over UDP so the controller can be exercised without
//! hardware.
//!
//! ```bash
//! # listen on 127.0.0.1:10001, reply to the sender
//! cargo run --bin pdu-sim
//!
//! # listen on 0.0.0.0:50000, always reply to 127.0.0.1:10002
//! cargo run --bin pdu-sim -- 0.0.0.0:50000 127.0.0.1:10002
//! ```

use std::net::SocketAddr;
use std::time::Instant;

use anyhow::{Context, Result};
use tokio::net::UdpSocket;
use tracing::{info, warn};

use pdu_controller::link::MAX_DATAGRAM_LEN;
use pdu_controller::sim::PduSimulator;

/// Default listening address
const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:10001";

/// Simulated draw of an output that is on: a slow wobble between 0.5 and 1.0 A
fn wobbling_current(started: Instant) -> impl FnMut(u8) -> f64 + Send {
    move |channel| {
        let t = started.elapsed().as_secs_f64() / 10.0 + f64::from(channel);
        0.75 + 0.25 * t.sin()
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let listen: SocketAddr = args
        .next()
        .unwrap_or_else(|| DEFAULT_LISTEN_ADDR.to_string())
        .parse()
        .context("invalid listen address")?;
    let reply_to: Option<SocketAddr> = args
        .next()
        .map(|addr| addr.parse())
        .transpose()
        .context("invalid reply address")?;

    let socket = UdpSocket::bind(listen)
        .await
        .with_context(|| format!("failed to bind {}", listen))?;
    info!(listen = %socket.local_addr()?, reply_to = ?reply_to, "PDU simulator ready");

    let mut pdu = PduSimulator::new(Box::new(wobbling_current(Instant::now())));
    let mut buf = vec![0u8; MAX_DATAGRAM_LEN];

    loop {
        tokio::select! {
            received = socket.recv_from(&mut buf) => {
                let (len, from) = match received {
                    Ok(received) => received,
                    Err(e) => {
                        warn!(error = %e, "Receive failed");
                        continue;
                    }
                };

                let command = String::from_utf8_lossy(&buf[..len]).into_owned();
                let reply = pdu.reply(&command);
                info!(%from, command = %command.trim_end(), %reply, "RX/TX");

                let target = reply_to.unwrap_or(from);
                if let Err(e) = socket.send_to(reply.as_bytes(), target).await {
                    warn!(error = %e, %target, "Reply failed");
                }
            }

            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down...");
                break;
            }
        }
    }

    Ok(())
}
