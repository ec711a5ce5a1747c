//! # PDU Controller
//!
//! Ground station for a six-channel power distribution unit over UDP.
//!
//! Switches PDU outputs, polls their current draw, integrates energy per
//! channel and keeps the battery budget, with every exchanged packet written
//! to a TMTC journal.

use std::path::PathBuf;

use anyhow::Result;
use chrono::{DateTime, Utc};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::time::{interval, Duration};
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use pdu_controller::config::{Config, TelemetryConfig};
use pdu_controller::console::{execute, ConsoleOutcome, OperatorCommand};
use pdu_controller::engine::{Engine, InboundReport};
use pdu_controller::link::datagram::DatagramIO;
use pdu_controller::link::PduLink;
use pdu_controller::protocol::framing::{frame_event, frame_rx, frame_tx, frame_warning};
use pdu_controller::protocol::types::Command;
use pdu_controller::telemetry::{open_session_journal, TmtcJournal};

/// Configuration file used when neither an argument nor `PDU_CONFIG` is given
const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Environment variable naming the configuration file
const CONFIG_ENV_VAR: &str = "PDU_CONFIG";

/// Seconds between status summary log lines
const STATUS_LOG_INTERVAL_S: u64 = 60;

/// Main entry point for the PDU controller
///
/// # Control Flow
///
/// 1. **Initialization**
///    - Load configuration (first argument, `PDU_CONFIG`, or the default path)
///    - Set up logging (stdout, plus a daily log file when journaling)
///    - Build the engine and replay a previous journal if configured
///    - Open the TMTC journal (appending to the replayed one) and bind the UDP link
///
/// 2. **Main Loop**
///    - Poll the link (10 ms timeout by default); frame, journal and apply replies
///    - Journal a `WARNING` line for every rejected packet
///    - Drive the auto-refresh timer and transmit its status sweeps
///    - Apply operator commands read from stdin
///    - Log a status summary every minute
///
/// 3. **Graceful Shutdown**
///    - `quit` or Ctrl+C
///    - Log the final energy snapshot
///
/// # Errors
///
/// Returns error if the configuration is invalid, the journal cannot be
/// created or the UDP socket cannot be bound.
///
/// # Examples
///
/// ```bash
/// cargo run --release -- config/default.toml
/// ```
#[tokio::main]
async fn main() -> Result<()> {
    let config_path = resolve_config_path(
        std::env::args().nth(1),
        std::env::var(CONFIG_ENV_VAR).ok(),
    );
    let config = Config::load(&config_path)?;

    let _log_guard = init_tracing(&config.telemetry);
    info!("PDU Controller v{} starting...", env!("CARGO_PKG_VERSION"));
    info!(path = %config_path.display(), "Configuration loaded");

    let started = Utc::now();
    let mut engine = Engine::new(&config.engine_settings(), started)?;

    let mut journal = open_session_journal(&config.telemetry, &mut engine, started)?;

    let mut link = PduLink::bind(&config.link).await?;

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let mut status_interval = interval(Duration::from_secs(STATUS_LOG_INTERVAL_S));

    info!("Type 'show' for the current state, 'quit' to exit");

    loop {
        tokio::select! {
            reply = link.poll_reply() => {
                match reply {
                    Ok(Some(raw)) => {
                        let at = Utc::now();
                        let framed = frame_rx(&raw, at);
                        record(&mut journal, &framed);
                        let report = engine.submit_inbound_packet(&framed, at);
                        record_faults(&mut journal, &report, at);
                        link.follow_acknowledgement(&report.packet);
                    }
                    Ok(None) => {}
                    Err(e) => warn!(error = %e, "Receive failed"),
                }

                let batch = engine.tick(Utc::now());
                if !batch.is_empty() {
                    transmit(&mut link, &mut journal, &batch).await;
                    debug!(snapshot = %snapshot_json(&engine), "Auto refresh sent");
                }
            }

            line = stdin.next_line(), if stdin_open => {
                match line {
                    Ok(Some(line)) if line.trim().is_empty() => {}
                    Ok(Some(line)) => {
                        let command = match OperatorCommand::parse(&line) {
                            Ok(command) => command,
                            Err(e) => {
                                warn!(error = %e, "Ignoring operator input");
                                continue;
                            }
                        };

                        let at = Utc::now();
                        match execute(command, &mut engine, at) {
                            ConsoleOutcome::Transmit(commands) => {
                                transmit(&mut link, &mut journal, &commands).await;
                            }
                            ConsoleOutcome::Session(event) => {
                                record(&mut journal, &frame_event(event.name(), event.at));
                            }
                            ConsoleOutcome::Show => {
                                println!("{}", snapshot_json_pretty(&engine));
                            }
                            ConsoleOutcome::Quit => {
                                info!("Operator requested exit");
                                break;
                            }
                            ConsoleOutcome::Updated | ConsoleOutcome::Rejected(_) => {}
                        }
                    }
                    Ok(None) => {
                        info!("Console input closed; running until Ctrl+C");
                        stdin_open = false;
                    }
                    Err(e) => {
                        warn!(error = %e, "Console read failed");
                        stdin_open = false;
                    }
                }
            }

            _ = status_interval.tick() => {
                let battery = engine.battery_report();
                info!(
                    flight = %engine.flight_state(),
                    used_wh = battery.used_wh,
                    remaining_wh = battery.remaining_wh,
                    remaining_percent = battery.remaining_percent,
                    "Status"
                );
                if battery.is_depleted() {
                    warn!(remaining_wh = battery.remaining_wh, "Battery budget exhausted");
                }
            }

            // Handle Ctrl+C for graceful shutdown
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down...");
                break;
            }
        }
    }

    info!(snapshot = %snapshot_json(&engine), "Final state");
    if let Some(journal) = &journal {
        info!(path = %journal.path().display(), lines = journal.lines_written(), "Journal closed");
    }

    Ok(())
}

/// Configuration path from the first argument, then the environment, then the default
fn resolve_config_path(arg: Option<String>, env: Option<String>) -> PathBuf {
    arg.or(env)
        .filter(|path| !path.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// Install the stdout subscriber, plus a daily rolling file when journaling
fn init_tracing(telemetry: &TelemetryConfig) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer());

    if telemetry.journal_enabled {
        let appender = tracing_appender::rolling::daily(&telemetry.log_dir, "pdu-controller.log");
        let (writer, guard) = tracing_appender::non_blocking(appender);
        registry
            .with(tracing_subscriber::fmt::layer().with_ansi(false).with_writer(writer))
            .init();
        Some(guard)
    } else {
        registry.init();
        None
    }
}

fn record(journal: &mut Option<TmtcJournal>, line: &str) {
    if let Some(journal) = journal {
        if let Err(e) = journal.record(line) {
            warn!(error = %e, "Failed to write journal line");
        }
    }
}

/// Journal a `WARNING` line for every fault the packet raised
fn record_faults(journal: &mut Option<TmtcJournal>, report: &InboundReport, at: DateTime<Utc>) {
    for fault in &report.faults {
        record(journal, &frame_warning(&fault.to_string(), at));
    }
}

async fn transmit<S: DatagramIO>(
    link: &mut PduLink<S>,
    journal: &mut Option<TmtcJournal>,
    commands: &[Command],
) {
    for command in commands {
        record(journal, &frame_tx(command, Utc::now()));
        if let Err(e) = link.send_command(command).await {
            warn!(error = %e, %command, "Failed to send command");
        }
    }
}

fn snapshot_json(engine: &Engine) -> String {
    serde_json::to_string(&engine.snapshot()).unwrap_or_else(|e| format!("<unserializable: {}>", e))
}

fn snapshot_json_pretty(engine: &Engine) -> String {
    serde_json::to_string_pretty(&engine.snapshot())
        .unwrap_or_else(|e| format!("<unserializable: {}>", e))
}
