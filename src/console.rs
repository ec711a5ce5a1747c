//! # Operator Console Module
//!
//! Parses operator text lines into engine intents and applies them.
//!
//! ## Commands
//!
//! | Line | Effect |
//! |------|--------|
//! | `toggle <id>` | Flip channel relative to its confirmed state |
//! | `on <id>` / `off <id>` | Switch channel explicitly |
//! | `status <id>` | Ask one channel for its current |
//! | `refresh` | Ask every channel for its current |
//! | `start` / `end` | Flight session boundaries |
//! | `reset` | Reset PDU network settings |
//! | `setip <a.b.c.d>` | Change PDU IP address |
//! | `setport <p>` | Change PDU port |
//! | `group <g> <id> <in\|out>` | Edit group membership |
//! | `limit <g> <wh>` | Group energy limit (0 disables) |
//! | `offset <wh>` | Battery offset |
//! | `interval <s>` | Auto-refresh interval (0 disables) |
//! | `clear` | Zero all energy counters |
//! | `show` | Print the engine snapshot |
//! | `quit` | Leave |
//!
//! ## Usage
//!
//! ```
//! use chrono::Utc;
//! use pdu_controller::console::{execute, ConsoleOutcome, OperatorCommand};
//! use pdu_controller::engine::{Engine, EngineSettings};
//! use pdu_controller::protocol::types::Command;
//!
//! let mut engine = Engine::new(&EngineSettings::default(), Utc::now()).unwrap();
//! let command = OperatorCommand::parse("on 3").unwrap();
//! let outcome = execute(command, &mut engine, Utc::now());
//! assert_eq!(
//!     outcome,
//!     ConsoleOutcome::Transmit(vec![Command::SetService { channel: 3, on: true }])
//! );
//! ```

use std::net::Ipv4Addr;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::engine::flight::SessionEvent;
use crate::engine::Engine;
use crate::error::TelemetryFault;
use crate::protocol::types::Command;

/// One parsed operator line
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OperatorCommand {
    Toggle(u8),
    SetService { channel: u8, on: bool },
    Status(u8),
    Refresh,
    StartFlight,
    EndFlight,
    Reset,
    SetIp(Ipv4Addr),
    SetPort(u16),
    Membership { group: u8, channel: u8, member: bool },
    Limit { group: u8, limit_wh: f64 },
    Offset(f64),
    Interval(i64),
    ClearEnergy,
    Show,
    Quit,
}

/// Operator line that could not be parsed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConsoleError {
    #[error("empty command")]
    Empty,

    #[error("unknown command {0:?}")]
    UnknownCommand(String),

    #[error("{command}: missing {name}")]
    MissingArgument { command: String, name: &'static str },

    #[error("{command}: invalid {name} {value:?}")]
    InvalidArgument {
        command: String,
        name: &'static str,
        value: String,
    },
}

/// What the caller has to do after a command was applied
#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleOutcome {
    /// Send these commands to the PDU (and journal them)
    Transmit(Vec<Command>),
    /// A flight session boundary to journal
    Session(SessionEvent),
    /// Engine settings changed; nothing to send
    Updated,
    /// Render the engine snapshot
    Show,
    Quit,
    /// The engine refused the intent (already logged)
    Rejected(TelemetryFault),
}

struct Args<'a> {
    command: &'a str,
    words: std::str::SplitWhitespace<'a>,
}

impl<'a> Args<'a> {
    fn next<T: FromStr>(&mut self, name: &'static str) -> Result<T, ConsoleError> {
        let word = self.words.next().ok_or_else(|| ConsoleError::MissingArgument {
            command: self.command.to_string(),
            name,
        })?;
        word.parse().map_err(|_| ConsoleError::InvalidArgument {
            command: self.command.to_string(),
            name,
            value: word.to_string(),
        })
    }

    fn membership(&mut self) -> Result<bool, ConsoleError> {
        match self.next::<String>("in|out")?.to_ascii_lowercase().as_str() {
            "in" | "add" => Ok(true),
            "out" | "remove" => Ok(false),
            other => Err(ConsoleError::InvalidArgument {
                command: self.command.to_string(),
                name: "in|out",
                value: other.to_string(),
            }),
        }
    }
}

impl OperatorCommand {
    /// Parse one operator line (case-insensitive command word)
    pub fn parse(line: &str) -> Result<Self, ConsoleError> {
        let mut words = line.split_whitespace();
        let word = words.next().ok_or(ConsoleError::Empty)?;
        let command = word.to_ascii_lowercase();
        let mut args = Args { command: &command, words };

        let parsed = match command.as_str() {
            "toggle" | "t" => Self::Toggle(args.next("channel")?),
            "on" => Self::SetService { channel: args.next("channel")?, on: true },
            "off" => Self::SetService { channel: args.next("channel")?, on: false },
            "status" => Self::Status(args.next("channel")?),
            "refresh" | "r" => Self::Refresh,
            "start" => Self::StartFlight,
            "end" => Self::EndFlight,
            "reset" => Self::Reset,
            "setip" => Self::SetIp(args.next("address")?),
            "setport" => Self::SetPort(args.next("port")?),
            "group" => Self::Membership {
                group: args.next("group")?,
                channel: args.next("channel")?,
                member: args.membership()?,
            },
            "limit" => Self::Limit {
                group: args.next("group")?,
                limit_wh: args.next("limit (Wh)")?,
            },
            "offset" => Self::Offset(args.next("offset (Wh)")?),
            "interval" => Self::Interval(args.next("interval (s)")?),
            "clear" => Self::ClearEnergy,
            "show" | "s" => Self::Show,
            "quit" | "exit" | "q" => Self::Quit,
            _ => return Err(ConsoleError::UnknownCommand(word.to_string())),
        };
        Ok(parsed)
    }
}

/// Apply an operator command to the engine at instant `at`
pub fn execute(command: OperatorCommand, engine: &mut Engine, at: DateTime<Utc>) -> ConsoleOutcome {
    let result = match command {
        OperatorCommand::Toggle(channel) => engine.request_toggle(channel).map(transmit),
        OperatorCommand::SetService { channel, on } => {
            engine.request_set_service(channel, on).map(transmit)
        }
        OperatorCommand::Status(channel) => engine.request_status(channel).map(transmit),
        OperatorCommand::Refresh => Ok(ConsoleOutcome::Transmit(engine.request_refresh_all())),
        OperatorCommand::StartFlight => engine.start_flight(at).map(ConsoleOutcome::Session),
        OperatorCommand::EndFlight => engine.end_flight(at).map(ConsoleOutcome::Session),
        OperatorCommand::Reset => Ok(transmit(engine.request_reset())),
        OperatorCommand::SetIp(address) => Ok(transmit(engine.request_set_ip(address))),
        OperatorCommand::SetPort(port) => engine.request_set_port(port).map(transmit),
        OperatorCommand::Membership { group, channel, member } => engine
            .set_group_membership(group, channel, member)
            .map(|()| ConsoleOutcome::Updated),
        OperatorCommand::Limit { group, limit_wh } => engine
            .set_group_limit(group, limit_wh)
            .map(|()| ConsoleOutcome::Updated),
        OperatorCommand::Offset(offset_wh) => {
            engine.set_offset(offset_wh).map(|()| ConsoleOutcome::Updated)
        }
        OperatorCommand::Interval(interval_s) => {
            engine.set_refresh_interval(interval_s);
            Ok(ConsoleOutcome::Updated)
        }
        OperatorCommand::ClearEnergy => {
            engine.clear_energy(at);
            Ok(ConsoleOutcome::Updated)
        }
        OperatorCommand::Show => Ok(ConsoleOutcome::Show),
        OperatorCommand::Quit => Ok(ConsoleOutcome::Quit),
    };

    result.unwrap_or_else(ConsoleOutcome::Rejected)
}

fn transmit(command: Command) -> ConsoleOutcome {
    ConsoleOutcome::Transmit(vec![command])
}
