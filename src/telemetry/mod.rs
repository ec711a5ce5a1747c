//! # Telemetry Module
//!
//! Handles the TMTC journal of framed packets and its replay.
//!
//! This module handles:
//! - Appending every framed RX/TX line and session event to a text journal
//! - Naming journal files after the session start time
//! - Replaying a previous journal into a fresh engine and appending to it

pub mod journal;
pub mod replay;

pub use journal::TmtcJournal;
pub use replay::{open_session_journal, replay, replay_file, ReplaySummary};
