//! Journal replay: rebuild engine state from a previous session's TMTC log.
//!
//! Every non-empty line goes through [`Engine::submit_inbound_packet`], so
//! channel states, accumulated energy and flight sessions end up exactly as
//! they were when the journal was written. Replayed lines are not journaled
//! again; the session keeps appending to the replayed file instead, so the
//! next restart sees the whole history.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use super::journal::TmtcJournal;
use crate::config::TelemetryConfig;
use crate::engine::Engine;
use crate::error::Result;

/// What a replay did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReplaySummary {
    /// Non-empty lines read
    pub lines: usize,
    /// Lines processed without any fault
    pub applied: usize,
    /// Faults reported across all lines
    pub faults: usize,
    /// Flight session boundaries replayed
    pub session_events: usize,
}

/// Feed every line of `reader` into `engine`
///
/// `fallback_at` stands in for the receive instant of lines whose timestamp
/// does not decode.
///
/// # Errors
///
/// Returns `PduError::Io` if reading fails; lines already replayed stay applied.
pub fn replay<R: BufRead>(
    reader: R,
    engine: &mut Engine,
    fallback_at: DateTime<Utc>,
) -> Result<ReplaySummary> {
    let mut summary = ReplaySummary::default();

    for line in reader.lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        summary.lines += 1;
        let report = engine.submit_inbound_packet(line, fallback_at);
        if report.session_event.is_some() {
            summary.session_events += 1;
        }
        if report.is_clean() {
            summary.applied += 1;
        } else {
            summary.faults += report.faults.len();
        }
    }

    Ok(summary)
}

/// Replay a journal file
pub fn replay_file(
    path: impl AsRef<Path>,
    engine: &mut Engine,
    fallback_at: DateTime<Utc>,
) -> Result<ReplaySummary> {
    let path = path.as_ref();
    let summary = replay(BufReader::new(File::open(path)?), engine, fallback_at)?;
    info!(
        path = %path.display(),
        lines = summary.lines,
        applied = summary.applied,
        faults = summary.faults,
        "Journal replayed"
    );
    Ok(summary)
}

/// Restore the engine from the configured journal and open this session's journal
///
/// # Arguments
///
/// * `config` - Journal switch, log directory and optional replay file
/// * `engine` - Engine to restore
/// * `at` - Session start; names a fresh journal and stands in for undecodable timestamps
///
/// # Returns
///
/// * `Some(journal)` - The replay file itself when one is configured (created
///   if it does not exist yet), otherwise a new file in `log_dir`
/// * `None` - Journaling is disabled
///
/// # Errors
///
/// Returns `PduError::Io` if the replay file cannot be read or the journal
/// cannot be opened
pub fn open_session_journal(
    config: &TelemetryConfig,
    engine: &mut Engine,
    at: DateTime<Utc>,
) -> Result<Option<TmtcJournal>> {
    let Some(path) = &config.replay_file else {
        return if config.journal_enabled {
            TmtcJournal::create_in(&config.log_dir, at).map(Some)
        } else {
            Ok(None)
        };
    };

    let path = Path::new(path);
    if path.exists() {
        replay_file(path, engine, at)?;
    } else {
        info!(path = %path.display(), "No journal to replay yet");
    }

    if config.journal_enabled {
        TmtcJournal::open(path).map(Some)
    } else {
        Ok(None)
    }
}
