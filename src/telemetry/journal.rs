//! TMTC journal: append-only text log of every framed line.
//!
//! Each line is flushed as soon as it is written so the file can be replayed
//! after a crash.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::info;

use crate::error::Result;

/// Suffix of journal file names
pub const JOURNAL_SUFFIX: &str = "-PDU LOG.txt";

/// Journal file name for a session opened at `at`
///
/// # Examples
///
/// ```
/// use chrono::{TimeZone, Utc};
/// use pdu_controller::telemetry::journal::journal_file_name;
///
/// let at = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
/// assert_eq!(journal_file_name(at), "20240501_100000-PDU LOG.txt");
/// ```
pub fn journal_file_name(at: DateTime<Utc>) -> String {
    format!("{}{}", at.format("%Y%m%d_%H%M%S"), JOURNAL_SUFFIX)
}

/// Append-only journal of framed TMTC lines
#[derive(Debug)]
pub struct TmtcJournal {
    path: PathBuf,
    writer: BufWriter<File>,
    lines_written: u64,
}

impl TmtcJournal {
    /// Create a new journal file in `dir`, named after `at`
    ///
    /// The directory is created if needed.
    ///
    /// # Errors
    ///
    /// Returns `PduError::Io` if the directory or file cannot be created
    pub fn create_in(dir: impl AsRef<Path>, at: DateTime<Utc>) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        Self::open(dir.join(journal_file_name(at)))
    }

    /// Open (or create) a journal file for appending
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        info!(path = %path.display(), "TMTC journal opened");
        Ok(Self {
            path,
            writer: BufWriter::new(file),
            lines_written: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn lines_written(&self) -> u64 {
        self.lines_written
    }

    /// Append one framed line and flush it to disk
    pub fn record(&mut self, line: &str) -> Result<()> {
        writeln!(self.writer, "{}", line.trim_end_matches(['\r', '\n']))?;
        self.writer.flush()?;
        self.lines_written += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap()
    }

    #[test]
    fn test_create_in_names_file_after_session_start() {
        let dir = TempDir::new().unwrap();
        let journal = TmtcJournal::create_in(dir.path().join("logs"), t0()).unwrap();
        assert!(journal.path().ends_with("logs/20240501_100000-PDU LOG.txt"));
        assert!(journal.path().exists());
    }

    #[test]
    fn test_lines_are_visible_immediately() {
        let dir = TempDir::new().unwrap();
        let mut journal = TmtcJournal::create_in(dir.path(), t0()).unwrap();

        journal.record("GND,2024-05-01 10:00:00.000,STATUS,1").unwrap();
        journal.record("PDU,2024-05-01 10:00:00.012,STATUS,1,0.512\r\n").unwrap();

        let contents = fs::read_to_string(journal.path()).unwrap();
        assert_eq!(
            contents,
            "GND,2024-05-01 10:00:00.000,STATUS,1\nPDU,2024-05-01 10:00:00.012,STATUS,1,0.512\n"
        );
        assert_eq!(journal.lines_written(), 2);
    }

    #[test]
    fn test_open_appends_to_existing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("journal.txt");
        fs::write(&path, "GND,2024-05-01 09:00:00.000,RESET\n").unwrap();

        let mut journal = TmtcJournal::open(&path).unwrap();
        journal.record("GND,2024-05-01 10:00:00.000,EVENT,START_FLIGHT").unwrap();

        let contents = fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 2);
        assert!(contents.ends_with("EVENT,START_FLIGHT\n"));
    }
}
