//! Append-only log of queue mutations.
//!
//! One JSON object per line. Opening a queue replays the log, then rewrites
//! it as a compact snapshot (temporary file plus rename) before appending
//! again. A line that does not parse, typically the last one after a crash,
//! is skipped.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, ErrorKind, Write};
use std::path::{Path, PathBuf};

use relay::{GroupKey, MessageId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub(crate) enum JournalEntry {
    Published {
        message_id: MessageId,
        group_key: GroupKey,
        sequence: u64,
        body: String,
        #[serde(default)]
        receive_count: u32,
    },
    Acked {
        message_id: MessageId,
        group_key: GroupKey,
    },
    Released {
        message_id: MessageId,
        group_key: GroupKey,
        receive_count: u32,
    },
    DeadLettered {
        message_id: MessageId,
        group_key: GroupKey,
        body: String,
        receive_count: u32,
    },
}

/// Entries read back from a journal.
#[derive(Debug, Default)]
pub(crate) struct Replay {
    pub(crate) entries: Vec<JournalEntry>,
    pub(crate) skipped: usize,
}

#[derive(Debug)]
pub(crate) struct Journal {
    path: PathBuf,
    file: File,
}

impl Journal {
    /// Reads every entry in `path`; a missing file is an empty journal.
    pub(crate) fn replay(path: &Path) -> io::Result<Replay> {
        let file = match File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Replay::default()),
            Err(e) => return Err(e),
        };

        let mut replay = Replay::default();
        for line in BufReader::new(file).lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(&line) {
                Ok(entry) => replay.entries.push(entry),
                Err(_) => replay.skipped += 1,
            }
        }
        Ok(replay)
    }

    /// Replaces `path` with `snapshot` and opens it for appending.
    pub(crate) fn rewrite(path: &Path, snapshot: &[JournalEntry]) -> io::Result<Self> {
        let temp = path.with_extension("journal.tmp");
        {
            let mut out = File::create(&temp)?;
            for entry in snapshot {
                write_line(&mut out, entry)?;
            }
            out.sync_all()?;
        }
        fs::rename(&temp, path)?;

        let file = OpenOptions::new().append(true).open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    /// Appends `entry` and flushes it to disk.
    pub(crate) fn append(&mut self, entry: &JournalEntry) -> io::Result<()> {
        write_line(&mut self.file, entry)?;
        self.file.sync_data()
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }
}

fn write_line(out: &mut File, entry: &JournalEntry) -> io::Result<()> {
    let mut line = serde_json::to_vec(entry)?;
    line.push(b'\n');
    out.write_all(&line)
}

/// File name for the journal of queue `name`: ASCII alphanumerics, `-`, `_`
/// and non-leading `.` are kept, anything else becomes `_`.
pub(crate) fn file_name(name: &str) -> String {
    let stem: String = name
        .chars()
        .enumerate()
        .map(|(i, c)| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' => c,
            '.' if i > 0 => c,
            _ => '_',
        })
        .collect();
    format!("{stem}.journal")
}
