//! Append-only tool usage log
//!
//! One JSON object per line. The whole log is scanned once at open time into
//! an in-memory tally, which is then kept current as records are appended.
//! Appends are serialized behind a mutex so several conversations can share
//! one store.

use std::cmp::Reverse;
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use itertools::Itertools;
use jiff::Timestamp;
use serde::{Deserialize, Serialize};

use crate::error::RouterError;

/// One tool invocation, as persisted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub server: String,
    pub timestamp: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
}

/// Accepted line shapes
///
/// Older logs hold one line per session listing every server used in it.
#[derive(Deserialize)]
#[serde(untagged)]
enum LogLine {
    Record(UsageRecord),
    Session { timestamp: Timestamp, tools_used: Vec<String> },
}

#[derive(Debug, Clone, Copy)]
struct Tally {
    count: u64,
    last_used: Timestamp,
    first_seen: usize,
}

#[derive(Default)]
struct State {
    file: Option<File>,
    /// The log on disk ends mid-line and the next append must start fresh
    needs_newline: bool,
    tallies: HashMap<String, Tally>,
}

impl State {
    fn count(&mut self, server: &str, at: Timestamp) {
        let next_seen = self.tallies.len();
        self.tallies
            .entry(server.to_owned())
            .and_modify(|tally| {
                tally.count += 1;
                tally.last_used = tally.last_used.max(at);
            })
            .or_insert(Tally {
                count: 1,
                last_used: at,
                first_seen: next_seen,
            });
    }
}

/// Durable usage log with a derived frequency ranking
pub struct UsageMetrics {
    path: PathBuf,
    state: Mutex<State>,
}

impl UsageMetrics {
    /// Open the log at `path`, tallying any existing records
    ///
    /// A missing file is an empty history. Unreadable lines are skipped
    /// with a warning.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut state = State::default();

        match fs::read(&path) {
            Ok(bytes) => {
                state.needs_newline = bytes.last().is_some_and(|b| *b != b'\n');
                load_lines(&bytes, &mut state);
                tracing::info!(
                    path = %path.display(),
                    servers = state.tallies.len(),
                    "loaded usage metrics"
                );
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no usage metrics yet");
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "could not read usage metrics, starting empty");
            }
        }

        Self {
            path,
            state: Mutex::new(state),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record and flush it to disk before returning
    pub fn record(&self, server: &str, timestamp: Timestamp, success: Option<bool>) -> Result<(), RouterError> {
        self.record_all(&[UsageRecord {
            server: server.to_owned(),
            timestamp,
            success,
        }])
    }

    /// Append records with a single write and flush before returning
    ///
    /// Every record counts toward ranking whatever its `success` flag. The
    /// in-memory tally only changes once the write has succeeded, and then
    /// for all records at once.
    pub fn record_all(&self, records: &[UsageRecord]) -> Result<(), RouterError> {
        if records.is_empty() {
            return Ok(());
        }

        let mut lines = Vec::new();
        for record in records {
            serde_json::to_writer(&mut lines, record).map_err(|e| RouterError::MetricsWriteFailed(e.to_string()))?;
            lines.push(b'\n');
        }

        let mut state = self.lock();

        if state.needs_newline {
            lines.insert(0, b'\n');
        }

        let mut file = match state.file.take() {
            Some(file) => file,
            None => self.open_for_append()?,
        };

        // on failure the handle is dropped and reopened by the next append,
        // which also starts a fresh line in case this one was torn
        if let Err(e) = file.write_all(&lines).and_then(|()| file.sync_data()) {
            state.needs_newline = true;
            return Err(RouterError::MetricsWriteFailed(format!("{}: {e}", self.path.display())));
        }

        state.file = Some(file);
        state.needs_newline = false;

        for record in records {
            state.count(&record.server, record.timestamp);
        }

        Ok(())
    }

    /// Every server with at least one record, most used first
    ///
    /// Ties are broken by most recent use, then by position in
    /// `registry_order`, then by when the server first appeared in the log.
    pub fn ranking(&self, registry_order: &[String]) -> Vec<String> {
        let position: HashMap<&str, usize> = registry_order
            .iter()
            .enumerate()
            .map(|(i, id)| (id.as_str(), i))
            .collect();

        let state = self.lock();

        state
            .tallies
            .iter()
            .sorted_by_key(|(id, tally)| {
                (
                    Reverse(tally.count),
                    Reverse(tally.last_used),
                    position.get(id.as_str()).copied().unwrap_or(usize::MAX),
                    tally.first_seen,
                )
            })
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// The `n` most used servers
    pub fn top_n(&self, n: usize) -> Vec<String> {
        self.top_n_in_order(n, &[])
    }

    /// The `n` most used servers, breaking ties by `registry_order`
    pub fn top_n_in_order(&self, n: usize, registry_order: &[String]) -> Vec<String> {
        self.ranking(registry_order).into_iter().take(n).collect()
    }

    /// Invocations recorded for a server, failed ones included
    pub fn count(&self, server: &str) -> u64 {
        self.lock().tallies.get(server).map_or(0, |t| t.count)
    }

    fn open_for_append(&self) -> Result<File, RouterError> {
        let write_failed = |e: std::io::Error| RouterError::MetricsWriteFailed(format!("{}: {e}", self.path.display()));

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(write_failed)?;
        }

        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(write_failed)
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // the state is only mutated after a write succeeds, so it stays
        // consistent even if a holder panicked
        self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

fn load_lines(bytes: &[u8], state: &mut State) {
    for (index, raw) in bytes.split(|b| *b == b'\n').enumerate() {
        let line_no = index + 1;

        let line = match std::str::from_utf8(raw) {
            Ok(line) => line.trim(),
            Err(e) => {
                warn_corrupt(line_no, &e.to_string());
                continue;
            }
        };

        if line.is_empty() {
            continue;
        }

        match serde_json::from_str::<LogLine>(line) {
            Ok(LogLine::Record(record)) => state.count(&record.server, record.timestamp),
            Ok(LogLine::Session { timestamp, tools_used }) => {
                for server in tools_used.iter().unique() {
                    state.count(server, timestamp);
                }
            }
            Err(e) => warn_corrupt(line_no, &e.to_string()),
        }
    }
}

fn warn_corrupt(line: usize, reason: &str) {
    let error = RouterError::MetricsReadCorrupt {
        line,
        reason: reason.to_owned(),
    };
    tracing::warn!(%error, "skipping usage record");
}
