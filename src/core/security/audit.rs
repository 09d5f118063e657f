//! Security audit log.
//!
//! One JSON object per line. The file is trimmed before each write: an
//! oversized file keeps only its tail, and now and then entries older than
//! the retention window are dropped.

use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDateTime, TimeDelta};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::ClientMeta;
use crate::core::Result;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Longest user agent recorded.
const MAX_USER_AGENT_CHARS: usize = 200;

/// Lines kept when an oversized file is cut down.
const TAIL_LINES: usize = 1000;

/// Kinds of security event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    Request,
    RateLimited,
    BlockedContent,
    BlockedOrigin,
    BlockedReferer,
    SafetyFlag,
}

/// One log line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub timestamp: String,
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub ip: String,
    pub user_agent: String,
    pub message: String,
    #[serde(default)]
    pub context: Value,
}

/// Append-only JSON lines log shared by all requests.
#[derive(Debug, Clone)]
pub struct AuditLog {
    path: PathBuf,
    max_bytes: u64,
    max_age: TimeDelta,
}

impl AuditLog {
    pub const DEFAULT_MAX_BYTES: u64 = 10 * 1024 * 1024;
    pub const DEFAULT_MAX_AGE_DAYS: i64 = 7;

    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            max_bytes: Self::DEFAULT_MAX_BYTES,
            max_age: TimeDelta::days(Self::DEFAULT_MAX_AGE_DAYS),
        }
    }

    #[must_use]
    pub const fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write one event. Failures are logged and swallowed; the request that
    /// triggered the event carries on regardless.
    pub async fn record(&self, kind: EventKind, client: &ClientMeta, message: &str, context: Value) {
        let entry = AuditEntry {
            timestamp: Local::now().format(TIMESTAMP_FORMAT).to_string(),
            kind,
            ip: client.ip.clone(),
            user_agent: client.user_agent.chars().take(MAX_USER_AGENT_CHARS).collect(),
            message: message.to_string(),
            context,
        };

        tracing::info!(kind = ?kind, ip = %entry.ip, detail = message, "security event");

        let log = self.clone();
        let written = tokio::task::spawn_blocking(move || log.append(&entry)).await;
        match written {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!(path = %self.path.display(), error = %e, "failed to write security log"),
            Err(e) => tracing::warn!(error = %e, "security log task failed"),
        }
    }

    fn append(&self, entry: &AuditEntry) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut line = serde_json::to_string(entry)?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(&self.path)?;
        file.lock()?;

        let result = self.rotate(&mut file).and_then(|()| {
            file.write_all(line.as_bytes())?;
            Ok(())
        });
        file.unlock()?;
        result
    }

    fn rotate(&self, file: &mut File) -> Result<()> {
        let size = file.metadata()?.len();
        if size > self.max_bytes {
            let contents = read_all(file)?;
            rewrite(file, &keep_tail(&contents, TAIL_LINES))?;
            return Ok(());
        }

        if rand::random_range(1..=100) != 1 {
            return Ok(());
        }

        let contents = read_all(file)?;
        let cutoff = Local::now().naive_local() - self.max_age;
        if let Some(pruned) = prune_expired(&contents, cutoff) {
            rewrite(file, &pruned)?;
        }
        Ok(())
    }
}

fn read_all(file: &mut File) -> Result<String> {
    let mut contents = String::new();
    file.read_to_string(&mut contents)?;
    Ok(contents)
}

fn rewrite(file: &mut File, contents: &str) -> Result<()> {
    file.set_len(0)?;
    file.write_all(contents.as_bytes())?;
    Ok(())
}

/// Last `keep` lines, or nothing when the file has no more than that.
fn keep_tail(contents: &str, keep: usize) -> String {
    let lines: Vec<&str> = contents.lines().collect();
    if lines.len() <= keep {
        return String::new();
    }
    let mut out = lines[lines.len() - keep..].join("\n");
    out.push('\n');
    out
}

/// Drop entries stamped before `cutoff`. Lines that are not entries are
/// kept. Returns `None` when nothing was dropped.
fn prune_expired(contents: &str, cutoff: NaiveDateTime) -> Option<String> {
    let lines: Vec<&str> = contents.lines().collect();
    let kept: Vec<&str> = lines
        .iter()
        .copied()
        .filter(|line| is_current(line, cutoff))
        .collect();

    if kept.len() == lines.len() {
        return None;
    }
    let mut out = kept.join("\n");
    out.push('\n');
    Some(out)
}

fn is_current(line: &str, cutoff: NaiveDateTime) -> bool {
    let Ok(value) = serde_json::from_str::<Value>(line) else {
        return true;
    };
    let Some(stamp) = value.get("timestamp").and_then(Value::as_str) else {
        return true;
    };
    NaiveDateTime::parse_from_str(stamp, TIMESTAMP_FORMAT).is_ok_and(|t| t >= cutoff)
}
