//! Per-client request limits shared across processes.
//!
//! Counters live in a JSON file mapping a hashed client IP to the
//! timestamps of its recent requests. Every check is a read-modify-write
//! under an exclusive file lock.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use sha2::{Digest, Sha256};

use crate::core::Result;

type Counters = HashMap<String, Vec<i64>>;

/// Sliding-window limiter backed by a shared file.
///
/// Each client keeps the timestamps of its admitted requests; a request is
/// admitted while fewer than `max_requests` of them fall inside `window`.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    path: PathBuf,
    max_requests: usize,
    window: Duration,
}

impl RateLimiter {
    /// Default: 20 requests per 60 seconds.
    pub const DEFAULT_MAX_REQUESTS: usize = 20;
    pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60);

    #[must_use]
    pub fn new(path: impl Into<PathBuf>, max_requests: usize, window: Duration) -> Self {
        Self {
            path: path.into(),
            max_requests,
            window,
        }
    }

    /// Record a request from `ip` and report whether it is within the limit.
    ///
    /// Rejected requests are not recorded.
    pub async fn check(&self, ip: &str) -> Result<bool> {
        let path = self.path.clone();
        let key = client_key(ip);
        let max = self.max_requests;
        let window = i64::try_from(self.window.as_secs()).unwrap_or(i64::MAX);
        let now = chrono::Utc::now().timestamp();

        tokio::task::spawn_blocking(move || check_locked(&path, &key, now, max, window)).await?
    }
}

/// Hex SHA-256 of the client address; raw IPs are never written to disk.
fn client_key(ip: &str) -> String {
    hex::encode(Sha256::digest(ip.as_bytes()))
}

fn check_locked(path: &Path, key: &str, now: i64, max: usize, window: i64) -> Result<bool> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)?;
    file.lock()?;

    let result = update(&mut file, key, now, max, window);
    file.unlock()?;
    result
}

fn update(file: &mut File, key: &str, now: i64, max: usize, window: i64) -> Result<bool> {
    let mut raw = String::new();
    file.read_to_string(&mut raw)?;
    // A corrupt file resets the counters rather than locking everyone out.
    let mut counters: Counters = serde_json::from_str(&raw).unwrap_or_default();

    let allowed = apply(&mut counters, key, now, max, window);

    let encoded = serde_json::to_vec(&counters)?;
    file.set_len(0)?;
    file.seek(SeekFrom::Start(0))?;
    file.write_all(&encoded)?;
    file.flush()?;

    Ok(allowed)
}

/// Drop expired timestamps everywhere, then admit or reject `key`.
fn apply(counters: &mut Counters, key: &str, now: i64, max: usize, window: i64) -> bool {
    counters.retain(|_, stamps| {
        stamps.retain(|&t| now - t < window);
        !stamps.is_empty()
    });

    let stamps = counters.entry(key.to_string()).or_default();
    if stamps.len() >= max {
        if stamps.is_empty() {
            counters.remove(key);
        }
        return false;
    }
    stamps.push(now);
    true
}
