use std::collections::VecDeque;

use chrono::Utc;
use parking_lot::Mutex;
use tracing_subscriber::EnvFilter;

/// Maximum number of lines kept in the admin-visible log ring.
const LOG_RING_CAPACITY: usize = 200;

/// Initialize the tracing subscriber from a simple level name
/// (`trace`/`debug`/`info`/`warn`/`error`), defaulting to `info` on anything
/// unrecognized.
pub fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}

/// A bounded, newest-wins ring of human-readable log lines, independent of
/// whatever `tracing` subscriber is installed, so `GET /admin/logs` keeps
/// working even when no subscriber is configured (e.g. under test).
pub struct LogRing {
    lines: Mutex<VecDeque<String>>,
}

impl LogRing {
    #[must_use]
    pub fn new() -> Self {
        Self {
            lines: Mutex::new(VecDeque::with_capacity(LOG_RING_CAPACITY)),
        }
    }

    /// Append one line, dropping the oldest if the ring is at capacity.
    pub fn push(&self, message: &str) {
        let mut lines = self.lines.lock();
        if lines.len() >= LOG_RING_CAPACITY {
            lines.pop_front();
        }
        lines.push_back(format!("[{}] {message}", Utc::now().to_rfc3339()));
    }

    /// Snapshot the ring, oldest first.
    #[must_use]
    pub fn snapshot(&self) -> Vec<String> {
        self.lines.lock().iter().cloned().collect()
    }
}

impl Default for LogRing {
    fn default() -> Self {
        Self::new()
    }
}

/// Emit a structured `tracing` event at `info` level and also append the
/// same message to the admin log ring — the one choke point every
/// noteworthy event passes through.
pub fn log_and_record(ring: &LogRing, message: &str) {
    tracing::info!("{message}");
    ring.push(message);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ring_drops_oldest_past_capacity() {
        let ring = LogRing::new();
        for i in 0..(LOG_RING_CAPACITY + 10) {
            ring.push(&format!("line {i}"));
        }
        let snapshot = ring.snapshot();
        assert_eq!(snapshot.len(), LOG_RING_CAPACITY);
        assert!(snapshot.last().unwrap().contains(&format!("line {}", LOG_RING_CAPACITY + 9)));
        assert!(!snapshot.iter().any(|l| l.contains("line 0]") || l.ends_with("line 0")));
    }

    #[test]
    fn ring_preserves_insertion_order() {
        let ring = LogRing::new();
        ring.push("first");
        ring.push("second");
        let snapshot = ring.snapshot();
        assert!(snapshot[0].contains("first"));
        assert!(snapshot[1].contains("second"));
    }
}
