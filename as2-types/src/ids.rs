//! Message-ID generation.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Generates globally unique AS2 Message-IDs.
///
/// The ID combines a millisecond timestamp, a process-wide monotonic
/// counter and a host fingerprint, so concurrent sender tasks and separate
/// processes on different hosts cannot collide. One generator is shared
/// across all pollers and senders of a process.
#[derive(Debug)]
pub struct MessageIdGenerator {
    counter: AtomicU64,
    host: String,
}

impl MessageIdGenerator {
    /// Create a generator with a fingerprint derived from the environment.
    pub fn new() -> Self {
        let host = std::env::var("HOSTNAME")
            .ok()
            .filter(|h| !h.is_empty())
            .unwrap_or_else(|| format!("p{}", std::process::id()));
        Self::with_host(&host)
    }

    /// Create a generator with an explicit host fingerprint.
    pub fn with_host(host: &str) -> Self {
        let host: String = host
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || *c == '-')
            .collect();
        Self {
            counter: AtomicU64::new(0),
            host,
        }
    }

    /// Produce the next Message-ID for a sender/receiver pair.
    ///
    /// Format: `<AS2-{millis}-{counter}-{host}@{sender}_{receiver}>`.
    pub fn next(&self, sender_as2_id: &str, receiver_as2_id: &str) -> String {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or(0);
        let count = self.counter.fetch_add(1, Ordering::Relaxed);
        format!(
            "<AS2-{millis}-{count:04}-{host}@{sender}_{receiver}>",
            host = self.host,
            sender = sender_as2_id,
            receiver = receiver_as2_id,
        )
    }
}

impl Default for MessageIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Render a Message-ID as a filesystem-safe name.
///
/// Strips the surrounding angle brackets and maps anything outside
/// `[A-Za-z0-9._-]` to `_`, matching the naming used for pending-info
/// records.
pub fn filesystem_safe_id(message_id: &str) -> String {
    message_id
        .trim()
        .trim_start_matches('<')
        .trim_end_matches('>')
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}
