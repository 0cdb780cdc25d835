//! Sliding-window deduplication of event fingerprints.
//!
//! The first sighting of a fingerprint is recorded with the current time.
//! Every later sighting inside the window reports "seen". Entries older than
//! the window are purged lazily at the start of each check, so memory stays
//! bounded by the number of distinct fingerprints seen within one window.

use chintel_sdk::objects::TransferEvent;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio::time::Instant;

/// Default deduplication window (1 hour).
pub const DEFAULT_DEDUP_WINDOW: Duration = Duration::from_secs(60 * 60);

/// Deterministic dedup key: `chain_id|tx_hash|from|to`.
///
/// Hashes and addresses are lower-cased since EVM hex is case-insensitive.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn new(chain_id: i64, tx_hash: &str, from: &str, to: &str) -> Self {
        Self(format!(
            "{}|{}|{}|{}",
            chain_id,
            tx_hash.to_lowercase(),
            from.to_lowercase(),
            to.to_lowercase()
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&TransferEvent> for Fingerprint {
    fn from(event: &TransferEvent) -> Self {
        Self::new(event.chain_id, &event.tx_hash, &event.from, &event.to)
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Default)]
struct WindowState {
    first_seen: HashMap<Fingerprint, Instant>,
    /// Insertion order. Entries are never refreshed, so this is also
    /// ordered by `first_seen`.
    order: VecDeque<(Instant, Fingerprint)>,
}

impl WindowState {
    fn purge_expired(&mut self, now: Instant, window: Duration) {
        while let Some((recorded_at, _)) = self.order.front() {
            if now.saturating_duration_since(*recorded_at) <= window {
                break;
            }
            if let Some((_, fingerprint)) = self.order.pop_front() {
                self.first_seen.remove(&fingerprint);
            }
        }
    }
}

/// Tracks recently seen fingerprints.
///
/// Check-and-insert happens under a single lock, so two concurrent
/// submissions of the same fingerprint cannot both observe "not seen".
pub struct DedupWindow {
    window: Duration,
    state: Mutex<WindowState>,
}

impl DedupWindow {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            state: Mutex::new(WindowState::default()),
        }
    }

    /// Returns `true` if the fingerprint was already seen within the window.
    ///
    /// A `false` result records the fingerprint as seen now.
    pub fn seen(&self, fingerprint: &Fingerprint) -> bool {
        self.seen_at(fingerprint, Instant::now())
    }

    /// Same as [`seen`](Self::seen) with an explicit clock reading.
    pub fn seen_at(&self, fingerprint: &Fingerprint, now: Instant) -> bool {
        let mut state = self.state.lock();
        state.purge_expired(now, self.window);

        if state.first_seen.contains_key(fingerprint) {
            return true;
        }

        state.first_seen.insert(fingerprint.clone(), now);
        state.order.push_back((now, fingerprint.clone()));
        false
    }

    /// Number of fingerprints currently tracked (including not-yet-purged ones).
    pub fn len(&self) -> usize {
        self.state.lock().first_seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn window(&self) -> Duration {
        self.window
    }
}

impl Default for DedupWindow {
    fn default() -> Self {
        Self::new(DEFAULT_DEDUP_WINDOW)
    }
}
