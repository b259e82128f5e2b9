//! Duplicate-notice suppression.
//!
//! The gateway redelivers webhook events and the periodic sweep revisits the
//! same pending transactions, so the same reconcile outcome can be produced
//! several times in a short burst. The deduper keeps one timestamp per notice
//! key and drops repeats inside the window.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use compact_str::CompactString;
use tokio::time::Instant;

/// Suppression window measured from the last notice that was let through.
pub const DEFAULT_DEDUP_WINDOW: Duration = Duration::from_secs(5);

/// Tracked-key count that triggers a cleanup pass.
const EVICT_THRESHOLD: usize = 1024;

/// Per-key suppression of repeated notices.
///
/// Time is taken from the tokio clock so tests can drive it.
pub struct NoticeDeduper {
    window: Duration,
    seen: Mutex<HashMap<CompactString, Instant>>,
}

impl Default for NoticeDeduper {
    fn default() -> Self {
        Self::with_window(DEFAULT_DEDUP_WINDOW)
    }
}

impl NoticeDeduper {
    pub fn with_window(window: Duration) -> Self {
        Self {
            window,
            seen: Mutex::new(HashMap::new()),
        }
    }

    /// Whether a notice for `key` should go out now.
    ///
    /// Returns `true` and records the timestamp when the key is unseen or
    /// its window has elapsed. Suppressed repeats do not refresh the
    /// timestamp, so a steady stream of duplicates still surfaces once per
    /// window.
    pub fn should_emit(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut seen = match self.seen.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if seen.len() >= EVICT_THRESHOLD {
            let window = self.window;
            seen.retain(|_, last| now.duration_since(*last) < window);
        }

        match seen.get(key) {
            Some(last) if now.duration_since(*last) < self.window => false,
            _ => {
                seen.insert(CompactString::from(key), now);
                true
            }
        }
    }

    #[cfg(test)]
    fn tracked_keys(&self) -> usize {
        match self.seen.lock() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }
}
