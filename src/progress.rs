//! Progress reporting for bulk catch-up.

use std::time::Instant;
use tracing::info;

/// Documents between two progress lines during a catch-up scan.
pub const PROGRESS_EVERY: u64 = 1000;

/// Live changes between two `Processed N changes` lines.
pub const CHANGES_EVERY: u64 = 100;

/// Counts scanned documents against the total taken before the scan.
#[derive(Debug)]
pub struct ScanProgress {
    collection: String,
    total: u64,
    count: u64,
    started: Instant,
}

impl ScanProgress {
    pub fn new(collection: impl Into<String>, total: u64) -> Self {
        Self {
            collection: collection.into(),
            total,
            count: 0,
            started: Instant::now(),
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    /// Record one document, logging every [`PROGRESS_EVERY`] documents.
    pub fn tick(&mut self) {
        self.count += 1;
        if self.count % PROGRESS_EVERY == 0 {
            info!("[{}] {}", self.collection, self.line());
        }
    }

    /// Log the final line.
    pub fn finish(&self) {
        info!("[{}] {}", self.collection, self.line());
    }

    /// `count/total - pct% | elapsed s`
    pub fn line(&self) -> String {
        format!(
            "{}/{} - {:.1}% | {:.1}s",
            self.count,
            self.total,
            self.percent(),
            self.started.elapsed().as_secs_f64()
        )
    }

    /// Share of the total seen so far. A rescan after a restart can push it
    /// past 100, so it is capped.
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            return 100.0;
        }
        (self.count as f64 * 100.0 / self.total as f64).min(100.0)
    }
}
