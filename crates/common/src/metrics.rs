//! Metrics collection for quotagate.
//!
//! Counts reservation outcomes, releases and lazy rollovers so hosts can
//! see how often restrictions bite.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Global metrics instance.
static METRICS: std::sync::OnceLock<Arc<Metrics>> = std::sync::OnceLock::new();

/// Get the global metrics instance.
pub fn get_metrics() -> &'static Arc<Metrics> {
    METRICS.get_or_init(|| Arc::new(Metrics::new()))
}

/// Initialize global metrics with custom instance.
pub fn init_metrics(metrics: Arc<Metrics>) -> Result<(), Arc<Metrics>> {
    METRICS.set(metrics)
}

/// Restriction engine metrics collector.
#[derive(Debug, Default)]
pub struct Metrics {
    // === Reservation Metrics ===
    /// Reservations that leased quota
    pub reservations_granted: AtomicU64,
    /// Reservations refused by policy
    pub reservations_denied: AtomicU64,
    /// Reservations answered with the null reservation
    pub reservations_unrestricted: AtomicU64,
    /// Total quota leased, in whole units
    pub quota_leased_units: AtomicU64,

    // === Release Metrics ===
    /// Releases reconciled against the current window
    pub releases_applied: AtomicU64,
    /// Releases whose window had already rolled over
    pub releases_stale: AtomicU64,
    /// Releases presented to the wrong restriction
    pub releases_rejected: AtomicU64,

    // === Window Metrics ===
    /// Lazy rollovers performed
    pub rollovers: AtomicU64,
    /// Version conflicts while writing back quota state
    pub write_conflicts: AtomicU64,
}

/// Snapshot of all metrics at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub reservations_granted: u64,
    pub reservations_denied: u64,
    pub reservations_unrestricted: u64,
    pub quota_leased_units: u64,
    pub releases_applied: u64,
    pub releases_stale: u64,
    pub releases_rejected: u64,
    pub rollovers: u64,
    pub write_conflicts: u64,
}

impl Metrics {
    /// Create a new metrics instance with all counters at zero.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            reservations_granted: AtomicU64::new(0),
            reservations_denied: AtomicU64::new(0),
            reservations_unrestricted: AtomicU64::new(0),
            quota_leased_units: AtomicU64::new(0),

            releases_applied: AtomicU64::new(0),
            releases_stale: AtomicU64::new(0),
            releases_rejected: AtomicU64::new(0),

            rollovers: AtomicU64::new(0),
            write_conflicts: AtomicU64::new(0),
        }
    }

    /// Record a granted reservation of `units` whole units.
    pub fn record_granted(&self, units: u64) {
        self.reservations_granted.fetch_add(1, Ordering::Relaxed);
        self.quota_leased_units.fetch_add(units, Ordering::Relaxed);
    }

    /// Record a denied reservation.
    pub fn record_denied(&self) {
        self.reservations_denied.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a null reservation.
    pub fn record_unrestricted(&self) {
        self.reservations_unrestricted
            .fetch_add(1, Ordering::Relaxed);
    }

    /// Record the result of a release.
    pub fn record_release(&self, accepted: bool, stale: bool) {
        let counter = match (accepted, stale) {
            (false, _) => &self.releases_rejected,
            (true, true) => &self.releases_stale,
            (true, false) => &self.releases_applied,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a lazy rollover.
    pub fn record_rollover(&self) {
        self.rollovers.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a version conflict during write-back.
    pub fn record_write_conflict(&self) {
        self.write_conflicts.fetch_add(1, Ordering::Relaxed);
    }

    /// Get a snapshot of all metrics.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            reservations_granted: self.reservations_granted.load(Ordering::Relaxed),
            reservations_denied: self.reservations_denied.load(Ordering::Relaxed),
            reservations_unrestricted: self.reservations_unrestricted.load(Ordering::Relaxed),
            quota_leased_units: self.quota_leased_units.load(Ordering::Relaxed),
            releases_applied: self.releases_applied.load(Ordering::Relaxed),
            releases_stale: self.releases_stale.load(Ordering::Relaxed),
            releases_rejected: self.releases_rejected.load(Ordering::Relaxed),
            rollovers: self.rollovers.load(Ordering::Relaxed),
            write_conflicts: self.write_conflicts.load(Ordering::Relaxed),
        }
    }

    /// Fraction of reservations that were denied.
    #[must_use]
    pub fn denial_rate(&self) -> f64 {
        let denied = self.reservations_denied.load(Ordering::Relaxed);
        let total = denied
            + self.reservations_granted.load(Ordering::Relaxed)
            + self.reservations_unrestricted.load(Ordering::Relaxed);
        if total > 0 {
            denied as f64 / total as f64
        } else {
            0.0
        }
    }
}
