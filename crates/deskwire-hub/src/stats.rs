//! Hub delivery counters
//!
//! Kept locally for the status endpoint and mirrored to the `metrics`
//! recorder for Prometheus scraping.

use crate::hub::BroadcastReport;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Default)]
pub struct HubMetrics {
    broadcasts: AtomicU64,
    delivered: AtomicU64,
    dropped: AtomicU64,
    pruned: AtomicU64,
    registrations: AtomicU64,
}

impl HubMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_registration(&self, active: usize) {
        self.registrations.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("deskwire_subscribers_registered_total").increment(1);
        metrics::gauge!("deskwire_subscribers_active").set(active as f64);
    }

    pub fn record_unregistration(&self, active: usize) {
        metrics::gauge!("deskwire_subscribers_active").set(active as f64);
    }

    pub fn record_broadcast(&self, report: &BroadcastReport, active: usize) {
        self.broadcasts.fetch_add(1, Ordering::Relaxed);
        self.delivered
            .fetch_add(report.delivered as u64, Ordering::Relaxed);
        self.dropped.fetch_add(report.dropped as u64, Ordering::Relaxed);
        self.pruned.fetch_add(report.pruned as u64, Ordering::Relaxed);

        metrics::counter!("deskwire_broadcasts_total").increment(1);
        metrics::counter!("deskwire_events_delivered_total").increment(report.delivered as u64);
        metrics::counter!("deskwire_events_dropped_total").increment(report.dropped as u64);
        metrics::counter!("deskwire_subscribers_pruned_total").increment(report.pruned as u64);
        metrics::gauge!("deskwire_subscribers_active").set(active as f64);
    }

    pub fn snapshot(&self) -> HubMetricsSnapshot {
        HubMetricsSnapshot {
            broadcasts: self.broadcasts.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            pruned: self.pruned.load(Ordering::Relaxed),
            registrations: self.registrations.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of the hub counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HubMetricsSnapshot {
    pub broadcasts: u64,
    pub delivered: u64,
    pub dropped: u64,
    pub pruned: u64,
    pub registrations: u64,
}
