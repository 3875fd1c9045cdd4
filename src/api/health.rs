//! Shared health state for the /health endpoint.
//! Updated by the pipeline, read by the API.

use std::sync::atomic::{AtomicU64, Ordering};

/// Pipeline counters since process start.
#[derive(Default)]
pub struct HealthState {
    /// Listings that reached the terminal pipeline state.
    pub listings_processed: AtomicU64,
    /// Comp refreshes that came back with no priced comps.
    pub empty_comp_summaries: AtomicU64,
    pub alerts_sent: AtomicU64,
    pub alerts_failed: AtomicU64,
    /// Nanosecond timestamp of the last comp refresh (0 = none).
    pub last_refresh_at_ns: AtomicU64,
}

impl HealthState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_listings_processed(&self) {
        self.listings_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_empty_comp_summaries(&self) {
        self.empty_comp_summaries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_alerts_sent(&self) {
        self.alerts_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_alerts_failed(&self) {
        self.alerts_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_last_refresh_at_ns(&self, ns: u64) {
        self.last_refresh_at_ns.store(ns, Ordering::Relaxed);
    }

    pub fn listings_processed(&self) -> u64 {
        self.listings_processed.load(Ordering::Relaxed)
    }

    pub fn empty_comp_summaries(&self) -> u64 {
        self.empty_comp_summaries.load(Ordering::Relaxed)
    }

    pub fn alerts_sent(&self) -> u64 {
        self.alerts_sent.load(Ordering::Relaxed)
    }

    pub fn alerts_failed(&self) -> u64 {
        self.alerts_failed.load(Ordering::Relaxed)
    }

    pub fn last_refresh_at_ns(&self) -> u64 {
        self.last_refresh_at_ns.load(Ordering::Relaxed)
    }
}
