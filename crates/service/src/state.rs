//! Shared Observability State
//!
//! Thread-safe counters the daemon updates and the HTTP endpoint reads.

use crate::store::StoreStats;
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Shared handle; cheap to clone.
#[derive(Debug, Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

#[derive(Debug)]
struct AppStateInner {
    start_time: Instant,
    /// Cycle liveness window for the health check.
    max_cycle_gap: Duration,
    finalized_slot: AtomicU64,
    cycles_completed: AtomicU64,
    last_cycle_finished: RwLock<Option<Instant>>,
    submissions_confirmed: AtomicU64,
    reported_pubkeys: AtomicU64,
    store_slots: AtomicU64,
    store_validators: AtomicU64,
    store_min_slot: AtomicU64,
    store_max_slot: AtomicU64,
    sleeps: DashMap<String, u64>,
    last_error: RwLock<Option<String>>,
}

impl AppState {
    /// `max_cycle_gap` bounds how stale the last completed cycle may be
    /// before `/health` degrades.
    #[must_use]
    pub fn new(max_cycle_gap: Duration) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                start_time: Instant::now(),
                max_cycle_gap,
                finalized_slot: AtomicU64::new(0),
                cycles_completed: AtomicU64::new(0),
                last_cycle_finished: RwLock::new(None),
                submissions_confirmed: AtomicU64::new(0),
                reported_pubkeys: AtomicU64::new(0),
                store_slots: AtomicU64::new(0),
                store_validators: AtomicU64::new(0),
                store_min_slot: AtomicU64::new(0),
                store_max_slot: AtomicU64::new(0),
                sleeps: DashMap::new(),
                last_error: RwLock::new(None),
            }),
        }
    }

    pub fn set_finalized_slot(&self, slot: u64) {
        self.inner.finalized_slot.store(slot, Ordering::Relaxed);
    }

    #[must_use]
    pub fn finalized_slot(&self) -> u64 {
        self.inner.finalized_slot.load(Ordering::Relaxed)
    }

    pub fn record_cycle_completed(&self) {
        self.inner.cycles_completed.fetch_add(1, Ordering::Relaxed);
        *self.inner.last_cycle_finished.write() = Some(Instant::now());
    }

    #[must_use]
    pub fn cycles_completed(&self) -> u64 {
        self.inner.cycles_completed.load(Ordering::Relaxed)
    }

    pub fn record_submission_confirmed(&self) {
        self.inner
            .submissions_confirmed
            .fetch_add(1, Ordering::Relaxed);
    }

    #[must_use]
    pub fn submissions_confirmed(&self) -> u64 {
        self.inner.submissions_confirmed.load(Ordering::Relaxed)
    }

    pub fn set_reported_pubkeys(&self, count: usize) {
        self.inner
            .reported_pubkeys
            .store(count as u64, Ordering::Relaxed);
    }

    pub fn set_store_stats(&self, stats: &StoreStats) {
        self.inner
            .store_slots
            .store(stats.slots as u64, Ordering::Relaxed);
        self.inner
            .store_validators
            .store(stats.validators as u64, Ordering::Relaxed);
        self.inner
            .store_min_slot
            .store(stats.min_slot.unwrap_or(0), Ordering::Relaxed);
        self.inner
            .store_max_slot
            .store(stats.max_slot.unwrap_or(0), Ordering::Relaxed);
    }

    pub fn count_sleep(&self, reason: &str) {
        *self.inner.sleeps.entry(reason.to_string()).or_insert(0) += 1;
    }

    pub fn set_error(&self, error: Option<String>) {
        *self.inner.last_error.write() = error;
    }

    #[must_use]
    pub fn last_error(&self) -> Option<String> {
        self.inner.last_error.read().clone()
    }

    #[must_use]
    pub fn uptime_secs(&self) -> u64 {
        self.inner.start_time.elapsed().as_secs()
    }

    /// Healthy while starting up, and afterwards while cycles keep
    /// completing within the configured gap.
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        match *self.inner.last_cycle_finished.read() {
            Some(finished) => finished.elapsed() <= self.inner.max_cycle_gap,
            None => self.inner.start_time.elapsed() <= self.inner.max_cycle_gap,
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            healthy: self.is_healthy(),
            uptime_secs: self.uptime_secs(),
            finalized_slot: self.finalized_slot(),
            cycles_completed: self.cycles_completed(),
            submissions_confirmed: self.submissions_confirmed(),
            reported_pubkeys: self.inner.reported_pubkeys.load(Ordering::Relaxed),
            store_slots: self.inner.store_slots.load(Ordering::Relaxed),
            store_validators: self.inner.store_validators.load(Ordering::Relaxed),
            store_min_slot: self.inner.store_min_slot.load(Ordering::Relaxed),
            store_max_slot: self.inner.store_max_slot.load(Ordering::Relaxed),
            sleeps: self
                .inner
                .sleeps
                .iter()
                .map(|entry| (entry.key().clone(), *entry.value()))
                .collect(),
            last_error: self.last_error(),
        }
    }
}

/// Point-in-time view served by `/status`.
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub healthy: bool,
    pub uptime_secs: u64,
    pub finalized_slot: u64,
    pub cycles_completed: u64,
    pub submissions_confirmed: u64,
    pub reported_pubkeys: u64,
    pub store_slots: u64,
    pub store_validators: u64,
    pub store_min_slot: u64,
    pub store_max_slot: u64,
    pub sleeps: std::collections::BTreeMap<String, u64>,
    pub last_error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let state = AppState::new(Duration::from_secs(900));
        state.record_cycle_completed();
        state.record_cycle_completed();
        state.record_submission_confirmed();
        state.count_sleep("error_recovery");
        state.count_sleep("error_recovery");
        state.count_sleep("idle");

        let snapshot = state.snapshot();
        assert_eq!(snapshot.cycles_completed, 2);
        assert_eq!(snapshot.submissions_confirmed, 1);
        assert_eq!(snapshot.sleeps.get("error_recovery"), Some(&2));
        assert_eq!(snapshot.sleeps.get("idle"), Some(&1));
    }

    #[test]
    fn store_stats_roundtrip() {
        let state = AppState::new(Duration::from_secs(900));
        state.set_store_stats(&StoreStats {
            slots: 3,
            min_slot: Some(10),
            max_slot: Some(30),
            validators: 12,
        });
        let snapshot = state.snapshot();
        assert_eq!(snapshot.store_slots, 3);
        assert_eq!(snapshot.store_validators, 12);
        assert_eq!(snapshot.store_min_slot, 10);
        assert_eq!(snapshot.store_max_slot, 30);
    }

    #[test]
    fn health_follows_cycle_liveness() {
        let state = AppState::new(Duration::from_secs(3600));
        // fresh process, no cycle yet: within the startup grace window
        assert!(state.is_healthy());
        state.record_cycle_completed();
        assert!(state.is_healthy());

        let stale = AppState::new(Duration::ZERO);
        stale.record_cycle_completed();
        std::thread::sleep(Duration::from_millis(5));
        assert!(!stale.is_healthy());
    }

    #[test]
    fn error_is_replaceable() {
        let state = AppState::new(Duration::from_secs(900));
        assert!(state.last_error().is_none());
        state.set_error(Some("boom".into()));
        assert_eq!(state.last_error().as_deref(), Some("boom"));
        state.set_error(None);
        assert!(state.last_error().is_none());
    }
}
