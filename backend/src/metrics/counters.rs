use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Minimal counters for operational visibility.
#[derive(Clone, Default)]
pub struct Counters {
    pub bookings_created: Arc<AtomicU64>,
    pub bookings_confirmed: Arc<AtomicU64>,
    pub bookings_cancelled: Arc<AtomicU64>,

    // refusals
    pub booking_rejected_no_seats: Arc<AtomicU64>,
    pub booking_rejected_inactive: Arc<AtomicU64>,
    pub confirm_rejected_expired: Arc<AtomicU64>,

    // sweeper
    pub sweep_runs: Arc<AtomicU64>,
    pub holds_expired: Arc<AtomicU64>,
    pub sweep_failures: Arc<AtomicU64>,

    // cascade
    pub events_cancelled: Arc<AtomicU64>,
    pub cascade_bookings_cancelled: Arc<AtomicU64>,

    // notification
    pub notifications_sent: Arc<AtomicU64>,
    pub notifications_failed: Arc<AtomicU64>,
    pub notification_batches_timed_out: Arc<AtomicU64>,
}

impl Counters {
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Relaxed)
    }
}
