use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::anyhow;
use futures::stream::{self, StreamExt};
use tokio::task::JoinHandle;
use tracing::{Instrument, error, info, info_span, warn};

use super::Notifier;
use crate::booking::model::Booking;
use crate::metrics::counters::Counters;
use crate::user::repository::UserRepository;

/// Outcome of one notification batch. Only ever logged and counted.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub sent: usize,
    pub failed: usize,
    /// The batch hit its time budget; undelivered notices were dropped.
    pub timed_out: bool,
}

/// Runs cancellation notices after a commit, off the caller's path.
///
/// A batch shares one time budget. Users are resolved and notified
/// independently; a failure is logged and never retried.
#[derive(Clone)]
pub struct NotificationDispatcher {
    users: Arc<dyn UserRepository>,
    notifier: Arc<dyn Notifier>,
    budget: Duration,
    concurrency: usize,
    counters: Counters,
}

impl NotificationDispatcher {
    pub fn new(
        users: Arc<dyn UserRepository>,
        notifier: Arc<dyn Notifier>,
        budget: Duration,
        concurrency: usize,
        counters: Counters,
    ) -> Self {
        Self {
            users,
            notifier,
            budget,
            concurrency: concurrency.max(1),
            counters,
        }
    }

    /// Spawns the batch and returns immediately. Callers are free to drop
    /// the handle.
    pub fn dispatch(&self, bookings: Vec<Booking>) -> JoinHandle<DispatchReport> {
        let this = self.clone();
        let span = info_span!(target: "notification", "dispatch", count = bookings.len());
        tokio::spawn(async move { this.run(bookings).await }.instrument(span))
    }

    pub async fn run(&self, bookings: Vec<Booking>) -> DispatchReport {
        if bookings.is_empty() {
            return DispatchReport::default();
        }

        let total = bookings.len();
        let sent = AtomicUsize::new(0);
        let failed = AtomicUsize::new(0);

        let work = {
            let sent = &sent;
            let failed = &failed;
            stream::iter(bookings).for_each_concurrent(self.concurrency, move |booking| async move {
                match self.notify_one(&booking).await {
                    Ok(()) => {
                        sent.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(e) => {
                        failed.fetch_add(1, Ordering::Relaxed);
                        error!(
                            booking_id = %booking.id,
                            user_id = %booking.user_id,
                            error = ?e,
                            "cancellation notice failed"
                        );
                    }
                }
            })
        };

        let timed_out = tokio::time::timeout(self.budget, work).await.is_err();

        let report = DispatchReport {
            sent: sent.load(Ordering::Relaxed),
            failed: failed.load(Ordering::Relaxed),
            timed_out,
        };

        Counters::add(&self.counters.notifications_sent, report.sent as u64);
        Counters::add(&self.counters.notifications_failed, report.failed as u64);

        if timed_out {
            Counters::bump(&self.counters.notification_batches_timed_out);
            warn!(
                total,
                sent = report.sent,
                failed = report.failed,
                budget_ms = self.budget.as_millis() as u64,
                "notification batch exceeded its time budget"
            );
        } else {
            info!(
                total,
                sent = report.sent,
                failed = report.failed,
                "notification batch finished"
            );
        }

        report
    }

    async fn notify_one(&self, booking: &Booking) -> anyhow::Result<()> {
        let user = self
            .users
            .get_by_id(&booking.user_id)
            .await?
            .ok_or_else(|| anyhow!("user {} not found", booking.user_id))?;

        self.notifier.notify_cancellation(&user, booking).await
    }
}
