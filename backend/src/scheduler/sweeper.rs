use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, instrument, warn};

use crate::db::UnitOfWork;
use crate::error::BookingError;
use crate::metrics::counters::Counters;
use crate::reservation::coordinator::ReservationCoordinator;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub found: usize,
    pub cancelled: usize,
    pub failed: usize,
}

/// Cancels holds whose expiry has passed, on a fixed cadence.
///
/// Keeps no state between runs. A late tick only delays the sweep; the next
/// run sees every overdue hold.
pub struct ExpirationSweeper<U: UnitOfWork> {
    coordinator: Arc<ReservationCoordinator<U>>,
    interval: Duration,
    counters: Counters,
}

impl<U: UnitOfWork> ExpirationSweeper<U> {
    pub fn new(
        coordinator: Arc<ReservationCoordinator<U>>,
        interval: Duration,
        counters: Counters,
    ) -> Self {
        Self {
            coordinator,
            // a zero period would panic the ticker
            interval: interval.max(Duration::from_millis(10)),
            counters,
        }
    }

    /// One pass over the expired holds. Each booking is cancelled on its
    /// own; a failure is logged and the pass moves on.
    #[instrument(skip(self), target = "sweeper")]
    pub async fn sweep_once(&self) -> Result<SweepReport, BookingError> {
        Counters::bump(&self.counters.sweep_runs);

        let expired = self.coordinator.get_expired_bookings().await?;
        let mut report = SweepReport {
            found: expired.len(),
            ..SweepReport::default()
        };

        if expired.is_empty() {
            debug!("no expired holds");
            return Ok(report);
        }

        for booking in expired {
            match self.coordinator.cancel_booking(booking.id).await {
                Ok(_) => {
                    report.cancelled += 1;
                    Counters::bump(&self.counters.holds_expired);
                }
                // cancelled elsewhere since the query
                Err(BookingError::AlreadyCancelled(_)) => {
                    debug!(booking_id = %booking.id, "hold already cancelled");
                }
                Err(e) => {
                    report.failed += 1;
                    Counters::bump(&self.counters.sweep_failures);
                    warn!(
                        booking_id = %booking.id,
                        event_id = %booking.event_id,
                        error = %e,
                        "failed to cancel expired hold"
                    );
                }
            }
        }

        info!(
            found = report.found,
            cancelled = report.cancelled,
            failed = report.failed,
            "sweep finished"
        );
        Ok(report)
    }

    /// Starts the periodic loop. The first pass runs immediately.
    pub fn start(self: Arc<Self>) -> SweeperHandle {
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            info!(
                target: "sweeper",
                interval_ms = self.interval.as_millis() as u64,
                "expiration sweeper started"
            );

            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    _ = ticker.tick() => {
                        if let Err(e) = self.sweep_once().await {
                            error!(target: "sweeper", error = ?e, "sweep failed");
                        }
                    }
                }
            }

            info!(target: "sweeper", "expiration sweeper stopped");
        });

        SweeperHandle { stop_tx, task }
    }
}

/// Running sweeper. Dropping the handle also stops the loop.
pub struct SweeperHandle {
    stop_tx: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    /// Signals the loop and waits for it. A pass already under way finishes
    /// first.
    pub async fn stop(self) {
        let _ = self.stop_tx.send(());
        if let Err(e) = self.task.await {
            error!(target: "sweeper", error = ?e, "sweeper task ended abnormally");
        }
    }
}
