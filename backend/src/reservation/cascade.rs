use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::booking::model::{Booking, BookingStatus};
use crate::clock::Clock;
use crate::db::{Repositories, UnitOfWork};
use crate::error::BookingError;
use crate::event::model::{Event, EventStatus};
use crate::metrics::counters::Counters;
use crate::notification::dispatcher::{DispatchReport, NotificationDispatcher};
use crate::reservation::coordinator::{commit, lock_event};
use crate::reservation::inventory;

/// An event can only be cancelled this far ahead of its start.
pub const MIN_CANCELLATION_LEAD_HOURS: i64 = 24;

#[derive(Debug)]
pub struct CascadeOutcome {
    /// The event as committed: `Cancelled`, every seat returned.
    pub event: Event,
    /// Bookings this cascade moved to `Cancelled`.
    pub cancelled: Vec<Booking>,
    /// Detached notification batch for `cancelled`.
    pub notices: JoinHandle<DispatchReport>,
}

/// Cancels an event together with every live booking it has.
pub struct CascadeCanceller<U: UnitOfWork> {
    repos: Repositories<U>,
    dispatcher: NotificationDispatcher,
    clock: Arc<dyn Clock>,
    counters: Counters,
}

impl<U: UnitOfWork> CascadeCanceller<U> {
    pub fn new(
        repos: Repositories<U>,
        dispatcher: NotificationDispatcher,
        clock: Arc<dyn Clock>,
        counters: Counters,
    ) -> Self {
        Self {
            repos,
            dispatcher,
            clock,
            counters,
        }
    }

    /// All-or-nothing: either every live booking is cancelled with its seat
    /// returned and the event marked `Cancelled`, or nothing changes.
    /// Notices go out after commit under the dispatcher's shared budget.
    #[instrument(skip(self), target = "cascade", fields(event_id = %event_id))]
    pub async fn cancel_event(
        &self,
        event_id: Uuid,
        reason: &str,
    ) -> Result<CascadeOutcome, BookingError> {
        let mut tx = self.repos.db.begin().await?;
        let mut event = lock_event(&self.repos, &mut tx, event_id).await?;

        let now = self.clock.now();
        ensure_cancellable(&event, now)?;

        let bookings = self
            .repos
            .bookings
            .get_by_event_id_for_update(&mut tx, &event_id)
            .await?;
        let total = bookings.len();

        let mut cancelled = Vec::new();
        for mut booking in bookings {
            if booking.status == BookingStatus::Cancelled {
                continue;
            }

            let previous = booking.cancel()?;
            self.repos.bookings.update(&mut tx, &booking).await?;
            inventory::return_seat(self.repos.events.as_ref(), &mut tx, &mut event, now).await?;

            debug!(booking_id = %booking.id, previous = %previous, "booking cancelled by cascade");
            cancelled.push(booking);
        }

        event.status = EventStatus::Cancelled;
        event.updated_at = now;
        self.repos.events.update(&mut tx, &event).await?;

        commit(&self.repos, tx).await?;

        Counters::bump(&self.counters.events_cancelled);
        Counters::add(
            &self.counters.cascade_bookings_cancelled,
            cancelled.len() as u64,
        );
        info!(
            name = %event.name,
            reason = %reason,
            total_bookings = total,
            cancelled_bookings = cancelled.len(),
            available = event.available,
            "event cancelled"
        );

        let notices = self.dispatcher.dispatch(cancelled.clone());

        Ok(CascadeOutcome {
            event,
            cancelled,
            notices,
        })
    }
}

/// Order matters: an already-cancelled event reports that before any
/// time-based refusal.
pub fn ensure_cancellable(event: &Event, now: DateTime<Utc>) -> Result<(), BookingError> {
    if event.status == EventStatus::Cancelled {
        return Err(BookingError::EventAlreadyCancelled(event.id));
    }
    if event.starts_at < now {
        return Err(BookingError::CannotCancelPastEvent(event.id));
    }
    if event.starts_at - now < Duration::hours(MIN_CANCELLATION_LEAD_HOURS) {
        return Err(BookingError::CancellationTooLate(event.id));
    }
    Ok(())
}
