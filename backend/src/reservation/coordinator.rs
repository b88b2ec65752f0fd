use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, field, info, instrument};
use uuid::Uuid;

use crate::booking::model::Booking;
use crate::clock::Clock;
use crate::db::{Repositories, UnitOfWork};
use crate::error::BookingError;
use crate::event::model::Event;
use crate::logger::warn_if_slow;
use crate::metrics::counters::Counters;
use crate::notification::dispatcher::{DispatchReport, NotificationDispatcher};
use crate::reservation::inventory;

const SLOW_LOCK: Duration = Duration::from_millis(250);
const SLOW_COMMIT: Duration = Duration::from_millis(250);

/// Book, confirm and cancel, each as one atomic unit of work.
///
/// Every operation locks the owning event row first and re-reads what it is
/// about to change under that lock. Returning early from any step drops the
/// transaction, which rolls back everything staged so far.
pub struct ReservationCoordinator<U: UnitOfWork> {
    repos: Repositories<U>,
    dispatcher: NotificationDispatcher,
    clock: Arc<dyn Clock>,
    default_ttl: chrono::Duration,
    counters: Counters,
}

impl<U: UnitOfWork> ReservationCoordinator<U> {
    pub fn new(
        repos: Repositories<U>,
        dispatcher: NotificationDispatcher,
        clock: Arc<dyn Clock>,
        default_ttl: chrono::Duration,
        counters: Counters,
    ) -> Self {
        Self {
            repos,
            dispatcher,
            clock,
            default_ttl,
            counters,
        }
    }

    /// Reserves one seat for `user_id`.
    ///
    /// The booking is `Pending` with a hold when the event requires
    /// confirmation, and `Confirmed` straight away otherwise.
    #[instrument(
        skip(self),
        target = "reservation",
        fields(event_id = %event_id, user_id = %user_id, booking_id = field::Empty)
    )]
    pub async fn book_place(&self, event_id: Uuid, user_id: Uuid) -> Result<Booking, BookingError> {
        let mut tx = self.repos.db.begin().await?;
        let mut event = lock_event(&self.repos, &mut tx, event_id).await?;

        if !event.is_active() {
            Counters::bump(&self.counters.booking_rejected_inactive);
            return Err(BookingError::EventNotActive(event_id));
        }
        if event.available <= 0 {
            Counters::bump(&self.counters.booking_rejected_no_seats);
            debug!("event sold out");
            return Err(BookingError::NoSeatsAvailable(event_id));
        }

        let now = self.clock.now();
        let ttl = event.booking_ttl.unwrap_or(self.default_ttl);
        let booking = Booking::create(&event, user_id, now, ttl)?;

        self.repos.bookings.create(&mut tx, &booking).await?;
        inventory::take_seat(self.repos.events.as_ref(), &mut tx, &mut event, now).await?;

        commit(&self.repos, tx).await?;

        tracing::Span::current().record("booking_id", field::display(booking.id));
        Counters::bump(&self.counters.bookings_created);
        info!(
            status = %booking.status,
            expires_at = %booking.expires_at,
            available = event.available,
            "booking created"
        );

        Ok(booking)
    }

    /// `Pending -> Confirmed`. An expired hold fails with `BookingExpired`
    /// and stays `Pending` for the sweeper.
    #[instrument(skip(self), target = "reservation", fields(booking_id = %booking_id))]
    pub async fn confirm_booking(&self, booking_id: Uuid) -> Result<Booking, BookingError> {
        let (mut tx, _event, mut booking) = self.lock_booking(booking_id).await?;

        if let Err(e) = booking.confirm(self.clock.now()) {
            if matches!(e, BookingError::BookingExpired(_)) {
                Counters::bump(&self.counters.confirm_rejected_expired);
            }
            return Err(e);
        }

        self.repos.bookings.update(&mut tx, &booking).await?;
        commit(&self.repos, tx).await?;

        Counters::bump(&self.counters.bookings_confirmed);
        info!(event_id = %booking.event_id, "booking confirmed");

        Ok(booking)
    }

    /// Cancels a booking and returns its seat. The user is notified after
    /// commit; delivery problems are logged and never reach the caller.
    pub async fn cancel_booking(&self, booking_id: Uuid) -> Result<Booking, BookingError> {
        self.cancel_booking_with_notice(booking_id)
            .await
            .map(|(booking, _notice)| booking)
    }

    /// As [`Self::cancel_booking`], also handing back the detached notice task.
    #[instrument(skip(self), target = "reservation", fields(booking_id = %booking_id))]
    pub async fn cancel_booking_with_notice(
        &self,
        booking_id: Uuid,
    ) -> Result<(Booking, JoinHandle<DispatchReport>), BookingError> {
        let (mut tx, mut event, mut booking) = self.lock_booking(booking_id).await?;
        let now = self.clock.now();

        let previous = booking.cancel()?;
        self.repos.bookings.update(&mut tx, &booking).await?;
        inventory::return_seat(self.repos.events.as_ref(), &mut tx, &mut event, now).await?;

        commit(&self.repos, tx).await?;

        Counters::bump(&self.counters.bookings_cancelled);
        info!(
            event_id = %booking.event_id,
            previous = %previous,
            available = event.available,
            "booking cancelled"
        );

        let notice = self.dispatcher.dispatch(vec![booking.clone()]);
        Ok((booking, notice))
    }

    /// Pending holds whose expiry is strictly before now.
    pub async fn get_expired_bookings(&self) -> Result<Vec<Booking>, BookingError> {
        Ok(self.repos.bookings.get_expired(self.clock.now()).await?)
    }

    /// Opens a unit of work, locks the booking's event and re-reads the
    /// booking under that lock.
    async fn lock_booking(&self, booking_id: Uuid) -> Result<(U::Tx, Event, Booking), BookingError> {
        // unlocked read only to learn which event to lock
        let peek = self
            .repos
            .bookings
            .get_by_id(&booking_id)
            .await?
            .ok_or(BookingError::BookingNotFound(booking_id))?;

        let mut tx = self.repos.db.begin().await?;
        let event = lock_event(&self.repos, &mut tx, peek.event_id).await?;

        let booking = self
            .repos
            .bookings
            .get_for_update(&mut tx, &booking_id)
            .await?
            .ok_or(BookingError::BookingNotFound(booking_id))?;

        Ok((tx, event, booking))
    }
}

/// Takes the event's exclusive row lock and returns the locked snapshot.
pub(crate) async fn lock_event<U: UnitOfWork>(
    repos: &Repositories<U>,
    tx: &mut U::Tx,
    event_id: Uuid,
) -> Result<Event, BookingError> {
    warn_if_slow("lock_event", SLOW_LOCK, repos.events.get_for_update(tx, &event_id))
        .await?
        .ok_or(BookingError::EventNotFound(event_id))
}

pub(crate) async fn commit<U: UnitOfWork>(
    repos: &Repositories<U>,
    tx: U::Tx,
) -> Result<(), BookingError> {
    warn_if_slow("commit", SLOW_COMMIT, repos.db.commit(tx)).await?;
    Ok(())
}
