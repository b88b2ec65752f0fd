//! Inventory ledger: the only code that moves an event's `available` counter.
//!
//! Both operations run inside a unit of work that already holds the event's
//! row lock and a snapshot of the locked row. The snapshot is kept in step
//! with the stored counter so later checks in the same unit see the truth.

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::error::BookingError;
use crate::event::model::Event;
use crate::event::repository::EventRepository;

/// Takes one seat. `NoSeatsAvailable` when the counter is already zero.
pub async fn take_seat<Tx: Send + 'static>(
    events: &dyn EventRepository<Tx>,
    tx: &mut Tx,
    event: &mut Event,
    at: DateTime<Utc>,
) -> Result<(), BookingError> {
    if !events.decrement_available_seats(tx, &event.id, at).await? {
        return Err(BookingError::NoSeatsAvailable(event.id));
    }

    event.available -= 1;
    event.updated_at = at;
    Ok(())
}

/// Returns one seat. Never refuses; a return past capacity is logged.
pub async fn return_seat<Tx: Send + 'static>(
    events: &dyn EventRepository<Tx>,
    tx: &mut Tx,
    event: &mut Event,
    at: DateTime<Utc>,
) -> Result<(), BookingError> {
    if event.available >= event.total_seats {
        warn!(
            event_id = %event.id,
            available = event.available,
            total_seats = event.total_seats,
            "returning a seat to an event that is already at capacity"
        );
    }

    events.increment_available_seats(tx, &event.id, at).await?;

    event.available += 1;
    event.updated_at = at;
    Ok(())
}
