use chrono::{DateTime, Duration, Utc};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::BookingError;
use crate::event::model::Event;

/// Booking lifecycle: `Pending -> Confirmed -> Cancelled`, or `Pending -> Cancelled`.
/// `Cancelled` is terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Cancelled,
}

impl BookingStatus {
    /// Pending and Confirmed bookings each hold one seat.
    pub fn holds_seat(self) -> bool {
        matches!(self, BookingStatus::Pending | BookingStatus::Confirmed)
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

impl FromStr for BookingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(BookingStatus::Pending),
            "confirmed" => Ok(BookingStatus::Confirmed),
            "cancelled" => Ok(BookingStatus::Cancelled),
            other => Err(format!("unknown booking status: {other}")),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Booking {
    pub id: Uuid,
    pub event_id: Uuid,
    pub user_id: Uuid,
    pub status: BookingStatus,
    pub created_at: DateTime<Utc>,
    /// End of the hold. Only meaningful while `Pending`.
    pub expires_at: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
}

impl Booking {
    /// Creates a booking for `event`.
    ///
    /// Events that require confirmation produce a `Pending` hold lasting `ttl`;
    /// all others produce a booking that is `Confirmed` immediately.
    pub fn create(
        event: &Event,
        user_id: Uuid,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<Self, BookingError> {
        let expires_at = now.checked_add_signed(ttl).ok_or_else(|| {
            BookingError::InvalidEvent(format!(
                "booking ttl of {}s puts the hold past the representable range",
                ttl.num_seconds()
            ))
        })?;

        let (status, confirmed_at) = if event.requires_confirmation {
            (BookingStatus::Pending, None)
        } else {
            (BookingStatus::Confirmed, Some(now))
        };

        Ok(Self {
            id: Uuid::new_v4(),
            event_id: event.id,
            user_id,
            status,
            created_at: now,
            expires_at,
            confirmed_at,
        })
    }

    /// A hold is expired once `now` is strictly past `expires_at`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.status == BookingStatus::Pending && now > self.expires_at
    }

    /// `Pending -> Confirmed`. An expired hold is left untouched; the sweeper
    /// is the only path that turns it into `Cancelled`.
    pub fn confirm(&mut self, now: DateTime<Utc>) -> Result<(), BookingError> {
        if self.status != BookingStatus::Pending {
            return Err(BookingError::BookingNotPending {
                id: self.id,
                status: self.status,
            });
        }
        if self.is_expired(now) {
            return Err(BookingError::BookingExpired(self.id));
        }

        self.status = BookingStatus::Confirmed;
        self.confirmed_at = Some(now);
        Ok(())
    }

    /// `Pending | Confirmed -> Cancelled`. Returns the status the booking had,
    /// so callers know a seat must go back to the ledger.
    pub fn cancel(&mut self) -> Result<BookingStatus, BookingError> {
        if self.status == BookingStatus::Cancelled {
            return Err(BookingError::AlreadyCancelled(self.id));
        }

        let previous = self.status;
        self.status = BookingStatus::Cancelled;
        Ok(previous)
    }
}
