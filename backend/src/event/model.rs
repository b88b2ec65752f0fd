use chrono::{DateTime, Duration, Utc};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Longest hold a booking may carry, whether set per event or as the default.
pub const MAX_BOOKING_TTL_SECS: i64 = 366 * 24 * 60 * 60;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventStatus {
    Active,
    Cancelled,
    Completed,
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EventStatus::Active => "active",
            EventStatus::Cancelled => "cancelled",
            EventStatus::Completed => "completed",
        };
        f.write_str(s)
    }
}

impl FromStr for EventStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(EventStatus::Active),
            "cancelled" => Ok(EventStatus::Cancelled),
            "completed" => Ok(EventStatus::Completed),
            other => Err(format!("unknown event status: {other}")),
        }
    }
}

/// A bookable event and its seat ledger.
///
/// `available` is only ever changed through the inventory ledger while the
/// event row is locked; `0 <= available <= total_seats` holds for every
/// committed state.
#[derive(Clone, Debug, PartialEq)]
pub struct Event {
    pub id: Uuid,
    pub name: String,
    pub starts_at: DateTime<Utc>,
    pub total_seats: i64,
    pub available: i64,
    /// Hold duration for new bookings; `None` falls back to the system default.
    pub booking_ttl: Option<Duration>,
    /// When false, bookings are final on creation and never expire.
    pub requires_confirmation: bool,
    pub status: EventStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Caller-supplied fields for a new event.
#[derive(Clone, Debug)]
pub struct NewEvent {
    pub name: String,
    pub starts_at: DateTime<Utc>,
    pub total_seats: i64,
    pub booking_ttl: Option<Duration>,
    pub requires_confirmation: bool,
}

impl Event {
    pub fn create(new: NewEvent, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: new.name,
            starts_at: new.starts_at,
            total_seats: new.total_seats,
            available: new.total_seats,
            booking_ttl: new.booking_ttl,
            requires_confirmation: new.requires_confirmation,
            status: EventStatus::Active,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == EventStatus::Active
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_event_starts_full_and_active() {
        let now = Utc::now();
        let e = Event::create(
            NewEvent {
                name: "Rust meetup".into(),
                starts_at: now + Duration::days(3),
                total_seats: 40,
                booking_ttl: None,
                requires_confirmation: true,
            },
            now,
        );

        assert_eq!(e.available, 40);
        assert!(e.is_active());
        assert_eq!(e.created_at, e.updated_at);
    }

    #[test]
    fn status_text_round_trips() {
        for s in [
            EventStatus::Active,
            EventStatus::Cancelled,
            EventStatus::Completed,
        ] {
            assert_eq!(s.to_string().parse::<EventStatus>().unwrap(), s);
        }
        assert!("closed".parse::<EventStatus>().is_err());
    }
}
