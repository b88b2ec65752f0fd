use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::booking::model::Booking;
use crate::clock::Clock;
use crate::config::AppConfig;
use crate::db::{Repositories, UnitOfWork};
use crate::error::BookingError;
use crate::event::model::{Event, MAX_BOOKING_TTL_SECS, NewEvent};
use crate::metrics::counters::Counters;
use crate::notification::Notifier;
use crate::notification::dispatcher::NotificationDispatcher;
use crate::reservation::cascade::{CascadeCanceller, CascadeOutcome};
use crate::reservation::coordinator::ReservationCoordinator;
use crate::scheduler::sweeper::ExpirationSweeper;
use crate::user::model::{User, UserRole};

/// Tunables the engine needs from configuration.
#[derive(Clone, Debug)]
pub struct EngineSettings {
    pub default_booking_ttl: chrono::Duration,
    pub sweep_interval: Duration,
    pub notify_budget: Duration,
    pub notify_concurrency: usize,
}

impl EngineSettings {
    pub fn from_config(cfg: &AppConfig) -> anyhow::Result<Self> {
        let default_booking_ttl = chrono::Duration::from_std(cfg.default_booking_ttl)
            .context("default booking ttl out of range")?;
        anyhow::ensure!(
            default_booking_ttl <= chrono::Duration::seconds(MAX_BOOKING_TTL_SECS),
            "default booking ttl of {}s exceeds the {MAX_BOOKING_TTL_SECS}s limit",
            default_booking_ttl.num_seconds()
        );

        Ok(Self {
            default_booking_ttl,
            sweep_interval: cfg.sweep_interval,
            notify_budget: cfg.notify_budget,
            notify_concurrency: cfg.notify_concurrency,
        })
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            default_booking_ttl: chrono::Duration::minutes(30),
            sweep_interval: Duration::from_secs(60),
            notify_budget: Duration::from_secs(30),
            notify_concurrency: 8,
        }
    }
}

/// Every operation callers (HTTP handlers, CLI, jobs) use.
pub struct BookingEngine<U: UnitOfWork> {
    repos: Repositories<U>,
    coordinator: Arc<ReservationCoordinator<U>>,
    canceller: CascadeCanceller<U>,
    clock: Arc<dyn Clock>,
    settings: EngineSettings,
    counters: Counters,
}

impl<U: UnitOfWork> BookingEngine<U> {
    pub fn new(
        repos: Repositories<U>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        settings: EngineSettings,
        counters: Counters,
    ) -> Self {
        let dispatcher = NotificationDispatcher::new(
            Arc::clone(&repos.users),
            notifier,
            settings.notify_budget,
            settings.notify_concurrency,
            counters.clone(),
        );

        let coordinator = Arc::new(ReservationCoordinator::new(
            repos.clone(),
            dispatcher.clone(),
            Arc::clone(&clock),
            settings.default_booking_ttl,
            counters.clone(),
        ));

        let canceller = CascadeCanceller::new(
            repos.clone(),
            dispatcher,
            Arc::clone(&clock),
            counters.clone(),
        );

        Self {
            repos,
            coordinator,
            canceller,
            clock,
            settings,
            counters,
        }
    }

    pub fn counters(&self) -> &Counters {
        &self.counters
    }

    /// Sweeper bound to this engine's coordinator. Not started.
    pub fn sweeper(&self) -> ExpirationSweeper<U> {
        ExpirationSweeper::new(
            Arc::clone(&self.coordinator),
            self.settings.sweep_interval,
            self.counters.clone(),
        )
    }

    // =========================
    // Reservations
    // =========================

    pub async fn book_place(&self, event_id: Uuid, user_id: Uuid) -> Result<Booking, BookingError> {
        self.coordinator.book_place(event_id, user_id).await
    }

    pub async fn confirm_booking(&self, booking_id: Uuid) -> Result<Booking, BookingError> {
        self.coordinator.confirm_booking(booking_id).await
    }

    pub async fn cancel_booking(&self, booking_id: Uuid) -> Result<Booking, BookingError> {
        self.coordinator.cancel_booking(booking_id).await
    }

    pub async fn get_expired_bookings(&self) -> Result<Vec<Booking>, BookingError> {
        self.coordinator.get_expired_bookings().await
    }

    pub async fn cancel_event(
        &self,
        event_id: Uuid,
        reason: &str,
    ) -> Result<CascadeOutcome, BookingError> {
        self.canceller.cancel_event(event_id, reason).await
    }

    // =========================
    // Events
    // =========================

    #[instrument(skip(self, new), target = "engine", fields(name = %new.name))]
    pub async fn create_event(&self, new: NewEvent) -> Result<Event, BookingError> {
        validate_new_event(&new)?;

        let event = Event::create(new, self.clock.now());
        self.repos.events.create(&event).await?;

        info!(
            event_id = %event.id,
            total_seats = event.total_seats,
            starts_at = %event.starts_at,
            requires_confirmation = event.requires_confirmation,
            "event created"
        );
        Ok(event)
    }

    pub async fn get_event(&self, event_id: Uuid) -> Result<Event, BookingError> {
        self.repos
            .events
            .get_by_id(&event_id)
            .await?
            .ok_or(BookingError::EventNotFound(event_id))
    }

    pub async fn list_events(&self) -> Result<Vec<Event>, BookingError> {
        Ok(self.repos.events.get_all().await?)
    }

    /// All bookings of one event, oldest first. `EventNotFound` for an
    /// unknown id rather than an empty list.
    pub async fn list_event_bookings(&self, event_id: Uuid) -> Result<Vec<Booking>, BookingError> {
        self.get_event(event_id).await?;
        Ok(self.repos.bookings.get_by_event_id(&event_id).await?)
    }

    // =========================
    // Users
    // =========================

    pub async fn register_user(
        &self,
        email: Option<String>,
        telegram: Option<String>,
        role: UserRole,
    ) -> Result<User, BookingError> {
        let user = User::new(email, telegram, role, self.clock.now());
        self.repos.users.create(&user).await?;
        info!(target: "engine", user_id = %user.id, role = %user.role, "user registered");
        Ok(user)
    }

    pub async fn get_user(&self, user_id: Uuid) -> Result<User, BookingError> {
        self.repos
            .users
            .get_by_id(&user_id)
            .await?
            .ok_or(BookingError::UserNotFound(user_id))
    }
}

fn validate_new_event(new: &NewEvent) -> Result<(), BookingError> {
    if new.name.trim().is_empty() {
        return Err(BookingError::InvalidEvent("name must not be empty".into()));
    }
    if new.total_seats <= 0 {
        return Err(BookingError::InvalidEvent(format!(
            "total_seats must be positive, got {}",
            new.total_seats
        )));
    }
    if let Some(ttl) = new.booking_ttl {
        if ttl <= chrono::Duration::zero() {
            return Err(BookingError::InvalidEvent(format!(
                "booking ttl must be positive, got {}s",
                ttl.num_seconds()
            )));
        }
        if ttl > chrono::Duration::seconds(MAX_BOOKING_TTL_SECS) {
            return Err(BookingError::InvalidEvent(format!(
                "booking ttl must not exceed {MAX_BOOKING_TTL_SECS}s, got {}s",
                ttl.num_seconds()
            )));
        }
        // stored with millisecond precision
        if ttl.subsec_nanos() % 1_000_000 != 0 {
            return Err(BookingError::InvalidEvent(
                "booking ttl must be a whole number of milliseconds".into(),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn new_event() -> NewEvent {
        NewEvent {
            name: "Opera".into(),
            starts_at: Utc::now() + chrono::Duration::days(10),
            total_seats: 100,
            booking_ttl: None,
            requires_confirmation: true,
        }
    }

    #[test]
    fn validation_rejects_bad_input() {
        assert!(validate_new_event(&new_event()).is_ok());

        let mut blank = new_event();
        blank.name = "   ".into();
        assert!(matches!(validate_new_event(&blank), Err(BookingError::InvalidEvent(_))));

        let mut empty = new_event();
        empty.total_seats = 0;
        assert!(matches!(validate_new_event(&empty), Err(BookingError::InvalidEvent(_))));

        let mut ttl = new_event();
        ttl.booking_ttl = Some(chrono::Duration::seconds(-5));
        assert!(matches!(validate_new_event(&ttl), Err(BookingError::InvalidEvent(_))));
    }

    #[test]
    fn validation_bounds_the_hold() {
        let mut far_future = new_event();
        far_future.booking_ttl = Some(chrono::Duration::days(365 * 200_000));
        assert!(matches!(validate_new_event(&far_future), Err(BookingError::InvalidEvent(_))));

        let mut limit = new_event();
        limit.booking_ttl = Some(chrono::Duration::seconds(MAX_BOOKING_TTL_SECS));
        assert!(validate_new_event(&limit).is_ok());

        let mut fractional = new_event();
        fractional.booking_ttl = Some(chrono::Duration::microseconds(1_500_250));
        assert!(matches!(validate_new_event(&fractional), Err(BookingError::InvalidEvent(_))));

        let mut millis = new_event();
        millis.booking_ttl = Some(chrono::Duration::milliseconds(500));
        assert!(validate_new_event(&millis).is_ok());
    }

    #[test]
    fn oversized_default_ttl_is_rejected() {
        let cfg = AppConfig::from_lookup(|k| match k {
            "DEFAULT_BOOKING_TTL_SECS" => Some("9000000000".into()),
            _ => None,
        });
        assert!(EngineSettings::from_config(&cfg).is_err());
    }

    #[test]
    fn settings_follow_config() {
        let cfg = AppConfig::from_lookup(|k| match k {
            "DEFAULT_BOOKING_TTL_SECS" => Some("900".into()),
            _ => None,
        });
        let s = EngineSettings::from_config(&cfg).unwrap();
        assert_eq!(s.default_booking_ttl, chrono::Duration::minutes(15));
        assert_eq!(s.notify_concurrency, 8);
    }
}
