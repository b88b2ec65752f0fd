use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::booking::model::Booking;

#[async_trait]
pub trait BookingRepository<Tx: Send + 'static>: Send + Sync {
    async fn create(&self, tx: &mut Tx, booking: &Booking) -> Result<()>;

    async fn get_by_id(&self, id: &Uuid) -> Result<Option<Booking>>;

    /// Re-reads a booking inside the unit of work. Callers lock the owning
    /// event first; that lock is what serializes writers to the booking.
    async fn get_for_update(&self, tx: &mut Tx, id: &Uuid) -> Result<Option<Booking>>;

    /// Persists status, confirmation time and expiry.
    async fn update(&self, tx: &mut Tx, booking: &Booking) -> Result<()>;

    /// Pending bookings whose hold ended strictly before `now`, oldest first.
    async fn get_expired(&self, now: DateTime<Utc>) -> Result<Vec<Booking>>;

    async fn get_by_event_id(&self, event_id: &Uuid) -> Result<Vec<Booking>>;

    async fn get_by_event_id_for_update(
        &self,
        tx: &mut Tx,
        event_id: &Uuid,
    ) -> Result<Vec<Booking>>;
}
