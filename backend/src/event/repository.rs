use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::event::model::Event;

/// Persistence contract for events and their seat ledger.
///
/// Methods taking `tx` run inside the caller's unit of work. `get_for_update`
/// acquires the exclusive row lock that every other `tx` method relies on;
/// the lock is held until the transaction commits or is dropped.
#[async_trait]
pub trait EventRepository<Tx: Send + 'static>: Send + Sync {
    async fn create(&self, event: &Event) -> Result<()>;

    async fn get_by_id(&self, id: &Uuid) -> Result<Option<Event>>;

    /// Ordered by start time, then newest created first.
    async fn get_all(&self) -> Result<Vec<Event>>;

    async fn get_for_update(&self, tx: &mut Tx, id: &Uuid) -> Result<Option<Event>>;

    /// Persists descriptive fields and status. Never writes `available` or
    /// `total_seats`.
    async fn update(&self, tx: &mut Tx, event: &Event) -> Result<()>;

    /// Takes one seat. Returns `false` without changing anything when
    /// `available` is already zero.
    async fn decrement_available_seats(
        &self,
        tx: &mut Tx,
        id: &Uuid,
        at: DateTime<Utc>,
    ) -> Result<bool>;

    /// Returns one seat. No upper bound is enforced here.
    async fn increment_available_seats(
        &self,
        tx: &mut Tx,
        id: &Uuid,
        at: DateTime<Utc>,
    ) -> Result<()>;
}
