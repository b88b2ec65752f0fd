//! In-process storage backend.
//!
//! Mirrors the relational backend's guarantees:
//!  - `get_for_update` takes a per-event exclusive lock that the transaction
//!    holds until commit or drop
//!  - writes are staged in the transaction and become visible only on commit
//!  - dropping an uncommitted transaction discards its writes and frees its locks
//!
//! Ledger and event writes on an event whose lock the transaction does not
//! hold are rejected, so lock discipline bugs surface as errors.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{anyhow, bail};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::{Mutex as RowLock, OwnedMutexGuard};
use uuid::Uuid;

use crate::booking::model::{Booking, BookingStatus};
use crate::booking::repository::BookingRepository;
use crate::db::UnitOfWork;
use crate::event::model::Event;
use crate::event::repository::EventRepository;
use crate::user::model::User;
use crate::user::repository::UserRepository;

#[derive(Default)]
struct Tables {
    events: HashMap<Uuid, Event>,
    bookings: HashMap<Uuid, Booking>,
    users: HashMap<Uuid, User>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    row_locks: Mutex<HashMap<Uuid, Arc<RowLock<()>>>>,
}

/// Staged writes plus the event locks held by one unit of work.
#[derive(Default)]
pub struct MemoryTx {
    locks: HashMap<Uuid, OwnedMutexGuard<()>>,
    events: HashMap<Uuid, Event>,
    bookings: HashMap<Uuid, Booking>,
}

impl MemoryTx {
    fn require_lock(&self, event_id: &Uuid) -> anyhow::Result<()> {
        if !self.locks.contains_key(event_id) {
            bail!("event {event_id} is not locked by this transaction");
        }
        Ok(())
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// True while some open transaction holds the event's row lock.
    pub fn is_locked(&self, event_id: &Uuid) -> bool {
        self.row_locks
            .lock()
            .get(event_id)
            .is_some_and(|l| l.try_lock().is_err())
    }

    fn visible_event(&self, tx: &MemoryTx, id: &Uuid) -> Option<Event> {
        tx.events
            .get(id)
            .cloned()
            .or_else(|| self.tables.lock().events.get(id).cloned())
    }

    fn visible_booking(&self, tx: &MemoryTx, id: &Uuid) -> Option<Booking> {
        tx.bookings
            .get(id)
            .cloned()
            .or_else(|| self.tables.lock().bookings.get(id).cloned())
    }

    fn row_lock(&self, event_id: &Uuid) -> Arc<RowLock<()>> {
        self.row_locks.lock().entry(*event_id).or_default().clone()
    }

    /// Drops the lock entry once nobody holds or waits on it.
    fn forget_row_lock(&self, event_id: &Uuid) {
        let mut locks = self.row_locks.lock();
        if locks.get(event_id).is_some_and(|l| Arc::strong_count(l) == 1) {
            locks.remove(event_id);
        }
    }
}

#[async_trait]
impl UnitOfWork for MemoryStore {
    type Tx = MemoryTx;

    async fn begin(&self) -> anyhow::Result<MemoryTx> {
        Ok(MemoryTx::default())
    }

    async fn commit(&self, tx: MemoryTx) -> anyhow::Result<()> {
        let MemoryTx {
            locks,
            events,
            bookings,
        } = tx;

        {
            let mut t = self.tables.lock();
            t.events.extend(events);
            t.bookings.extend(bookings);
        }

        // released only after the writes are visible
        drop(locks);
        Ok(())
    }
}

#[async_trait]
impl EventRepository<MemoryTx> for MemoryStore {
    async fn create(&self, event: &Event) -> anyhow::Result<()> {
        let mut t = self.tables.lock();
        if t.events.contains_key(&event.id) {
            bail!("event {} already exists", event.id);
        }
        t.events.insert(event.id, event.clone());
        Ok(())
    }

    async fn get_by_id(&self, id: &Uuid) -> anyhow::Result<Option<Event>> {
        Ok(self.tables.lock().events.get(id).cloned())
    }

    async fn get_all(&self) -> anyhow::Result<Vec<Event>> {
        let mut out: Vec<Event> = self.tables.lock().events.values().cloned().collect();
        out.sort_by(|a, b| {
            a.starts_at
                .cmp(&b.starts_at)
                .then_with(|| b.created_at.cmp(&a.created_at))
        });
        Ok(out)
    }

    async fn get_for_update(&self, tx: &mut MemoryTx, id: &Uuid) -> anyhow::Result<Option<Event>> {
        if !tx.locks.contains_key(id) {
            let guard = self.row_lock(id).lock_owned().await;
            tx.locks.insert(*id, guard);
        }

        let event = self.visible_event(tx, id);
        if event.is_none() {
            tx.locks.remove(id);
            self.forget_row_lock(id);
        }
        Ok(event)
    }

    async fn update(&self, tx: &mut MemoryTx, event: &Event) -> anyhow::Result<()> {
        tx.require_lock(&event.id)?;
        let current = self
            .visible_event(tx, &event.id)
            .ok_or_else(|| anyhow!("event {} not found for update", event.id))?;

        let mut next = event.clone();
        next.available = current.available;
        next.total_seats = current.total_seats;
        tx.events.insert(event.id, next);
        Ok(())
    }

    async fn decrement_available_seats(
        &self,
        tx: &mut MemoryTx,
        id: &Uuid,
        at: DateTime<Utc>,
    ) -> anyhow::Result<bool> {
        tx.require_lock(id)?;
        let mut event = self
            .visible_event(tx, id)
            .ok_or_else(|| anyhow!("event {id} not found"))?;

        if event.available <= 0 {
            return Ok(false);
        }
        event.available -= 1;
        event.updated_at = at;
        tx.events.insert(*id, event);
        Ok(true)
    }

    async fn increment_available_seats(
        &self,
        tx: &mut MemoryTx,
        id: &Uuid,
        at: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        tx.require_lock(id)?;
        let mut event = self
            .visible_event(tx, id)
            .ok_or_else(|| anyhow!("event {id} vanished while returning a seat"))?;

        event.available += 1;
        event.updated_at = at;
        tx.events.insert(*id, event);
        Ok(())
    }
}

#[async_trait]
impl BookingRepository<MemoryTx> for MemoryStore {
    async fn create(&self, tx: &mut MemoryTx, booking: &Booking) -> anyhow::Result<()> {
        tx.require_lock(&booking.event_id)?;
        if self.visible_booking(tx, &booking.id).is_some() {
            bail!("booking {} already exists", booking.id);
        }
        tx.bookings.insert(booking.id, booking.clone());
        Ok(())
    }

    async fn get_by_id(&self, id: &Uuid) -> anyhow::Result<Option<Booking>> {
        Ok(self.tables.lock().bookings.get(id).cloned())
    }

    async fn get_for_update(
        &self,
        tx: &mut MemoryTx,
        id: &Uuid,
    ) -> anyhow::Result<Option<Booking>> {
        Ok(self.visible_booking(tx, id))
    }

    async fn update(&self, tx: &mut MemoryTx, booking: &Booking) -> anyhow::Result<()> {
        tx.require_lock(&booking.event_id)?;
        if self.visible_booking(tx, &booking.id).is_none() {
            bail!("booking {} not found for update", booking.id);
        }
        tx.bookings.insert(booking.id, booking.clone());
        Ok(())
    }

    async fn get_expired(&self, now: DateTime<Utc>) -> anyhow::Result<Vec<Booking>> {
        let mut out: Vec<Booking> = self
            .tables
            .lock()
            .bookings
            .values()
            .filter(|b| b.status == BookingStatus::Pending && b.expires_at < now)
            .cloned()
            .collect();
        out.sort_by_key(|b| b.expires_at);
        Ok(out)
    }

    async fn get_by_event_id(&self, event_id: &Uuid) -> anyhow::Result<Vec<Booking>> {
        let mut out: Vec<Booking> = self
            .tables
            .lock()
            .bookings
            .values()
            .filter(|b| b.event_id == *event_id)
            .cloned()
            .collect();
        out.sort_by_key(|b| b.created_at);
        Ok(out)
    }

    async fn get_by_event_id_for_update(
        &self,
        tx: &mut MemoryTx,
        event_id: &Uuid,
    ) -> anyhow::Result<Vec<Booking>> {
        tx.require_lock(event_id)?;

        let mut merged: HashMap<Uuid, Booking> = self
            .tables
            .lock()
            .bookings
            .values()
            .filter(|b| b.event_id == *event_id)
            .map(|b| (b.id, b.clone()))
            .collect();
        for b in tx.bookings.values().filter(|b| b.event_id == *event_id) {
            merged.insert(b.id, b.clone());
        }

        let mut out: Vec<Booking> = merged.into_values().collect();
        out.sort_by_key(|b| b.created_at);
        Ok(out)
    }
}

#[async_trait]
impl UserRepository for MemoryStore {
    async fn create(&self, user: &User) -> anyhow::Result<()> {
        let mut t = self.tables.lock();
        if t.users.contains_key(&user.id) {
            bail!("user {} already exists", user.id);
        }
        t.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn get_by_id(&self, id: &Uuid) -> anyhow::Result<Option<User>> {
        Ok(self.tables.lock().users.get(id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::model::NewEvent;
    use chrono::Duration;

    fn mk_event(seats: i64) -> Event {
        let now = Utc::now();
        Event::create(
            NewEvent {
                name: "Jazz night".into(),
                starts_at: now + Duration::days(5),
                total_seats: seats,
                booking_ttl: None,
                requires_confirmation: true,
            },
            now,
        )
    }

    #[tokio::test]
    async fn missing_event_leaves_no_lock_entry() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();

        for _ in 0..3 {
            let found = EventRepository::get_for_update(&store, &mut tx, &Uuid::new_v4())
                .await
                .unwrap();
            assert!(found.is_none());
        }

        assert!(tx.locks.is_empty());
        assert!(store.row_locks.lock().is_empty());
    }

    #[tokio::test]
    async fn staged_writes_are_invisible_until_commit() {
        let store = MemoryStore::new();
        let event = mk_event(2);
        EventRepository::create(&store, &event).await.unwrap();

        let mut tx = store.begin().await.unwrap();
        EventRepository::get_for_update(&store, &mut tx, &event.id).await.unwrap();
        assert!(
            store
                .decrement_available_seats(&mut tx, &event.id, Utc::now())
                .await
                .unwrap()
        );

        let outside = EventRepository::get_by_id(&store, &event.id).await.unwrap().unwrap();
        assert_eq!(outside.available, 2);

        store.commit(tx).await.unwrap();
        let after = EventRepository::get_by_id(&store, &event.id).await.unwrap().unwrap();
        assert_eq!(after.available, 1);
    }

    #[tokio::test]
    async fn dropping_tx_rolls_back_and_releases_lock() {
        let store = MemoryStore::new();
        let event = mk_event(1);
        EventRepository::create(&store, &event).await.unwrap();

        {
            let mut tx = store.begin().await.unwrap();
            EventRepository::get_for_update(&store, &mut tx, &event.id).await.unwrap();
            store
                .decrement_available_seats(&mut tx, &event.id, Utc::now())
                .await
                .unwrap();
            assert!(store.is_locked(&event.id));
        }

        assert!(!store.is_locked(&event.id));
        let after = EventRepository::get_by_id(&store, &event.id).await.unwrap().unwrap();
        assert_eq!(after.available, 1);
    }

    #[tokio::test]
    async fn ledger_writes_require_the_row_lock() {
        let store = MemoryStore::new();
        let event = mk_event(1);
        EventRepository::create(&store, &event).await.unwrap();

        let mut tx = store.begin().await.unwrap();
        let err = store
            .decrement_available_seats(&mut tx, &event.id, Utc::now())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not locked"));
    }

    #[tokio::test]
    async fn decrement_refuses_at_zero() {
        let store = MemoryStore::new();
        let event = mk_event(0);
        EventRepository::create(&store, &event).await.unwrap();

        let mut tx = store.begin().await.unwrap();
        EventRepository::get_for_update(&store, &mut tx, &event.id).await.unwrap();
        assert!(
            !store
                .decrement_available_seats(&mut tx, &event.id, Utc::now())
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn update_never_touches_the_counter() {
        let store = MemoryStore::new();
        let event = mk_event(3);
        EventRepository::create(&store, &event).await.unwrap();

        let mut tx = store.begin().await.unwrap();
        let mut locked = EventRepository::get_for_update(&store, &mut tx, &event.id).await.unwrap().unwrap();
        locked.available = 99;
        locked.name = "Renamed".into();
        EventRepository::update(&store, &mut tx, &locked).await.unwrap();
        store.commit(tx).await.unwrap();

        let after = EventRepository::get_by_id(&store, &event.id).await.unwrap().unwrap();
        assert_eq!(after.name, "Renamed");
        assert_eq!(after.available, 3);
    }

    #[tokio::test]
    async fn second_locker_waits_for_commit() {
        let store = Arc::new(MemoryStore::new());
        let event = mk_event(1);
        EventRepository::create(store.as_ref(), &event).await.unwrap();

        let mut tx = store.begin().await.unwrap();
        EventRepository::get_for_update(store.as_ref(), &mut tx, &event.id).await.unwrap();

        let s = Arc::clone(&store);
        let id = event.id;
        let waiter = tokio::spawn(async move {
            let mut tx2 = s.begin().await.unwrap();
            EventRepository::get_for_update(s.as_ref(), &mut tx2, &id).await.unwrap().unwrap().available
        });

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        store
            .decrement_available_seats(&mut tx, &event.id, Utc::now())
            .await
            .unwrap();
        store.commit(tx).await.unwrap();

        // the waiter observes the committed decrement
        assert_eq!(waiter.await.unwrap(), 0);
    }
}
