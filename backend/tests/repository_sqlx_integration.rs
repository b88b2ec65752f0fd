use std::sync::Arc;

use chrono::{Duration, Utc};
use sqlx::Row;
use uuid::Uuid;

use event_booker::booking::model::BookingStatus;
use event_booker::clock::{Clock, ManualClock};
use event_booker::db::{Db, Dialect, Repositories, UnitOfWork};
use event_booker::engine::{BookingEngine, EngineSettings};
use event_booker::error::BookingError;
use event_booker::event::model::{EventStatus, NewEvent};
use event_booker::metrics::counters::Counters;
use event_booker::notification::composite::CompositeNotifier;
use event_booker::user::model::UserRole;

/// Helper to setup an isolated, unique in-memory SQLite database.
/// A unique name per test keeps parallel tests apart while still allowing
/// shared cache access across the pool.
async fn setup_db() -> Db {
    sqlx::any::install_default_drivers();

    let db_name = Uuid::new_v4().to_string();
    let conn_str = format!("sqlite:file:{}?mode=memory&cache=shared", db_name);

    let db = Db::connect(&conn_str, 5).await.unwrap();
    db.migrate().await.unwrap();
    // idempotent
    db.migrate().await.unwrap();
    db
}

fn engine(db: Db, clock: Arc<ManualClock>) -> BookingEngine<Db> {
    BookingEngine::new(
        Repositories::sqlx(db),
        Arc::new(CompositeNotifier::default()),
        clock,
        EngineSettings::default(),
        Counters::default(),
    )
}

fn new_event(now: chrono::DateTime<Utc>, hold: bool) -> NewEvent {
    NewEvent {
        name: "Film club".into(),
        starts_at: now + Duration::days(4),
        total_seats: 2,
        booking_ttl: if hold { Some(Duration::minutes(5)) } else { None },
        requires_confirmation: hold,
    }
}

#[tokio::test]
async fn event_round_trips_through_sql() {
    let db = setup_db().await;
    assert_eq!(db.dialect, Dialect::Sqlite);
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let engine = engine(db, clock.clone());

    let created = engine.create_event(new_event(clock.now(), true)).await.unwrap();
    let loaded = engine.get_event(created.id).await.unwrap();

    assert_eq!(loaded.name, created.name);
    assert_eq!(loaded.total_seats, 2);
    assert_eq!(loaded.available, 2);
    assert_eq!(loaded.booking_ttl, Some(Duration::minutes(5)));
    assert!(loaded.requires_confirmation);
    assert_eq!(loaded.status, EventStatus::Active);
    assert_eq!(
        loaded.starts_at.timestamp_millis(),
        created.starts_at.timestamp_millis()
    );

    let no_ttl = engine.create_event(new_event(clock.now(), false)).await.unwrap();
    assert_eq!(engine.get_event(no_ttl.id).await.unwrap().booking_ttl, None);
    assert_eq!(engine.list_events().await.unwrap().len(), 2);
}

#[tokio::test]
async fn sub_second_ttl_is_stored_exactly() {
    let db = setup_db().await;
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let engine = engine(db, clock.clone());

    let mut new = new_event(clock.now(), true);
    new.booking_ttl = Some(Duration::milliseconds(1_500));
    let created = engine.create_event(new).await.unwrap();
    assert_eq!(
        engine.get_event(created.id).await.unwrap().booking_ttl,
        Some(Duration::milliseconds(1_500))
    );

    let mut new = new_event(clock.now(), true);
    new.booking_ttl = Some(Duration::milliseconds(500));
    let short = engine.create_event(new).await.unwrap();
    assert_eq!(
        engine.get_event(short.id).await.unwrap().booking_ttl,
        Some(Duration::milliseconds(500))
    );

    // the event's own hold applies, not the system default
    let b = engine.book_place(short.id, Uuid::new_v4()).await.unwrap();
    assert_eq!(b.expires_at - b.created_at, Duration::milliseconds(500));
}

#[tokio::test]
async fn booking_lifecycle_against_sqlite() {
    let db = setup_db().await;
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let engine = engine(db, clock.clone());

    let user = engine
        .register_user(Some("viewer@example.com".into()), Some(String::new()), UserRole::User)
        .await
        .unwrap();
    let loaded_user = engine.get_user(user.id).await.unwrap();
    assert_eq!(loaded_user.email.as_deref(), Some("viewer@example.com"));
    assert_eq!(loaded_user.telegram, None);

    let event = engine.create_event(new_event(clock.now(), true)).await.unwrap();

    let a = engine.book_place(event.id, user.id).await.unwrap();
    let b = engine.book_place(event.id, user.id).await.unwrap();
    assert_eq!(a.status, BookingStatus::Pending);
    assert!(matches!(
        engine.book_place(event.id, user.id).await,
        Err(BookingError::NoSeatsAvailable(_))
    ));
    assert_eq!(engine.get_event(event.id).await.unwrap().available, 0);

    clock.advance(Duration::minutes(1));
    let confirmed = engine.confirm_booking(a.id).await.unwrap();
    assert!(confirmed.confirmed_at.is_some());

    clock.advance(Duration::minutes(5));
    assert!(matches!(
        engine.confirm_booking(b.id).await,
        Err(BookingError::BookingExpired(_))
    ));

    let expired = engine.get_expired_bookings().await.unwrap();
    assert_eq!(expired.len(), 1);
    assert_eq!(expired[0].id, b.id);

    let report = engine.sweeper().sweep_once().await.unwrap();
    assert_eq!(report.cancelled, 1);
    assert_eq!(engine.get_event(event.id).await.unwrap().available, 1);

    engine.cancel_booking(a.id).await.unwrap();
    assert!(matches!(
        engine.cancel_booking(a.id).await,
        Err(BookingError::AlreadyCancelled(_))
    ));
    assert_eq!(engine.get_event(event.id).await.unwrap().available, 2);

    let stored = engine.list_event_bookings(event.id).await.unwrap();
    assert_eq!(stored.len(), 2);
    assert!(stored.iter().all(|b| b.status == BookingStatus::Cancelled));
    assert!(stored.iter().any(|b| b.confirmed_at.is_some()));
}

#[tokio::test]
async fn cascade_commits_as_one_unit() {
    let db = setup_db().await;
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let engine = engine(db, clock.clone());

    let event = engine.create_event(new_event(clock.now(), false)).await.unwrap();
    engine.book_place(event.id, Uuid::new_v4()).await.unwrap();
    engine.book_place(event.id, Uuid::new_v4()).await.unwrap();

    let outcome = engine.cancel_event(event.id, "projector broken").await.unwrap();
    assert_eq!(outcome.cancelled.len(), 2);

    let stored = engine.get_event(event.id).await.unwrap();
    assert_eq!(stored.status, EventStatus::Cancelled);
    assert_eq!(stored.available, 2);
    assert!(
        engine
            .list_event_bookings(event.id)
            .await
            .unwrap()
            .iter()
            .all(|b| b.status == BookingStatus::Cancelled)
    );
}

#[tokio::test]
async fn uncommitted_transaction_is_discarded() {
    let db = setup_db().await;
    let pool = db.pool.clone();
    let repos = Repositories::sqlx(db);
    let clock = ManualClock::new(Utc::now());

    let event = event_booker::event::model::Event::create(new_event(clock.now(), false), clock.now());
    repos.events.create(&event).await.unwrap();

    {
        let mut tx = repos.db.begin().await.unwrap();
        let locked = repos
            .events
            .get_for_update(&mut tx, &event.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(locked.available, 2);
        assert!(
            repos
                .events
                .decrement_available_seats(&mut tx, &event.id, clock.now())
                .await
                .unwrap()
        );
        // dropped without commit
    }

    let row = sqlx::query("SELECT available FROM events WHERE id = $1")
        .bind(event.id.to_string())
        .fetch_one(&pool)
        .await
        .unwrap();
    let available: i64 = row.try_get("available").unwrap();
    assert_eq!(available, 2);
}

#[tokio::test]
async fn decrement_stops_at_zero() {
    let db = setup_db().await;
    let repos = Repositories::sqlx(db);
    let now = Utc::now();

    let mut new = new_event(now, false);
    new.total_seats = 1;
    let event = event_booker::event::model::Event::create(new, now);
    repos.events.create(&event).await.unwrap();

    let mut tx = repos.db.begin().await.unwrap();
    repos.events.get_for_update(&mut tx, &event.id).await.unwrap();
    assert!(repos.events.decrement_available_seats(&mut tx, &event.id, now).await.unwrap());
    assert!(!repos.events.decrement_available_seats(&mut tx, &event.id, now).await.unwrap());
    repos.db.commit(tx).await.unwrap();

    assert_eq!(repos.events.get_by_id(&event.id).await.unwrap().unwrap().available, 0);
}
