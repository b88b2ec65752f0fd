use anyhow::{Context, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::{AnyPool, Row};
use uuid::Uuid;

use crate::db::codec::{bool_to_i64, from_ms, i64_to_bool, parse_uuid, to_ms};
use crate::db::{Dialect, SqlxTx};
use crate::event::model::{Event, EventStatus};
use crate::event::repository::EventRepository;

const EVENT_COLUMNS: &str = "id, name, starts_at_ms, total_seats, available, booking_ttl_ms, \
     requires_confirmation, status, created_at_ms, updated_at_ms";

/// SQLx-backed implementation of EventRepository.
/// Responsible only for persistence, row locking and row mapping.
pub struct SqlxEventRepository {
    pool: AnyPool,
    dialect: Dialect,
}

impl SqlxEventRepository {
    pub fn new(pool: AnyPool, dialect: Dialect) -> Self {
        Self { pool, dialect }
    }
}

#[async_trait]
impl EventRepository<SqlxTx> for SqlxEventRepository {
    async fn create(&self, event: &Event) -> anyhow::Result<()> {
        sqlx::query(
            r#"
INSERT INTO events (
  id, name, starts_at_ms, total_seats, available, booking_ttl_ms,
  requires_confirmation, status, created_at_ms, updated_at_ms
)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10);
"#,
        )
        .bind(event.id.to_string())
        .bind(&event.name)
        .bind(to_ms(event.starts_at))
        .bind(event.total_seats)
        .bind(event.available)
        .bind(ttl_to_ms(event.booking_ttl))
        .bind(bool_to_i64(event.requires_confirmation))
        .bind(event.status.to_string())
        .bind(to_ms(event.created_at))
        .bind(to_ms(event.updated_at))
        .execute(&self.pool)
        .await
        .context("failed to insert event")?;

        Ok(())
    }

    async fn get_by_id(&self, id: &Uuid) -> anyhow::Result<Option<Event>> {
        let sql = format!("SELECT {EVENT_COLUMNS} FROM events WHERE id = $1;");
        let row = sqlx::query(&sql)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_event).transpose()
    }

    async fn get_all(&self) -> anyhow::Result<Vec<Event>> {
        let sql =
            format!("SELECT {EVENT_COLUMNS} FROM events ORDER BY starts_at_ms ASC, created_at_ms DESC;");
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;

        let mut out = Vec::with_capacity(rows.len());
        for r in rows {
            match row_to_event(&r) {
                Ok(e) => out.push(e),
                Err(e) => {
                    // poison-row resilience: a listing should not fail on one bad row
                    tracing::warn!(error = %e, "skipping malformed event row");
                }
            }
        }

        Ok(out)
    }

    async fn get_for_update(&self, tx: &mut SqlxTx, id: &Uuid) -> anyhow::Result<Option<Event>> {
        let sql = match self.dialect {
            Dialect::Postgres => format!("SELECT {EVENT_COLUMNS} FROM events WHERE id = $1 FOR UPDATE;"),
            Dialect::Sqlite => {
                // SQLite has no row locks; a no-op write takes the database
                // write lock for the rest of the transaction.
                sqlx::query("UPDATE events SET available = available WHERE id = $1;")
                    .bind(id.to_string())
                    .execute(&mut **tx)
                    .await
                    .context("failed to lock event row")?;
                format!("SELECT {EVENT_COLUMNS} FROM events WHERE id = $1;")
            }
        };

        let row = sqlx::query(&sql)
            .bind(id.to_string())
            .fetch_optional(&mut **tx)
            .await
            .context("failed to read event for update")?;

        row.as_ref().map(row_to_event).transpose()
    }

    async fn update(&self, tx: &mut SqlxTx, event: &Event) -> anyhow::Result<()> {
        sqlx::query(
            r#"
UPDATE events
SET name = $1, starts_at_ms = $2, booking_ttl_ms = $3,
    requires_confirmation = $4, status = $5, updated_at_ms = $6
WHERE id = $7;
"#,
        )
        .bind(&event.name)
        .bind(to_ms(event.starts_at))
        .bind(ttl_to_ms(event.booking_ttl))
        .bind(bool_to_i64(event.requires_confirmation))
        .bind(event.status.to_string())
        .bind(to_ms(event.updated_at))
        .bind(event.id.to_string())
        .execute(&mut **tx)
        .await
        .context("failed to update event")?;

        Ok(())
    }

    async fn decrement_available_seats(
        &self,
        tx: &mut SqlxTx,
        id: &Uuid,
        at: DateTime<Utc>,
    ) -> anyhow::Result<bool> {
        let res = sqlx::query(
            r#"
UPDATE events
SET available = available - 1, updated_at_ms = $1
WHERE id = $2 AND available > 0;
"#,
        )
        .bind(to_ms(at))
        .bind(id.to_string())
        .execute(&mut **tx)
        .await
        .context("failed to decrement available seats")?;

        Ok(res.rows_affected() == 1)
    }

    async fn increment_available_seats(
        &self,
        tx: &mut SqlxTx,
        id: &Uuid,
        at: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        let res = sqlx::query(
            r#"
UPDATE events
SET available = available + 1, updated_at_ms = $1
WHERE id = $2;
"#,
        )
        .bind(to_ms(at))
        .bind(id.to_string())
        .execute(&mut **tx)
        .await
        .context("failed to increment available seats")?;

        if res.rows_affected() != 1 {
            return Err(anyhow!("event {id} vanished while returning a seat"));
        }
        Ok(())
    }
}

/* =========================
Row mapping + conversions
========================= */

fn row_to_event(r: &sqlx::any::AnyRow) -> anyhow::Result<Event> {
    let id: String = r.try_get("id")?;
    let status: String = r.try_get("status")?;

    Ok(Event {
        id: parse_uuid(&id, "event id")?,
        name: r.try_get("name")?,
        starts_at: from_ms(r.try_get("starts_at_ms")?)?,
        total_seats: r.try_get("total_seats")?,
        available: r.try_get("available")?,
        booking_ttl: ms_to_ttl(r.try_get("booking_ttl_ms")?),
        requires_confirmation: i64_to_bool(r.try_get("requires_confirmation")?)?,
        status: status.parse::<EventStatus>().map_err(|e| anyhow!(e))?,
        created_at: from_ms(r.try_get("created_at_ms")?)?,
        updated_at: from_ms(r.try_get("updated_at_ms")?)?,
    })
}

/// `0` stores "use the system default".
fn ttl_to_ms(ttl: Option<Duration>) -> i64 {
    ttl.map(|d| d.num_milliseconds()).unwrap_or(0)
}

fn ms_to_ttl(ms: i64) -> Option<Duration> {
    (ms > 0).then(|| Duration::milliseconds(ms))
}
